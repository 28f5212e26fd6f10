use super::*;
use crate::types::{PaneInfo, PaneTiming, Window};
use crate::window::{FixedWindows, GlobalWindows};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Clone, Default)]
struct Recorder {
    values: Arc<Mutex<Vec<WindowedValue>>>,
    batches: Arc<Mutex<Vec<WindowedBatch>>>,
    flushes: Arc<Mutex<usize>>,
}

impl Receiver for Recorder {
    fn receive(&mut self, value: WindowedValue) -> anyhow::Result<()> {
        self.values.lock().unwrap().push(value);
        Ok(())
    }

    fn receive_batch(&mut self, batch: WindowedBatch) -> anyhow::Result<()> {
        self.batches.lock().unwrap().push(batch);
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        *self.flushes.lock().unwrap() += 1;
        Ok(())
    }
}

fn w(start: i64, end: i64) -> Window {
    Window::interval(start, end)
}

fn handler(main: &Recorder) -> OutputHandler {
    OutputHandler::new(Arc::new(GlobalWindows), Box::new(main.clone()))
}

fn late_pane() -> PaneInfo {
    PaneInfo {
        is_first: false,
        is_last: true,
        timing: PaneTiming::Late,
        index: 3,
        nonspeculative_index: 1,
    }
}

#[test]
fn test_plain_value_inherits_input_metadata() {
    let main = Recorder::default();
    let mut h = handler(&main);
    let input = WindowedValue::new(1, 50, vec![w(0, 100)]).with_pane_info(late_pane());
    h.handle_process_outputs(&input, vec![Output::Value(Value::Int(2))])
        .unwrap();
    let values = main.values.lock().unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0], input.with_value(Value::Int(2)));
}

#[test]
fn test_timestamped_value_gets_new_windows() {
    let main = Recorder::default();
    let mut h = OutputHandler::new(
        Arc::new(FixedWindows::of(Duration::from_millis(10)).unwrap()),
        Box::new(main.clone()),
    );
    let input = WindowedValue::new(1, 5, vec![w(0, 10)]).with_pane_info(late_pane());
    h.handle_process_outputs(&input, vec![Output::timestamped(7, 23)])
        .unwrap();
    let values = main.values.lock().unwrap();
    assert_eq!(values[0].timestamp, 23);
    assert_eq!(values[0].windows, vec![w(20, 30)]);
    assert_eq!(values[0].pane_info, PaneInfo::NO_FIRING);
}

#[test]
fn test_override_windows_replicated_for_multi_window_input() {
    let main = Recorder::default();
    let mut h = handler(&main);
    let input = WindowedValue::new(1, 5, vec![w(0, 10), w(5, 15), w(-5, 5)]);
    h.handle_process_outputs(
        &input,
        vec![
            Output::Windowed(WindowedValue::new(2, 7, vec![w(100, 200)])),
            Output::timestamped(3, 8),
            Output::Value(Value::Int(4)),
        ],
    )
    .unwrap();
    let values = main.values.lock().unwrap();
    assert_eq!(values[0].windows, vec![w(100, 200); 3]);
    assert_eq!(values[1].windows, vec![Window::Global; 3]);
    // Plain values keep the input's own window list.
    assert_eq!(values[2].windows, input.windows);
}

#[test]
fn test_tagged_outputs() {
    let main = Recorder::default();
    let side = Recorder::default();
    let mut h = handler(&main).with_tagged_receiver("side", Box::new(side.clone()));
    let input = WindowedValue::in_global_window(1);
    h.handle_process_outputs(
        &input,
        vec![
            Output::tagged("side", Output::Value(Value::Int(10))),
            Output::Value(Value::Int(20)),
        ],
    )
    .unwrap();
    assert_eq!(side.values.lock().unwrap()[0].value, Value::Int(10));
    assert_eq!(main.values.lock().unwrap()[0].value, Value::Int(20));
}

#[test]
fn test_unknown_and_invalid_tags() {
    let main = Recorder::default();
    let mut h = handler(&main);
    let input = WindowedValue::in_global_window(1);

    let err = h
        .handle_process_outputs(&input, vec![Output::tagged("nope", Output::Value(Value::Null))])
        .unwrap_err();
    assert!(matches!(err, RunnerError::UnknownTag(ref tag) if tag == "nope"));

    let err = h
        .handle_process_outputs(&input, vec![Output::tagged("", Output::Value(Value::Null))])
        .unwrap_err();
    assert!(matches!(err, RunnerError::InvalidTag(_)));

    let nested = Output::tagged("a", Output::tagged("b", Output::Value(Value::Null)));
    let err = h.handle_process_outputs(&input, vec![nested]).unwrap_err();
    assert!(err.is_shape_error());
    assert!(main.values.lock().unwrap().is_empty());
}

#[test]
fn test_batch_in_element_mode_is_shape_error() {
    let main = Recorder::default();
    let mut h = handler(&main);
    let input = WindowedValue::in_global_window(1);
    let batch = WindowedBatch::from_batch_and_windowed_value(Value::list([1, 2]), &input);
    let err = h
        .handle_process_outputs(&input, vec![Output::WindowedBatch(batch)])
        .unwrap_err();
    assert!(matches!(err, RunnerError::OutputShape(_)));
}

#[test]
fn test_process_yielding_batches() {
    let main = Recorder::default();
    let counter = OutputCounter::new();
    let mut h = handler(&main)
        .with_output_modes(true, false)
        .with_counter(counter.clone());
    let input = WindowedValue::new(1, 5, vec![w(0, 10)]);
    h.handle_process_outputs(&input, vec![Output::Value(Value::list([1, 2, 3]))])
        .unwrap();
    let batches = main.batches.lock().unwrap();
    assert_eq!(batches[0], WindowedBatch::from_batch_and_windowed_value(Value::list([1, 2, 3]), &input));
    assert_eq!(counter.snapshot().sum, 3);

    let err = h
        .handle_process_outputs(&input, vec![Output::timestamped(1, 1)])
        .unwrap_err();
    assert!(matches!(err, RunnerError::OutputShape(_)));
}

#[test]
fn test_process_batch_outputs() {
    let main = Recorder::default();
    let mut h = handler(&main);
    let input = WindowedBatch::of(Value::list([1, 2]), 9, vec![w(0, 10), w(5, 15)], PaneInfo::NO_FIRING);
    let explicit = WindowedBatch::of(Value::list([7]), 3, vec![w(0, 5)], PaneInfo::NO_FIRING);
    h.handle_process_batch_outputs(
        &input,
        vec![
            Output::Value(Value::list([2, 4])),
            Output::WindowedBatch(explicit),
        ],
    )
    .unwrap();
    let batches = main.batches.lock().unwrap();
    assert_eq!(batches[0], input.with_values(Value::list([2, 4])));
    assert_eq!(batches[1].windows, vec![w(0, 5), w(0, 5)]);

    let err = h
        .handle_process_batch_outputs(
            &input,
            vec![Output::Windowed(WindowedValue::in_global_window(1))],
        )
        .unwrap_err();
    assert!(matches!(err, RunnerError::OutputShape(_)));
}

#[test]
fn test_process_batch_yielding_elements() {
    let main = Recorder::default();
    let mut h = handler(&main).with_output_modes(false, true);
    let input = WindowedBatch::of(Value::list([1, 2]), 9, vec![w(0, 10)], PaneInfo::NO_FIRING);
    h.handle_process_batch_outputs(
        &input,
        vec![Output::Value(Value::Int(1)), Output::Value(Value::Int(2))],
    )
    .unwrap();
    let values = main.values.lock().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values[1], WindowedValue::new(2, 9, vec![w(0, 10)]));
}

#[test]
fn test_counter_records_per_element_distribution() {
    let main = Recorder::default();
    let counter = OutputCounter::new();
    let mut h = handler(&main).with_counter(counter.clone());
    let input = WindowedValue::in_global_window(1);
    h.handle_process_outputs(&input, vec![Output::Value(Value::Int(1)); 3])
        .unwrap();
    h.handle_process_outputs(&input, vec![]).unwrap();
    assert_eq!(
        counter.snapshot(),
        OutputCounterSnapshot {
            count: 2,
            sum: 3,
            min: Some(0),
            max: Some(3),
        }
    );
}

#[test]
fn test_start_and_finish_bundle_outputs() {
    let main = Recorder::default();
    let mut h = handler(&main);
    assert!(h.start_bundle_outputs(vec![]).is_ok());
    let err = h
        .start_bundle_outputs(vec![Output::Value(Value::Int(1))])
        .unwrap_err();
    assert!(matches!(err, RunnerError::OutputShape(_)));

    let wv = WindowedValue::new(1, 99, vec![w(0, 100)]);
    h.finish_bundle_outputs(vec![Output::Windowed(wv.clone())]).unwrap();
    assert_eq!(main.values.lock().unwrap()[0], wv);

    let err = h
        .finish_bundle_outputs(vec![Output::Value(Value::Int(1))])
        .unwrap_err();
    assert!(matches!(err, RunnerError::OutputShape(_)));
}

#[test]
fn test_flush_reaches_every_receiver() {
    let main = Recorder::default();
    let side = Recorder::default();
    let mut h = handler(&main).with_tagged_receiver("side", Box::new(side.clone()));
    h.flush().unwrap();
    assert_eq!(*main.flushes.lock().unwrap(), 1);
    assert_eq!(*side.flushes.lock().unwrap(), 1);
}

#[test]
fn test_list_batch_converter() {
    assert_eq!(ListBatchConverter.get_length(&Value::list([1, 2])).unwrap(), 2);
    assert!(ListBatchConverter.get_length(&Value::Int(1)).is_err());
}
