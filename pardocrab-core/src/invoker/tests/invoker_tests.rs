use super::*;
use crate::output::Receiver;
use crate::resources::{ContextParam, Resource, ResourceFactory};
use crate::sdf::{OffsetRange, OffsetRangeProvider};
use crate::side_input::WindowedSideInput;
use crate::signature::{DoFnDecl, MethodDecl};
use crate::state::{InMemoryStateContext, StateSpec, TimeDomain};
use crate::types::SizedRestriction;
use crate::window::GlobalWindows;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Clone, Default)]
struct Recorder {
    values: Arc<Mutex<Vec<WindowedValue>>>,
    batches: Arc<Mutex<Vec<WindowedBatch>>>,
}

impl Recorder {
    fn values(&self) -> Vec<WindowedValue> {
        self.values.lock().unwrap().clone()
    }

    fn payloads(&self) -> Vec<Value> {
        self.values().into_iter().map(|wv| wv.value).collect()
    }
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
}

fn build(dofn: impl DoFn + 'static, args: InvokerArgs) -> (Box<dyn DoFnInvoker>, Recorder) {
    let recorder = Recorder::default();
    let signature = Arc::new(DoFnSignature::new(&dofn).unwrap());
    let handler = OutputHandler::new(Arc::new(GlobalWindows), Box::new(recorder.clone()))
        .with_output_modes(
            signature.process_yields_batches(),
            signature.process_batch_yields_elements(),
        );
    let invoker = create_invoker(Box::new(dofn), signature, handler, args).unwrap();
    (invoker, recorder)
}

fn w(start: i64, end: i64) -> Window {
    Window::interval(start, end)
}

fn int(ctx: &ProcessContext, name: &str) -> anyhow::Result<i64> {
    ctx.value(name)?
        .as_int()
        .ok_or_else(|| anyhow::anyhow!("'{name}' is not an integer"))
}

// ── DoFns ───────────────────────────────────────────────────────────────────

struct Doubler;

impl DoFn for Doubler {
    fn declare(&self) -> DoFnDecl {
        DoFnDecl::new().process(MethodDecl::new().arg("x"))
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let x = int(ctx, "x")?;
        ctx.collect(x * 2);
        Ok(())
    }
}

struct AddOffset;

impl DoFn for AddOffset {
    fn declare(&self) -> DoFnDecl {
        DoFnDecl::new().process(MethodDecl::new().arg("x").arg("offset"))
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let sum = int(ctx, "x")? + int(ctx, "offset")?;
        ctx.collect(sum);
        Ok(())
    }
}

struct WindowName;

impl DoFn for WindowName {
    fn declare(&self) -> DoFnDecl {
        DoFnDecl::new().process(MethodDecl::new().arg("x").special("w", ParamKind::Window))
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let name = ctx.window()?.to_string();
        ctx.collect(name);
        Ok(())
    }
}

struct TimestampEcho;

impl DoFn for TimestampEcho {
    fn declare(&self) -> DoFnDecl {
        DoFnDecl::new().process(MethodDecl::new().arg("x").special("ts", ParamKind::Timestamp))
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let ts = ctx.timestamp()?;
        ctx.collect(ts);
        Ok(())
    }
}

/// Emits a plain, a timestamped and a windowed output per element. The
/// timestamp parameter, when declared, is never read.
struct ThreeOutputs {
    declare_timestamp: bool,
}

impl DoFn for ThreeOutputs {
    fn declare(&self) -> DoFnDecl {
        let mut process = MethodDecl::new().arg("x");
        if self.declare_timestamp {
            process = process.special("ts", ParamKind::Timestamp);
        }
        DoFnDecl::new().process(process)
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let x = int(ctx, "x")?;
        ctx.collect(x * 2);
        ctx.collect_timestamped(x, 100 + x);
        ctx.collect_windowed(WindowedValue::new(-x, 1, vec![w(0, 10)]));
        Ok(())
    }
}

struct Lookup;

impl DoFn for Lookup {
    fn declare(&self) -> DoFnDecl {
        DoFnDecl::new().process(MethodDecl::new().arg("x").marker("lookup", "side_input"))
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let value = ctx.value("lookup")?.clone();
        ctx.collect(value);
        Ok(())
    }
}

/// Returns how many times it has been read.
struct CountingSideInput {
    calls: Arc<AtomicUsize>,
    global: bool,
}

impl SideInputMap for CountingSideInput {
    fn is_globally_windowed(&self) -> bool {
        self.global
    }

    fn get(&self, _window: &Window) -> anyhow::Result<Value> {
        Ok(Value::Int(self.calls.fetch_add(1, Ordering::SeqCst) as i64 + 1))
    }
}

struct KeyEcho;

impl DoFn for KeyEcho {
    fn declare(&self) -> DoFnDecl {
        DoFnDecl::new().process(MethodDecl::new().arg("kv").special("k", ParamKind::Key))
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let key = ctx.key()?.clone();
        ctx.collect(key);
        Ok(())
    }
}

struct CountPerKey;

impl DoFn for CountPerKey {
    fn declare(&self) -> DoFnDecl {
        DoFnDecl::new().process(
            MethodDecl::new()
                .arg("kv")
                .special("k", ParamKind::Key)
                .special("count", ParamKind::State(StateSpec::value("count"))),
        )
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let key = ctx.key()?.clone();
        let state = Arc::clone(ctx.state("count")?);
        let n = state.read()?.and_then(|v| v.as_int()).unwrap_or(0) + 1;
        state.write(Value::Int(n))?;
        ctx.collect(Value::kv(key, n));
        Ok(())
    }
}

fn flush_timer() -> TimerSpec {
    TimerSpec::event_time("flush")
}

/// Sets a timer ten milliseconds after each element; the callback reports
/// what it was called with.
struct DelayedFlush;

impl DoFn for DelayedFlush {
    fn declare(&self) -> DoFnDecl {
        DoFnDecl::new()
            .process(
                MethodDecl::new()
                    .arg("kv")
                    .special("ts", ParamKind::Timestamp)
                    .special("t", ParamKind::Timer(flush_timer())),
            )
            .on_timer(
                flush_timer(),
                MethodDecl::new()
                    .special("k", ParamKind::Key)
                    .special("w", ParamKind::Window)
                    .special("ts", ParamKind::Timestamp)
                    .special("tag", ParamKind::DynamicTimerTag),
            )
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let ts = ctx.timestamp()?;
        ctx.timer("t")?.set(ts + 10, "")?;
        Ok(())
    }

    fn on_timer(&mut self, _timer: &TimerSpec, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let report = Value::Tuple(vec![
            ctx.key()?.clone(),
            Value::from(ctx.dynamic_timer_tag()?),
            Value::Int(ctx.timestamp()?),
            Value::from(ctx.window()?.to_string()),
        ]);
        ctx.collect(report);
        Ok(())
    }
}

/// Emits every claimed offset; optionally checkpoints after a number of claims.
struct EmitOffsets {
    defer_after: Option<usize>,
    observe_window: bool,
}

impl DoFn for EmitOffsets {
    fn declare(&self) -> DoFnDecl {
        let provider = Arc::new(OffsetRangeProvider::from_int_elements());
        let mut process = MethodDecl::new()
            .arg("n")
            .special("tracker", ParamKind::RestrictionTracker(provider));
        if self.observe_window {
            process = process.special("w", ParamKind::Window);
        }
        DoFnDecl::new().process(process)
    }

    fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let tracker = ctx.restriction_tracker()?.clone();
        let range = OffsetRange::from_value(&tracker.current_restriction()?)?;
        let mut position = range.start;
        let mut claimed = 0;
        while tracker.try_claim(position)? {
            ctx.collect(position);
            claimed += 1;
            position += 1;
            if Some(claimed) == self.defer_after {
                tracker.defer_remainder(None)?;
                break;
            }
        }
        Ok(())
    }
}

struct BatchSizes;

impl DoFn for BatchSizes {
    fn declare(&self) -> DoFnDecl {
        DoFnDecl::new().process_batch(MethodDecl::new().arg("batch").special("w", ParamKind::Window))
    }

    fn process_batch(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let n = ctx.element()?.as_items().map_or(0, |items| items.len());
        ctx.collect(Value::list([n as i64]));
        Ok(())
    }
}

#[derive(Clone, Default)]
struct Tracking {
    entered: Arc<AtomicUsize>,
    exited: Arc<AtomicUsize>,
}

impl ResourceFactory for Tracking {
    fn enter(&self) -> anyhow::Result<Resource> {
        self.entered.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(String::from("conn")))
    }

    fn exit(&self, _resource: Resource) -> anyhow::Result<()> {
        self.exited.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Bundled {
    param: ContextParam,
    seen: Arc<Mutex<Option<String>>>,
    fail_finish: bool,
    output_in_start: bool,
}

impl DoFn for Bundled {
    fn declare(&self) -> DoFnDecl {
        DoFnDecl::new()
            .process(MethodDecl::new().arg("x"))
            .start_bundle(MethodDecl::new().special("conn", ParamKind::BundleContext(self.param.clone())))
    }

    fn start_bundle(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
        let conn = ctx.resource::<String>("conn")?;
        *self.seen.lock().unwrap() = Some(conn.as_str().to_string());
        if self.output_in_start {
            ctx.collect(1);
        }
        Ok(())
    }

    fn finish_bundle(&mut self, _ctx: &mut ProcessContext) -> anyhow::Result<()> {
        if self.fail_finish {
            anyhow::bail!("flush failed");
        }
        Ok(())
    }
}

fn bundled(tracking: &Tracking, fail_finish: bool, output_in_start: bool) -> (Bundled, Arc<Mutex<Option<String>>>) {
    let seen = Arc::new(Mutex::new(None));
    let dofn = Bundled {
        param: ContextParam::new("conn", Arc::new(tracking.clone())),
        seen: Arc::clone(&seen),
        fail_finish,
        output_in_start,
    };
    (dofn, seen)
}

// ── Policy selection and binding ────────────────────────────────────────────

#[test]
fn test_plain_dofn_uses_direct_policy() {
    let (mut invoker, out) = build(Doubler, InvokerArgs::default());
    assert_eq!(invoker.policy(), InvocationPolicy::Direct);
    assert!(invoker.split_coordinator().is_none());

    let residuals = invoker
        .invoke_process(&WindowedValue::new(3, 10, vec![w(0, 100)]), None, None)
        .unwrap();
    assert!(residuals.is_empty());
    assert_eq!(out.values(), vec![WindowedValue::new(6, 10, vec![w(0, 100)])]);
}

#[test]
fn test_constant_args_use_per_window_policy() {
    let args = InvokerArgs {
        args: vec![ConstArg::Value(Value::from(10))],
        ..Default::default()
    };
    let (mut invoker, out) = build(AddOffset, args);
    assert_eq!(invoker.policy(), InvocationPolicy::Windowed);
    invoker
        .invoke_process(&WindowedValue::in_global_window(1), None, None)
        .unwrap();
    assert_eq!(out.payloads(), vec![Value::Int(11)]);
}

#[test]
fn test_window_param_explodes_multi_window_elements() {
    let (mut invoker, out) = build(WindowName, InvokerArgs::default());
    let windows = vec![w(0, 10), w(5, 15), w(10, 20)];
    invoker
        .invoke_process(&WindowedValue::new("x", 7, windows.clone()), None, None)
        .unwrap();

    let values = out.values();
    assert_eq!(values.len(), 3);
    for (value, window) in values.iter().zip(&windows) {
        assert_eq!(value.windows, vec![*window]);
        assert_eq!(value.value, Value::from(window.to_string()));
    }
}

#[test]
fn test_window_insensitive_dofn_sees_element_once() {
    let (mut invoker, out) = build(TimestampEcho, InvokerArgs::default());
    assert_eq!(invoker.policy(), InvocationPolicy::Windowed);
    invoker
        .invoke_process(&WindowedValue::new("x", 7, vec![w(0, 10), w(5, 15)]), None, None)
        .unwrap();
    let values = out.values();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].value, Value::Int(7));
    assert_eq!(values[0].windows, vec![w(0, 10), w(5, 15)]);
}

fn run_policy(
    dofn: ThreeOutputs,
    options: RunnerOptions,
    inputs: &[WindowedValue],
) -> (InvocationPolicy, Vec<WindowedValue>) {
    let (mut invoker, out) = build(dofn, InvokerArgs { options, ..Default::default() });
    for input in inputs {
        assert!(invoker.invoke_process(input, None, None).unwrap().is_empty());
    }
    (invoker.policy(), out.values())
}

#[test]
fn test_direct_and_windowed_policies_agree() {
    let inputs = vec![
        WindowedValue::in_global_window(1),
        WindowedValue::new(2, 7, vec![w(0, 10)]),
        WindowedValue::new(3, 12, vec![w(0, 20), w(10, 30)]),
    ];
    let uncached = RunnerOptions::new().with_experiment(crate::config::DISABLE_GLOBAL_WINDOWED_ARGS_CACHING);

    let (policy, direct) = run_policy(
        ThreeOutputs { declare_timestamp: false },
        RunnerOptions::default(),
        &inputs,
    );
    assert_eq!(policy, InvocationPolicy::Direct);
    assert_eq!(direct.len(), 9);

    let (policy, windowed) = run_policy(
        ThreeOutputs { declare_timestamp: true },
        RunnerOptions::default(),
        &inputs,
    );
    assert_eq!(policy, InvocationPolicy::Windowed);
    assert_eq!(windowed, direct);

    let (policy, recomputed) = run_policy(ThreeOutputs { declare_timestamp: true }, uncached, &inputs);
    assert_eq!(policy, InvocationPolicy::Windowed);
    assert_eq!(recomputed, direct);
}

// ── Side inputs and caching ─────────────────────────────────────────────────

fn lookup_args(side_input: CountingSideInput, options: RunnerOptions) -> InvokerArgs {
    InvokerArgs {
        side_inputs: vec![Arc::new(side_input)],
        args: vec![ConstArg::SideInput],
        options,
        ..Default::default()
    }
}

#[test]
fn test_global_side_input_is_read_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let side_input = CountingSideInput {
        calls: Arc::clone(&calls),
        global: true,
    };
    let (mut invoker, out) = build(Lookup, lookup_args(side_input, RunnerOptions::default()));
    for i in 0..3 {
        invoker
            .invoke_process(&WindowedValue::in_global_window(i), None, None)
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(out.payloads(), vec![Value::Int(1); 3]);
}

#[test]
fn test_caching_can_be_disabled() {
    let calls = Arc::new(AtomicUsize::new(0));
    let side_input = CountingSideInput {
        calls: Arc::clone(&calls),
        global: true,
    };
    let options = RunnerOptions::new().with_experiment(crate::config::DISABLE_GLOBAL_WINDOWED_ARGS_CACHING);
    let (mut invoker, out) = build(Lookup, lookup_args(side_input, options));
    for i in 0..3 {
        invoker
            .invoke_process(&WindowedValue::in_global_window(i), None, None)
            .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(out.payloads(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
}

#[test]
fn test_windowed_side_input_resolved_per_window() {
    let side_input = WindowedSideInput::new()
        .with_value(w(0, 10), "early")
        .with_value(w(10, 20), "late");
    let args = InvokerArgs {
        side_inputs: vec![Arc::new(side_input)],
        args: vec![ConstArg::SideInput],
        ..Default::default()
    };
    let (mut invoker, out) = build(Lookup, args);
    invoker
        .invoke_process(&WindowedValue::new(1, 5, vec![w(0, 10), w(10, 20)]), None, None)
        .unwrap();
    assert_eq!(out.payloads(), vec![Value::from("early"), Value::from("late")]);
}

// ── Keys, state and timers ──────────────────────────────────────────────────

#[test]
fn test_key_param_requires_pairs() {
    let (mut invoker, out) = build(KeyEcho, InvokerArgs::default());
    invoker
        .invoke_process(&WindowedValue::in_global_window(Value::kv("a", 1)), None, None)
        .unwrap();
    assert_eq!(out.payloads(), vec![Value::from("a")]);

    let err = invoker
        .invoke_process(&WindowedValue::in_global_window(5), None, None)
        .unwrap_err();
    assert!(matches!(err, RunnerError::KeyShape(_)));
}

#[test]
fn test_state_is_scoped_per_key() {
    let args = InvokerArgs {
        user_state_context: Some(Arc::new(InMemoryStateContext::new())),
        ..Default::default()
    };
    let (mut invoker, out) = build(CountPerKey, args);
    for key in ["a", "a", "b"] {
        invoker
            .invoke_process(&WindowedValue::in_global_window(Value::kv(key, 0)), None, None)
            .unwrap();
    }
    assert_eq!(
        out.payloads(),
        vec![Value::kv("a", 1), Value::kv("a", 2), Value::kv("b", 1)]
    );
}

#[test]
fn test_state_without_context() {
    let (mut invoker, _out) = build(CountPerKey, InvokerArgs::default());
    let err = invoker
        .invoke_process(&WindowedValue::in_global_window(Value::kv("a", 0)), None, None)
        .unwrap_err();
    assert!(matches!(err, RunnerError::MissingStateContext));
}

#[test]
fn test_timer_set_in_process_fires_callback() {
    let state = InMemoryStateContext::new();
    let args = InvokerArgs {
        user_state_context: Some(Arc::new(state.clone())),
        ..Default::default()
    };
    let (mut invoker, out) = build(DelayedFlush, args);
    invoker
        .invoke_process(&WindowedValue::new(Value::kv("a", 1), 5, vec![w(0, 100)]), None, None)
        .unwrap();
    assert_eq!(state.pending_timers().unwrap(), 1);
    assert!(out.values().is_empty());

    let fired = state.fire_due(TimeDomain::EventTime, 20).unwrap();
    assert_eq!(fired.len(), 1);
    let timer = &fired[0];
    assert_eq!(timer.fire_at, 15);
    invoker
        .base_mut()
        .invoke_user_timer(
            &timer.timer,
            &timer.key,
            timer.window,
            timer.fire_at,
            PaneInfo::NO_FIRING,
            &timer.dynamic_tag,
        )
        .unwrap();

    let values = out.values();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].timestamp, 15);
    assert_eq!(values[0].windows, vec![w(0, 100)]);
    assert_eq!(
        values[0].value,
        Value::Tuple(vec![
            Value::from("a"),
            Value::from(""),
            Value::Int(15),
            Value::from(w(0, 100).to_string()),
        ])
    );
}

#[test]
fn test_unknown_timer_callback() {
    let args = InvokerArgs {
        user_state_context: Some(Arc::new(InMemoryStateContext::new())),
        ..Default::default()
    };
    let (mut invoker, _out) = build(DelayedFlush, args);
    let err = invoker
        .base_mut()
        .invoke_user_timer(
            &TimerSpec::event_time("other"),
            &Value::from("a"),
            Window::Global,
            0,
            PaneInfo::NO_FIRING,
            "",
        )
        .unwrap_err();
    assert!(matches!(err, RunnerError::InvalidSignature { .. }));
}

// ── Splittable DoFns ────────────────────────────────────────────────────────

fn offsets(out: &Recorder) -> Vec<i64> {
    out.payloads().iter().filter_map(Value::as_int).collect()
}

#[test]
fn test_splittable_element_uses_initial_restriction() {
    let dofn = EmitOffsets {
        defer_after: None,
        observe_window: false,
    };
    let (mut invoker, out) = build(dofn, InvokerArgs::default());
    assert_eq!(invoker.policy(), InvocationPolicy::Windowed);
    assert!(invoker.split_coordinator().is_some());

    let residuals = invoker
        .invoke_process(&WindowedValue::in_global_window(3), None, None)
        .unwrap();
    assert!(residuals.is_empty());
    assert_eq!(offsets(&out), vec![0, 1, 2]);
}

#[test]
fn test_splittable_element_with_given_restriction() {
    let dofn = EmitOffsets {
        defer_after: None,
        observe_window: false,
    };
    let (mut invoker, out) = build(dofn, InvokerArgs::default());
    let restriction = OffsetRange::new(1, 3).unwrap().to_value();
    invoker
        .invoke_process(&WindowedValue::in_global_window(10), Some(restriction), None)
        .unwrap();
    assert_eq!(offsets(&out), vec![1, 2]);
}

#[test]
fn test_checkpoint_returns_deferred_residual() {
    let dofn = EmitOffsets {
        defer_after: Some(2),
        observe_window: false,
    };
    let (mut invoker, out) = build(dofn, InvokerArgs::default());
    let residuals = invoker
        .invoke_process(&WindowedValue::in_global_window(5), None, None)
        .unwrap();
    assert_eq!(offsets(&out), vec![0, 1]);
    assert_eq!(residuals.len(), 1);
    assert!(residuals[0].resume_delay.is_none());

    let sized = SizedRestriction::from_value(&residuals[0].residual_value.value).unwrap();
    assert_eq!(sized.element, Value::Int(5));
    assert_eq!(sized.restriction, OffsetRange::new(2, 5).unwrap().to_value());
    assert_eq!(sized.size, 3.0);
}

#[test]
fn test_checkpoint_in_each_window_keeps_processing_later_windows() {
    let dofn = EmitOffsets {
        defer_after: Some(1),
        observe_window: true,
    };
    let (mut invoker, out) = build(dofn, InvokerArgs::default());
    let windows = vec![w(0, 10), w(10, 20), w(20, 30)];
    let residuals = invoker
        .invoke_process(&WindowedValue::new(4, 5, windows.clone()), None, None)
        .unwrap();

    assert_eq!(offsets(&out), vec![0, 0, 0]);
    assert_eq!(residuals.len(), 3);
    for (residual, window) in residuals.iter().zip(&windows) {
        assert_eq!(residual.residual_value.windows, vec![*window]);
        let deferred = SizedRestriction::from_value(&residual.residual_value.value).unwrap();
        assert_eq!(deferred.restriction, OffsetRange::new(1, 4).unwrap().to_value());
        assert_eq!(deferred.size, 3.0);
    }
}

#[test]
fn test_window_observing_splittable_processes_each_window() {
    let dofn = EmitOffsets {
        defer_after: None,
        observe_window: true,
    };
    let (mut invoker, out) = build(dofn, InvokerArgs::default());
    let residuals = invoker
        .invoke_process(&WindowedValue::new(2, 5, vec![w(0, 10), w(10, 20)]), None, None)
        .unwrap();
    assert!(residuals.is_empty());
    assert_eq!(offsets(&out), vec![0, 1, 0, 1]);
    // Nothing is left in flight once the element is done.
    assert!(invoker
        .split_coordinator()
        .unwrap()
        .try_split(0.5)
        .unwrap()
        .is_none());
}

#[test]
fn test_restriction_entry_points() {
    let (plain, _out) = build(Doubler, InvokerArgs::default());
    let err = plain
        .base()
        .invoke_initial_restriction(&Value::from(3))
        .unwrap_err();
    assert!(matches!(err, RunnerError::InvalidSignature { .. }));

    let dofn = EmitOffsets {
        defer_after: None,
        observe_window: false,
    };
    let (sdf, _out) = build(dofn, InvokerArgs::default());
    let base = sdf.base();
    let element = Value::from(3);
    let restriction = base.invoke_initial_restriction(&element).unwrap();
    assert_eq!(restriction, OffsetRange::new(0, 3).unwrap().to_value());
    assert_eq!(base.invoke_split(&element, &restriction).unwrap(), vec![restriction.clone()]);
    assert_eq!(base.invoke_restriction_size(&element, &restriction).unwrap(), 3.0);
    let mut tracker = base.invoke_create_tracker(&restriction).unwrap();
    assert!(tracker.try_claim(&Value::Int(0)).unwrap());
    let estimator = base.invoke_create_watermark_estimator(&Value::Null).unwrap();
    assert!(estimator.current_watermark().is_none());
}

// ── Batches ─────────────────────────────────────────────────────────────────

#[test]
fn test_batch_with_window_param_explodes() {
    let (mut invoker, out) = build(BatchSizes, InvokerArgs::default());
    let batch = WindowedBatch::of(
        Value::list([1, 2, 3]),
        9,
        vec![w(0, 10), w(5, 15)],
        PaneInfo::NO_FIRING,
    );
    invoker.invoke_process_batch(&batch).unwrap();
    let batches = out.batches.lock().unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].windows, vec![w(0, 10)]);
    assert_eq!(batches[1].windows, vec![w(5, 15)]);
    assert_eq!(batches[0].values, Value::list([3]));
}

#[test]
fn test_batch_only_dofn_rejects_elements() {
    let (mut invoker, _out) = build(BatchSizes, InvokerArgs::default());
    let err = invoker
        .invoke_process(&WindowedValue::in_global_window(1), None, None)
        .unwrap_err();
    assert!(matches!(err, RunnerError::InvalidSignature { .. }));
}

// ── Lifecycle and resources ─────────────────────────────────────────────────

#[test]
fn test_bundle_resource_released_when_finish_fails() {
    let tracking = Tracking::default();
    let (dofn, seen) = bundled(&tracking, true, false);
    let (mut invoker, _out) = build(dofn, InvokerArgs::default());
    let base = invoker.base_mut();

    base.invoke_start_bundle().unwrap();
    assert!(base.in_bundle_scope());
    assert_eq!(seen.lock().unwrap().as_deref(), Some("conn"));
    assert_eq!(tracking.entered.load(Ordering::SeqCst), 1);

    let err = base.invoke_finish_bundle().unwrap_err();
    assert!(matches!(err, RunnerError::User(_)));
    assert!(!base.in_bundle_scope());
    assert_eq!(tracking.exited.load(Ordering::SeqCst), 1);
}

#[test]
fn test_start_bundle_output_is_rejected_and_releases() {
    let tracking = Tracking::default();
    let (dofn, _seen) = bundled(&tracking, false, true);
    let (mut invoker, _out) = build(dofn, InvokerArgs::default());
    let err = invoker.base_mut().invoke_start_bundle().unwrap_err();
    assert!(matches!(err, RunnerError::OutputShape(_)));
    assert_eq!(tracking.exited.load(Ordering::SeqCst), 1);
    assert!(!invoker.base().in_bundle_scope());
}
