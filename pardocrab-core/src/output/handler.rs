use super::*;

/// Dispatches DoFn results to receivers, filling in windowing metadata.
pub struct OutputHandler {
    window_fn: Arc<dyn WindowFn>,
    main_receiver: Box<dyn Receiver>,
    tagged_receivers: AHashMap<String, Box<dyn Receiver>>,
    counter: Option<OutputCounter>,
    batch_converter: Arc<dyn BatchConverter>,
    process_yields_batches: bool,
    process_batch_yields_elements: bool,
}

impl OutputHandler {
    pub fn new(window_fn: Arc<dyn WindowFn>, main_receiver: Box<dyn Receiver>) -> Self {
        Self {
            window_fn,
            main_receiver,
            tagged_receivers: AHashMap::new(),
            counter: None,
            batch_converter: Arc::new(ListBatchConverter),
            process_yields_batches: false,
            process_batch_yields_elements: false,
        }
    }

    pub fn with_tagged_receiver(mut self, tag: impl Into<String>, receiver: Box<dyn Receiver>) -> Self {
        self.tagged_receivers.insert(tag.into(), receiver);
        self
    }

    pub fn with_counter(mut self, counter: OutputCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn with_batch_converter(mut self, converter: Arc<dyn BatchConverter>) -> Self {
        self.batch_converter = converter;
        self
    }

    /// Which shape `process` and `process_batch` produce.
    pub fn with_output_modes(mut self, process_yields_batches: bool, process_batch_yields_elements: bool) -> Self {
        self.process_yields_batches = process_yields_batches;
        self.process_batch_yields_elements = process_batch_yields_elements;
        self
    }

    pub fn counter(&self) -> Option<&OutputCounter> {
        self.counter.as_ref()
    }

    /// Route the results of a `process` call on `input`.
    pub fn handle_process_outputs(
        &mut self,
        input: &WindowedValue,
        results: Vec<Output>,
    ) -> Result<()> {
        let mut produced = 0u64;
        for result in results {
            let (tag, result) = split_tag(result)?;
            if !self.process_yields_batches {
                let value = self.propagate_windowing(input, result)?;
                produced += 1;
                self.write_value(tag.as_deref(), value)?;
            } else {
                let batch = match result {
                    Output::WindowedBatch(batch) => repeat_batch_windows(batch, input.windows.len()),
                    Output::Value(values) => WindowedBatch::from_batch_and_windowed_value(values, input),
                    other => return Err(element_in_batch_mode(&other)),
                };
                produced += self.batch_length(&batch.values)?;
                self.write_batch(tag.as_deref(), batch)?;
            }
        }
        if let Some(counter) = &self.counter {
            counter.add_input(produced);
        }
        Ok(())
    }

    /// Route the results of a `process_batch` call on `input`.
    pub fn handle_process_batch_outputs(
        &mut self,
        input: &WindowedBatch,
        results: Vec<Output>,
    ) -> Result<()> {
        let mut produced = 0u64;
        for result in results {
            let (tag, result) = split_tag(result)?;
            if !self.process_batch_yields_elements {
                let batch = match result {
                    Output::WindowedBatch(batch) => repeat_batch_windows(batch, input.windows.len()),
                    Output::Value(values) => input.with_values(values),
                    other => return Err(element_in_batch_mode(&other)),
                };
                produced += self.batch_length(&batch.values)?;
                self.write_batch(tag.as_deref(), batch)?;
            } else {
                let value = self.propagate_windowing(&input.as_empty_windowed_value(), result)?;
                produced += 1;
                self.write_value(tag.as_deref(), value)?;
            }
        }
        if let Some(counter) = &self.counter {
            counter.add_input(produced);
        }
        Ok(())
    }

    /// `start_bundle` may not produce anything.
    pub fn start_bundle_outputs(&self, results: Vec<Output>) -> Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        Err(RunnerError::OutputShape(format!(
            "start_bundle should not output any elements but got {} output(s)",
            results.len()
        )))
    }

    /// `finish_bundle` may only produce fully formed windowed values.
    pub fn finish_bundle_outputs(&mut self, results: Vec<Output>) -> Result<()> {
        for result in results {
            let (tag, result) = split_tag(result)?;
            let Output::Windowed(value) = result else {
                return Err(RunnerError::OutputShape(format!(
                    "finish_bundle should only output windowed values but got a {}",
                    result.kind_name()
                )));
            };
            self.write_value(tag.as_deref(), value)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.main_receiver
            .flush()
            .map_err(|e| RunnerError::collaborator("flush main output", e))?;
        for (tag, receiver) in self.tagged_receivers.iter_mut() {
            receiver
                .flush()
                .map_err(|e| RunnerError::collaborator(format!("flush output '{tag}'"), e))?;
        }
        Ok(())
    }

    fn propagate_windowing(&self, input: &WindowedValue, result: Output) -> Result<WindowedValue> {
        let replicas = input.windows.len();
        match result {
            Output::Value(value) => Ok(input.with_value(value)),
            Output::Windowed(mut value) => {
                if replicas != 1 {
                    value.windows = repeat_windows(&value.windows, replicas);
                }
                Ok(value)
            }
            Output::Timestamped { value, timestamp } => {
                let mut windows = self.window_fn.assign_windows(&value, timestamp);
                if replicas != 1 {
                    windows = repeat_windows(&windows, replicas);
                }
                Ok(WindowedValue::new(value, timestamp, windows))
            }
            other => Err(RunnerError::OutputShape(format!(
                "received a {} from a DoFn that was expected to produce elements",
                other.kind_name()
            ))),
        }
    }

    fn batch_length(&self, values: &Value) -> Result<u64> {
        self.batch_converter
            .get_length(values)
            .map(|n| n as u64)
            .map_err(|e| RunnerError::collaborator("batch length", e))
    }

    fn receiver(&mut self, tag: Option<&str>) -> Result<&mut Box<dyn Receiver>> {
        match tag {
            None => Ok(&mut self.main_receiver),
            Some(tag) => self
                .tagged_receivers
                .get_mut(tag)
                .ok_or_else(|| RunnerError::UnknownTag(tag.to_string())),
        }
    }

    fn write_value(&mut self, tag: Option<&str>, value: WindowedValue) -> Result<()> {
        let receiver = self.receiver(tag)?;
        receiver
            .receive(value)
            .map_err(|e| RunnerError::downstream(receiver_context(tag), e))
    }

    fn write_batch(&mut self, tag: Option<&str>, batch: WindowedBatch) -> Result<()> {
        let receiver = self.receiver(tag)?;
        receiver
            .receive_batch(batch)
            .map_err(|e| RunnerError::downstream(receiver_context(tag), e))
    }
}

/// Unwrap one level of tagging. Tags must be plain names.
fn split_tag(result: Output) -> Result<(Option<String>, Output)> {
    match result {
        Output::Tagged { tag, output } => {
            if tag.is_empty() || tag.chars().any(|c| c.is_whitespace() || c.is_control()) {
                return Err(RunnerError::InvalidTag(tag));
            }
            if matches!(*output, Output::Tagged { .. }) {
                return Err(RunnerError::InvalidTag(format!("{tag} (nested tag)")));
            }
            Ok((Some(tag), *output))
        }
        other => Ok((None, other)),
    }
}

fn repeat_batch_windows(mut batch: WindowedBatch, replicas: usize) -> WindowedBatch {
    if replicas != 1 {
        batch.windows = repeat_windows(&batch.windows, replicas);
    }
    batch
}

fn element_in_batch_mode(output: &Output) -> RunnerError {
    RunnerError::OutputShape(format!(
        "received a {} from a DoFn that was expected to produce a batch",
        output.kind_name()
    ))
}

fn receiver_context(tag: Option<&str>) -> String {
    match tag {
        None => "main output".to_string(),
        Some(tag) => format!("output '{tag}'"),
    }
}
