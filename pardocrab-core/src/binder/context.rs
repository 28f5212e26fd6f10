use super::*;

/// What a DoFn method sees: its bound arguments and an output buffer.
///
/// Outputs are routed after the method returns. When a watermark estimator
/// is attached, each output's timestamp is reported to it as the output is
/// collected, so a split taken mid-call sees every output produced so far.
#[derive(Debug, Default)]
pub struct ProcessContext {
    args: CallArgs,
    outputs: Vec<Output>,
    watermark: Option<OutputWatermark>,
}

#[derive(Debug)]
struct OutputWatermark {
    estimator: ThreadsafeWatermarkEstimator,
    input_timestamp: EventTime,
    error: Option<anyhow::Error>,
}

impl OutputWatermark {
    fn observe(&mut self, output: &Output) {
        if self.error.is_some() {
            return;
        }
        let timestamp = output_timestamp(output, self.input_timestamp);
        if let Err(e) = self.estimator.observe_timestamp(timestamp) {
            self.error = Some(e);
        }
    }
}

/// The timestamp `output` will carry once routed. A batch is observed once
/// at its own timestamp, which every value in it shares.
fn output_timestamp(output: &Output, input_timestamp: EventTime) -> EventTime {
    match output {
        Output::Value(_) => input_timestamp,
        Output::Timestamped { timestamp, .. } => *timestamp,
        Output::Windowed(value) => value.timestamp,
        Output::WindowedBatch(batch) => batch.timestamp,
        Output::Tagged { output, .. } => output_timestamp(output, input_timestamp),
    }
}

impl ProcessContext {
    pub fn new(args: CallArgs) -> Self {
        Self {
            args,
            outputs: Vec::new(),
            watermark: None,
        }
    }

    /// Report output timestamps to `estimator` as they are collected.
    /// Plain values take `input_timestamp`.
    pub fn with_watermark_estimator(
        mut self,
        estimator: ThreadsafeWatermarkEstimator,
        input_timestamp: EventTime,
    ) -> Self {
        self.watermark = Some(OutputWatermark {
            estimator,
            input_timestamp,
            error: None,
        });
        self
    }

    fn push(&mut self, output: Output) {
        if let Some(watermark) = &mut self.watermark {
            watermark.observe(&output);
        }
        self.outputs.push(output);
    }

    /// Collect a value for the main output.
    pub fn collect(&mut self, value: impl Into<Value>) {
        self.push(Output::Value(value.into()));
    }

    /// Collect a value for the output named `tag`.
    pub fn collect_tagged(&mut self, tag: impl Into<String>, value: impl Into<Value>) {
        self.push(Output::tagged(tag, Output::Value(value.into())));
    }

    /// Collect a value with its own timestamp; windows are assigned again.
    pub fn collect_timestamped(&mut self, value: impl Into<Value>, timestamp: EventTime) {
        self.push(Output::timestamped(value, timestamp));
    }

    pub fn collect_windowed(&mut self, value: WindowedValue) {
        self.push(Output::Windowed(value));
    }

    pub fn collect_windowed_batch(&mut self, batch: WindowedBatch) {
        self.push(Output::WindowedBatch(batch));
    }

    pub fn emit(&mut self, output: Output) {
        self.push(output);
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    /// The collected outputs, or the first error raised while reporting
    /// their timestamps.
    pub fn finish(self) -> Result<Vec<Output>> {
        if let Some(OutputWatermark { error: Some(e), .. }) = self.watermark {
            return Err(RunnerError::collaborator("watermark estimator", e));
        }
        Ok(self.outputs)
    }

    pub fn into_outputs(self) -> Vec<Output> {
        self.outputs
    }
}

impl Deref for ProcessContext {
    type Target = CallArgs;

    fn deref(&self) -> &CallArgs {
        &self.args
    }
}
