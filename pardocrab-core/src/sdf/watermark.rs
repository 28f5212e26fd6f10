use super::*;

/// Estimates the output watermark of a splittable DoFn from the timestamps
/// it emits.
pub trait WatermarkEstimator: Send {
    fn observe_timestamp(&mut self, timestamp: EventTime);

    /// `None` if no watermark can be reported yet.
    fn current_watermark(&self) -> Option<Watermark>;

    /// State needed to resume estimation after a split or checkpoint.
    fn get_estimator_state(&self) -> Value;
}

/// Creates watermark estimators from saved state.
pub trait WatermarkEstimatorProvider: Send + Sync {
    fn initial_estimator_state(&self, _element: &Value, _restriction: &Value) -> Result<Value> {
        Ok(Value::Null)
    }

    fn create_watermark_estimator(&self, state: &Value) -> Result<Box<dyn WatermarkEstimator>>;
}

// ── No-op ─────────────────────────────────────────────────────────────────────

/// Estimator that never reports a watermark.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpWatermarkEstimator;

impl WatermarkEstimator for NoOpWatermarkEstimator {
    fn observe_timestamp(&mut self, _timestamp: EventTime) {}

    fn current_watermark(&self) -> Option<Watermark> {
        None
    }

    fn get_estimator_state(&self) -> Value {
        Value::Null
    }
}

/// Used when a DoFn does not declare a watermark estimator.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpWatermarkEstimatorProvider;

impl WatermarkEstimatorProvider for NoOpWatermarkEstimatorProvider {
    fn create_watermark_estimator(&self, _state: &Value) -> Result<Box<dyn WatermarkEstimator>> {
        Ok(Box::new(NoOpWatermarkEstimator))
    }
}

// ── Monotonic ─────────────────────────────────────────────────────────────────

/// Reports the largest timestamp observed so far.
///
/// State is the current watermark as `Int` or `Null` when nothing was observed.
#[derive(Debug, Clone, Default)]
pub struct MonotonicWatermarkEstimator {
    watermark: Option<EventTime>,
}

impl MonotonicWatermarkEstimator {
    pub fn new(watermark: Option<EventTime>) -> Self {
        Self { watermark }
    }
}

impl WatermarkEstimator for MonotonicWatermarkEstimator {
    fn observe_timestamp(&mut self, timestamp: EventTime) {
        self.watermark = Some(self.watermark.map_or(timestamp, |wm| wm.max(timestamp)));
    }

    fn current_watermark(&self) -> Option<Watermark> {
        self.watermark.map(Watermark::new)
    }

    fn get_estimator_state(&self) -> Value {
        self.watermark.map_or(Value::Null, Value::Int)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicWatermarkEstimatorProvider;

impl WatermarkEstimatorProvider for MonotonicWatermarkEstimatorProvider {
    fn create_watermark_estimator(&self, state: &Value) -> Result<Box<dyn WatermarkEstimator>> {
        match state {
            Value::Null => Ok(Box::new(MonotonicWatermarkEstimator::new(None))),
            Value::Int(ts) => Ok(Box::new(MonotonicWatermarkEstimator::new(Some(*ts)))),
            other => bail!("Invalid monotonic watermark estimator state: {other}"),
        }
    }
}
