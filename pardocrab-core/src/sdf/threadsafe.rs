use super::*;

/// When deferred work should be resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredTime {
    /// After a delay, measured from the call to `defer_remainder`.
    After(Duration),
    /// At an absolute wall-clock time in milliseconds since epoch.
    At(EventTime),
}

struct TrackerInner {
    tracker: Box<dyn RestrictionTracker>,
    deferred_residual: Option<Value>,
    deferred_time: Option<DeferredTime>,
    deferred_at: Option<Instant>,
}

/// A restriction tracker shared between the processing thread and a
/// split-request thread. Every call takes the tracker's lock.
#[derive(Clone)]
pub struct ThreadsafeRestrictionTracker {
    inner: Arc<Mutex<TrackerInner>>,
}

impl ThreadsafeRestrictionTracker {
    pub fn new(tracker: Box<dyn RestrictionTracker>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TrackerInner {
                tracker,
                deferred_residual: None,
                deferred_time: None,
                deferred_at: None,
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, TrackerInner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("Restriction tracker lock poisoned"))
    }

    pub fn current_restriction(&self) -> Result<Value> {
        Ok(self.lock()?.tracker.current_restriction())
    }

    pub fn try_claim(&self, position: &Value) -> Result<bool> {
        self.lock()?.tracker.try_claim(position)
    }

    pub fn try_split(&self, fraction_of_remainder: f64) -> Result<Option<(Value, Value)>> {
        Ok(self.lock()?.tracker.try_split(fraction_of_remainder))
    }

    pub fn current_progress(&self) -> Result<Option<RestrictionProgress>> {
        Ok(self.lock()?.tracker.current_progress())
    }

    pub fn check_done(&self) -> Result<()> {
        self.lock()?.tracker.check_done()
    }

    pub fn is_bounded(&self) -> Result<bool> {
        Ok(self.lock()?.tracker.is_bounded())
    }

    /// Checkpoint the tracker: split at fraction 0 and remember the residual
    /// to be resumed at `deferred_time`.
    pub fn defer_remainder(&self, deferred_time: Option<DeferredTime>) -> Result<()> {
        let mut inner = self.lock()?;
        inner.deferred_at = Some(Instant::now());
        inner.deferred_time = deferred_time;
        if let Some((_, residual)) = inner.tracker.try_split(0.0) {
            inner.deferred_residual = Some(residual);
        }
        Ok(())
    }

    /// The deferred residual and how long to wait before resuming it.
    pub fn deferred_status(&self) -> Result<Option<(Value, Option<Duration>)>> {
        let inner = self.lock()?;
        let Some(residual) = inner.deferred_residual.clone() else {
            return Ok(None);
        };
        let delay = match inner.deferred_time {
            None => None,
            Some(DeferredTime::After(delay)) => {
                let elapsed = inner.deferred_at.map(|at| at.elapsed()).unwrap_or_default();
                Some(delay.saturating_sub(elapsed))
            }
            Some(DeferredTime::At(resume_at)) => {
                let now_ms = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or(0);
                Some(Duration::from_millis(resume_at.saturating_sub(now_ms).max(0) as u64))
            }
        };
        Ok(Some((residual, delay)))
    }
}

/// The tracker as seen by the DoFn: it may claim and checkpoint but not split.
#[derive(Clone)]
pub struct RestrictionTrackerView {
    tracker: ThreadsafeRestrictionTracker,
}

impl RestrictionTrackerView {
    pub fn new(tracker: ThreadsafeRestrictionTracker) -> Self {
        Self { tracker }
    }

    pub fn current_restriction(&self) -> Result<Value> {
        self.tracker.current_restriction()
    }

    pub fn try_claim(&self, position: impl Into<Value>) -> Result<bool> {
        self.tracker.try_claim(&position.into())
    }

    pub fn defer_remainder(&self, deferred_time: Option<DeferredTime>) -> Result<()> {
        self.tracker.defer_remainder(deferred_time)
    }
}

impl std::fmt::Debug for RestrictionTrackerView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestrictionTrackerView").finish_non_exhaustive()
    }
}

/// A watermark estimator shared between the output path and a split-request
/// thread.
#[derive(Clone)]
pub struct ThreadsafeWatermarkEstimator {
    inner: Arc<Mutex<Box<dyn WatermarkEstimator>>>,
}

impl ThreadsafeWatermarkEstimator {
    pub fn new(estimator: Box<dyn WatermarkEstimator>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(estimator)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Box<dyn WatermarkEstimator>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("Watermark estimator lock poisoned"))
    }

    pub fn observe_timestamp(&self, timestamp: EventTime) -> Result<()> {
        self.lock()?.observe_timestamp(timestamp);
        Ok(())
    }

    pub fn current_watermark(&self) -> Result<Option<Watermark>> {
        Ok(self.lock()?.current_watermark())
    }

    pub fn get_estimator_state(&self) -> Result<Value> {
        Ok(self.lock()?.get_estimator_state())
    }

    /// Current watermark and state, read under one lock.
    pub fn snapshot(&self) -> Result<(Option<Watermark>, Value)> {
        let estimator = self.lock()?;
        Ok((estimator.current_watermark(), estimator.get_estimator_state()))
    }
}

impl std::fmt::Debug for ThreadsafeWatermarkEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadsafeWatermarkEstimator").finish_non_exhaustive()
    }
}
