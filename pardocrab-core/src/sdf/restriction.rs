use super::*;

/// Work done and left for a restriction, in provider-defined units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RestrictionProgress {
    pub completed: f64,
    pub remaining: f64,
}

impl RestrictionProgress {
    pub fn new(completed: f64, remaining: f64) -> Self {
        Self {
            completed,
            remaining,
        }
    }

    pub fn total(&self) -> f64 {
        self.completed + self.remaining
    }

    pub fn fraction_completed(&self) -> f64 {
        let total = self.total();
        if total <= 0.0 {
            1.0
        } else {
            self.completed / total
        }
    }
}

/// Tracks claimed positions within one restriction.
///
/// Always accessed through a [`ThreadsafeRestrictionTracker`] once processing
/// starts.
pub trait RestrictionTracker: Send {
    fn current_restriction(&self) -> Value;

    /// Claim `position`. Returns `false` once the position is past the end of
    /// the restriction; the DoFn must then stop.
    fn try_claim(&mut self, position: &Value) -> Result<bool>;

    /// Split off the unclaimed `fraction_of_remainder` of the remaining work.
    ///
    /// On success the tracker keeps the primary and returns
    /// `(primary, residual)`. A fraction of 0 checkpoints the tracker.
    fn try_split(&mut self, fraction_of_remainder: f64) -> Option<(Value, Value)>;

    /// Fail if claimed work remains unprocessed.
    fn check_done(&self) -> Result<()>;

    /// `None` when the tracker cannot estimate progress.
    fn current_progress(&self) -> Option<RestrictionProgress>;

    fn is_bounded(&self) -> bool {
        true
    }
}

/// Creates and sizes restrictions for the elements of a splittable DoFn.
pub trait RestrictionProvider: Send + Sync {
    fn initial_restriction(&self, element: &Value) -> Result<Value>;

    fn create_tracker(&self, restriction: &Value) -> Result<Box<dyn RestrictionTracker>>;

    /// Initial splitting of a restriction before processing.
    fn split(&self, _element: &Value, restriction: &Value) -> Result<Vec<Value>> {
        Ok(vec![restriction.clone()])
    }

    /// Size of `restriction`; must be non-negative.
    fn restriction_size(&self, element: &Value, restriction: &Value) -> Result<f64>;
}
