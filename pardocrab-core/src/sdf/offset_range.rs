use super::*;

/// A half-open range of offsets `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetRange {
    pub start: i64,
    pub stop: i64,
}

impl OffsetRange {
    pub fn new(start: i64, stop: i64) -> Result<Self> {
        if start > stop {
            bail!("Start offset must not be larger than the stop offset: [{start}, {stop})");
        }
        Ok(Self { start, stop })
    }

    pub fn size(&self) -> i64 {
        self.stop - self.start
    }

    pub fn split_at(&self, position: i64) -> (OffsetRange, OffsetRange) {
        (
            OffsetRange {
                start: self.start,
                stop: position,
            },
            OffsetRange {
                start: position,
                stop: self.stop,
            },
        )
    }

    pub fn to_value(&self) -> Value {
        Value::Tuple(vec![Value::Int(self.start), Value::Int(self.stop)])
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        match value.as_kv() {
            Some((Value::Int(start), Value::Int(stop))) => Self::new(*start, *stop),
            _ => bail!("Expected an offset range (start, stop), got {value}"),
        }
    }
}

/// Claims strictly increasing offsets within an [`OffsetRange`].
#[derive(Debug, Clone)]
pub struct OffsetRangeTracker {
    range: OffsetRange,
    current_position: Option<i64>,
    last_claim_attempt: Option<i64>,
    checkpointed: bool,
}

impl OffsetRangeTracker {
    pub fn new(range: OffsetRange) -> Self {
        Self {
            range,
            current_position: None,
            last_claim_attempt: None,
            checkpointed: false,
        }
    }

    pub fn range(&self) -> OffsetRange {
        self.range
    }
}

impl RestrictionTracker for OffsetRangeTracker {
    fn current_restriction(&self) -> Value {
        self.range.to_value()
    }

    fn try_claim(&mut self, position: &Value) -> Result<bool> {
        let position = position
            .as_int()
            .ok_or_else(|| anyhow!("Offset positions must be integers, got {position}"))?;
        if let Some(last) = self.last_claim_attempt {
            if position <= last {
                bail!("Positions claimed should strictly increase: {position} after {last}");
            }
        }
        if position < self.range.start {
            bail!("Position {position} is before the start of {:?}", self.range);
        }
        self.last_claim_attempt = Some(position);
        if position >= self.range.stop {
            return Ok(false);
        }
        self.current_position = Some(position);
        Ok(true)
    }

    fn try_split(&mut self, fraction_of_remainder: f64) -> Option<(Value, Value)> {
        if self.checkpointed {
            return None;
        }
        let current = self.last_claim_attempt.unwrap_or(self.range.start - 1);
        let offsets = ((self.range.stop - current) as f64 * fraction_of_remainder).max(1.0) as i64;
        let split_point = current + offsets;
        if split_point >= self.range.stop {
            return None;
        }
        if fraction_of_remainder == 0.0 {
            self.checkpointed = true;
        }
        let (primary, residual) = self.range.split_at(split_point);
        self.range = primary;
        Some((primary.to_value(), residual.to_value()))
    }

    fn check_done(&self) -> Result<()> {
        if self.range.start == self.range.stop {
            return Ok(());
        }
        match self.last_claim_attempt {
            Some(last) if last >= self.range.stop - 1 => Ok(()),
            _ => bail!(
                "Offset range tracker is not done: work in [{}, {}) has not been claimed",
                self.last_claim_attempt.map_or(self.range.start, |l| l + 1),
                self.range.stop
            ),
        }
    }

    fn current_progress(&self) -> Option<RestrictionProgress> {
        let size = self.range.size() as f64;
        let completed = match self.last_claim_attempt {
            None => 0.0,
            Some(last) => ((last + 1 - self.range.start) as f64).min(size),
        };
        Some(RestrictionProgress::new(completed, size - completed))
    }
}

type InitialRange = dyn Fn(&Value) -> Result<OffsetRange> + Send + Sync;

/// Restriction provider over offset ranges.
pub struct OffsetRangeProvider {
    initial: Box<InitialRange>,
}

impl OffsetRangeProvider {
    pub fn new<F>(initial: F) -> Self
    where
        F: Fn(&Value) -> Result<OffsetRange> + Send + Sync + 'static,
    {
        Self {
            initial: Box::new(initial),
        }
    }

    /// Elements are integers `n`; each covers `[0, n)`.
    pub fn from_int_elements() -> Self {
        Self::new(|element| {
            let n = element
                .as_int()
                .ok_or_else(|| anyhow!("Expected an integer element, got {element}"))?;
            OffsetRange::new(0, n)
        })
    }
}

impl RestrictionProvider for OffsetRangeProvider {
    fn initial_restriction(&self, element: &Value) -> Result<Value> {
        Ok((self.initial)(element)?.to_value())
    }

    fn create_tracker(&self, restriction: &Value) -> Result<Box<dyn RestrictionTracker>> {
        Ok(Box::new(OffsetRangeTracker::new(OffsetRange::from_value(
            restriction,
        )?)))
    }

    fn restriction_size(&self, _element: &Value, restriction: &Value) -> Result<f64> {
        Ok(OffsetRange::from_value(restriction)?.size() as f64)
    }
}
