use super::*;

/// Distribution of the number of outputs produced per input element.
///
/// Clones share the same cells.
#[derive(Debug, Clone)]
pub struct OutputCounter {
    inner: Arc<CounterCells>,
}

#[derive(Debug)]
struct CounterCells {
    count: AtomicU64,
    sum: AtomicU64,
    min: AtomicI64,
    max: AtomicI64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputCounterSnapshot {
    /// Number of recorded elements.
    pub count: u64,
    /// Total outputs across them.
    pub sum: u64,
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl OutputCounter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(CounterCells {
                count: AtomicU64::new(0),
                sum: AtomicU64::new(0),
                min: AtomicI64::new(i64::MAX),
                max: AtomicI64::new(-1),
            }),
        }
    }

    /// Record the output count of one element.
    pub fn add_input(&self, outputs: u64) {
        let cells = &self.inner;
        let as_signed = i64::try_from(outputs).unwrap_or(i64::MAX);
        cells.count.fetch_add(1, Ordering::Relaxed);
        cells.sum.fetch_add(outputs, Ordering::Relaxed);
        cells.min.fetch_min(as_signed, Ordering::Relaxed);
        cells.max.fetch_max(as_signed, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> OutputCounterSnapshot {
        let cells = &self.inner;
        let count = cells.count.load(Ordering::Relaxed);
        let (min, max) = if count == 0 {
            (None, None)
        } else {
            (
                Some(cells.min.load(Ordering::Relaxed) as u64),
                Some(cells.max.load(Ordering::Relaxed) as u64),
            )
        };
        OutputCounterSnapshot {
            count,
            sum: cells.sum.load(Ordering::Relaxed),
            min,
            max,
        }
    }
}

impl Default for OutputCounter {
    fn default() -> Self {
        Self::new()
    }
}
