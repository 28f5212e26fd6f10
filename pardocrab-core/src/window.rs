//! Window assignment used when a DoFn emits a value with an explicit timestamp.
//!
//! The engine only needs `assign_windows`; merging and triggering belong to
//! the grouping stages around it.

use std::time::Duration;

use anyhow::{bail, Result};

use crate::types::{EventTime, TimeWindow, Value, Window};

/// Assigns windows to an element with a known timestamp.
pub trait WindowFn: Send + Sync {
    /// Return the windows that contain the element with the given timestamp.
    fn assign_windows(&self, element: &Value, timestamp: EventTime) -> Vec<Window>;
}

// ── Global ────────────────────────────────────────────────────────────────────

/// A single window that spans all time.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalWindows;

impl GlobalWindows {
    pub fn new() -> Self {
        Self
    }
}

impl WindowFn for GlobalWindows {
    fn assign_windows(&self, _element: &Value, _timestamp: EventTime) -> Vec<Window> {
        vec![Window::Global]
    }
}

// ── Fixed ─────────────────────────────────────────────────────────────────────

/// Fixed-size, non-overlapping windows aligned to multiples of `size`.
#[derive(Debug, Clone)]
pub struct FixedWindows {
    size_ms: i64,
    offset_ms: i64,
}

impl FixedWindows {
    pub fn of(size: Duration) -> Result<Self> {
        Self::of_with_offset(size, Duration::ZERO)
    }

    pub fn of_with_offset(size: Duration, offset: Duration) -> Result<Self> {
        let size_ms = size.as_millis() as i64;
        if size_ms <= 0 {
            bail!("Fixed window size must be at least 1ms, got {size:?}");
        }
        Ok(Self {
            size_ms,
            offset_ms: offset.as_millis() as i64,
        })
    }
}

impl WindowFn for FixedWindows {
    fn assign_windows(&self, _element: &Value, timestamp: EventTime) -> Vec<Window> {
        let start = timestamp - (timestamp - self.offset_ms).rem_euclid(self.size_ms);
        vec![Window::Interval(TimeWindow::new(start, start + self.size_ms))]
    }
}

#[cfg(test)]
#[path = "tests/window_tests.rs"]
mod tests;
