//! Side-input access by window.

use ahash::AHashMap;
use anyhow::anyhow;

use crate::types::{Value, Window};

/// A materialized side input, looked up by the main input's window.
pub trait SideInputMap: Send + Sync {
    /// Globally windowed side inputs return the same value for every window.
    fn is_globally_windowed(&self) -> bool;

    fn get(&self, window: &Window) -> anyhow::Result<Value>;
}

/// One value for every window.
#[derive(Debug, Clone)]
pub struct GlobalSideInput {
    value: Value,
}

impl GlobalSideInput {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl SideInputMap for GlobalSideInput {
    fn is_globally_windowed(&self) -> bool {
        true
    }

    fn get(&self, _window: &Window) -> anyhow::Result<Value> {
        Ok(self.value.clone())
    }
}

/// A value per window, with an optional fallback for unknown windows.
#[derive(Debug, Clone, Default)]
pub struct WindowedSideInput {
    values: AHashMap<Window, Value>,
    default: Option<Value>,
}

impl WindowedSideInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, window: Window, value: impl Into<Value>) -> Self {
        self.values.insert(window, value.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }
}

impl SideInputMap for WindowedSideInput {
    fn is_globally_windowed(&self) -> bool {
        false
    }

    fn get(&self, window: &Window) -> anyhow::Result<Value> {
        self.values
            .get(window)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| anyhow!("side input not available for window {window}"))
    }
}

#[cfg(test)]
#[path = "tests/side_input_tests.rs"]
mod tests;
