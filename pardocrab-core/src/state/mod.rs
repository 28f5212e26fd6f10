//! # User State
//!
//! Per-key, per-window state and timers requested by stateful DoFns.
//!
//! The engine only talks to a [`UserStateContext`]; persistence is the
//! context's business. [`InMemoryStateContext`] is a local-mode context that
//! keeps everything in memory.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::types::{EventTime, PaneInfo, Value, Window};

mod memory;
mod timers;

pub use memory::*;
pub use timers::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    /// A single value, replaced on write.
    Value,
    /// An append-only collection of values.
    Bag,
}

/// Declares a named piece of user state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateSpec {
    pub name: String,
    pub kind: StateKind,
}

impl StateSpec {
    pub fn value(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StateKind::Value,
        }
    }

    pub fn bag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StateKind::Bag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeDomain {
    EventTime,
    ProcessingTime,
}

/// Declares a named timer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerSpec {
    pub name: String,
    pub domain: TimeDomain,
}

impl TimerSpec {
    pub fn event_time(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: TimeDomain::EventTime,
        }
    }

    pub fn processing_time(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: TimeDomain::ProcessingTime,
        }
    }
}

/// Handle to one state cell, scoped to a key and window.
pub trait UserState: Send + Sync {
    /// Read a value state.
    fn read(&self) -> Result<Option<Value>>;

    /// Replace a value state.
    fn write(&self, value: Value) -> Result<()>;

    /// Append to a bag state.
    fn add(&self, value: Value) -> Result<()>;

    /// Read every value in the cell.
    fn read_all(&self) -> Result<Vec<Value>>;

    fn clear(&self) -> Result<()>;
}

/// Handle to one timer, scoped to a key and window.
///
/// Dynamic timer tags let one timer spec hold several independent timers;
/// the empty tag is the default timer.
pub trait UserTimer: Send + Sync {
    fn set(&self, fire_at: EventTime, dynamic_tag: &str) -> Result<()>;

    fn clear(&self, dynamic_tag: &str) -> Result<()>;
}

/// Supplies state and timer handles to stateful invocations.
pub trait UserStateContext: Send + Sync {
    fn get_state(&self, spec: &StateSpec, key: &Value, window: &Window) -> Result<Arc<dyn UserState>>;

    fn get_timer(
        &self,
        spec: &TimerSpec,
        key: &Value,
        window: &Window,
        timestamp: EventTime,
        pane_info: &PaneInfo,
    ) -> Result<Arc<dyn UserTimer>>;
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
