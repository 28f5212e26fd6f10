//! # Splittable DoFns
//!
//! Contracts for restriction providers, restriction trackers and watermark
//! estimators, the thread-safe wrappers shared between the processing thread
//! and a split-request thread, and the [`SplitCoordinator`] that answers
//! `try_split` / progress requests while an element is being processed.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;
use crate::types::{EventTime, SizedRestriction, Value, Watermark, WindowedValue};

mod coordinator;
mod offset_range;
mod restriction;
mod threadsafe;
mod watermark;

pub use coordinator::*;
pub use offset_range::*;
pub use restriction::*;
pub use threadsafe::*;
pub use watermark::*;

#[cfg(test)]
#[path = "tests/sdf_tests.rs"]
mod tests;
