//! # Output Router
//!
//! Routes what a DoFn call collected to the downstream receivers.
//!
//! - Element mode: plain values inherit the input's timestamp, windows and
//!   pane; timestamped values get fresh windows from the [`WindowFn`];
//!   windowed values are used as-is.
//! - Batch mode: plain values become a batch with the input's metadata;
//!   windowed batches are used as-is; element-shaped overrides are an error.
//! - When the input carried a window count other than one, override window
//!   lists are repeated that many times.
//! - Untagged outputs go to the main receiver, tagged ones to the receiver
//!   registered for the tag.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashMap;
use anyhow::anyhow;

use crate::error::{Result, RunnerError};
use crate::types::{repeat_windows, Output, Value, WindowedBatch, WindowedValue};
use crate::window::WindowFn;

mod counter;
mod handler;
mod receiver;

pub use counter::*;
pub use handler::*;
pub use receiver::*;

#[cfg(test)]
#[path = "tests/output_tests.rs"]
mod tests;
