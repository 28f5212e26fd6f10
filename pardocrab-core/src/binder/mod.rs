//! # Argument Binder
//!
//! Turns a [`MethodSignature`] plus call-site constants into an
//! [`ArgTemplate`]: an ordered list of slots that are either filled
//! constants, side-input placeholders (filled per window) or special-parameter
//! placeholders (filled per call). At call time the invoker instantiates the
//! template into [`CallArgs`], which the DoFn reads through its
//! [`ProcessContext`].

use std::collections::BTreeMap;
use std::ops::Deref;
use std::sync::Arc;

use anyhow::anyhow;

use crate::error::{Result, RunnerError};
use crate::resources::Resource;
use crate::runner::BundleFinalizer;
use crate::sdf::{RestrictionTrackerView, ThreadsafeWatermarkEstimator};
use crate::signature::{MethodSignature, ParamKind, ParamRole};
use crate::state::{UserState, UserTimer};
use crate::types::{EventTime, Output, PaneInfo, Value, Window, WindowedBatch, WindowedValue};

mod args;
mod context;
mod template;

pub use args::*;
pub use context::*;
pub use template::*;

#[cfg(test)]
#[path = "tests/binder_tests.rs"]
mod tests;
