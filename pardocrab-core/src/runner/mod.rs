//! # Bundle Lifecycle Controller
//!
//! [`DoFnRunner`] drives one DoFn instance through its lifecycle:
//!
//! ```text
//! uninitialized ──setup──▶ set up ──start_bundle──▶ in bundle
//!                            ▲                          │ process / process_batch
//!                            └──────finish_bundle───────┘ process_user_timer
//!                 set up ──teardown──▶ torn down
//! ```
//!
//! Calls out of order fail with [`RunnerError::Lifecycle`]. Every failure is
//! annotated with the step name once, offered to the execution context's
//! [`OutputSampler`], logged and returned.
//!
//! Splitting is available from any thread through a [`SplitHandle`].

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::anyhow;

use crate::binder::ConstArg;
use crate::config::RunnerOptions;
use crate::error::{Result, RunnerError};
use crate::invoker::{create_invoker, DoFnInvoker, InvocationPolicy, InvokerArgs};
use crate::output::{BatchConverter, OutputCounter, OutputHandler, Receiver};
use crate::sdf::{RestrictionProgress, SplitCoordinator, SplitResult, SplitResultResidual};
use crate::side_input::SideInputMap;
use crate::signature::{DoFn, DoFnSignature};
use crate::state::{TimerSpec, UserStateContext};
use crate::types::{EventTime, PaneInfo, SizedRestriction, Value, Window, WindowedBatch, WindowedValue};
use crate::window::{GlobalWindows, WindowFn};

mod builder;
mod context;
mod dofn_runner;
mod finalizer;

pub use builder::*;
pub use context::*;
pub use dofn_runner::*;
pub use finalizer::*;

#[cfg(test)]
#[path = "tests/runner_tests.rs"]
mod tests;
