//! # PardoCrab API
//!
//! Closure-based DoFns and a bundle harness on top of `pardocrab-core`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pardocrab_api::functions::map;
//! use pardocrab_api::harness::{BundleHarness, CollectingReceiver};
//! use pardocrab_api::pardocrab_core::runner::DoFnRunner;
//! use pardocrab_api::pardocrab_core::types::{Value, WindowedValue};
//!
//! let out = CollectingReceiver::new();
//! let double = map(|v: &Value| Ok(Value::Int(v.as_int().unwrap_or(0) * 2)));
//! let runner = DoFnRunner::builder(double, out.clone()).step_name("double").build().unwrap();
//! let mut harness = BundleHarness::new(runner).unwrap();
//! harness
//!     .run_bundle((1..=3).map(WindowedValue::in_global_window))
//!     .unwrap();
//! harness.close().unwrap();
//! assert_eq!(out.payloads(), vec![Value::Int(2), Value::Int(4), Value::Int(6)]);
//! ```
//!
//! - [`functions`]: [`FnDoFn`](functions::FnDoFn) and the `map` / `flat_map` /
//!   `filter` helpers.
//! - [`harness`]: [`CollectingReceiver`](harness::CollectingReceiver) and
//!   [`BundleHarness`](harness::BundleHarness), which drives a runner through
//!   bundles, residuals and timers.

pub mod functions;
pub mod harness;

pub use pardocrab_core;
