//! # PardoCrab Core
//!
//! Executes user-defined per-element functions ([`DoFn`](signature::DoFn)s)
//! inside bundles of windowed elements.
//!
//! - [`types`]: [`Value`](types::Value), [`Window`](types::Window),
//!   [`WindowedValue`](types::WindowedValue), [`WindowedBatch`](types::WindowedBatch)
//!   and the [`Output`](types::Output) shapes a DoFn can produce.
//! - [`signature`]: the [`DoFn`](signature::DoFn) trait and the validated
//!   [`DoFnSignature`](signature::DoFnSignature) built from its declaration.
//! - [`binder`]: argument templates and the [`ProcessContext`](binder::ProcessContext)
//!   DoFn methods read their arguments from.
//! - [`invoker`]: direct and per-window invocation policies.
//! - [`sdf`]: restriction trackers, watermark estimators and the
//!   [`SplitCoordinator`](sdf::SplitCoordinator) for splittable DoFns.
//! - [`output`]: the [`OutputHandler`](output::OutputHandler) that routes results
//!   to [`Receiver`](output::Receiver)s.
//! - [`runner`]: [`DoFnRunner`](runner::DoFnRunner), the bundle lifecycle controller.
//! - [`state`], [`side_input`], [`resources`], [`window`], [`config`], [`error`].

pub mod binder;
pub mod config;
pub mod error;
pub mod invoker;
pub mod output;
pub mod resources;
pub mod runner;
pub mod sdf;
pub mod side_input;
pub mod signature;
pub mod state;
pub mod types;
pub mod window;
