//! # Signature Model
//!
//! A DoFn describes each of its methods as a list of named parameters, some
//! of which default to a *special parameter* (element, timestamp, window,
//! key, state, timer, restriction tracker, ...). [`DoFnSignature::new`]
//! classifies and validates those declarations once; everything downstream
//! works from the resulting immutable signature.
//!
//! ## Example
//!
//! ```ignore
//! impl DoFn for CountPerKey {
//!     fn declare(&self) -> DoFnDecl {
//!         DoFnDecl::new().process(
//!             MethodDecl::new()
//!                 .arg("element")
//!                 .special("count", ParamKind::State(StateSpec::value("count"))),
//!         )
//!     }
//!
//!     fn process(&mut self, ctx: &mut ProcessContext) -> anyhow::Result<()> {
//!         let count = ctx.state("count")?;
//!         ...
//!     }
//! }
//! ```

use std::str::FromStr;
use std::sync::Arc;

use crate::binder::ProcessContext;
use crate::error::{Result, RunnerError};
use crate::resources::ContextParam;
use crate::sdf::{NoOpWatermarkEstimatorProvider, RestrictionProvider, WatermarkEstimatorProvider};
use crate::state::{StateSpec, TimerSpec};
use crate::types::Value;

mod dofn;
mod method;
mod params;

pub use dofn::*;
pub use method::*;
pub use params::*;

#[cfg(test)]
#[path = "tests/signature_tests.rs"]
mod tests;
