//! # Invoker
//!
//! Calls a DoFn's methods with bound arguments and routes what they produce.
//!
//! Two policies exist, picked once per DoFn by [`create_invoker`]:
//!
//! - [`SimpleInvoker`]: the element is the only argument. Used when nothing
//!   else needs binding.
//! - [`PerWindowInvoker`]: arguments come from an [`ArgTemplate`]. Handles
//!   side inputs, keys, state, splittable restrictions and window explosion.
//!
//! Both share an [`InvokerBase`], which owns the DoFn, the output handler
//! and the scoped resources, and runs lifecycle methods and timer callbacks.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::binder::{Arg, ArgTemplate, CallArgs, ConstArg, ProcessContext};
use crate::config::RunnerOptions;
use crate::error::{Result, RunnerError};
use crate::output::OutputHandler;
use crate::resources::EnteredResources;
use crate::runner::BundleFinalizer;
use crate::sdf::{
    RestrictionProvider, RestrictionTracker, RestrictionTrackerView, SplitCoordinator,
    SplitResultResidual, ThreadsafeWatermarkEstimator, WatermarkEstimator,
};
use crate::side_input::SideInputMap;
use crate::signature::{DoFn, DoFnSignature, MethodSignature, ParamKind};
use crate::state::{TimerSpec, UserStateContext};
use crate::types::{
    EventTime, Output, PaneInfo, Value, Window, WindowedBatch, WindowedValue, EVENT_TIME_MIN,
};

mod base;
mod per_window;
mod simple;

pub use base::*;
pub use per_window::*;
pub use simple::*;

/// How arguments are supplied to `process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationPolicy {
    Direct,
    Windowed,
}

/// Calls `process` / `process_batch` for one element or batch.
pub trait DoFnInvoker: Send {
    fn base(&self) -> &InvokerBase;

    fn base_mut(&mut self) -> &mut InvokerBase;

    fn policy(&self) -> InvocationPolicy;

    /// Process one element. For a splittable DoFn, `restriction` and
    /// `estimator_state` are the element's restriction and watermark state;
    /// missing ones are computed from the providers.
    ///
    /// Returns the residuals of windows that checkpointed.
    fn invoke_process(
        &mut self,
        windowed_value: &WindowedValue,
        restriction: Option<Value>,
        estimator_state: Option<Value>,
    ) -> Result<Vec<SplitResultResidual>>;

    fn invoke_process_batch(&mut self, batch: &WindowedBatch) -> Result<()>;

    /// Restriction state of the element in flight, for splittable DoFns.
    fn split_coordinator(&self) -> Option<&Arc<SplitCoordinator>> {
        None
    }
}

/// Everything an invoker needs besides the DoFn and its output handler.
#[derive(Default)]
pub struct InvokerArgs {
    /// One map per `ConstArg::SideInput` slot, in fill order.
    pub side_inputs: Vec<Arc<dyn SideInputMap>>,
    pub args: Vec<ConstArg>,
    pub kwargs: BTreeMap<String, ConstArg>,
    pub user_state_context: Option<Arc<dyn UserStateContext>>,
    pub bundle_finalizer: BundleFinalizer,
    pub options: RunnerOptions,
}

/// Pick an invocation policy for `signature` and build the invoker.
pub fn create_invoker(
    dofn: Box<dyn DoFn>,
    signature: Arc<DoFnSignature>,
    output_handler: OutputHandler,
    args: InvokerArgs,
) -> Result<Box<dyn DoFnInvoker>> {
    let has_defaults = |method: &Option<MethodSignature>| {
        method.as_ref().is_some_and(MethodSignature::has_defaults)
    };
    let per_window = !args.side_inputs.is_empty()
        || !args.args.is_empty()
        || !args.kwargs.is_empty()
        || has_defaults(&signature.process)
        || has_defaults(&signature.process_batch)
        || signature.is_stateful();

    let base = InvokerBase::new(
        dofn,
        Arc::clone(&signature),
        output_handler,
        args.user_state_context.clone(),
        args.bundle_finalizer.clone(),
    )?;
    if per_window {
        tracing::debug!("using per-window invoker");
        Ok(Box::new(PerWindowInvoker::new(base, args)?))
    } else {
        tracing::debug!("using simple invoker");
        Ok(Box::new(SimpleInvoker::new(base)))
    }
}

#[cfg(test)]
#[path = "tests/invoker_tests.rs"]
mod tests;
