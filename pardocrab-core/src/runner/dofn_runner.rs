use super::*;

/// Where a runner is in the DoFn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    SetUp,
    InBundle,
    TornDown,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::SetUp => "set up",
            LifecycleState::InBundle => "in a bundle",
            LifecycleState::TornDown => "torn down",
        };
        f.write_str(s)
    }
}

/// Thread-safe access to the split state of a splittable runner.
///
/// Clones refer to the same runner; use one from another thread while the
/// runner is processing.
#[derive(Clone)]
pub struct SplitHandle {
    coordinator: Arc<SplitCoordinator>,
}

impl SplitHandle {
    pub fn try_split(&self, fraction_of_remainder: f64) -> Result<Option<SplitResult>> {
        self.coordinator.try_split(fraction_of_remainder)
    }

    pub fn current_element_progress(&self) -> Result<Option<RestrictionProgress>> {
        self.coordinator.current_progress()
    }
}

/// Runs one DoFn instance through setup, bundles and teardown.
pub struct DoFnRunner {
    invoker: Box<dyn DoFnInvoker>,
    signature: Arc<DoFnSignature>,
    step: Option<NameContext>,
    state: LifecycleState,
    bundle_finalizer: BundleFinalizer,
    counter: Option<OutputCounter>,
    execution_context: ExecutionContext,
}

impl DoFnRunner {
    pub fn builder(dofn: impl DoFn + 'static, main_receiver: impl Receiver + 'static) -> DoFnRunnerBuilder {
        DoFnRunnerBuilder::new(dofn, main_receiver)
    }

    pub(super) fn new(
        invoker: Box<dyn DoFnInvoker>,
        signature: Arc<DoFnSignature>,
        step: Option<NameContext>,
        bundle_finalizer: BundleFinalizer,
        counter: Option<OutputCounter>,
        execution_context: ExecutionContext,
    ) -> Self {
        Self {
            invoker,
            signature,
            step,
            state: LifecycleState::Uninitialized,
            bundle_finalizer,
            counter,
            execution_context,
        }
    }

    pub fn signature(&self) -> &Arc<DoFnSignature> {
        &self.signature
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.state
    }

    pub fn invocation_policy(&self) -> InvocationPolicy {
        self.invoker.policy()
    }

    pub fn step_name(&self) -> Option<&str> {
        self.step.as_ref().map(|s| s.step_name.as_str())
    }

    /// Per-element output counts, when the counter experiment is enabled.
    pub fn output_counter(&self) -> Option<&OutputCounter> {
        self.counter.as_ref()
    }

    pub fn set_execution_context(&mut self, context: ExecutionContext) {
        self.execution_context = context;
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    pub fn setup(&mut self) -> Result<()> {
        self.expect_state("set up", &[LifecycleState::Uninitialized])?;
        self.invoker
            .base_mut()
            .invoke_setup()
            .map_err(|e| self.fail(e, None))?;
        self.transition(LifecycleState::SetUp);
        Ok(())
    }

    pub fn start_bundle(&mut self) -> Result<()> {
        self.expect_state("start a bundle", &[LifecycleState::SetUp])?;
        self.invoker
            .base_mut()
            .invoke_start_bundle()
            .map_err(|e| self.fail(e, None))?;
        self.transition(LifecycleState::InBundle);
        Ok(())
    }

    /// Process one element. Returns residuals of checkpointed restrictions.
    pub fn process(&mut self, windowed_value: &WindowedValue) -> Result<Vec<SplitResultResidual>> {
        self.expect_state("process an element", &[LifecycleState::InBundle])?;
        self.invoker
            .invoke_process(windowed_value, None, None)
            .map_err(|e| self.fail(e, Some(windowed_value)))
    }

    pub fn process_batch(&mut self, batch: &WindowedBatch) -> Result<()> {
        self.expect_state("process a batch", &[LifecycleState::InBundle])?;
        self.invoker
            .invoke_process_batch(batch)
            .map_err(|e| self.fail(e, None))
    }

    /// Process an element whose value is a sized restriction
    /// `((element, (restriction, estimator_state)), size)`, such as a split
    /// residual.
    pub fn process_with_sized_restriction(
        &mut self,
        windowed_value: &WindowedValue,
    ) -> Result<Vec<SplitResultResidual>> {
        self.expect_state("process an element", &[LifecycleState::InBundle])?;
        let result = self.process_sized(windowed_value);
        result.map_err(|e| self.fail(e, Some(windowed_value)))
    }

    fn process_sized(&mut self, windowed_value: &WindowedValue) -> Result<Vec<SplitResultResidual>> {
        if !self.signature.is_splittable() {
            return Err(RunnerError::InvalidSignature {
                method: "process".into(),
                reason: "sized restrictions can only be processed by a splittable DoFn".into(),
            });
        }
        let sized = SizedRestriction::from_value(&windowed_value.value)?;
        let element = windowed_value.with_value(sized.element);
        self.invoker
            .invoke_process(&element, Some(sized.restriction), Some(sized.estimator_state))
    }

    /// Run the callback of a fired timer.
    pub fn process_user_timer(
        &mut self,
        timer: &TimerSpec,
        key: &Value,
        window: Window,
        timestamp: EventTime,
        pane_info: PaneInfo,
        dynamic_timer_tag: &str,
    ) -> Result<()> {
        self.expect_state("fire a timer", &[LifecycleState::InBundle])?;
        self.invoker
            .base_mut()
            .invoke_user_timer(timer, key, window, timestamp, pane_info, dynamic_timer_tag)
            .map_err(|e| self.fail(e, None))
    }

    /// Finish the bundle and flush every receiver. The runner leaves the
    /// bundle even when this fails.
    pub fn finish_bundle(&mut self) -> Result<()> {
        self.expect_state("finish a bundle", &[LifecycleState::InBundle])?;
        let base = self.invoker.base_mut();
        let result = base
            .invoke_finish_bundle()
            .and_then(|()| base.output_handler_mut().flush());
        self.transition(LifecycleState::SetUp);
        result.map_err(|e| self.fail(e, None))
    }

    /// Tear the DoFn down. A runner that was never set up is only marked
    /// torn down.
    pub fn teardown(&mut self) -> Result<()> {
        self.expect_state(
            "tear down",
            &[
                LifecycleState::Uninitialized,
                LifecycleState::SetUp,
                LifecycleState::InBundle,
            ],
        )?;
        let was = self.state;
        self.transition(LifecycleState::TornDown);
        if was == LifecycleState::Uninitialized {
            return Ok(());
        }
        self.invoker
            .base_mut()
            .invoke_teardown()
            .map_err(|e| self.fail(e, None))
    }

    /// Run the bundle-finalization callbacks registered during the last bundle.
    pub fn finalize_bundle(&mut self) -> Result<()> {
        self.bundle_finalizer
            .finalize_bundle()
            .map_err(|e| self.fail(e, None))
    }

    // ── Splitting ───────────────────────────────────────────────────────────

    /// Split the element in flight. `None` for non-splittable DoFns or when
    /// nothing can be split.
    pub fn try_split(&self, fraction_of_remainder: f64) -> Result<Option<SplitResult>> {
        match self.invoker.split_coordinator() {
            Some(coordinator) => coordinator
                .try_split(fraction_of_remainder)
                .map_err(|e| self.fail(e, None)),
            None => Ok(None),
        }
    }

    pub fn current_element_progress(&self) -> Result<Option<RestrictionProgress>> {
        match self.invoker.split_coordinator() {
            Some(coordinator) => coordinator
                .current_progress()
                .map_err(|e| self.fail(e, None)),
            None => Ok(None),
        }
    }

    /// A handle for splitting from another thread.
    pub fn split_handle(&self) -> Option<SplitHandle> {
        self.invoker.split_coordinator().map(|coordinator| SplitHandle {
            coordinator: Arc::clone(coordinator),
        })
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    fn expect_state(&self, action: &'static str, allowed: &[LifecycleState]) -> Result<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(self.fail(
            RunnerError::Lifecycle {
                action,
                state: self.state.to_string(),
            },
            None,
        ))
    }

    fn transition(&mut self, next: LifecycleState) {
        tracing::debug!(
            "{}: {} -> {}",
            self.step_name().unwrap_or("<unnamed>"),
            self.state,
            next
        );
        self.state = next;
    }

    /// Annotate `err` with the step name, report it and hand it back.
    fn fail(&self, err: RunnerError, element: Option<&WindowedValue>) -> RunnerError {
        let err = match &self.step {
            Some(step) => err.annotate(&step.step_name),
            None => err,
        };
        let step = self.step_name().unwrap_or("<unnamed>");
        if let Some(sampler) = &self.execution_context.output_sampler {
            sampler.sample_exception(step, &err, element);
        }
        tracing::error!("{}: {}", step, err);
        err
    }
}
