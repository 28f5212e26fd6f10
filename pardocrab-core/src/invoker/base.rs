use super::*;

/// What is known about the call being bound; placeholders are filled from it.
pub(crate) struct CallScope<'a> {
    pub method: &'a str,
    pub element: Option<&'a Value>,
    pub windowed_value: Option<&'a WindowedValue>,
    pub key: Option<&'a Value>,
    pub window: Window,
    pub timestamp: EventTime,
    pub pane_info: PaneInfo,
    pub dynamic_timer_tag: Option<&'a str>,
}

impl<'a> CallScope<'a> {
    /// Scope of a lifecycle method: no element, the global window.
    pub fn lifecycle(method: &'a str) -> Self {
        Self {
            method,
            element: None,
            windowed_value: None,
            key: None,
            window: Window::Global,
            timestamp: EVENT_TIME_MIN,
            pane_info: PaneInfo::NO_FIRING,
            dynamic_timer_tag: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum LifecycleMethod {
    Setup,
    StartBundle,
    FinishBundle,
    Teardown,
}

impl LifecycleMethod {
    fn name(self) -> &'static str {
        match self {
            LifecycleMethod::Setup => "setup",
            LifecycleMethod::StartBundle => "start_bundle",
            LifecycleMethod::FinishBundle => "finish_bundle",
            LifecycleMethod::Teardown => "teardown",
        }
    }
}

/// State shared by every invoker: the DoFn, its signature, where outputs go
/// and the resources entered for the current setup and bundle scopes.
pub struct InvokerBase {
    pub(super) dofn: Box<dyn DoFn>,
    pub(super) signature: Arc<DoFnSignature>,
    pub(super) output_handler: OutputHandler,
    pub(super) user_state_context: Option<Arc<dyn UserStateContext>>,
    bundle_finalizer: BundleFinalizer,
    setup_template: ArgTemplate,
    start_bundle_template: ArgTemplate,
    finish_bundle_template: ArgTemplate,
    teardown_template: ArgTemplate,
    timer_templates: Vec<(TimerSpec, ArgTemplate)>,
    setup_resources: Option<EnteredResources>,
    bundle_resources: Option<EnteredResources>,
}

impl InvokerBase {
    pub fn new(
        dofn: Box<dyn DoFn>,
        signature: Arc<DoFnSignature>,
        output_handler: OutputHandler,
        user_state_context: Option<Arc<dyn UserStateContext>>,
        bundle_finalizer: BundleFinalizer,
    ) -> Result<Self> {
        let no_kwargs = BTreeMap::new();
        let bind = |method: &MethodSignature| ArgTemplate::bind(method, &[], &no_kwargs);
        let timer_templates = signature
            .timer_specs()
            .into_iter()
            .filter_map(|timer| {
                signature
                    .timer_method(&timer)
                    .map(|method| bind(method).map(|template| (timer.clone(), template)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            setup_template: bind(&signature.setup)?,
            start_bundle_template: bind(&signature.start_bundle)?,
            finish_bundle_template: bind(&signature.finish_bundle)?,
            teardown_template: bind(&signature.teardown)?,
            timer_templates,
            dofn,
            signature,
            output_handler,
            user_state_context,
            bundle_finalizer,
            setup_resources: None,
            bundle_resources: None,
        })
    }

    pub fn signature(&self) -> &Arc<DoFnSignature> {
        &self.signature
    }

    pub fn output_handler(&self) -> &OutputHandler {
        &self.output_handler
    }

    pub fn output_handler_mut(&mut self) -> &mut OutputHandler {
        &mut self.output_handler
    }

    pub fn bundle_finalizer(&self) -> &BundleFinalizer {
        &self.bundle_finalizer
    }

    pub fn in_bundle_scope(&self) -> bool {
        self.bundle_resources.is_some()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────────

    /// Enter setup-scoped resources, then call `setup`. The resources are
    /// released again if `setup` fails.
    pub fn invoke_setup(&mut self) -> Result<()> {
        self.setup_resources = Some(EnteredResources::enter_all(&self.signature.setup_contexts())?);
        if let Err(err) = self.call_lifecycle(LifecycleMethod::Setup) {
            release_after_failure(self.setup_resources.take(), "setup");
            return Err(err);
        }
        Ok(())
    }

    /// Enter bundle-scoped resources, then call `start_bundle`.
    pub fn invoke_start_bundle(&mut self) -> Result<()> {
        self.bundle_resources = Some(EnteredResources::enter_all(&self.signature.bundle_contexts())?);
        let result = self
            .call_lifecycle(LifecycleMethod::StartBundle)
            .and_then(|outputs| self.output_handler.start_bundle_outputs(outputs));
        if let Err(err) = result {
            release_after_failure(self.bundle_resources.take(), "start_bundle");
            return Err(err);
        }
        Ok(())
    }

    /// Call `finish_bundle` and route its outputs. Bundle resources are
    /// released on every path; the first failure is returned.
    pub fn invoke_finish_bundle(&mut self) -> Result<()> {
        let result = self
            .call_lifecycle(LifecycleMethod::FinishBundle)
            .and_then(|outputs| self.output_handler.finish_bundle_outputs(outputs));
        let released = release(self.bundle_resources.take());
        result.and(released)
    }

    /// Call `teardown`, then release setup resources on every path.
    pub fn invoke_teardown(&mut self) -> Result<()> {
        let result = self.call_lifecycle(LifecycleMethod::Teardown).map(drop);
        let released = release(self.setup_resources.take());
        result.and(released)
    }

    fn call_lifecycle(&mut self, method: LifecycleMethod) -> Result<Vec<Output>> {
        let template = match method {
            LifecycleMethod::Setup => &self.setup_template,
            LifecycleMethod::StartBundle => &self.start_bundle_template,
            LifecycleMethod::FinishBundle => &self.finish_bundle_template,
            LifecycleMethod::Teardown => &self.teardown_template,
        };
        let scope = CallScope::lifecycle(method.name());
        let args = template.instantiate(|kind| self.fill(kind, &scope))?;
        let mut ctx = ProcessContext::new(args);
        match method {
            LifecycleMethod::Setup => self.dofn.setup(&mut ctx)?,
            LifecycleMethod::StartBundle => self.dofn.start_bundle(&mut ctx)?,
            LifecycleMethod::FinishBundle => self.dofn.finish_bundle(&mut ctx)?,
            LifecycleMethod::Teardown => self.dofn.teardown(&mut ctx)?,
        }
        Ok(ctx.into_outputs())
    }

    // ── Timers ──────────────────────────────────────────────────────────────

    /// Run the callback registered for `timer`. Outputs inherit `timestamp`
    /// and `window`.
    pub fn invoke_user_timer(
        &mut self,
        timer: &TimerSpec,
        key: &Value,
        window: Window,
        timestamp: EventTime,
        pane_info: PaneInfo,
        dynamic_timer_tag: &str,
    ) -> Result<()> {
        let method = format!("on_timer({})", timer.name);
        let Some((_, template)) = self.timer_templates.iter().find(|(t, _)| t == timer) else {
            return Err(RunnerError::InvalidSignature {
                method,
                reason: "no callback is registered for this timer".into(),
            });
        };
        let scope = CallScope {
            method: &method,
            element: None,
            windowed_value: None,
            key: Some(key),
            window,
            timestamp,
            pane_info,
            dynamic_timer_tag: Some(dynamic_timer_tag),
        };
        let args = template.instantiate(|kind| self.fill(kind, &scope))?;
        let mut ctx = ProcessContext::new(args);
        self.dofn.on_timer(timer, &mut ctx)?;
        let input = WindowedValue::new(Value::Null, timestamp, vec![window]);
        self.output_handler
            .handle_process_outputs(&input, ctx.into_outputs())
    }

    // ── Restriction provider entry points ───────────────────────────────────

    fn provider(&self, method: &str) -> Result<&Arc<dyn RestrictionProvider>> {
        self.signature
            .restriction_provider()
            .ok_or_else(|| RunnerError::InvalidSignature {
                method: method.to_string(),
                reason: "the DoFn is not splittable".into(),
            })
    }

    pub fn invoke_initial_restriction(&self, element: &Value) -> Result<Value> {
        self.provider("initial_restriction")?
            .initial_restriction(element)
            .map_err(|e| RunnerError::collaborator("initial restriction", e))
    }

    pub fn invoke_create_tracker(&self, restriction: &Value) -> Result<Box<dyn RestrictionTracker>> {
        self.provider("create_tracker")?
            .create_tracker(restriction)
            .map_err(|e| RunnerError::collaborator("create restriction tracker", e))
    }

    pub fn invoke_split(&self, element: &Value, restriction: &Value) -> Result<Vec<Value>> {
        self.provider("split")?
            .split(element, restriction)
            .map_err(|e| RunnerError::collaborator("split restriction", e))
    }

    /// Size of `restriction`; negative sizes are rejected.
    pub fn invoke_restriction_size(&self, element: &Value, restriction: &Value) -> Result<f64> {
        let size = self
            .provider("restriction_size")?
            .restriction_size(element, restriction)
            .map_err(|e| RunnerError::collaborator("restriction size", e))?;
        if size < 0.0 || size.is_nan() {
            return Err(RunnerError::NegativeSize {
                what: "initial",
                size,
            });
        }
        Ok(size)
    }

    pub fn invoke_initial_estimator_state(&self, element: &Value, restriction: &Value) -> Result<Value> {
        self.signature
            .watermark_estimator_provider()
            .initial_estimator_state(element, restriction)
            .map_err(|e| RunnerError::collaborator("initial watermark estimator state", e))
    }

    pub fn invoke_create_watermark_estimator(
        &self,
        estimator_state: &Value,
    ) -> Result<Box<dyn WatermarkEstimator>> {
        self.signature
            .watermark_estimator_provider()
            .create_watermark_estimator(estimator_state)
            .map_err(|e| RunnerError::collaborator("create watermark estimator", e))
    }

    // ── Placeholder values ──────────────────────────────────────────────────

    /// The argument for one placeholder of a call in `scope`.
    pub(crate) fn fill(&self, kind: &ParamKind, scope: &CallScope<'_>) -> Result<Arg> {
        let unavailable = |reason: &str| RunnerError::UnsupportedParam {
            method: scope.method.to_string(),
            param: kind.param_id(),
            reason: reason.to_string(),
        };
        Ok(match kind {
            ParamKind::Element => {
                Arg::Value(scope.element.cloned().ok_or_else(|| unavailable("no element"))?)
            }
            ParamKind::Key => Arg::Key(scope.key.cloned().ok_or_else(|| unavailable("no key"))?),
            ParamKind::Window => Arg::Window(scope.window),
            ParamKind::WindowedValue => Arg::WindowedValue(
                scope
                    .windowed_value
                    .cloned()
                    .ok_or_else(|| unavailable("no windowed value"))?,
            ),
            ParamKind::Timestamp => Arg::Timestamp(scope.timestamp),
            ParamKind::PaneInfo => Arg::PaneInfo(scope.pane_info),
            ParamKind::State(spec) => {
                let context = self.state_context()?;
                let key = scope.key.ok_or_else(|| unavailable("no key"))?;
                let state = context
                    .get_state(spec, key, &scope.window)
                    .map_err(|e| RunnerError::collaborator(format!("state '{}'", spec.name), e))?;
                Arg::State(state)
            }
            ParamKind::Timer(spec) => {
                let context = self.state_context()?;
                let key = scope.key.ok_or_else(|| unavailable("no key"))?;
                let timer = context
                    .get_timer(spec, key, &scope.window, scope.timestamp, &scope.pane_info)
                    .map_err(|e| RunnerError::collaborator(format!("timer '{}'", spec.name), e))?;
                Arg::Timer(timer)
            }
            ParamKind::BundleFinalizer => Arg::BundleFinalizer(self.bundle_finalizer.clone()),
            ParamKind::DynamicTimerTag => {
                Arg::DynamicTimerTag(scope.dynamic_timer_tag.unwrap_or_default().to_string())
            }
            ParamKind::BundleContext(param) => {
                let resource = self
                    .bundle_resources
                    .as_ref()
                    .and_then(|r| r.get(&param.name))
                    .ok_or_else(|| RunnerError::Lifecycle {
                        action: "use a bundle-scoped resource",
                        state: "no bundle is active".into(),
                    })?;
                Arg::Resource(Arc::clone(resource))
            }
            ParamKind::SetupContext(param) => {
                let resource = self
                    .setup_resources
                    .as_ref()
                    .and_then(|r| r.get(&param.name))
                    .ok_or_else(|| RunnerError::Lifecycle {
                        action: "use a setup-scoped resource",
                        state: "the DoFn is not set up".into(),
                    })?;
                Arg::Resource(Arc::clone(resource))
            }
            ParamKind::SideInput
            | ParamKind::RestrictionTracker(_)
            | ParamKind::WatermarkEstimator(_) => {
                return Err(unavailable("supplied when arguments are bound"))
            }
        })
    }

    fn state_context(&self) -> Result<&Arc<dyn UserStateContext>> {
        self.user_state_context
            .as_ref()
            .ok_or(RunnerError::MissingStateContext)
    }
}

fn release(resources: Option<EnteredResources>) -> Result<()> {
    match resources {
        Some(mut resources) => resources.exit_all(),
        None => Ok(()),
    }
}

/// Release resources after a failed lifecycle call; the call's error wins.
fn release_after_failure(resources: Option<EnteredResources>, method: &str) {
    if let Err(err) = release(resources) {
        tracing::warn!("releasing resources after failed {}: {}", method, err);
    }
}
