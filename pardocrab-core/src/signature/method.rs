use super::*;

/// How a classified parameter is supplied.
#[derive(Clone, Debug)]
pub enum ParamRole {
    /// No default: the element or a call-site constant.
    Required,
    Special(ParamKind),
    /// Plain default, used when no constant is supplied.
    Constant(Value),
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub role: ParamRole,
}

/// The classified parameter list of one DoFn method.
#[derive(Clone, Debug)]
pub struct MethodSignature {
    pub name: String,
    pub params: Vec<Param>,
}

impl MethodSignature {
    /// Classify `decl`, resolving markers and rejecting duplicates.
    pub fn build(name: &str, decl: &MethodDecl) -> Result<Self> {
        let mut params: Vec<Param> = Vec::with_capacity(decl.params.len());
        let mut param_ids: Vec<String> = Vec::new();
        let mut seen_default = false;

        for p in &decl.params {
            if params.iter().any(|existing| existing.name == p.name) {
                return Err(RunnerError::InvalidSignature {
                    method: name.to_string(),
                    reason: format!("parameter '{}' is declared twice", p.name),
                });
            }
            let role = match &p.default {
                None if seen_default => {
                    return Err(RunnerError::InvalidSignature {
                        method: name.to_string(),
                        reason: format!(
                            "required parameter '{}' follows a parameter with a default",
                            p.name
                        ),
                    });
                }
                None => ParamRole::Required,
                Some(ParamDefault::Special(kind)) => ParamRole::Special(kind.clone()),
                Some(ParamDefault::Marker(marker)) => {
                    let kind = marker.parse::<ParamKind>().map_err(|_| RunnerError::UnknownMarker {
                        method: name.to_string(),
                        param: p.name.clone(),
                        marker: marker.clone(),
                    })?;
                    ParamRole::Special(kind)
                }
                Some(ParamDefault::Value(value)) => ParamRole::Constant(value.clone()),
            };
            seen_default |= p.default.is_some();

            if let ParamRole::Special(kind) = &role {
                let id = kind.param_id();
                if param_ids.contains(&id) {
                    return Err(RunnerError::DuplicateParam {
                        method: name.to_string(),
                        param: id,
                    });
                }
                param_ids.push(id);
            }
            params.push(Param {
                name: p.name.clone(),
                role,
            });
        }

        Ok(Self {
            name: name.to_string(),
            params,
        })
    }

    /// Number of leading parameters without a default.
    pub fn required_count(&self) -> usize {
        self.params
            .iter()
            .take_while(|p| matches!(p.role, ParamRole::Required))
            .count()
    }

    /// True if any parameter declares a default of any sort.
    pub fn has_defaults(&self) -> bool {
        self.params
            .iter()
            .any(|p| !matches!(p.role, ParamRole::Required))
    }

    /// Special parameters with their names, in declaration order.
    pub fn specials(&self) -> impl Iterator<Item = (&str, &ParamKind)> {
        self.params.iter().filter_map(|p| match &p.role {
            ParamRole::Special(kind) => Some((p.name.as_str(), kind)),
            _ => None,
        })
    }

    pub fn find_kind(&self, pred: impl Fn(&ParamKind) -> bool) -> Option<(&str, &ParamKind)> {
        self.specials().find(|(_, kind)| pred(kind))
    }

    pub fn has_kind(&self, pred: impl Fn(&ParamKind) -> bool) -> bool {
        self.find_kind(pred).is_some()
    }

    fn reject(&self, kind: &ParamKind, reason: &str) -> RunnerError {
        RunnerError::UnsupportedParam {
            method: self.name.clone(),
            param: kind.param_id(),
            reason: reason.to_string(),
        }
    }

    /// Lifecycle methods and timer callbacks are called without an element,
    /// so every parameter must have a default.
    fn require_defaults(&self) -> Result<()> {
        match self.params.iter().find(|p| matches!(p.role, ParamRole::Required)) {
            Some(p) => Err(RunnerError::InvalidSignature {
                method: self.name.clone(),
                reason: format!("parameter '{}' must have a default", p.name),
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchingPreference {
    DoNotCare,
    BatchRequired,
    BatchForbidden,
}

/// The validated contract of a DoFn.
pub struct DoFnSignature {
    pub process: Option<MethodSignature>,
    pub process_batch: Option<MethodSignature>,
    pub setup: MethodSignature,
    pub start_bundle: MethodSignature,
    pub finish_bundle: MethodSignature,
    pub teardown: MethodSignature,
    timer_methods: Vec<(TimerSpec, MethodSignature)>,
    restriction_provider: Option<Arc<dyn RestrictionProvider>>,
    watermark_estimator_provider: Arc<dyn WatermarkEstimatorProvider>,
    process_yields_batches: bool,
    process_batch_yields_elements: bool,
    unbounded_per_element: bool,
}

impl DoFnSignature {
    pub fn new(dofn: &dyn DoFn) -> Result<Self> {
        Self::from_decl(dofn.declare())
    }

    pub fn from_decl(decl: DoFnDecl) -> Result<Self> {
        let process = decl
            .process
            .as_ref()
            .map(|m| MethodSignature::build("process", m))
            .transpose()?;
        let process_batch = decl
            .process_batch
            .as_ref()
            .map(|m| MethodSignature::build("process_batch", m))
            .transpose()?;
        if process.is_none() && process_batch.is_none() {
            return Err(RunnerError::InvalidSignature {
                method: "DoFn".to_string(),
                reason: "must define process or process_batch".to_string(),
            });
        }
        if let Some(batch) = &process_batch {
            validate_process_batch(batch)?;
        }

        let setup = MethodSignature::build("setup", &decl.setup)?;
        let start_bundle = MethodSignature::build("start_bundle", &decl.start_bundle)?;
        let finish_bundle = MethodSignature::build("finish_bundle", &decl.finish_bundle)?;
        let teardown = MethodSignature::build("teardown", &decl.teardown)?;
        validate_bundle_method(&start_bundle)?;
        validate_bundle_method(&finish_bundle)?;
        validate_instance_method(&setup)?;
        validate_instance_method(&teardown)?;

        let mut timer_methods = Vec::with_capacity(decl.timer_callbacks.len());
        for (timer, method) in &decl.timer_callbacks {
            if timer_methods.iter().any(|(t, _): &(TimerSpec, _)| t.name == timer.name) {
                return Err(RunnerError::InvalidSignature {
                    method: format!("on_timer({})", timer.name),
                    reason: "more than one callback for the same timer".to_string(),
                });
            }
            let sig = MethodSignature::build(&format!("on_timer({})", timer.name), method)?;
            validate_timer_callback(&sig)?;
            timer_methods.push((timer.clone(), sig));
        }

        let mut restriction_provider = None;
        let mut watermark_estimator_provider: Option<Arc<dyn WatermarkEstimatorProvider>> = None;
        if let Some(process) = &process {
            for (_, kind) in process.specials() {
                match kind {
                    ParamKind::RestrictionTracker(provider) => {
                        restriction_provider = Some(Arc::clone(provider))
                    }
                    ParamKind::WatermarkEstimator(provider) => {
                        watermark_estimator_provider = Some(Arc::clone(provider))
                    }
                    _ => {}
                }
            }
            if watermark_estimator_provider.is_some() && restriction_provider.is_none() {
                return Err(RunnerError::InvalidSignature {
                    method: "process".to_string(),
                    reason: "a watermark estimator requires a restriction tracker".to_string(),
                });
            }
        }

        let signature = Self {
            process,
            process_batch,
            setup,
            start_bundle,
            finish_bundle,
            teardown,
            timer_methods,
            restriction_provider,
            watermark_estimator_provider: watermark_estimator_provider
                .unwrap_or_else(|| Arc::new(NoOpWatermarkEstimatorProvider)),
            process_yields_batches: decl.process_yields_batches,
            process_batch_yields_elements: decl.process_batch_yields_elements,
            unbounded_per_element: decl.unbounded_per_element,
        };
        signature.validate_stateful()?;
        Ok(signature)
    }

    fn validate_stateful(&self) -> Result<()> {
        if self.is_splittable() && self.is_stateful() {
            return Err(RunnerError::InvalidSignature {
                method: "process".to_string(),
                reason: "splittable DoFns cannot use state or timers".to_string(),
            });
        }

        let mut state_specs: Vec<&StateSpec> = Vec::new();
        let mut timer_specs: Vec<&TimerSpec> = Vec::new();
        for method in self.stateful_methods() {
            for (_, kind) in method.specials() {
                match kind {
                    ParamKind::State(spec) => {
                        if state_specs.iter().any(|s| s.name == spec.name && *s != spec) {
                            return Err(RunnerError::InvalidSignature {
                                method: method.name.clone(),
                                reason: format!("state '{}' is declared with two different specs", spec.name),
                            });
                        }
                        state_specs.push(spec);
                    }
                    ParamKind::Timer(spec) => {
                        if timer_specs.iter().any(|t| t.name == spec.name && *t != spec) {
                            return Err(RunnerError::InvalidSignature {
                                method: method.name.clone(),
                                reason: format!("timer '{}' is declared with two different specs", spec.name),
                            });
                        }
                        if self.timer_method(spec).is_none() {
                            return Err(RunnerError::InvalidSignature {
                                method: method.name.clone(),
                                reason: format!("timer '{}' has no on_timer callback", spec.name),
                            });
                        }
                        timer_specs.push(spec);
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn stateful_methods(&self) -> impl Iterator<Item = &MethodSignature> {
        self.process
            .iter()
            .chain(self.timer_methods.iter().map(|(_, m)| m))
    }

    /// Every method the DoFn exposes, lifecycle order first.
    fn all_methods(&self) -> impl Iterator<Item = &MethodSignature> {
        std::iter::once(&self.setup)
            .chain(std::iter::once(&self.start_bundle))
            .chain(self.process.iter())
            .chain(self.process_batch.iter())
            .chain(std::iter::once(&self.finish_bundle))
            .chain(std::iter::once(&self.teardown))
            .chain(self.timer_methods.iter().map(|(_, m)| m))
    }

    pub fn is_splittable(&self) -> bool {
        self.restriction_provider.is_some()
    }

    pub fn restriction_provider(&self) -> Option<&Arc<dyn RestrictionProvider>> {
        self.restriction_provider.as_ref()
    }

    /// The declared provider, or a no-op provider when none is declared.
    pub fn watermark_estimator_provider(&self) -> &Arc<dyn WatermarkEstimatorProvider> {
        &self.watermark_estimator_provider
    }

    /// State specs in first-use order.
    pub fn state_specs(&self) -> Vec<StateSpec> {
        let mut specs: Vec<StateSpec> = Vec::new();
        for method in self.stateful_methods() {
            for (_, kind) in method.specials() {
                if let ParamKind::State(spec) = kind {
                    if !specs.contains(spec) {
                        specs.push(spec.clone());
                    }
                }
            }
        }
        specs
    }

    /// Timer specs with a registered callback.
    pub fn timer_specs(&self) -> Vec<TimerSpec> {
        self.timer_methods.iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn is_stateful(&self) -> bool {
        self.has_timers() || !self.state_specs().is_empty()
    }

    pub fn has_timers(&self) -> bool {
        !self.timer_methods.is_empty()
    }

    pub fn timer_method(&self, timer: &TimerSpec) -> Option<&MethodSignature> {
        self.timer_methods
            .iter()
            .find(|(t, _)| t == timer)
            .map(|(_, m)| m)
    }

    pub fn has_bundle_finalization(&self) -> bool {
        std::iter::once(&self.start_bundle)
            .chain(self.process.iter())
            .chain(std::iter::once(&self.finish_bundle))
            .any(|m| m.has_kind(|k| matches!(k, ParamKind::BundleFinalizer)))
    }

    pub fn is_unbounded_per_element(&self) -> bool {
        self.unbounded_per_element
    }

    pub fn process_yields_batches(&self) -> bool {
        self.process_yields_batches
    }

    pub fn process_batch_yields_elements(&self) -> bool {
        self.process_batch_yields_elements
    }

    /// Distinct bundle-scoped resources, in order of first appearance.
    pub fn bundle_contexts(&self) -> Vec<ContextParam> {
        self.contexts(|kind| match kind {
            ParamKind::BundleContext(param) => Some(param),
            _ => None,
        })
    }

    /// Distinct setup-scoped resources, in order of first appearance.
    pub fn setup_contexts(&self) -> Vec<ContextParam> {
        self.contexts(|kind| match kind {
            ParamKind::SetupContext(param) => Some(param),
            _ => None,
        })
    }

    fn contexts(&self, select: impl Fn(&ParamKind) -> Option<&ContextParam>) -> Vec<ContextParam> {
        let mut out: Vec<ContextParam> = Vec::new();
        for method in self.all_methods() {
            for (_, kind) in method.specials() {
                if let Some(param) = select(kind) {
                    if !out.iter().any(|p| p.name == param.name) {
                        out.push(param.clone());
                    }
                }
            }
        }
        out
    }

    pub fn batching_preference(&self) -> BatchingPreference {
        match (self.process.is_some(), self.process_batch.is_some()) {
            (true, true) => BatchingPreference::DoNotCare,
            (false, true) => BatchingPreference::BatchRequired,
            _ => BatchingPreference::BatchForbidden,
        }
    }
}

impl std::fmt::Debug for DoFnSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DoFnSignature")
            .field("process", &self.process)
            .field("process_batch", &self.process_batch)
            .field("splittable", &self.is_splittable())
            .field("timers", &self.timer_specs())
            .finish_non_exhaustive()
    }
}

fn validate_process_batch(method: &MethodSignature) -> Result<()> {
    for (_, kind) in method.specials() {
        match kind {
            ParamKind::Window | ParamKind::Timestamp | ParamKind::PaneInfo => {}
            ParamKind::Element => {
                return Err(method.reject(
                    kind,
                    "the element marker is reserved for a future capability",
                ))
            }
            k if k.is_per_key() => {
                return Err(method.reject(kind, "batches have no single key"))
            }
            _ => {
                return Err(RunnerError::InvalidSignature {
                    method: method.name.clone(),
                    reason: format!(
                        "only window, timestamp and pane_info are allowed, got {kind}"
                    ),
                })
            }
        }
    }
    Ok(())
}

fn validate_bundle_method(method: &MethodSignature) -> Result<()> {
    method.require_defaults()?;
    for (_, kind) in method.specials() {
        if kind.is_element_scoped() || matches!(kind, ParamKind::DynamicTimerTag) {
            return Err(method.reject(kind, "not available outside element processing"));
        }
    }
    Ok(())
}

fn validate_instance_method(method: &MethodSignature) -> Result<()> {
    validate_bundle_method(method)?;
    for (_, kind) in method.specials() {
        if matches!(kind, ParamKind::BundleContext(_) | ParamKind::BundleFinalizer) {
            return Err(method.reject(kind, "not available outside a bundle"));
        }
    }
    Ok(())
}

fn validate_timer_callback(method: &MethodSignature) -> Result<()> {
    method.require_defaults()?;
    for (_, kind) in method.specials() {
        if matches!(
            kind,
            ParamKind::Element
                | ParamKind::WindowedValue
                | ParamKind::SideInput
                | ParamKind::RestrictionTracker(_)
                | ParamKind::WatermarkEstimator(_)
        ) {
            return Err(method.reject(kind, "not available in a timer callback"));
        }
    }
    Ok(())
}
