use super::*;

/// Parameter names under which the tracker and estimator are passed.
struct SplittableParams {
    coordinator: Arc<SplitCoordinator>,
    tracker_param: String,
    estimator_param: Option<String>,
}

/// Invoker that binds every argument from a template.
///
/// Window-sensitive DoFns see each of an element's windows in turn; others
/// see the element once, with side inputs and window parameters resolved
/// against the global window. Unless arguments must be recomputed per call,
/// the template with side inputs filled in is cached after the first call.
pub struct PerWindowInvoker {
    base: InvokerBase,
    side_inputs: Vec<Arc<dyn SideInputMap>>,
    has_windowed_inputs: bool,
    recalculate_window_args: bool,
    is_key_param_required: bool,
    process_template: Option<ArgTemplate>,
    process_batch_template: Option<ArgTemplate>,
    cached_process_args: Option<ArgTemplate>,
    cached_process_batch_args: Option<ArgTemplate>,
    splittable: Option<SplittableParams>,
}

impl PerWindowInvoker {
    pub fn new(base: InvokerBase, args: InvokerArgs) -> Result<Self> {
        let signature = Arc::clone(&base.signature);
        let bind = |method: &Option<MethodSignature>| {
            method
                .as_ref()
                .map(|m| ArgTemplate::bind(m, &args.args, &args.kwargs))
                .transpose()
        };
        let process_template = bind(&signature.process)?;
        let process_batch_template = bind(&signature.process_batch)?;

        let declares = |method: &Option<MethodSignature>, pred: fn(&ParamKind) -> bool| {
            method.as_ref().is_some_and(|m| m.has_kind(pred))
        };
        let is_window = |k: &ParamKind| matches!(k, ParamKind::Window);
        let has_windowed_inputs = args.side_inputs.iter().any(|s| !s.is_globally_windowed())
            || declares(&signature.process, is_window)
            || declares(&signature.process_batch, is_window)
            || signature.is_stateful();
        let recalculate_window_args =
            has_windowed_inputs || args.options.disable_global_windowed_args_caching();
        let is_key_param_required =
            declares(&signature.process, |k: &ParamKind| matches!(k, ParamKind::Key));

        let splittable = match (signature.restriction_provider(), signature.process.as_ref()) {
            (Some(provider), Some(process)) => {
                let param_name = |pred: fn(&ParamKind) -> bool| {
                    process.find_kind(pred).map(|(name, _)| name.to_string())
                };
                let tracker_param = param_name(|k| matches!(k, ParamKind::RestrictionTracker(_)))
                    .ok_or_else(|| RunnerError::InvalidSignature {
                        method: "process".into(),
                        reason: "a splittable DoFn must take a restriction tracker".into(),
                    })?;
                Some(SplittableParams {
                    coordinator: Arc::new(SplitCoordinator::new(
                        Arc::clone(provider),
                        Arc::clone(signature.watermark_estimator_provider()),
                    )),
                    tracker_param,
                    estimator_param: param_name(|k| matches!(k, ParamKind::WatermarkEstimator(_))),
                })
            }
            _ => None,
        };

        tracing::debug!(
            "per-window invoker: windowed inputs {}, recalculate args {}, splittable {}",
            has_windowed_inputs,
            recalculate_window_args,
            splittable.is_some()
        );
        Ok(Self {
            base,
            side_inputs: args.side_inputs,
            has_windowed_inputs,
            recalculate_window_args,
            is_key_param_required,
            process_template,
            process_batch_template,
            cached_process_args: None,
            cached_process_batch_args: None,
            splittable,
        })
    }

    pub fn has_windowed_inputs(&self) -> bool {
        self.has_windowed_inputs
    }

    /// The window side inputs and window parameters are resolved against.
    fn effective_window(&self, windows: &[Window]) -> Window {
        if self.has_windowed_inputs {
            windows.first().copied().unwrap_or(Window::Global)
        } else {
            Window::Global
        }
    }

    fn side_input_values(&self, window: &Window) -> Result<Vec<Value>> {
        self.side_inputs
            .iter()
            .map(|side_input| {
                side_input
                    .get(window)
                    .map_err(|e| RunnerError::collaborator(format!("side input for {window}"), e))
            })
            .collect()
    }

    fn extract_key(&self, value: &Value) -> Result<Option<Value>> {
        if self.base.user_state_context.is_none() && !self.is_key_param_required {
            return Ok(None);
        }
        match value.as_kv() {
            Some((key, _)) => Ok(Some(key.clone())),
            None => Err(RunnerError::KeyShape(value.to_string())),
        }
    }

    /// Call `process` once for `windowed_value`, with `extra` passed by keyword.
    fn invoke_process_per_window(
        &mut self,
        windowed_value: &WindowedValue,
        extra: Vec<(String, Arg)>,
        estimator: Option<&ThreadsafeWatermarkEstimator>,
    ) -> Result<()> {
        let window = self.effective_window(&windowed_value.windows);
        let template = match self.cached_process_args.take() {
            Some(template) => template,
            None => {
                let unfilled = self.process_template.as_ref().ok_or_else(no_process)?;
                unfilled.fill_side_inputs(self.side_input_values(&window)?)?
            }
        };
        let result = self.call_process(&template, windowed_value, window, extra, estimator);
        if !self.recalculate_window_args {
            self.cached_process_args = Some(template);
        }
        result
    }

    fn call_process(
        &mut self,
        template: &ArgTemplate,
        windowed_value: &WindowedValue,
        window: Window,
        extra: Vec<(String, Arg)>,
        estimator: Option<&ThreadsafeWatermarkEstimator>,
    ) -> Result<()> {
        let key = self.extract_key(&windowed_value.value)?;
        let scope = CallScope {
            method: "process",
            element: Some(&windowed_value.value),
            windowed_value: Some(windowed_value),
            key: key.as_ref(),
            window,
            timestamp: windowed_value.timestamp,
            pane_info: windowed_value.pane_info,
            dynamic_timer_tag: None,
        };
        let mut args = template.instantiate(|kind| self.base.fill(kind, &scope))?;
        for (name, arg) in extra {
            args.insert_kwarg(name, arg);
        }
        let mut ctx = ProcessContext::new(args);
        if let Some(estimator) = estimator {
            ctx = ctx.with_watermark_estimator(estimator.clone(), windowed_value.timestamp);
        }
        self.base.dofn.process(&mut ctx)?;
        let outputs = ctx.finish()?;
        self.base
            .output_handler
            .handle_process_outputs(windowed_value, outputs)
    }

    /// Process one window of a splittable element against `active`.
    fn process_restriction_window(
        &mut self,
        windowed_value: &WindowedValue,
        coordinator: &SplitCoordinator,
        active: &crate::sdf::ActiveRestriction,
        tracker_param: &str,
        estimator_param: Option<&str>,
    ) -> Result<Option<SplitResultResidual>> {
        let mut extra = vec![(
            tracker_param.to_string(),
            Arg::RestrictionTracker(RestrictionTrackerView::new(active.tracker.clone())),
        )];
        if let Some(name) = estimator_param {
            extra.push((name.to_string(), Arg::WatermarkEstimator(active.estimator.clone())));
        }
        self.invoke_process_per_window(windowed_value, extra, Some(&active.estimator))?;
        coordinator.finish_window(windowed_value, active)
    }

    fn invoke_splittable(
        &mut self,
        windowed_value: &WindowedValue,
        restriction: Option<Value>,
        estimator_state: Option<Value>,
        coordinator: Arc<SplitCoordinator>,
        tracker_param: &str,
        estimator_param: Option<&str>,
    ) -> Result<Vec<SplitResultResidual>> {
        let restriction = match restriction {
            Some(restriction) => restriction,
            None => self.base.invoke_initial_restriction(&windowed_value.value)?,
        };
        let estimator_state = match estimator_state {
            Some(state) => state,
            None => self
                .base
                .invoke_initial_estimator_state(&windowed_value.value, &restriction)?,
        };
        let _element = coordinator.begin_element(windowed_value, &restriction, &estimator_state)?;

        let mut residuals = Vec::new();
        let window_count = windowed_value.windows.len();
        if self.has_windowed_inputs && window_count > 1 {
            for (index, window) in windowed_value.windows.iter().enumerate() {
                let Some(active) =
                    coordinator.start_window(Some(index), window_count, &restriction, &estimator_state)?
                else {
                    // A split moved the stop index here.
                    break;
                };
                let single = windowed_value.in_window(*window);
                let residual = self.process_restriction_window(
                    &single,
                    &coordinator,
                    &active,
                    tracker_param,
                    estimator_param,
                )?;
                if let Some(residual) = residual {
                    tracing::debug!("element checkpointed in window {} of {}", index, window_count);
                    residuals.push(residual);
                }
            }
        } else if let Some(active) =
            coordinator.start_window(None, window_count, &restriction, &estimator_state)?
        {
            let residual = self.process_restriction_window(
                windowed_value,
                &coordinator,
                &active,
                tracker_param,
                estimator_param,
            )?;
            residuals.extend(residual);
        }
        Ok(residuals)
    }

    fn invoke_process_batch_per_window(&mut self, batch: &WindowedBatch) -> Result<()> {
        let window = self.effective_window(&batch.windows);
        let template = match self.cached_process_batch_args.take() {
            Some(template) => template,
            None => {
                let unfilled = self
                    .process_batch_template
                    .as_ref()
                    .ok_or_else(no_process_batch)?;
                unfilled.fill_side_inputs(self.side_input_values(&window)?)?
            }
        };
        let result = self.call_process_batch(&template, batch, window);
        if !self.recalculate_window_args {
            self.cached_process_batch_args = Some(template);
        }
        result
    }

    fn call_process_batch(
        &mut self,
        template: &ArgTemplate,
        batch: &WindowedBatch,
        window: Window,
    ) -> Result<()> {
        let scope = CallScope {
            method: "process_batch",
            element: Some(&batch.values),
            windowed_value: None,
            key: None,
            window,
            timestamp: batch.timestamp,
            pane_info: batch.pane_info,
            dynamic_timer_tag: None,
        };
        let args = template.instantiate(|kind| self.base.fill(kind, &scope))?;
        let mut ctx = ProcessContext::new(args);
        self.base.dofn.process_batch(&mut ctx)?;
        self.base
            .output_handler
            .handle_process_batch_outputs(batch, ctx.into_outputs())
    }
}

impl DoFnInvoker for PerWindowInvoker {
    fn base(&self) -> &InvokerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut InvokerBase {
        &mut self.base
    }

    fn policy(&self) -> InvocationPolicy {
        InvocationPolicy::Windowed
    }

    fn invoke_process(
        &mut self,
        windowed_value: &WindowedValue,
        restriction: Option<Value>,
        estimator_state: Option<Value>,
    ) -> Result<Vec<SplitResultResidual>> {
        if let Some(params) = &self.splittable {
            let coordinator = Arc::clone(&params.coordinator);
            let tracker_param = params.tracker_param.clone();
            let estimator_param = params.estimator_param.clone();
            return self.invoke_splittable(
                windowed_value,
                restriction,
                estimator_state,
                coordinator,
                &tracker_param,
                estimator_param.as_deref(),
            );
        }

        if self.has_windowed_inputs && windowed_value.windows.len() != 1 {
            for window in &windowed_value.windows {
                self.invoke_process_per_window(&windowed_value.in_window(*window), Vec::new(), None)?;
            }
        } else {
            self.invoke_process_per_window(windowed_value, Vec::new(), None)?;
        }
        Ok(Vec::new())
    }

    fn invoke_process_batch(&mut self, batch: &WindowedBatch) -> Result<()> {
        if self.has_windowed_inputs && batch.windows.len() != 1 {
            for window in &batch.windows {
                let single = WindowedBatch::of(
                    batch.values.clone(),
                    batch.timestamp,
                    vec![*window],
                    batch.pane_info,
                );
                self.invoke_process_batch_per_window(&single)?;
            }
            return Ok(());
        }
        self.invoke_process_batch_per_window(batch)
    }

    fn split_coordinator(&self) -> Option<&Arc<SplitCoordinator>> {
        self.splittable.as_ref().map(|p| &p.coordinator)
    }
}

fn no_process() -> RunnerError {
    RunnerError::InvalidSignature {
        method: "process".into(),
        reason: "the DoFn only processes batches".into(),
    }
}

fn no_process_batch() -> RunnerError {
    RunnerError::InvalidSignature {
        method: "process_batch".into(),
        reason: "the DoFn does not process batches".into(),
    }
}
