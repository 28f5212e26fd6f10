use super::*;

/// Configures a [`DoFnRunner`].
pub struct DoFnRunnerBuilder {
    dofn: Box<dyn DoFn>,
    main_receiver: Box<dyn Receiver>,
    tagged_receivers: Vec<(String, Box<dyn Receiver>)>,
    window_fn: Arc<dyn WindowFn>,
    batch_converter: Option<Arc<dyn BatchConverter>>,
    args: Vec<ConstArg>,
    kwargs: BTreeMap<String, ConstArg>,
    positional_side_inputs: Vec<Arc<dyn SideInputMap>>,
    keyword_side_inputs: BTreeMap<String, Arc<dyn SideInputMap>>,
    user_state_context: Option<Arc<dyn UserStateContext>>,
    step: Option<NameContext>,
    options: RunnerOptions,
    execution_context: ExecutionContext,
}

impl DoFnRunnerBuilder {
    pub fn new(dofn: impl DoFn + 'static, main_receiver: impl Receiver + 'static) -> Self {
        Self {
            dofn: Box::new(dofn),
            main_receiver: Box::new(main_receiver),
            tagged_receivers: Vec::new(),
            window_fn: Arc::new(GlobalWindows),
            batch_converter: None,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            positional_side_inputs: Vec::new(),
            keyword_side_inputs: BTreeMap::new(),
            user_state_context: None,
            step: None,
            options: RunnerOptions::default(),
            execution_context: ExecutionContext::default(),
        }
    }

    pub fn tagged_receiver(mut self, tag: impl Into<String>, receiver: impl Receiver + 'static) -> Self {
        self.tagged_receivers.push((tag.into(), Box::new(receiver)));
        self
    }

    /// Windowing applied to outputs that carry their own timestamp.
    pub fn window_fn(mut self, window_fn: impl WindowFn + 'static) -> Self {
        self.window_fn = Arc::new(window_fn);
        self
    }

    pub fn batch_converter(mut self, converter: impl BatchConverter + 'static) -> Self {
        self.batch_converter = Some(Arc::new(converter));
        self
    }

    /// Append a positional constant.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(ConstArg::Value(value.into()));
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        self.keyword_side_inputs.remove(&name);
        self.kwargs.insert(name, ConstArg::Value(value.into()));
        self
    }

    /// Append a positional side input, looked up per window at call time.
    pub fn side_input_arg(mut self, side_input: impl SideInputMap + 'static) -> Self {
        self.args.push(ConstArg::SideInput);
        self.positional_side_inputs.push(Arc::new(side_input));
        self
    }

    pub fn side_input_kwarg(mut self, name: impl Into<String>, side_input: impl SideInputMap + 'static) -> Self {
        let name = name.into();
        self.kwargs.insert(name.clone(), ConstArg::SideInput);
        self.keyword_side_inputs.insert(name, Arc::new(side_input));
        self
    }

    pub fn user_state_context(mut self, context: Arc<dyn UserStateContext>) -> Self {
        self.user_state_context = Some(context);
        self
    }

    pub fn step_name(mut self, step: impl Into<String>) -> Self {
        self.step = Some(NameContext::new(step));
        self
    }

    pub fn name_context(mut self, step: NameContext) -> Self {
        self.step = Some(step);
        self
    }

    pub fn options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn execution_context(mut self, context: ExecutionContext) -> Self {
        self.execution_context = context;
        self
    }

    /// Validate the DoFn's signature and pick its invoker.
    pub fn build(self) -> Result<DoFnRunner> {
        let step = self.step;
        let annotate = |err: RunnerError| match &step {
            Some(step) => err.annotate(&step.step_name),
            None => err,
        };

        let signature = Arc::new(DoFnSignature::new(self.dofn.as_ref()).map_err(annotate)?);
        if signature.is_stateful() && self.user_state_context.is_none() {
            return Err(annotate(RunnerError::MissingStateContext));
        }

        let counter = self
            .options
            .outputs_per_element_counter()
            .then(OutputCounter::new);
        let mut handler = OutputHandler::new(self.window_fn, self.main_receiver).with_output_modes(
            signature.process_yields_batches(),
            signature.process_batch_yields_elements(),
        );
        for (tag, receiver) in self.tagged_receivers {
            handler = handler.with_tagged_receiver(tag, receiver);
        }
        if let Some(counter) = &counter {
            handler = handler.with_counter(counter.clone());
        }
        if let Some(converter) = self.batch_converter {
            handler = handler.with_batch_converter(converter);
        }

        // Fill order: positional side inputs, then keyword ones by name.
        let mut side_inputs = self.positional_side_inputs;
        side_inputs.extend(self.keyword_side_inputs.into_values());

        let bundle_finalizer = BundleFinalizer::new();
        let invoker = create_invoker(
            self.dofn,
            Arc::clone(&signature),
            handler,
            InvokerArgs {
                side_inputs,
                args: self.args,
                kwargs: self.kwargs,
                user_state_context: self.user_state_context,
                bundle_finalizer: bundle_finalizer.clone(),
                options: self.options,
            },
        )
        .map_err(annotate)?;

        Ok(DoFnRunner::new(
            invoker,
            signature,
            step,
            bundle_finalizer,
            counter,
            self.execution_context,
        ))
    }
}
