use super::*;

/// Invoker for DoFns whose only argument is the element.
pub struct SimpleInvoker {
    base: InvokerBase,
    process_element: Option<String>,
    process_batch_element: Option<String>,
}

impl SimpleInvoker {
    pub fn new(base: InvokerBase) -> Self {
        let first_param = |method: &Option<MethodSignature>| {
            method
                .as_ref()
                .and_then(|m| m.params.first())
                .map(|p| p.name.clone())
        };
        let process_element = first_param(&base.signature.process);
        let process_batch_element = first_param(&base.signature.process_batch);
        Self {
            base,
            process_element,
            process_batch_element,
        }
    }
}

impl DoFnInvoker for SimpleInvoker {
    fn base(&self) -> &InvokerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut InvokerBase {
        &mut self.base
    }

    fn policy(&self) -> InvocationPolicy {
        InvocationPolicy::Direct
    }

    fn invoke_process(
        &mut self,
        windowed_value: &WindowedValue,
        _restriction: Option<Value>,
        _estimator_state: Option<Value>,
    ) -> Result<Vec<SplitResultResidual>> {
        let args = CallArgs::of_element(self.process_element.clone(), windowed_value.value.clone());
        let mut ctx = ProcessContext::new(args);
        self.base.dofn.process(&mut ctx)?;
        self.base
            .output_handler
            .handle_process_outputs(windowed_value, ctx.into_outputs())?;
        Ok(Vec::new())
    }

    fn invoke_process_batch(&mut self, batch: &WindowedBatch) -> Result<()> {
        let args = CallArgs::of_element(self.process_batch_element.clone(), batch.values.clone());
        let mut ctx = ProcessContext::new(args);
        self.base.dofn.process_batch(&mut ctx)?;
        self.base
            .output_handler
            .handle_process_batch_outputs(batch, ctx.into_outputs())
    }
}
