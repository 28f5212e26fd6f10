use super::*;

/// A call-site constant argument.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstArg {
    Value(Value),
    /// Stands for the next side input, resolved per window.
    SideInput,
}

impl From<Value> for ConstArg {
    fn from(v: Value) -> Self {
        ConstArg::Value(v)
    }
}

#[derive(Clone, Debug)]
enum Slot {
    Filled(Arg),
    SideInput,
    Placeholder,
}

impl Slot {
    fn from_const(arg: &ConstArg) -> Self {
        match arg {
            ConstArg::Value(v) => Slot::Filled(Arg::Value(v.clone())),
            ConstArg::SideInput => Slot::SideInput,
        }
    }
}

/// Precomputed arguments of one DoFn method.
///
/// Filled slots are cloned into every call; placeholders are written by
/// index from [`placeholders`](Self::placeholders) at call time.
#[derive(Clone, Debug, Default)]
pub struct ArgTemplate {
    method: String,
    names: Vec<Option<String>>,
    slots: Vec<Slot>,
    kwargs: BTreeMap<String, Slot>,
    placeholders: Vec<(usize, ParamKind)>,
    element_index: Option<usize>,
}

impl ArgTemplate {
    /// Build the template for `signature` with the given call-site constants.
    pub fn bind(
        signature: &MethodSignature,
        args: &[ConstArg],
        kwargs: &BTreeMap<String, ConstArg>,
    ) -> Result<Self> {
        let mut template = ArgTemplate {
            method: signature.name.clone(),
            ..Default::default()
        };
        let mut remaining = args.iter();

        let required = signature.required_count();
        let has_element_marker = signature.has_kind(|k| matches!(k, ParamKind::Element));
        let mut required_params = signature.params[..required].iter();
        if !has_element_marker {
            if let Some(first) = required_params.next() {
                template.push_placeholder(&first.name, ParamKind::Element);
            }
        }
        for param in required_params {
            match remaining.next() {
                Some(arg) => template.push(Some(&param.name), Slot::from_const(arg)),
                None if kwargs.contains_key(&param.name) => {}
                None => {
                    return Err(RunnerError::InvalidSignature {
                        method: signature.name.clone(),
                        reason: format!("no value supplied for parameter '{}'", param.name),
                    })
                }
            }
        }

        for param in &signature.params[required..] {
            match &param.role {
                ParamRole::Special(ParamKind::SideInput) => match remaining.next() {
                    Some(arg) => template.push(Some(&param.name), Slot::from_const(arg)),
                    None if kwargs.contains_key(&param.name) => {}
                    None => return Err(RunnerError::MissingSideInput(param.name.clone())),
                },
                // Supplied by keyword when the call is made.
                ParamRole::Special(ParamKind::RestrictionTracker(_))
                | ParamRole::Special(ParamKind::WatermarkEstimator(_)) => {}
                ParamRole::Special(kind) => template.push_placeholder(&param.name, kind.clone()),
                ParamRole::Constant(default) => match remaining.next() {
                    Some(arg) => template.push(Some(&param.name), Slot::from_const(arg)),
                    None if kwargs.contains_key(&param.name) => {}
                    None => template.push(Some(&param.name), Slot::Filled(Arg::Value(default.clone()))),
                },
                ParamRole::Required => {
                    return Err(RunnerError::InvalidSignature {
                        method: signature.name.clone(),
                        reason: format!("required parameter '{}' follows a default", param.name),
                    })
                }
            }
        }

        for arg in remaining {
            template.push(None, Slot::from_const(arg));
        }
        for (name, arg) in kwargs {
            template.kwargs.insert(name.clone(), Slot::from_const(arg));
        }
        Ok(template)
    }

    fn push(&mut self, name: Option<&str>, slot: Slot) {
        self.names.push(name.map(str::to_string));
        self.slots.push(slot);
    }

    fn push_placeholder(&mut self, name: &str, kind: ParamKind) {
        let index = self.slots.len();
        if matches!(kind, ParamKind::Element) {
            self.element_index = Some(index);
        }
        self.push(Some(name), Slot::Placeholder);
        self.placeholders.push((index, kind));
    }

    /// `(slot index, kind)` of every per-call placeholder.
    pub fn placeholders(&self) -> &[(usize, ParamKind)] {
        &self.placeholders
    }

    pub fn element_index(&self) -> Option<usize> {
        self.element_index
    }

    pub fn has_side_inputs(&self) -> bool {
        self.slots
            .iter()
            .chain(self.kwargs.values())
            .any(|s| matches!(s, Slot::SideInput))
    }

    /// Replace side-input placeholders with `values`: positional slots first,
    /// then keyword slots in name order.
    pub fn fill_side_inputs(&self, values: Vec<Value>) -> Result<ArgTemplate> {
        let mut filled = self.clone();
        let mut values = values.into_iter();
        for (slot, name) in filled.slots.iter_mut().zip(&self.names) {
            if matches!(slot, Slot::SideInput) {
                let value = values.next().ok_or_else(|| {
                    RunnerError::MissingSideInput(name.clone().unwrap_or_else(|| self.method.clone()))
                })?;
                *slot = Slot::Filled(Arg::Value(value));
            }
        }
        for (name, slot) in filled.kwargs.iter_mut() {
            if matches!(slot, Slot::SideInput) {
                let value = values
                    .next()
                    .ok_or_else(|| RunnerError::MissingSideInput(name.clone()))?;
                *slot = Slot::Filled(Arg::Value(value));
            }
        }
        Ok(filled)
    }

    /// Produce the arguments of one call, asking `fill` for each placeholder.
    pub fn instantiate(
        &self,
        mut fill: impl FnMut(&ParamKind) -> Result<Arg>,
    ) -> Result<CallArgs> {
        let mut args: Vec<Option<Arg>> = self
            .slots
            .iter()
            .map(|slot| match slot {
                Slot::Filled(arg) => Some(arg.clone()),
                Slot::SideInput | Slot::Placeholder => None,
            })
            .collect();
        for (index, kind) in &self.placeholders {
            args[*index] = Some(fill(kind)?);
        }
        let args = args
            .into_iter()
            .zip(&self.names)
            .map(|(arg, name)| {
                arg.ok_or_else(|| {
                    RunnerError::MissingSideInput(name.clone().unwrap_or_else(|| self.method.clone()))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut kwargs = BTreeMap::new();
        for (name, slot) in &self.kwargs {
            match slot {
                Slot::Filled(arg) => {
                    kwargs.insert(name.clone(), arg.clone());
                }
                _ => return Err(RunnerError::MissingSideInput(name.clone())),
            }
        }
        Ok(CallArgs::new(self.names.clone(), args, kwargs, self.element_index))
    }
}
