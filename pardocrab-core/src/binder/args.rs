use super::*;

/// A bound argument value.
#[derive(Clone)]
pub enum Arg {
    /// The element, a batch, a side-input value or a constant.
    Value(Value),
    Key(Value),
    Window(Window),
    WindowedValue(WindowedValue),
    Timestamp(EventTime),
    PaneInfo(PaneInfo),
    State(Arc<dyn UserState>),
    Timer(Arc<dyn UserTimer>),
    BundleFinalizer(BundleFinalizer),
    DynamicTimerTag(String),
    Resource(Resource),
    RestrictionTracker(RestrictionTrackerView),
    WatermarkEstimator(ThreadsafeWatermarkEstimator),
}

impl std::fmt::Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Value(v) => write!(f, "Value({v})"),
            Arg::Key(k) => write!(f, "Key({k})"),
            Arg::Window(w) => write!(f, "Window({w})"),
            Arg::WindowedValue(wv) => write!(f, "{wv:?}"),
            Arg::Timestamp(ts) => write!(f, "Timestamp({ts})"),
            Arg::PaneInfo(p) => write!(f, "{p:?}"),
            Arg::State(_) => f.write_str("State"),
            Arg::Timer(_) => f.write_str("Timer"),
            Arg::BundleFinalizer(_) => f.write_str("BundleFinalizer"),
            Arg::DynamicTimerTag(tag) => write!(f, "DynamicTimerTag({tag:?})"),
            Arg::Resource(_) => f.write_str("Resource"),
            Arg::RestrictionTracker(_) => f.write_str("RestrictionTracker"),
            Arg::WatermarkEstimator(_) => f.write_str("WatermarkEstimator"),
        }
    }
}

/// Arguments of one DoFn call: positional slots (named after the declared
/// parameter when there is one) and keyword arguments.
#[derive(Clone, Debug, Default)]
pub struct CallArgs {
    names: Vec<Option<String>>,
    args: Vec<Arg>,
    kwargs: BTreeMap<String, Arg>,
    element_index: Option<usize>,
}

impl CallArgs {
    pub(crate) fn new(
        names: Vec<Option<String>>,
        args: Vec<Arg>,
        kwargs: BTreeMap<String, Arg>,
        element_index: Option<usize>,
    ) -> Self {
        Self {
            names,
            args,
            kwargs,
            element_index,
        }
    }

    /// Arguments holding just the element, under its parameter name if known.
    pub fn of_element(name: Option<String>, value: Value) -> Self {
        Self {
            names: vec![name],
            args: vec![Arg::Value(value)],
            kwargs: BTreeMap::new(),
            element_index: Some(0),
        }
    }

    pub fn insert_kwarg(&mut self, name: impl Into<String>, arg: Arg) {
        self.kwargs.insert(name.into(), arg);
    }

    /// Look an argument up by parameter name; keywords win over positionals.
    pub fn get(&self, name: &str) -> Option<&Arg> {
        self.kwargs.get(name).or_else(|| {
            self.names
                .iter()
                .position(|n| n.as_deref() == Some(name))
                .and_then(|i| self.args.get(i))
        })
    }

    pub fn positional(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    pub fn kwargs(&self) -> &BTreeMap<String, Arg> {
        &self.kwargs
    }

    fn all(&self) -> impl Iterator<Item = &Arg> {
        self.args.iter().chain(self.kwargs.values())
    }

    /// A value-like argument by name.
    pub fn value(&self, name: &str) -> anyhow::Result<&Value> {
        match self.get(name) {
            Some(Arg::Value(v)) | Some(Arg::Key(v)) => Ok(v),
            Some(other) => Err(anyhow!("argument '{name}' is not a value: {other:?}")),
            None => Err(anyhow!("no argument named '{name}'")),
        }
    }

    /// The element, or the batch for `process_batch`.
    pub fn element(&self) -> anyhow::Result<&Value> {
        match self.element_index.and_then(|i| self.args.get(i)) {
            Some(Arg::Value(v)) => Ok(v),
            _ => Err(anyhow!("this call has no element argument")),
        }
    }

    pub fn key(&self) -> anyhow::Result<&Value> {
        self.find("key", |a| match a {
            Arg::Key(k) => Some(k),
            _ => None,
        })
    }

    pub fn timestamp(&self) -> anyhow::Result<EventTime> {
        self.find("timestamp", |a| match a {
            Arg::Timestamp(ts) => Some(ts),
            _ => None,
        })
        .copied()
    }

    pub fn window(&self) -> anyhow::Result<&Window> {
        self.find("window", |a| match a {
            Arg::Window(w) => Some(w),
            _ => None,
        })
    }

    pub fn windowed_value(&self) -> anyhow::Result<&WindowedValue> {
        self.find("windowed value", |a| match a {
            Arg::WindowedValue(wv) => Some(wv),
            _ => None,
        })
    }

    pub fn pane_info(&self) -> anyhow::Result<&PaneInfo> {
        self.find("pane info", |a| match a {
            Arg::PaneInfo(p) => Some(p),
            _ => None,
        })
    }

    pub fn state(&self, name: &str) -> anyhow::Result<&Arc<dyn UserState>> {
        match self.get(name) {
            Some(Arg::State(state)) => Ok(state),
            _ => Err(anyhow!("no state parameter named '{name}'")),
        }
    }

    pub fn timer(&self, name: &str) -> anyhow::Result<&Arc<dyn UserTimer>> {
        match self.get(name) {
            Some(Arg::Timer(timer)) => Ok(timer),
            _ => Err(anyhow!("no timer parameter named '{name}'")),
        }
    }

    pub fn restriction_tracker(&self) -> anyhow::Result<&RestrictionTrackerView> {
        self.find("restriction tracker", |a| match a {
            Arg::RestrictionTracker(t) => Some(t),
            _ => None,
        })
    }

    pub fn watermark_estimator(&self) -> anyhow::Result<&ThreadsafeWatermarkEstimator> {
        self.find("watermark estimator", |a| match a {
            Arg::WatermarkEstimator(e) => Some(e),
            _ => None,
        })
    }

    pub fn bundle_finalizer(&self) -> anyhow::Result<&BundleFinalizer> {
        self.find("bundle finalizer", |a| match a {
            Arg::BundleFinalizer(f) => Some(f),
            _ => None,
        })
    }

    pub fn dynamic_timer_tag(&self) -> anyhow::Result<&str> {
        self.find("dynamic timer tag", |a| match a {
            Arg::DynamicTimerTag(tag) => Some(tag.as_str()),
            _ => None,
        })
    }

    /// A scoped resource, downcast to its concrete type.
    pub fn resource<T: std::any::Any + Send + Sync>(&self, name: &str) -> anyhow::Result<Arc<T>> {
        match self.get(name) {
            Some(Arg::Resource(resource)) => Arc::clone(resource)
                .downcast::<T>()
                .map_err(|_| anyhow!("resource '{name}' has an unexpected type")),
            _ => Err(anyhow!("no resource parameter named '{name}'")),
        }
    }

    fn find<'a, T: ?Sized>(
        &'a self,
        what: &str,
        select: impl Fn(&'a Arg) -> Option<&'a T>,
    ) -> anyhow::Result<&'a T> {
        self.all()
            .find_map(select)
            .ok_or_else(|| anyhow!("no {what} parameter declared"))
    }
}
