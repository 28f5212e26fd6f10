use super::*;

/// A runtime facility a DoFn parameter can ask for.
#[derive(Clone)]
pub enum ParamKind {
    /// The current element (or the batch, for `process_batch`).
    Element,
    /// Key of a key/value element.
    Key,
    Window,
    WindowedValue,
    Timestamp,
    PaneInfo,
    /// A side input, filled from the call-site arguments.
    SideInput,
    State(StateSpec),
    Timer(TimerSpec),
    /// Makes the DoFn splittable; the provider creates and sizes restrictions.
    RestrictionTracker(Arc<dyn RestrictionProvider>),
    WatermarkEstimator(Arc<dyn WatermarkEstimatorProvider>),
    BundleFinalizer,
    DynamicTimerTag,
    /// A resource entered around each bundle.
    BundleContext(ContextParam),
    /// A resource entered around setup/teardown.
    SetupContext(ContextParam),
}

impl ParamKind {
    /// Identity used for duplicate detection; kinds with a spec include its name.
    pub fn param_id(&self) -> String {
        match self {
            ParamKind::Element => "element".into(),
            ParamKind::Key => "key".into(),
            ParamKind::Window => "window".into(),
            ParamKind::WindowedValue => "windowed_value".into(),
            ParamKind::Timestamp => "timestamp".into(),
            ParamKind::PaneInfo => "pane_info".into(),
            ParamKind::SideInput => "side_input".into(),
            ParamKind::State(spec) => format!("state({})", spec.name),
            ParamKind::Timer(spec) => format!("timer({})", spec.name),
            ParamKind::RestrictionTracker(_) => "restriction_tracker".into(),
            ParamKind::WatermarkEstimator(_) => "watermark_estimator".into(),
            ParamKind::BundleFinalizer => "bundle_finalizer".into(),
            ParamKind::DynamicTimerTag => "dynamic_timer_tag".into(),
            ParamKind::BundleContext(param) => format!("bundle_context({})", param.name),
            ParamKind::SetupContext(param) => format!("setup_context({})", param.name),
        }
    }

    /// Kinds that only make sense while processing one element.
    pub fn is_element_scoped(&self) -> bool {
        matches!(
            self,
            ParamKind::Element
                | ParamKind::Key
                | ParamKind::Window
                | ParamKind::WindowedValue
                | ParamKind::Timestamp
                | ParamKind::PaneInfo
                | ParamKind::SideInput
                | ParamKind::State(_)
                | ParamKind::Timer(_)
                | ParamKind::RestrictionTracker(_)
                | ParamKind::WatermarkEstimator(_)
        )
    }

    /// Kinds that need a key: not available for batches.
    pub fn is_per_key(&self) -> bool {
        matches!(self, ParamKind::Key | ParamKind::State(_) | ParamKind::Timer(_))
    }
}

impl std::fmt::Debug for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.param_id())
    }
}

impl std::fmt::Display for ParamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.param_id())
    }
}

impl FromStr for ParamKind {
    type Err = ();

    /// Parse a textual marker. Only kinds without a payload have one.
    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        Ok(match s {
            "element" => ParamKind::Element,
            "key" => ParamKind::Key,
            "window" => ParamKind::Window,
            "windowed_value" => ParamKind::WindowedValue,
            "timestamp" => ParamKind::Timestamp,
            "pane_info" => ParamKind::PaneInfo,
            "side_input" => ParamKind::SideInput,
            "bundle_finalizer" => ParamKind::BundleFinalizer,
            "dynamic_timer_tag" => ParamKind::DynamicTimerTag,
            _ => return Err(()),
        })
    }
}

/// The declared default of a parameter.
#[derive(Clone, Debug)]
pub enum ParamDefault {
    Special(ParamKind),
    /// A textual marker naming a special kind, resolved when the signature
    /// is built.
    Marker(String),
    /// A plain default value.
    Value(Value),
}

/// One declared parameter.
#[derive(Clone, Debug)]
pub struct ParamDecl {
    pub name: String,
    pub default: Option<ParamDefault>,
}

/// The parameter list of one DoFn method, in declaration order.
///
/// Parameters without a default must come first.
#[derive(Clone, Debug, Default)]
pub struct MethodDecl {
    pub params: Vec<ParamDecl>,
}

impl MethodDecl {
    pub fn new() -> Self {
        Self::default()
    }

    /// A required parameter. The first one of `process` receives the element
    /// unless an element marker is declared.
    pub fn arg(mut self, name: impl Into<String>) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            default: None,
        });
        self
    }

    pub fn special(mut self, name: impl Into<String>, kind: ParamKind) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            default: Some(ParamDefault::Special(kind)),
        });
        self
    }

    pub fn marker(mut self, name: impl Into<String>, marker: impl Into<String>) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            default: Some(ParamDefault::Marker(marker.into())),
        });
        self
    }

    pub fn default_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.push(ParamDecl {
            name: name.into(),
            default: Some(ParamDefault::Value(value.into())),
        });
        self
    }
}
