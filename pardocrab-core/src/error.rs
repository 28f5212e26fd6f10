//! Error taxonomy for the DoFn execution engine.
//!
//! Validation and shape errors are raised by the engine itself; failures from
//! user code and from collaborators (restriction providers, state stores,
//! side-input maps) arrive as [`anyhow::Error`] and are wrapped. The bundle
//! controller annotates every error it surfaces with the step name exactly once.

/// Errors produced while building signatures, binding arguments, invoking a
/// DoFn, splitting restrictions or routing outputs.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// A DoFn method has a malformed parameter list.
    #[error("invalid signature for {method}: {reason}")]
    InvalidSignature { method: String, reason: String },

    /// The same special parameter appears twice in one method.
    #[error("{method} declares {param} more than once")]
    DuplicateParam { method: String, param: String },

    /// A special parameter is not allowed on this method.
    #[error("{param} is not supported on {method}: {reason}")]
    UnsupportedParam {
        method: String,
        param: String,
        reason: String,
    },

    /// A parameter default names a marker that is not a known special parameter.
    #[error("unknown parameter marker '{marker}' for {method}({param})")]
    UnknownMarker {
        method: String,
        param: String,
        marker: String,
    },

    /// A side-input slot had no positional or keyword value.
    #[error("value for side input '{0}' not provided")]
    MissingSideInput(String),

    /// The element of a stateful or key-observing DoFn is not a key/value pair.
    #[error("input value to a stateful DoFn or key parameter must be a key/value pair, got {0}")]
    KeyShape(String),

    /// A restriction provider reported a negative size.
    #[error("{what} restriction size must be non-negative, got {size}")]
    NegativeSize { what: &'static str, size: f64 },

    /// A DoFn produced a result whose shape is not allowed where it was produced.
    #[error("output shape error: {0}")]
    OutputShape(String),

    /// An output tag is not a plain, non-empty name.
    #[error("invalid output tag {0:?}")]
    InvalidTag(String),

    /// No receiver is registered for an output tag.
    #[error("unknown output tag '{0}'")]
    UnknownTag(String),

    /// A stateful DoFn was built without a user-state context.
    #[error("a stateful DoFn requires a user state context")]
    MissingStateContext,

    /// A lifecycle method was called out of order.
    #[error("cannot {action} while {state}")]
    Lifecycle { action: &'static str, state: String },

    /// A value is not of the form `((element, (restriction, state)), size)`.
    #[error("malformed sized restriction: {0}")]
    InvalidSizedRestriction(String),

    /// A collaborator failed.
    #[error("{context}: {cause:#}")]
    Collaborator { context: String, cause: anyhow::Error },

    /// User code failed.
    #[error("{0:#}")]
    User(anyhow::Error),

    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),

    /// An error annotated with the step that raised it.
    #[error("{source} [while running '{step}']")]
    Annotated {
        step: String,
        source: Box<RunnerError>,
    },
}

impl RunnerError {
    pub fn collaborator(context: impl Into<String>, cause: anyhow::Error) -> Self {
        RunnerError::Collaborator {
            context: context.into(),
            cause,
        }
    }

    /// Wrap a receiver failure. Errors raised by a downstream runner keep
    /// their own annotation.
    pub fn downstream(context: impl Into<String>, cause: anyhow::Error) -> Self {
        match cause.downcast::<RunnerError>() {
            Ok(inner) => inner,
            Err(cause) => RunnerError::collaborator(context, cause),
        }
    }

    pub fn is_annotated(&self) -> bool {
        matches!(self, RunnerError::Annotated { .. })
    }

    /// The step an annotated error was raised in.
    pub fn step_name(&self) -> Option<&str> {
        match self {
            RunnerError::Annotated { step, .. } => Some(step),
            _ => None,
        }
    }

    /// The error underneath any annotation.
    pub fn root(&self) -> &RunnerError {
        match self {
            RunnerError::Annotated { source, .. } => source.root(),
            other => other,
        }
    }

    /// Attach `step` unless the error already carries a step.
    pub fn annotate(self, step: &str) -> Self {
        if self.is_annotated() {
            return self;
        }
        RunnerError::Annotated {
            step: step.to_string(),
            source: Box::new(self),
        }
    }

    /// True for errors about the shape of produced outputs.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self.root(),
            RunnerError::OutputShape(_) | RunnerError::InvalidTag(_) | RunnerError::UnknownTag(_)
        )
    }

    /// True for errors raised while validating signatures or bound arguments.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self.root(),
            RunnerError::InvalidSignature { .. }
                | RunnerError::DuplicateParam { .. }
                | RunnerError::UnsupportedParam { .. }
                | RunnerError::UnknownMarker { .. }
                | RunnerError::MissingSideInput(_)
                | RunnerError::KeyShape(_)
                | RunnerError::NegativeSize { .. }
                | RunnerError::MissingStateContext
                | RunnerError::InvalidSizedRestriction(_)
        )
    }
}

/// User errors that already are runner errors (raised by a nested runner
/// and passed back through user code) are unwrapped, not wrapped again.
impl From<anyhow::Error> for RunnerError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<RunnerError>() {
            Ok(inner) => inner,
            Err(err) => RunnerError::User(err),
        }
    }
}

pub type Result<T, E = RunnerError> = std::result::Result<T, E>;

#[cfg(test)]
#[path = "tests/error_tests.rs"]
mod tests;
