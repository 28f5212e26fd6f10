use super::*;

/// Names of the step a runner executes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameContext {
    pub step_name: String,
    /// Name shown to users, when it differs from the step name.
    pub user_name: Option<String>,
}

impl NameContext {
    pub fn new(step_name: impl Into<String>) -> Self {
        Self {
            step_name: step_name.into(),
            user_name: None,
        }
    }

    pub fn with_user_name(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }
}

/// Receives a copy of every failure the runner surfaces, for diagnostics.
pub trait OutputSampler: Send + Sync {
    fn sample_exception(&self, step: &str, error: &RunnerError, element: Option<&WindowedValue>);
}

/// Per-worker context handed to a runner between bundles.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    pub output_sampler: Option<Arc<dyn OutputSampler>>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_sampler(mut self, sampler: Arc<dyn OutputSampler>) -> Self {
        self.output_sampler = Some(sampler);
        self
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("output_sampler", &self.output_sampler.is_some())
            .finish()
    }
}
