use serde::{Deserialize, Serialize};

/// Re-evaluate side-input and window arguments on every call, even when the
/// DoFn is not window sensitive.
pub const DISABLE_GLOBAL_WINDOWED_ARGS_CACHING: &str = "disable_global_windowed_args_caching";

/// Record a distribution of the number of outputs produced per input element.
pub const OUTPUTS_PER_ELEMENT_COUNTER: &str = "outputs_per_element_counter";

/// Pipeline options consulted by the runner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerOptions {
    pub experiments: Vec<String>,
}

impl RunnerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_experiment(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.has_experiment(&name) {
            self.experiments.push(name);
        }
        self
    }

    pub fn has_experiment(&self, name: &str) -> bool {
        self.experiments.iter().any(|e| e == name)
    }

    pub fn disable_global_windowed_args_caching(&self) -> bool {
        self.has_experiment(DISABLE_GLOBAL_WINDOWED_ARGS_CACHING)
    }

    pub fn outputs_per_element_counter(&self) -> bool {
        self.has_experiment(OUTPUTS_PER_ELEMENT_COUNTER)
    }

    pub fn to_bytes(&self) -> anyhow::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> anyhow::Result<Self> {
        Ok(bincode::deserialize(data)?)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
