//! Scoped resources requested by DoFn parameters.
//!
//! A setup-scoped resource lives from `setup` to `teardown`; a bundle-scoped
//! one from `start_bundle` to `finish_bundle`. Entered resources are exited in
//! reverse order, and on drop if nobody exited them explicitly.

use std::any::Any;
use std::sync::Arc;

use ahash::AHashMap;

use crate::error::{Result, RunnerError};

/// A resource value handed to DoFn methods.
pub type Resource = Arc<dyn Any + Send + Sync>;

/// Creates and releases one kind of scoped resource.
pub trait ResourceFactory: Send + Sync {
    fn enter(&self) -> anyhow::Result<Resource>;

    fn exit(&self, _resource: Resource) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A named resource parameter.
#[derive(Clone)]
pub struct ContextParam {
    pub name: String,
    pub factory: Arc<dyn ResourceFactory>,
}

impl ContextParam {
    pub fn new(name: impl Into<String>, factory: Arc<dyn ResourceFactory>) -> Self {
        Self {
            name: name.into(),
            factory,
        }
    }
}

impl std::fmt::Debug for ContextParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextParam").field("name", &self.name).finish()
    }
}

impl PartialEq for ContextParam {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

/// Resources entered for one scope.
#[derive(Default)]
pub struct EnteredResources {
    entries: Vec<(ContextParam, Resource)>,
    by_name: AHashMap<String, Resource>,
}

impl EnteredResources {
    /// Enter every param in order. On failure, already-entered resources are
    /// exited before the error is returned.
    pub fn enter_all(params: &[ContextParam]) -> Result<Self> {
        let mut entered = Self::default();
        for param in params {
            match param.factory.enter() {
                Ok(resource) => {
                    entered
                        .by_name
                        .insert(param.name.clone(), Arc::clone(&resource));
                    entered.entries.push((param.clone(), resource));
                }
                Err(e) => {
                    // Release what was entered; the enter failure is the one reported.
                    let _ = entered.exit_all();
                    return Err(RunnerError::collaborator(
                        format!("entering resource '{}'", param.name),
                        e,
                    ));
                }
            }
        }
        Ok(entered)
    }

    pub fn get(&self, name: &str) -> Option<&Resource> {
        self.by_name.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exit every resource in reverse order of entry. All resources are
    /// exited even if one fails; the first failure is returned.
    pub fn exit_all(&mut self) -> Result<()> {
        self.by_name.clear();
        let mut first_err = None;
        while let Some((param, resource)) = self.entries.pop() {
            if let Err(e) = param.factory.exit(resource) {
                let err = RunnerError::collaborator(format!("exiting resource '{}'", param.name), e);
                if first_err.is_none() {
                    first_err = Some(err);
                } else {
                    tracing::warn!(error = %err, "additional resource exit failure");
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for EnteredResources {
    fn drop(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        if let Err(e) = self.exit_all() {
            tracing::warn!(error = %e, "failed to release scoped resource on drop");
        }
    }
}

#[cfg(test)]
#[path = "tests/resources_tests.rs"]
mod tests;
