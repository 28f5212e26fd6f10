use super::*;

type FinalizeCallback = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Collects callbacks to run once the bundle's output is durably committed.
///
/// Clones share the same callback list.
#[derive(Clone, Default)]
pub struct BundleFinalizer {
    callbacks: Arc<Mutex<Vec<FinalizeCallback>>>,
}

impl BundleFinalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        callback: impl FnOnce() -> anyhow::Result<()> + Send + 'static,
    ) -> anyhow::Result<()> {
        self.callbacks
            .lock()
            .map_err(|_| anyhow!("bundle finalizer lock poisoned"))?
            .push(Box::new(callback));
        Ok(())
    }

    /// Number of callbacks waiting for [`finalize_bundle`](Self::finalize_bundle).
    pub fn pending(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Run every registered callback once. Failures are logged, not returned.
    pub fn finalize_bundle(&self) -> Result<()> {
        let callbacks = std::mem::take(&mut *self.lock()?);
        for callback in callbacks {
            if let Err(err) = callback() {
                tracing::warn!("bundle finalization callback failed: {:#}", err);
            }
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<FinalizeCallback>>> {
        self.callbacks
            .lock()
            .map_err(|_| RunnerError::LockPoisoned("bundle finalizer"))
    }
}

impl std::fmt::Debug for BundleFinalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pending = self.callbacks.lock().map(|c| c.len()).unwrap_or_default();
        f.debug_struct("BundleFinalizer")
            .field("pending", &pending)
            .finish()
    }
}
