use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use pardocrab_core::output::Receiver;
use pardocrab_core::runner::DoFnRunner;
use pardocrab_core::sdf::SplitResultResidual;
use pardocrab_core::state::{InMemoryStateContext, TimeDomain};
use pardocrab_core::types::{EventTime, PaneInfo, Value, WindowedBatch, WindowedValue};

/// Receiver that keeps everything it is given.
///
/// Clones share the same buffers, so keep one clone to inspect what a runner
/// produced.
#[derive(Clone, Default)]
pub struct CollectingReceiver {
    values: Arc<Mutex<Vec<WindowedValue>>>,
    batches: Arc<Mutex<Vec<WindowedBatch>>>,
}

impl CollectingReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> Vec<WindowedValue> {
        self.values.lock().map(|v| v.clone()).unwrap_or_default()
    }

    /// Just the payloads of [`values`](Self::values).
    pub fn payloads(&self) -> Vec<Value> {
        self.values().into_iter().map(|wv| wv.value).collect()
    }

    pub fn batches(&self) -> Vec<WindowedBatch> {
        self.batches.lock().map(|b| b.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut values) = self.values.lock() {
            values.clear();
        }
        if let Ok(mut batches) = self.batches.lock() {
            batches.clear();
        }
    }
}

impl Receiver for CollectingReceiver {
    fn receive(&mut self, value: WindowedValue) -> anyhow::Result<()> {
        self.values
            .lock()
            .map_err(|_| anyhow::anyhow!("collected values lock poisoned"))?
            .push(value);
        Ok(())
    }

    fn receive_batch(&mut self, batch: WindowedBatch) -> anyhow::Result<()> {
        self.batches
            .lock()
            .map_err(|_| anyhow::anyhow!("collected batches lock poisoned"))?
            .push(batch);
        Ok(())
    }
}

/// Drives a [`DoFnRunner`] through whole bundles the way a worker would.
///
/// Owns the runner; sets it up on construction and tears it down on
/// [`close`](Self::close). When a state context is attached, event-time
/// timers are fired as the watermark advances.
pub struct BundleHarness {
    runner: DoFnRunner,
    state: Option<InMemoryStateContext>,
    residuals: VecDeque<SplitResultResidual>,
}

impl BundleHarness {
    pub fn new(mut runner: DoFnRunner) -> anyhow::Result<Self> {
        runner.setup()?;
        Ok(Self {
            runner,
            state: None,
            residuals: VecDeque::new(),
        })
    }

    /// Fire timers from `state` in [`advance_watermark`](Self::advance_watermark).
    pub fn with_state(mut self, state: InMemoryStateContext) -> Self {
        self.state = Some(state);
        self
    }

    pub fn runner(&self) -> &DoFnRunner {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut DoFnRunner {
        &mut self.runner
    }

    /// Residuals returned so far and not yet resumed.
    pub fn pending_residuals(&self) -> usize {
        self.residuals.len()
    }

    /// Run one bundle over `elements` and finalize it.
    ///
    /// Checkpointed restrictions are kept for [`resume_residuals`](Self::resume_residuals).
    pub fn run_bundle<I>(&mut self, elements: I) -> anyhow::Result<()>
    where
        I: IntoIterator<Item = WindowedValue>,
    {
        self.runner.start_bundle()?;
        let mut processed = 0usize;
        for element in elements {
            let residuals = self.runner.process(&element)?;
            self.residuals.extend(residuals);
            processed += 1;
        }
        self.runner.finish_bundle()?;
        self.runner.finalize_bundle()?;
        tracing::debug!(
            "bundle done: {} elements, {} residuals pending",
            processed,
            self.residuals.len()
        );
        Ok(())
    }

    /// Process pending residuals, one bundle per round, until none are left
    /// or `max_rounds` is reached. Returns the number of rounds run.
    pub fn resume_residuals(&mut self, max_rounds: usize) -> anyhow::Result<usize> {
        let mut rounds = 0;
        while !self.residuals.is_empty() && rounds < max_rounds {
            let batch: Vec<_> = self.residuals.drain(..).collect();
            self.runner.start_bundle()?;
            for residual in batch {
                let more = self
                    .runner
                    .process_with_sized_restriction(&residual.residual_value)?;
                self.residuals.extend(more);
            }
            self.runner.finish_bundle()?;
            self.runner.finalize_bundle()?;
            rounds += 1;
        }
        Ok(rounds)
    }

    /// Fire every event-time timer due at `watermark` in a bundle of its own.
    /// Timers set by callbacks that are already due fire in the same call.
    ///
    /// Returns how many timers fired.
    pub fn advance_watermark(&mut self, watermark: EventTime) -> anyhow::Result<usize> {
        let Some(state) = self.state.clone() else {
            anyhow::bail!("no state context attached to the harness");
        };
        self.runner.start_bundle()?;
        let mut fired = 0;
        loop {
            let due = state.fire_due(TimeDomain::EventTime, watermark)?;
            if due.is_empty() {
                break;
            }
            for timer in due {
                self.runner.process_user_timer(
                    &timer.timer,
                    &timer.key,
                    timer.window,
                    timer.fire_at,
                    PaneInfo::NO_FIRING,
                    &timer.dynamic_tag,
                )?;
                fired += 1;
            }
        }
        self.runner.finish_bundle()?;
        self.runner.finalize_bundle()?;
        Ok(fired)
    }

    pub fn close(mut self) -> anyhow::Result<()> {
        self.runner.teardown()?;
        Ok(())
    }
}
