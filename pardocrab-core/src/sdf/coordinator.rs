use super::*;

/// Work retained by the current invocation after a split.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResultPrimary {
    pub primary_value: WindowedValue,
}

/// Work handed back to the runner for later processing.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitResultResidual {
    pub residual_value: WindowedValue,
    /// Watermark observed before the residual was produced. `None` for
    /// whole-window residuals, which have processed nothing yet.
    pub current_watermark: Option<Watermark>,
    /// How long to wait before resuming a checkpointed residual.
    pub resume_delay: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitResult {
    pub primaries: Vec<SplitResultPrimary>,
    pub residuals: Vec<SplitResultResidual>,
}

/// Tracker and estimator installed for the window being processed.
#[derive(Clone)]
pub struct ActiveRestriction {
    pub tracker: ThreadsafeRestrictionTracker,
    pub estimator: ThreadsafeWatermarkEstimator,
}

#[derive(Default)]
struct SplitState {
    windowed_value: Option<WindowedValue>,
    restriction: Option<Value>,
    estimator_state: Option<Value>,
    tracker: Option<ThreadsafeRestrictionTracker>,
    estimator: Option<ThreadsafeWatermarkEstimator>,
    /// Set only when windows are processed one at a time.
    current_window_index: Option<usize>,
    stop_window_index: Option<usize>,
}

/// What the element looked like when a split was decided.
struct ElementSnapshot {
    windowed_value: WindowedValue,
    restriction: Value,
    estimator_state: Value,
}

enum SplitPlan {
    /// Split between windows only.
    WholeWindow {
        element: ElementSnapshot,
        boundary: usize,
        stop: usize,
    },
    /// The tracker split the current window's restriction.
    WithinWindow {
        element: ElementSnapshot,
        primary: Value,
        residual: Value,
        watermark: Option<Watermark>,
        residual_estimator_state: Value,
        window_index: Option<usize>,
        stop: Option<usize>,
        new_stop: Option<usize>,
    },
}

impl SplitPlan {
    /// Stop index before the split and the one the split committed.
    fn stop_indices(&self) -> (Option<usize>, Option<usize>) {
        match self {
            SplitPlan::WholeWindow { boundary, stop, .. } => (Some(*stop), Some(*boundary)),
            SplitPlan::WithinWindow { stop, new_stop, .. } => (*stop, *new_stop),
        }
    }
}

/// Serializes access to the restriction state of the element in flight.
///
/// The processing thread calls [`begin_element`](Self::begin_element), then
/// [`start_window`](Self::start_window) / [`finish_window`](Self::finish_window)
/// around each DoFn call. Any other thread may call
/// [`try_split`](Self::try_split) and [`current_progress`](Self::current_progress)
/// at any time. The state lock is never held across a DoFn call or a
/// `restriction_size` call. Lock order is coordinator, then tracker or
/// estimator.
pub struct SplitCoordinator {
    restriction_provider: Arc<dyn RestrictionProvider>,
    estimator_provider: Arc<dyn WatermarkEstimatorProvider>,
    state: Mutex<SplitState>,
}

/// Clears the coordinator's state when the element is done, on every path.
pub struct ElementGuard {
    coordinator: Arc<SplitCoordinator>,
}

impl Drop for ElementGuard {
    fn drop(&mut self) {
        match self.coordinator.state.lock() {
            Ok(mut state) => *state = SplitState::default(),
            Err(_) => tracing::warn!("split state lock poisoned while clearing element"),
        }
    }
}

impl SplitCoordinator {
    pub fn new(
        restriction_provider: Arc<dyn RestrictionProvider>,
        estimator_provider: Arc<dyn WatermarkEstimatorProvider>,
    ) -> Self {
        Self {
            restriction_provider,
            estimator_provider,
            state: Mutex::new(SplitState::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SplitState>, RunnerError> {
        self.state
            .lock()
            .map_err(|_| RunnerError::LockPoisoned("split state"))
    }

    /// Record the element, restriction and estimator state being processed.
    pub fn begin_element(
        self: &Arc<Self>,
        windowed_value: &WindowedValue,
        restriction: &Value,
        estimator_state: &Value,
    ) -> Result<ElementGuard, RunnerError> {
        let mut state = self.lock()?;
        *state = SplitState {
            windowed_value: Some(windowed_value.clone()),
            restriction: Some(restriction.clone()),
            estimator_state: Some(estimator_state.clone()),
            ..SplitState::default()
        };
        Ok(ElementGuard {
            coordinator: Arc::clone(self),
        })
    }

    /// Install a fresh tracker and estimator for the next window.
    ///
    /// `window_index` is `Some` when the element's windows are processed one
    /// at a time. Returns `None` when a split has already moved the stop index
    /// to this window, in which case processing of the element ends.
    pub fn start_window(
        &self,
        window_index: Option<usize>,
        window_count: usize,
        restriction: &Value,
        estimator_state: &Value,
    ) -> Result<Option<ActiveRestriction>, RunnerError> {
        let tracker = self
            .restriction_provider
            .create_tracker(restriction)
            .map_err(|e| RunnerError::collaborator("create restriction tracker", e))?;
        let estimator = self
            .estimator_provider
            .create_watermark_estimator(estimator_state)
            .map_err(|e| RunnerError::collaborator("create watermark estimator", e))?;

        let mut state = self.lock()?;
        if let Some(index) = window_index {
            state.current_window_index = Some(index);
            if index == 0 {
                state.stop_window_index = Some(window_count);
            }
            if index >= state.stop_window_index.unwrap_or(window_count) {
                return Ok(None);
            }
        }
        let active = ActiveRestriction {
            tracker: ThreadsafeRestrictionTracker::new(tracker),
            estimator: ThreadsafeWatermarkEstimator::new(estimator),
        };
        state.tracker = Some(active.tracker.clone());
        state.estimator = Some(active.estimator.clone());
        Ok(Some(active))
    }

    /// Check the finished window's tracker and package any checkpointed work.
    pub fn finish_window(
        &self,
        windowed_value: &WindowedValue,
        active: &ActiveRestriction,
    ) -> Result<Option<SplitResultResidual>, RunnerError> {
        active.tracker.check_done().map_err(RunnerError::User)?;
        let Some((residual, resume_delay)) = active
            .tracker
            .deferred_status()
            .map_err(|e| RunnerError::collaborator("deferred status", e))?
        else {
            return Ok(None);
        };

        let size = self.checked_size("deferred", &windowed_value.value, &residual)?;
        let (current_watermark, estimator_state) = active
            .estimator
            .snapshot()
            .map_err(|e| RunnerError::collaborator("watermark estimator", e))?;
        let value =
            SizedRestriction::new(windowed_value.value.clone(), residual, estimator_state, size);
        Ok(Some(SplitResultResidual {
            residual_value: windowed_value.with_value(value.to_value()),
            current_watermark,
            resume_delay,
        }))
    }

    /// Split the element in flight, keeping roughly `fraction` of the
    /// remaining work as residual.
    ///
    /// Returns `None` when nothing is in flight or nothing can be split.
    pub fn try_split(&self, fraction: f64) -> Result<Option<SplitResult>, RunnerError> {
        let Some(plan) = self.plan_split(fraction)? else {
            return Ok(None);
        };
        let (previous, committed) = plan.stop_indices();
        match self.package(plan) {
            Ok(result) => Ok(Some(result)),
            Err(e) => {
                // No split was handed out, so the element keeps its windows.
                let mut state = self.lock()?;
                if state.stop_window_index == committed {
                    state.stop_window_index = previous;
                }
                Err(e)
            }
        }
    }

    /// Progress of the element in flight, scaled across its remaining windows.
    pub fn current_progress(&self) -> Result<Option<RestrictionProgress>, RunnerError> {
        let state = self.lock()?;
        let Some(tracker) = state.tracker.as_ref() else {
            return Ok(None);
        };
        let progress = tracker
            .current_progress()
            .map_err(|e| RunnerError::collaborator("restriction tracker progress", e))?;
        Ok(match (progress, state.current_window_index, state.stop_window_index) {
            (Some(p), Some(index), Some(stop)) => Some(scale_progress(p, index, stop)),
            (p, _, _) => p,
        })
    }

    fn snapshot(state: &SplitState) -> Option<ElementSnapshot> {
        Some(ElementSnapshot {
            windowed_value: state.windowed_value.clone()?,
            restriction: state.restriction.clone()?,
            estimator_state: state.estimator_state.clone().unwrap_or_default(),
        })
    }

    /// Decide the split and apply it to the tracker and stop index, all under
    /// the state lock.
    fn plan_split(&self, fraction: f64) -> Result<Option<SplitPlan>, RunnerError> {
        let mut state = self.lock()?;
        let (Some(tracker), Some(estimator)) = (state.tracker.clone(), state.estimator.clone())
        else {
            return Ok(None);
        };
        let Some(element) = Self::snapshot(&state) else {
            return Ok(None);
        };
        let window_index = state.current_window_index;
        let stop = state.stop_window_index;

        let mut fraction = fraction;
        let new_stop = match (window_index, stop) {
            (Some(index), Some(stop)) if index + 1 < stop => {
                let progress = tracker
                    .current_progress()
                    .map_err(|e| RunnerError::collaborator("restriction tracker progress", e))?
                    .unwrap_or(RestrictionProgress::new(0.0, 1.0));
                // A window with no measurable work counts as one finished unit.
                let progress = if progress.total() <= 0.0 {
                    RestrictionProgress::new(1.0, 0.0)
                } else {
                    progress
                };
                let scaled = scale_progress(progress, index, stop);
                let scaled_fraction_of_remainder = scaled.remaining * fraction;

                if scaled_fraction_of_remainder >= progress.remaining {
                    let windows = ((progress.completed + scaled_fraction_of_remainder)
                        / progress.total())
                    .round_ties_even()
                    .max(1.0) as usize;
                    let boundary = (index + windows).min(stop - 1);
                    tracing::debug!(index, stop, boundary, "whole-window split");
                    state.stop_window_index = Some(boundary);
                    return Ok(Some(SplitPlan::WholeWindow {
                        element,
                        boundary,
                        stop,
                    }));
                }
                fraction = scaled_fraction_of_remainder / progress.remaining;
                Some(index + 1)
            }
            _ => stop,
        };

        // Read the estimator before splitting; the processing thread may
        // advance it concurrently.
        let (watermark, residual_estimator_state) = estimator
            .snapshot()
            .map_err(|e| RunnerError::collaborator("watermark estimator", e))?;
        let split = tracker
            .try_split(fraction)
            .map_err(|e| RunnerError::collaborator("restriction tracker split", e))?;

        match split {
            Some((primary, residual)) => {
                state.stop_window_index = new_stop;
                Ok(Some(SplitPlan::WithinWindow {
                    element,
                    primary,
                    residual,
                    watermark,
                    residual_estimator_state,
                    window_index,
                    stop,
                    new_stop,
                }))
            }
            None => match (new_stop, stop) {
                (Some(boundary), Some(stop)) if boundary != stop => {
                    tracing::debug!(boundary, stop, "tracker declined split, splitting at window boundary");
                    state.stop_window_index = Some(boundary);
                    Ok(Some(SplitPlan::WholeWindow {
                        element,
                        boundary,
                        stop,
                    }))
                }
                _ => Ok(None),
            },
        }
    }

    /// Size and wrap a planned split. Runs without the state lock.
    fn package(&self, plan: SplitPlan) -> Result<SplitResult, RunnerError> {
        let mut result = SplitResult::default();
        match plan {
            SplitPlan::WholeWindow {
                element,
                boundary,
                stop,
            } => {
                let (primary, residual) = self.whole_window_split(&element, boundary, boundary, stop)?;
                result.primaries.extend(primary);
                result.residuals.extend(residual);
            }
            SplitPlan::WithinWindow {
                element,
                primary,
                residual,
                watermark,
                residual_estimator_state,
                window_index,
                stop,
                ..
            } => {
                let wv = &element.windowed_value;
                let primary_size = self.checked_size("primary", &wv.value, &primary)?;
                let residual_size = self.checked_size("residual", &wv.value, &residual)?;

                let windows = match window_index {
                    Some(index) => vec![wv.windows[index]],
                    None => wv.windows.clone(),
                };
                let primary_value = SizedRestriction::new(
                    wv.value.clone(),
                    primary,
                    element.estimator_state.clone(),
                    primary_size,
                );
                let residual_value = SizedRestriction::new(
                    wv.value.clone(),
                    residual,
                    residual_estimator_state,
                    residual_size,
                );
                result.primaries.push(SplitResultPrimary {
                    primary_value: wv
                        .with_windows(windows.clone())
                        .with_value(primary_value.to_value()),
                });
                result.residuals.push(SplitResultResidual {
                    residual_value: wv.with_windows(windows).with_value(residual_value.to_value()),
                    current_watermark: watermark,
                    resume_delay: None,
                });

                if let (Some(index), Some(stop)) = (window_index, stop) {
                    let (primary, residual) = self.whole_window_split(&element, index, index + 1, stop)?;
                    result.primaries.extend(primary);
                    result.residuals.extend(residual);
                }
            }
        }
        Ok(result)
    }

    /// Primary over `windows[..to]` and residual over `windows[from..stop]`,
    /// both carrying the element's original restriction.
    fn whole_window_split(
        &self,
        element: &ElementSnapshot,
        to: usize,
        from: usize,
        stop: usize,
    ) -> Result<(Option<SplitResultPrimary>, Option<SplitResultResidual>), RunnerError> {
        let wv = &element.windowed_value;
        let size = self.checked_size("whole-window", &wv.value, &element.restriction)?;
        let value = SizedRestriction::new(
            wv.value.clone(),
            element.restriction.clone(),
            element.estimator_state.clone(),
            size,
        )
        .to_value();

        let primary = (to > 0).then(|| SplitResultPrimary {
            primary_value: wv.with_windows(wv.windows[..to].to_vec()).with_value(value.clone()),
        });
        let residual = (from < stop).then(|| SplitResultResidual {
            residual_value: wv.with_windows(wv.windows[from..stop].to_vec()).with_value(value),
            current_watermark: None,
            resume_delay: None,
        });
        Ok((primary, residual))
    }

    fn checked_size(
        &self,
        what: &'static str,
        element: &Value,
        restriction: &Value,
    ) -> Result<f64, RunnerError> {
        let size = self
            .restriction_provider
            .restriction_size(element, restriction)
            .map_err(|e| RunnerError::collaborator("restriction size", e))?;
        if size < 0.0 || size.is_nan() {
            return Err(RunnerError::NegativeSize { what, size });
        }
        Ok(size)
    }
}

/// Scale one window's progress to cover every window from `index` to `stop`.
pub fn scale_progress(progress: RestrictionProgress, index: usize, stop: usize) -> RestrictionProgress {
    let total = progress.total();
    let completed = index as f64 * total + progress.completed;
    let remaining = stop.saturating_sub(index + 1) as f64 * total + progress.remaining;
    RestrictionProgress::new(completed, remaining)
}
