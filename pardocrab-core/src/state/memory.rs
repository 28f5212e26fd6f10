use super::*;

#[derive(Debug, Default)]
struct Store {
    /// serialized (state name, key, window) -> serialized values
    cells: AHashMap<Vec<u8>, Vec<Vec<u8>>>,
    event_timers: TimerService,
    processing_timers: TimerService,
}

impl Store {
    fn timers_mut(&mut self, domain: TimeDomain) -> &mut TimerService {
        match domain {
            TimeDomain::EventTime => &mut self.event_timers,
            TimeDomain::ProcessingTime => &mut self.processing_timers,
        }
    }
}

fn lock(store: &Mutex<Store>) -> Result<std::sync::MutexGuard<'_, Store>> {
    store.lock().map_err(|_| anyhow!("State store lock poisoned"))
}

/// In-memory user state and timers for local execution and tests.
///
/// Cheap to clone; clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStateContext {
    store: Arc<Mutex<Store>>,
}

impl InMemoryStateContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every timer in `domain` due at or before `now`.
    pub fn fire_due(&self, domain: TimeDomain, now: EventTime) -> Result<Vec<FiredTimer>> {
        let due = lock(&self.store)?.timers_mut(domain).drain_due(now);
        let mut fired = Vec::with_capacity(due.len());
        for (bytes, fire_at) in due {
            let id: TimerId = bincode::deserialize(&bytes)?;
            fired.push(FiredTimer {
                timer: id.timer,
                key: id.key,
                window: id.window,
                dynamic_tag: id.dynamic_tag,
                fire_at,
            });
        }
        Ok(fired)
    }

    /// Earliest pending fire time in `domain`.
    pub fn next_timer(&self, domain: TimeDomain) -> Result<Option<EventTime>> {
        Ok(lock(&self.store)?.timers_mut(domain).next_timer())
    }

    pub fn pending_timers(&self) -> Result<usize> {
        let store = lock(&self.store)?;
        Ok(store.event_timers.len() + store.processing_timers.len())
    }
}

impl UserStateContext for InMemoryStateContext {
    fn get_state(&self, spec: &StateSpec, key: &Value, window: &Window) -> Result<Arc<dyn UserState>> {
        let cell = bincode::serialize(&(&spec.name, key, window))?;
        Ok(Arc::new(InMemoryState {
            store: Arc::clone(&self.store),
            spec: spec.clone(),
            cell,
        }))
    }

    fn get_timer(
        &self,
        spec: &TimerSpec,
        key: &Value,
        window: &Window,
        _timestamp: EventTime,
        _pane_info: &PaneInfo,
    ) -> Result<Arc<dyn UserTimer>> {
        Ok(Arc::new(InMemoryTimer {
            store: Arc::clone(&self.store),
            spec: spec.clone(),
            key: key.clone(),
            window: *window,
        }))
    }
}

/// State cell handle returned by [`InMemoryStateContext`].
pub struct InMemoryState {
    store: Arc<Mutex<Store>>,
    spec: StateSpec,
    cell: Vec<u8>,
}

impl InMemoryState {
    fn expect_kind(&self, kind: StateKind, op: &str) -> Result<()> {
        if self.spec.kind != kind {
            bail!("{op} is not supported on {:?} state '{}'", self.spec.kind, self.spec.name);
        }
        Ok(())
    }
}

impl UserState for InMemoryState {
    fn read(&self) -> Result<Option<Value>> {
        self.expect_kind(StateKind::Value, "read")?;
        let store = lock(&self.store)?;
        match store.cells.get(&self.cell).and_then(|values| values.last()) {
            Some(bytes) => Ok(Some(bincode::deserialize(bytes)?)),
            None => Ok(None),
        }
    }

    fn write(&self, value: Value) -> Result<()> {
        self.expect_kind(StateKind::Value, "write")?;
        let bytes = bincode::serialize(&value)?;
        lock(&self.store)?.cells.insert(self.cell.clone(), vec![bytes]);
        Ok(())
    }

    fn add(&self, value: Value) -> Result<()> {
        self.expect_kind(StateKind::Bag, "add")?;
        let bytes = bincode::serialize(&value)?;
        lock(&self.store)?
            .cells
            .entry(self.cell.clone())
            .or_default()
            .push(bytes);
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<Value>> {
        let store = lock(&self.store)?;
        match store.cells.get(&self.cell) {
            Some(values) => {
                let mut out = Vec::with_capacity(values.len());
                for bytes in values {
                    out.push(bincode::deserialize(bytes)?);
                }
                Ok(out)
            }
            None => Ok(Vec::new()),
        }
    }

    fn clear(&self) -> Result<()> {
        lock(&self.store)?.cells.remove(&self.cell);
        Ok(())
    }
}

/// Timer handle returned by [`InMemoryStateContext`].
pub struct InMemoryTimer {
    store: Arc<Mutex<Store>>,
    spec: TimerSpec,
    key: Value,
    window: Window,
}

impl InMemoryTimer {
    fn id_bytes(&self, dynamic_tag: &str) -> Result<Vec<u8>> {
        let id = TimerId {
            timer: self.spec.clone(),
            key: self.key.clone(),
            window: self.window,
            dynamic_tag: dynamic_tag.to_string(),
        };
        Ok(bincode::serialize(&id)?)
    }
}

impl UserTimer for InMemoryTimer {
    fn set(&self, fire_at: EventTime, dynamic_tag: &str) -> Result<()> {
        let id = self.id_bytes(dynamic_tag)?;
        lock(&self.store)?.timers_mut(self.spec.domain).register(id, fire_at);
        Ok(())
    }

    fn clear(&self, dynamic_tag: &str) -> Result<()> {
        let id = self.id_bytes(dynamic_tag)?;
        lock(&self.store)?.timers_mut(self.spec.domain).delete(&id);
        Ok(())
    }
}
