use super::*;

/// Identifies one registered user timer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimerId {
    pub timer: TimerSpec,
    pub key: Value,
    pub window: Window,
    pub dynamic_tag: String,
}

/// A timer that came due.
#[derive(Debug, Clone, PartialEq)]
pub struct FiredTimer {
    pub timer: TimerSpec,
    pub key: Value,
    pub window: Window,
    pub dynamic_tag: String,
    pub fire_at: EventTime,
}

/// Pending timers of one time domain, ordered by fire time.
///
/// Everything due at a watermark is one range scan from the front.
///
/// # Invariant
/// A timer id is registered at most once; setting it again moves it to the
/// new fire time.
#[derive(Debug, Clone, Default)]
pub struct TimerService {
    /// fire_at -> serialized timer ids due at that time.
    timers: BTreeMap<EventTime, BTreeSet<Vec<u8>>>,
    /// serialized timer id -> current fire time.
    registered: AHashMap<Vec<u8>, EventTime>,
}

impl TimerService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` to fire at `fire_at`, replacing any earlier registration.
    pub fn register(&mut self, id: Vec<u8>, fire_at: EventTime) {
        if let Some(previous) = self.registered.insert(id.clone(), fire_at) {
            self.remove_at(&id, previous);
        }
        self.timers.entry(fire_at).or_default().insert(id);
    }

    /// Cancel a timer. No-op if `id` was not registered.
    pub fn delete(&mut self, id: &[u8]) {
        if let Some(fire_at) = self.registered.remove(id) {
            self.remove_at(id, fire_at);
        }
    }

    /// Drain and return all timers with `fire_at <= now` in ascending order.
    pub fn drain_due(&mut self, now: EventTime) -> Vec<(Vec<u8>, EventTime)> {
        let fire_times: Vec<EventTime> = self.timers.range(..=now).map(|(ts, _)| *ts).collect();

        let mut fired = Vec::new();
        for fire_at in fire_times {
            if let Some(ids) = self.timers.remove(&fire_at) {
                for id in ids {
                    self.registered.remove(&id);
                    fired.push((id, fire_at));
                }
            }
        }
        fired
    }

    /// Earliest pending fire time.
    pub fn next_timer(&self) -> Option<EventTime> {
        self.timers.keys().next().copied()
    }

    pub fn len(&self) -> usize {
        self.registered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }

    fn remove_at(&mut self, id: &[u8], fire_at: EventTime) {
        if let Some(ids) = self.timers.get_mut(&fire_at) {
            ids.remove(id);
            if ids.is_empty() {
                self.timers.remove(&fire_at);
            }
        }
    }
}
