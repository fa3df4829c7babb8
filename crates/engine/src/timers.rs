use std::{collections::HashMap, hash::Hash};

use chrono::{DateTime, Duration, Utc};

/// Longest countdown or overlay timing the engine will schedule.
pub const MAX_TIMER_SECONDS: f64 = 7.0 * 24.0 * 3600.0;

/// Content timings as a duration, clamped to `0..=MAX_TIMER_SECONDS`. NaN
/// counts as zero.
pub fn seconds(value: f64) -> Duration {
    let clamped = if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, MAX_TIMER_SECONDS)
    };
    Duration::milliseconds((clamped * 1000.0).round() as i64)
}

/// `now + seconds(value)`, or `None` when the instant is not representable.
pub fn deadline_after(now: DateTime<Utc>, value: f64) -> Option<DateTime<Utc>> {
    now.checked_add_signed(seconds(value))
}

pub fn seconds_between(later: DateTime<Utc>, earlier: DateTime<Utc>) -> f64 {
    (later - earlier).num_milliseconds() as f64 / 1000.0
}

/// Cancellable absolute deadlines keyed by a logical id. Scheduling a key
/// replaces any deadline already held for it, so at most one timer per key is
/// ever in flight.
#[derive(Debug, Clone)]
pub struct TimerRegistry<K> {
    deadlines: HashMap<K, DateTime<Utc>>,
    paused_at: Option<DateTime<Utc>>,
}

impl<K> Default for TimerRegistry<K> {
    fn default() -> Self {
        Self {
            deadlines: HashMap::new(),
            paused_at: None,
        }
    }
}

impl<K: Eq + Hash + Clone> TimerRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, key: K, deadline: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.deadlines.insert(key, deadline)
    }

    pub fn cancel(&mut self, key: &K) -> bool {
        self.deadlines.remove(key).is_some()
    }

    pub fn cancel_where(&mut self, mut predicate: impl FnMut(&K) -> bool) {
        self.deadlines.retain(|key, _| !predicate(key));
    }

    pub fn clear(&mut self) {
        self.deadlines.clear();
        self.paused_at = None;
    }

    pub fn deadline(&self, key: &K) -> Option<DateTime<Utc>> {
        self.deadlines.get(key).copied()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.deadlines.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.deadlines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        if self.is_paused() {
            return None;
        }
        self.deadlines.values().min().copied()
    }

    /// Removes and returns every key whose deadline has passed, earliest first.
    /// Nothing fires while paused.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<(K, DateTime<Utc>)> {
        if self.is_paused() {
            return Vec::new();
        }
        let mut due: Vec<(K, DateTime<Utc>)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, deadline)| (key.clone(), *deadline))
            .collect();
        due.sort_by_key(|(_, deadline)| *deadline);
        for (key, _) in &due {
            self.deadlines.remove(key);
        }
        due
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Shifts every deadline forward by the time spent paused.
    pub fn resume(&mut self, now: DateTime<Utc>) -> Duration {
        let Some(paused_at) = self.paused_at.take() else {
            return Duration::zero();
        };
        let shift = (now - paused_at).max(Duration::zero());
        for deadline in self.deadlines.values_mut() {
            *deadline = deadline.checked_add_signed(shift).unwrap_or(*deadline);
        }
        shift
    }
}
