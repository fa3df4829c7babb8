use chrono::{DateTime, Utc};
use shared::domain::{ItemId, RundownItem};
use tracing::{debug, warn};

use crate::timers::{deadline_after, seconds_between, TimerRegistry, MAX_TIMER_SECONDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CountdownPhase {
    #[default]
    Idle,
    Running,
    Paused,
    Expired,
    Superseded,
}

/// Countdown for the live item. Expiry is decided by the absolute deadline;
/// `tick` only refreshes the displayed remaining time.
#[derive(Debug, Clone, Default)]
pub struct AutomationScheduler {
    timers: TimerRegistry<ItemId>,
    item_id: Option<ItemId>,
    phase: CountdownPhase,
    paused_remaining: Option<f64>,
    display_remaining: Option<f64>,
}

impl AutomationScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CountdownPhase {
        self.phase
    }

    pub fn item_id(&self) -> Option<ItemId> {
        self.item_id
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.item_id.and_then(|id| self.timers.deadline(&id))
    }

    pub fn display_remaining(&self) -> Option<f64> {
        self.display_remaining
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Option<f64> {
        match self.phase {
            CountdownPhase::Running => self
                .deadline()
                .map(|deadline| seconds_between(deadline, now).max(0.0)),
            CountdownPhase::Paused => self.paused_remaining,
            _ => None,
        }
    }

    /// Starts the countdown for a newly live item, always cancelling whatever
    /// was running before. Manual-mode items leave the scheduler idle.
    pub fn start(&mut self, item: &RundownItem, now: DateTime<Utc>) {
        self.cancel();
        if !item.is_auto() {
            self.phase = CountdownPhase::Idle;
            return;
        }
        if item.automation_duration_seconds > MAX_TIMER_SECONDS {
            warn!(
                item_id = item.id.0,
                duration = item.automation_duration_seconds,
                max = MAX_TIMER_SECONDS,
                "automation duration clamped"
            );
        }
        let Some(deadline) = deadline_after(now, item.automation_duration_seconds) else {
            warn!(item_id = item.id.0, "automation deadline out of range; not scheduled");
            self.phase = CountdownPhase::Idle;
            return;
        };
        self.timers.schedule(item.id, deadline);
        self.item_id = Some(item.id);
        self.phase = CountdownPhase::Running;
        self.display_remaining = Some(seconds_between(deadline, now));
        debug!(
            item_id = item.id.0,
            duration = item.automation_duration_seconds,
            "automation countdown started"
        );
    }

    pub fn cancel(&mut self) {
        if matches!(self.phase, CountdownPhase::Running | CountdownPhase::Paused) {
            self.phase = CountdownPhase::Superseded;
        }
        self.timers.clear();
        self.item_id = None;
        self.paused_remaining = None;
        self.display_remaining = None;
    }

    /// Returns the remaining seconds captured for the pause snapshot.
    pub fn pause(&mut self, now: DateTime<Utc>) -> Option<f64> {
        if self.phase != CountdownPhase::Running {
            return None;
        }
        let remaining = self.remaining(now)?;
        if let Some(id) = self.item_id {
            self.timers.cancel(&id);
        }
        self.phase = CountdownPhase::Paused;
        self.paused_remaining = Some(remaining);
        self.display_remaining = Some(remaining);
        Some(remaining)
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.phase != CountdownPhase::Paused {
            return;
        }
        let (Some(id), Some(remaining)) = (self.item_id, self.paused_remaining.take()) else {
            self.phase = CountdownPhase::Idle;
            return;
        };
        let Some(deadline) = deadline_after(now, remaining) else {
            warn!(item_id = id.0, "automation deadline out of range after resume");
            self.item_id = None;
            self.phase = CountdownPhase::Idle;
            return;
        };
        self.timers.schedule(id, deadline);
        self.phase = CountdownPhase::Running;
    }

    /// Returns the item whose deadline has passed, at most once per countdown.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<ItemId> {
        if self.phase != CountdownPhase::Running {
            return None;
        }
        self.display_remaining = self.remaining(now);
        let expired = self.timers.take_due(now).into_iter().next()?.0;
        self.phase = CountdownPhase::Expired;
        self.display_remaining = Some(0.0);
        debug!(item_id = expired.0, "automation countdown expired");
        Some(expired)
    }

    /// Marks an expired countdown as handled when the advance it triggered
    /// did not start a new one.
    pub fn supersede(&mut self) {
        if self.phase == CountdownPhase::Expired {
            self.phase = CountdownPhase::Superseded;
            self.item_id = None;
        }
    }
}

#[cfg(test)]
#[path = "tests/automation_tests.rs"]
mod tests;
