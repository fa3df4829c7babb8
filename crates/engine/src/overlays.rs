use chrono::{DateTime, Utc};
use shared::{
    domain::{ItemId, OverlayPersistence, SegmentId},
    state::{ExecutionState, OverlayInstance},
};
use tracing::{debug, warn};

use crate::{
    rundown::RundownIndex,
    timers::{deadline_after, TimerRegistry},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayTimer {
    Appear(ItemId),
    Disappear(ItemId),
}

impl OverlayTimer {
    pub fn overlay_id(self) -> ItemId {
        match self {
            OverlayTimer::Appear(id) | OverlayTimer::Disappear(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayChange {
    Appeared(ItemId),
    Disappeared(ItemId),
}

/// Appear/disappear timers for the overlays riding on the live item.
#[derive(Debug, Clone, Default)]
pub struct OverlayScheduler {
    timers: TimerRegistry<OverlayTimer>,
}

impl OverlayScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timers(&self) -> &TimerRegistry<OverlayTimer> {
        &self.timers
    }

    /// Schedules the overlay run following `parent`, relative to its live
    /// time. Pending appearances from the previous parent are dropped;
    /// overlays already on air keep their disappear timers.
    pub fn on_parent_live(
        &mut self,
        rundown: &RundownIndex,
        parent: ItemId,
        live_at: DateTime<Utc>,
    ) {
        self.cancel_pending_appearances();
        for overlay_id in rundown.overlays_for(parent) {
            let Some(settings) = rundown.overlay_settings(*overlay_id) else {
                continue;
            };
            if settings.persistence == OverlayPersistence::Manual {
                continue;
            }
            let Some(appear_at) = deadline_after(live_at, settings.in_point_seconds) else {
                warn!(overlay_id = overlay_id.0, "overlay in-point out of range; not scheduled");
                continue;
            };
            self.timers
                .schedule(OverlayTimer::Appear(*overlay_id), appear_at);
            debug!(
                overlay_id = overlay_id.0,
                parent_id = parent.0,
                in_point = settings.in_point_seconds,
                "overlay appearance scheduled"
            );
        }
    }

    /// Drops timers for overlays that vanished in a rundown refresh.
    pub fn forget_missing(&mut self, rundown: &RundownIndex) {
        self.timers
            .cancel_where(|timer| rundown.get(timer.overlay_id()).is_none());
    }

    pub fn cancel_pending_appearances(&mut self) {
        self.timers
            .cancel_where(|timer| matches!(timer, OverlayTimer::Appear(_)));
    }

    pub fn tick(
        &mut self,
        rundown: &RundownIndex,
        state: &mut ExecutionState,
        now: DateTime<Utc>,
    ) -> Vec<OverlayChange> {
        let mut changes = Vec::new();
        for (timer, _) in self.timers.take_due(now) {
            match timer {
                OverlayTimer::Appear(overlay_id) => {
                    if self.show(rundown, state, overlay_id, now) {
                        changes.push(OverlayChange::Appeared(overlay_id));
                    }
                }
                OverlayTimer::Disappear(overlay_id) => {
                    if state.remove_overlay(overlay_id) {
                        debug!(overlay_id = overlay_id.0, "overlay auto out");
                        changes.push(OverlayChange::Disappeared(overlay_id));
                    }
                }
            }
        }
        changes
    }

    fn show(
        &mut self,
        rundown: &RundownIndex,
        state: &mut ExecutionState,
        overlay_id: ItemId,
        now: DateTime<Utc>,
    ) -> bool {
        let (Some(entry), Some(settings)) =
            (rundown.get(overlay_id), rundown.overlay_settings(overlay_id))
        else {
            return false;
        };
        if state.overlay_active(overlay_id) {
            return false;
        }
        state.active_overlays.push(OverlayInstance {
            overlay_id,
            parent_item_id: entry.parent_item_id.unwrap_or(overlay_id),
            segment_id: entry.segment_id,
            started_at: now,
            persistence: settings.persistence,
        });
        if settings.persistence == OverlayPersistence::AutoOut {
            match deadline_after(now, settings.duration_seconds) {
                Some(out_at) => {
                    self.timers.schedule(OverlayTimer::Disappear(overlay_id), out_at);
                }
                None => warn!(overlay_id = overlay_id.0, "overlay duration out of range; stays on air"),
            }
        }
        debug!(
            overlay_id = overlay_id.0,
            persistence = settings.persistence.as_str(),
            "overlay on air"
        );
        true
    }

    /// Removes `leave_in_local` overlays that belonged to the segment just left.
    pub fn sweep_segment(&mut self, state: &mut ExecutionState, left: SegmentId) -> Vec<ItemId> {
        let removed: Vec<ItemId> = state
            .active_overlays
            .iter()
            .filter(|instance| {
                instance.segment_id == left
                    && instance.persistence == OverlayPersistence::LeaveInLocal
            })
            .map(|instance| instance.overlay_id)
            .collect();
        for overlay_id in &removed {
            state.remove_overlay(*overlay_id);
            self.cancel_overlay(*overlay_id);
        }
        if !removed.is_empty() {
            debug!(segment_id = left.0, count = removed.len(), "segment sweep");
        }
        removed
    }

    /// Cancels every timer and keeps only `leave_in_global` overlays.
    pub fn stop(&mut self, state: &mut ExecutionState) {
        self.timers.clear();
        state
            .active_overlays
            .retain(|instance| instance.persistence == OverlayPersistence::LeaveInGlobal);
    }

    pub fn reset(&mut self) {
        self.timers.clear();
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        self.timers.pause(now);
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.timers.resume(now);
    }

    /// Flips a `manual` overlay on or off. Other persistence modes are driven
    /// by their timers and are ignored here.
    pub fn toggle_manual(
        &mut self,
        rundown: &RundownIndex,
        state: &mut ExecutionState,
        overlay_id: ItemId,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(settings) = rundown.overlay_settings(overlay_id) else {
            return false;
        };
        if settings.persistence != OverlayPersistence::Manual {
            return false;
        }
        if state.remove_overlay(overlay_id) {
            debug!(overlay_id = overlay_id.0, color = ?settings.color_index, "manual overlay out");
            return true;
        }
        self.show(rundown, state, overlay_id, now)
    }

    pub fn clear(&mut self, state: &mut ExecutionState, overlay_id: ItemId) -> bool {
        let had_timers = self.cancel_overlay(overlay_id);
        state.remove_overlay(overlay_id) || had_timers
    }

    fn cancel_overlay(&mut self, overlay_id: ItemId) -> bool {
        let appear = self.timers.cancel(&OverlayTimer::Appear(overlay_id));
        let disappear = self.timers.cancel(&OverlayTimer::Disappear(overlay_id));
        appear || disappear
    }
}

#[cfg(test)]
#[path = "tests/overlay_tests.rs"]
mod tests;
