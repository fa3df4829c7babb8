use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{EpisodeId, ItemId, ManualItemId, Segment, SegmentId, TransitionKind},
    protocol::{Button, Snapshot, TimerPulse},
    state::ExecutionState,
};
use tracing::{debug, info};

use crate::{
    automation::AutomationScheduler,
    controller::Controller,
    overlays::{OverlayChange, OverlayScheduler},
    rundown::RundownIndex,
    timers::seconds_between,
};

/// Fire-and-forget command for the external scene switcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SceneCommand {
    Cut {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<ItemId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        manual_item_id: Option<ManualItemId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transition: Option<TransitionKind>,
    },
    ArmTransition {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transition: Option<TransitionKind>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LiveMarker {
    item: Option<ItemId>,
    manual: Option<ManualItemId>,
    start: Option<DateTime<Utc>>,
}

impl LiveMarker {
    fn of(state: &ExecutionState) -> Self {
        Self {
            item: state.current_item_id,
            manual: state.current_manual_item,
            start: state.start_time,
        }
    }
}

/// The authority's state machine: controller plus both schedulers. Every
/// entry point takes `now` so behaviour is fully determined by its inputs.
#[derive(Debug, Default)]
pub struct Engine {
    controller: Controller,
    automation: AutomationScheduler,
    overlays: OverlayScheduler,
    episode_id: Option<EpisodeId>,
    paused_at: Option<DateTime<Utc>>,
    last_live_segment: Option<SegmentId>,
    scene_commands: Vec<SceneCommand>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rundown(episode_id: EpisodeId, segments: Vec<Segment>) -> Self {
        let mut engine = Self::new();
        engine.load_episode(episode_id, segments);
        engine
    }

    pub fn state(&self) -> &ExecutionState {
        self.controller.state()
    }

    pub fn rundown(&self) -> &RundownIndex {
        self.controller.rundown()
    }

    pub fn automation(&self) -> &AutomationScheduler {
        &self.automation
    }

    pub fn overlays(&self) -> &OverlayScheduler {
        &self.overlays
    }

    pub fn episode_id(&self) -> Option<EpisodeId> {
        self.episode_id
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state().clone(),
            segments: self.rundown().segments().to_vec(),
            current_episode_id: self.episode_id,
        }
    }

    pub fn take_scene_commands(&mut self) -> Vec<SceneCommand> {
        std::mem::take(&mut self.scene_commands)
    }

    /// Switches episodes. State always comes back stopped and empty.
    pub fn load_episode(&mut self, episode_id: EpisodeId, segments: Vec<Segment>) {
        self.controller.replace_rundown(segments);
        self.controller.reset();
        self.automation.cancel();
        self.overlays.reset();
        self.episode_id = Some(episode_id);
        self.paused_at = None;
        self.last_live_segment = None;
        info!(
            episode_id = episode_id.0,
            items = self.rundown().len(),
            "episode loaded"
        );
    }

    /// Swaps in fresh content for the current episode without resetting.
    pub fn refresh_rundown(&mut self, segments: Vec<Segment>, now: DateTime<Utc>) -> bool {
        let had_item = self.state().current_item_id.is_some();
        let was_paused = self.state().paused;
        self.controller.replace_rundown(segments);
        self.overlays.forget_missing(self.controller.rundown());
        let changed = self.controller.prune_missing();
        if was_paused && !self.state().paused {
            self.paused_at = None;
            self.overlays.resume(now);
            self.automation.cancel();
        }
        if had_item && self.state().current_item_id.is_none() {
            self.automation.cancel();
            self.overlays.cancel_pending_appearances();
        }
        debug!(changed, "rundown refreshed");
        changed | self.pump(now)
    }

    pub fn find_next_actionable(&self, from_index: usize) -> Option<ItemId> {
        self.controller.find_next_actionable(from_index)
    }

    pub fn advance_next(&mut self, now: DateTime<Utc>) -> bool {
        self.transition(now, |controller| controller.advance_next(now))
    }

    pub fn set_preview(&mut self, item_id: ItemId, now: DateTime<Utc>) -> bool {
        self.transition(now, |controller| controller.set_preview(item_id))
    }

    pub fn execute_manual_item(&mut self, manual_item_id: ManualItemId, now: DateTime<Utc>) -> bool {
        self.transition(now, |controller| {
            controller.execute_manual_item(manual_item_id, now)
        })
    }

    pub fn arm_manual_item(&mut self, manual_item_id: ManualItemId) -> bool {
        self.controller.arm_manual_item(manual_item_id)
    }

    pub fn preview_manual_item(&mut self, manual_item_id: ManualItemId) -> bool {
        self.controller.preview_manual_item(manual_item_id)
    }

    pub fn arm_transition(&mut self, transition: TransitionKind) -> bool {
        let changed = self.controller.arm_transition(transition);
        self.scene_commands.push(SceneCommand::ArmTransition {
            transition: self.state().armed_transition,
        });
        changed
    }

    pub fn toggle_stop(&mut self, now: DateTime<Utc>) -> bool {
        if self.controller.toggle_stop() {
            self.automation.cancel();
            let (_, state) = self.controller.parts_mut();
            self.overlays.stop(state);
            self.paused_at = None;
            self.last_live_segment = None;
            info!("execution stopped");
        } else {
            info!("stop released");
        }
        self.pump(now);
        true
    }

    pub fn toggle_pause(&mut self, now: DateTime<Utc>) -> bool {
        if self.state().paused {
            self.resume(now);
            return true;
        }
        if !self.state().is_live() {
            debug!("pause ignored: nothing live");
            return false;
        }
        let remaining = self.automation.pause(now);
        self.overlays.pause(now);
        self.controller.enter_pause(remaining);
        self.paused_at = Some(now);
        true
    }

    fn resume(&mut self, now: DateTime<Utc>) {
        let shift = self
            .paused_at
            .take()
            .map(|paused_at| (now - paused_at).max(chrono::Duration::zero()))
            .unwrap_or_else(chrono::Duration::zero);
        self.automation.resume(now);
        self.overlays.resume(now);
        self.controller.leave_pause(shift);
        self.pump(now);
    }

    pub fn trigger_manual_overlay(&mut self, overlay_id: ItemId, now: DateTime<Utc>) -> bool {
        let (rundown, state) = self.controller.parts_mut();
        self.overlays.toggle_manual(rundown, state, overlay_id, now)
    }

    pub fn clear_overlay(&mut self, overlay_id: ItemId) -> bool {
        let (_, state) = self.controller.parts_mut();
        self.overlays.clear(state, overlay_id)
    }

    pub fn apply_button(&mut self, button: Button, now: DateTime<Utc>) -> bool {
        match button {
            Button::Next => self.advance_next(now),
            Button::Stop => self.toggle_stop(now),
            Button::Pause => self.toggle_pause(now),
            Button::Preview { item_id } => self.set_preview(item_id, now),
            Button::ArmTransition { transition } => self.arm_transition(transition),
            Button::ArmManualItem { manual_item_id } => self.arm_manual_item(manual_item_id),
            Button::PreviewManualItem { manual_item_id } => {
                self.preview_manual_item(manual_item_id)
            }
            Button::ExecuteManualItem { manual_item_id } => {
                self.execute_manual_item(manual_item_id, now)
            }
            Button::TriggerOverlay { overlay_id } => self.trigger_manual_overlay(overlay_id, now),
            Button::ClearOverlay { overlay_id } => self.clear_overlay(overlay_id),
        }
    }

    /// Fires due timers. Returns whether the state changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;
        if let Some(expired) = self.automation.tick(now) {
            info!(item_id = expired.0, "automation expired, advancing");
            changed |= self.advance_next(now);
            self.automation.supersede();
        }
        changed | self.pump(now)
    }

    pub fn countdown_remaining(&self, now: DateTime<Utc>) -> Option<f64> {
        self.automation.remaining(now)
    }

    pub fn timer_pulse(&self, now: DateTime<Utc>) -> TimerPulse {
        let state = self.state();
        let running = state.is_live() && !state.paused;
        let elapsed = state
            .start_time
            .map(|start| {
                let until = if state.paused {
                    self.paused_at.unwrap_or(now)
                } else {
                    now
                };
                seconds_between(until, start).max(0.0)
            })
            .unwrap_or(0.0);
        TimerPulse {
            elapsed_seconds: elapsed,
            is_running: running,
        }
    }

    fn transition(&mut self, now: DateTime<Utc>, op: impl FnOnce(&mut Controller) -> bool) -> bool {
        let before = LiveMarker::of(self.state());
        let was_paused = self.state().paused;
        if !op(&mut self.controller) {
            return false;
        }
        if was_paused && !self.state().paused {
            // A new item went live mid-pause: release the frozen timers first.
            self.paused_at = None;
            self.overlays.resume(now);
            self.automation.cancel();
        }
        let after = LiveMarker::of(self.state());
        if before != after {
            self.on_live_changed(before, after, now);
        }
        self.pump(now);
        true
    }

    fn on_live_changed(&mut self, before: LiveMarker, after: LiveMarker, now: DateTime<Utc>) {
        let current = after.item;
        let manual = after.manual;
        let live_at = after.start.unwrap_or(now);

        // A manual item firing inside an open block leaves the block's timers alone.
        let item_retaken = before.item != after.item || before.manual == after.manual;
        if item_retaken {
            match current.and_then(|id| self.controller.rundown().item(id)) {
                Some(item) => self.automation.start(item, live_at),
                None => self.automation.cancel(),
            }
            match current {
                Some(parent) => {
                    self.overlays
                        .on_parent_live(self.controller.rundown(), parent, live_at)
                }
                None => self.overlays.cancel_pending_appearances(),
            }
        }

        if let Some(segment) = self.controller.live_segment() {
            if let Some(left) = self.last_live_segment.filter(|left| *left != segment) {
                let (_, state) = self.controller.parts_mut();
                self.overlays.sweep_segment(state, left);
            }
            self.last_live_segment = Some(segment);
        }

        if current.is_some() || manual.is_some() {
            let transition = self.controller.take_armed_transition();
            info!(
                item_id = current.map(|id| id.0),
                manual_item_id = manual.map(|id| id.0),
                ?transition,
                "cut"
            );
            self.scene_commands.push(SceneCommand::Cut {
                item_id: current,
                manual_item_id: manual,
                transition,
            });
        }
    }

    fn pump(&mut self, now: DateTime<Utc>) -> bool {
        let (rundown, state) = self.controller.parts_mut();
        let changes = self.overlays.tick(rundown, state, now);
        for change in &changes {
            match change {
                OverlayChange::Appeared(id) => debug!(overlay_id = id.0, "overlay appeared"),
                OverlayChange::Disappeared(id) => debug!(overlay_id = id.0, "overlay disappeared"),
            }
        }
        !changes.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/engine_tests.rs"]
mod tests;
