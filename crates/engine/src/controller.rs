//! Live/preview/armed transitions over [`ExecutionState`].
//!
//! Every operation is total: ids that do not resolve against the loaded
//! rundown leave the state untouched. Operations report whether they changed
//! anything so the caller knows when to publish a snapshot.

use chrono::{DateTime, Utc};
use shared::{
    domain::{ItemId, ItemKind, ManualItemId, Segment, SegmentId, TransitionKind},
    state::ExecutionState,
};
use tracing::debug;

use crate::rundown::RundownIndex;

#[derive(Debug, Clone, Default)]
pub struct Controller {
    rundown: RundownIndex,
    state: ExecutionState,
}

impl Controller {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            rundown: RundownIndex::new(segments),
            state: ExecutionState::stopped(),
        }
    }

    pub fn state(&self) -> &ExecutionState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut ExecutionState {
        &mut self.state
    }

    pub fn rundown(&self) -> &RundownIndex {
        &self.rundown
    }

    pub(crate) fn parts_mut(&mut self) -> (&RundownIndex, &mut ExecutionState) {
        (&self.rundown, &mut self.state)
    }

    /// Back to the stopped, all-null shape. Used at session start so a reload
    /// never resumes mid-show.
    pub fn reset(&mut self) {
        self.state = ExecutionState::stopped();
    }

    pub fn replace_rundown(&mut self, segments: Vec<Segment>) {
        self.rundown = RundownIndex::new(segments);
    }

    /// Drops every pointer that no longer resolves after a rundown refresh.
    pub fn prune_missing(&mut self) -> bool {
        let rundown = &self.rundown;
        let state = &mut self.state;
        let before = state.clone();

        if state
            .current_item_id
            .is_some_and(|id| rundown.position(id).is_none())
        {
            state.current_item_id = None;
            state.start_time = None;
            state.remaining_time_seconds = None;
            state.paused = false;
        }
        if state
            .preview_item_id
            .is_some_and(|id| rundown.position(id).is_none())
        {
            state.preview_item_id = None;
        }
        for slot in [
            &mut state.armed_manual_item,
            &mut state.current_manual_item,
            &mut state.preview_manual_item,
        ] {
            if slot.is_some_and(|id| !rundown.contains_manual_item(id)) {
                *slot = None;
            }
        }
        state
            .active_overlays
            .retain(|instance| rundown.get(instance.overlay_id).is_some());

        *state != before
    }

    pub fn find_next_actionable(&self, from_index: usize) -> Option<ItemId> {
        self.rundown.find_next_actionable(from_index)
    }

    /// Segment of whatever is live: the current item, or the block owning the
    /// current manual item.
    pub fn live_segment(&self) -> Option<SegmentId> {
        if let Some(current) = self.state.current_item_id {
            return self.rundown.segment_of(current);
        }
        let manual = self.state.current_manual_item?;
        let parent = self.rundown.manual_parent(manual)?;
        self.rundown.segment_of(parent)
    }

    pub fn advance_next(&mut self, now: DateTime<Utc>) -> bool {
        if let Some(manual) = self.state.armed_manual_item.take() {
            debug!(manual_item_id = manual.0, "advance: taking armed manual item");
            self.state.current_manual_item = Some(manual);
            self.state.current_item_id = None;
            self.state.preview_item_id = None;
            self.go_live(now);
            return true;
        }

        let preview = self
            .state
            .preview_item_id
            .filter(|id| self.rundown.position(*id).is_some());

        if let Some(preview) = preview {
            match self.rundown.kind(preview) {
                Some(ItemKind::PresenterNote) => {
                    let Some(target) = self.rundown.next_actionable_after(preview) else {
                        debug!(item_id = preview.0, "advance: presenter note with nothing after it");
                        self.state.preview_item_id = None;
                        return true;
                    };
                    debug!(note_id = preview.0, item_id = target.0, "advance: skipping presenter note");
                    self.take_live(target, now);
                    return true;
                }
                Some(ItemKind::ManualBlock) => {
                    debug!(item_id = preview.0, "advance: opening manual block");
                    self.state.current_item_id = Some(preview);
                    self.state.current_manual_item = None;
                    self.state.preview_item_id = None;
                    self.go_live(now);
                    return true;
                }
                _ => {
                    debug!(item_id = preview.0, "advance: promoting preview");
                    self.take_live(preview, now);
                    return true;
                }
            }
        }

        let nothing_live =
            self.state.current_item_id.is_none() && self.state.current_manual_item.is_none();
        if nothing_live {
            if let Some(first) = self.rundown.find_next_actionable(0) {
                debug!(item_id = first.0, "advance: starting from first actionable item");
                self.take_live(first, now);
                return true;
            }
        }

        debug!("advance: nothing to promote");
        false
    }

    /// `item_id` goes live and preview moves to the next actionable item after it.
    fn take_live(&mut self, item_id: ItemId, now: DateTime<Utc>) {
        self.state.current_item_id = Some(item_id);
        self.state.current_manual_item = None;
        self.state.preview_item_id = self.rundown.next_actionable_after(item_id);
        self.go_live(now);
    }

    fn go_live(&mut self, now: DateTime<Utc>) {
        self.state.stopped = false;
        self.state.paused = false;
        self.state.remaining_time_seconds = None;
        self.state.start_time = Some(now);
    }

    /// Returns `true` when entering stop.
    pub fn toggle_stop(&mut self) -> bool {
        if self.state.stopped {
            self.state.stopped = false;
            debug!("stop released");
            false
        } else {
            self.state.stopped = true;
            self.state.clear_pointers();
            debug!("stopped");
            true
        }
    }

    pub(crate) fn enter_pause(&mut self, remaining: Option<f64>) {
        self.state.paused = true;
        self.state.remaining_time_seconds = remaining;
        debug!(?remaining, "paused");
    }

    pub(crate) fn leave_pause(&mut self, shift: chrono::Duration) {
        self.state.paused = false;
        self.state.remaining_time_seconds = None;
        if let Some(start) = self.state.start_time.as_mut() {
            *start = start.checked_add_signed(shift).unwrap_or(*start);
        }
        debug!(shift_ms = shift.num_milliseconds(), "resumed");
    }

    pub fn set_preview(&mut self, item_id: ItemId) -> bool {
        if self.rundown.position(item_id).is_none() {
            return false;
        }
        if self.rundown.kind(item_id) == Some(ItemKind::PresenterNote) {
            debug!(item_id = item_id.0, "preview: presenter notes cannot be previewed");
            return false;
        }

        let target_cue = self.rundown.cue_of(item_id);
        let live_block_cue = self
            .state
            .current_item_id
            .filter(|id| self.rundown.kind(*id) == Some(ItemKind::ManualBlock))
            .or_else(|| {
                self.state
                    .current_manual_item
                    .and_then(|manual| self.rundown.manual_parent(manual))
            })
            .and_then(|block| self.rundown.cue_of(block));

        if let Some(block_cue) = live_block_cue {
            if Some(block_cue) != target_cue {
                debug!(item_id = item_id.0, "preview: leaving manual block cue, clearing live block");
                self.state.current_item_id = None;
                self.state.current_manual_item = None;
                self.state.start_time = None;
                self.state.remaining_time_seconds = None;
                self.state.paused = false;
            }
        }

        self.state.preview_item_id = Some(item_id);
        true
    }

    pub fn arm_transition(&mut self, transition: TransitionKind) -> bool {
        if self.state.armed_transition == Some(transition) {
            self.state.armed_transition = None;
        } else {
            self.state.armed_transition = Some(transition);
        }
        debug!(armed = ?self.state.armed_transition, "transition arming toggled");
        true
    }

    pub(crate) fn take_armed_transition(&mut self) -> Option<TransitionKind> {
        self.state.armed_transition.take()
    }

    pub fn arm_manual_item(&mut self, manual_item_id: ManualItemId) -> bool {
        if !self.rundown.contains_manual_item(manual_item_id) {
            return false;
        }
        toggle(&mut self.state.armed_manual_item, manual_item_id);
        true
    }

    pub fn preview_manual_item(&mut self, manual_item_id: ManualItemId) -> bool {
        if !self.rundown.contains_manual_item(manual_item_id) {
            return false;
        }
        toggle(&mut self.state.preview_manual_item, manual_item_id);
        true
    }

    /// Takes a manual item live directly, or takes it back down when it is
    /// already live. An open parent block stays current.
    pub fn execute_manual_item(&mut self, manual_item_id: ManualItemId, now: DateTime<Utc>) -> bool {
        let Some(parent) = self.rundown.manual_parent(manual_item_id) else {
            return false;
        };

        if self.state.current_manual_item == Some(manual_item_id) {
            self.state.current_manual_item = None;
            if self.state.current_item_id.is_none() {
                self.state.start_time = None;
                self.state.paused = false;
                self.state.remaining_time_seconds = None;
            }
            debug!(manual_item_id = manual_item_id.0, "manual item taken out");
            return true;
        }

        if self.state.current_item_id != Some(parent) {
            self.state.current_item_id = None;
        }
        if self.state.armed_manual_item == Some(manual_item_id) {
            self.state.armed_manual_item = None;
        }
        if self.state.preview_manual_item == Some(manual_item_id) {
            self.state.preview_manual_item = None;
        }
        self.state.current_manual_item = Some(manual_item_id);
        self.go_live(now);
        debug!(manual_item_id = manual_item_id.0, "manual item executed");
        true
    }
}

fn toggle<T: PartialEq + Copy>(slot: &mut Option<T>, value: T) {
    if *slot == Some(value) {
        *slot = None;
    } else {
        *slot = Some(value);
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
