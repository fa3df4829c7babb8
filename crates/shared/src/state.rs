use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ItemId, ManualItemId, OverlayPersistence, SegmentId, TransitionKind};

/// An overlay currently on air.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayInstance {
    pub overlay_id: ItemId,
    pub parent_item_id: ItemId,
    pub segment_id: SegmentId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,
    pub persistence: OverlayPersistence,
}

/// The live/preview/armed model owned by the authority and mirrored by every follower.
///
/// When `stopped` is set every pointer is `None` and only `leave_in_global`
/// overlays may remain in `active_overlays`. `remaining_time_seconds` is only
/// populated while `paused`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub current_item_id: Option<ItemId>,
    pub preview_item_id: Option<ItemId>,
    pub armed_transition: Option<TransitionKind>,
    pub armed_manual_item: Option<ManualItemId>,
    pub current_manual_item: Option<ManualItemId>,
    pub preview_manual_item: Option<ManualItemId>,
    pub stopped: bool,
    pub paused: bool,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub start_time: Option<DateTime<Utc>>,
    pub remaining_time_seconds: Option<f64>,
    pub active_overlays: Vec<OverlayInstance>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::stopped()
    }
}

impl ExecutionState {
    pub fn stopped() -> Self {
        Self {
            current_item_id: None,
            preview_item_id: None,
            armed_transition: None,
            armed_manual_item: None,
            current_manual_item: None,
            preview_manual_item: None,
            stopped: true,
            paused: false,
            start_time: None,
            remaining_time_seconds: None,
            active_overlays: Vec::new(),
        }
    }

    pub fn clear_pointers(&mut self) {
        self.current_item_id = None;
        self.preview_item_id = None;
        self.armed_transition = None;
        self.armed_manual_item = None;
        self.current_manual_item = None;
        self.preview_manual_item = None;
        self.start_time = None;
        self.remaining_time_seconds = None;
        self.paused = false;
    }

    pub fn overlay_active(&self, overlay_id: ItemId) -> bool {
        self.active_overlays
            .iter()
            .any(|instance| instance.overlay_id == overlay_id)
    }

    pub fn remove_overlay(&mut self, overlay_id: ItemId) -> bool {
        let before = self.active_overlays.len();
        self.active_overlays
            .retain(|instance| instance.overlay_id != overlay_id);
        before != self.active_overlays.len()
    }

    pub fn is_live(&self) -> bool {
        !self.stopped && (self.current_item_id.is_some() || self.current_manual_item.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_stopped_with_no_pointers() {
        let state = ExecutionState::default();
        assert!(state.stopped);
        assert!(!state.is_live());
        assert!(state.current_item_id.is_none());
        assert!(state.active_overlays.is_empty());
    }

    #[test]
    fn serializes_with_camel_case_fields_and_millisecond_timestamps() {
        let mut state = ExecutionState::stopped();
        state.stopped = false;
        state.current_item_id = Some(ItemId(7));
        state.start_time = DateTime::from_timestamp_millis(1_700_000_000_123);

        let json = serde_json::to_value(&state).expect("json");
        assert_eq!(json["currentItemId"], 7);
        assert_eq!(json["startTime"], 1_700_000_000_123i64);
        assert!(json["previewItemId"].is_null());

        let back: ExecutionState = serde_json::from_value(json).expect("decode");
        assert_eq!(back, state);
    }
}
