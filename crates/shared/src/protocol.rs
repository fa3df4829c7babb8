use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{EpisodeId, ItemId, ManualItemId, Segment, SurfaceRole, TransitionKind},
    state::ExecutionState,
};

/// Button pressed on a follower surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Button {
    Next,
    Stop,
    Pause,
    #[serde(rename_all = "camelCase")]
    Preview {
        item_id: ItemId,
    },
    ArmTransition {
        transition: TransitionKind,
    },
    #[serde(rename_all = "camelCase")]
    ArmManualItem {
        manual_item_id: ManualItemId,
    },
    #[serde(rename_all = "camelCase")]
    PreviewManualItem {
        manual_item_id: ManualItemId,
    },
    #[serde(rename_all = "camelCase")]
    ExecuteManualItem {
        manual_item_id: ManualItemId,
    },
    #[serde(rename_all = "camelCase")]
    TriggerOverlay {
        overlay_id: ItemId,
    },
    #[serde(rename_all = "camelCase")]
    ClearOverlay {
        overlay_id: ItemId,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    pub button: Button,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub origin_timestamp: DateTime<Utc>,
}

impl ActionEnvelope {
    pub fn new(button: Button, origin_timestamp: DateTime<Utc>) -> Self {
        Self {
            button,
            index: None,
            origin_timestamp,
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub state: ExecutionState,
    pub segments: Vec<Segment>,
    pub current_episode_id: Option<EpisodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerPulse {
    pub elapsed_seconds: f64,
    pub is_running: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub role: SurfaceRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_id: Option<EpisodeId>,
}

impl Subscription {
    /// Presenters only follow the episode they asked for; other roles see everything.
    pub fn accepts(&self, snapshot: &Snapshot) -> bool {
        match (self.role, self.episode_id) {
            (SurfaceRole::Presenter, Some(wanted)) => snapshot.current_episode_id == Some(wanted),
            _ => true,
        }
    }
}

/// Every frame exchanged between the authority and its followers, on any tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    State(Snapshot),
    Action(ActionEnvelope),
    Subscribe(Subscription),
    Timer(TimerPulse),
}

impl SyncMessage {
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_text(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AutomationMode, Cue, CueId, ItemKind, RundownItem, Segment, SegmentId};

    #[test]
    fn action_uses_documented_wire_shape() {
        let origin = DateTime::from_timestamp_millis(1_700_000_000_000).expect("ts");
        let message = SyncMessage::Action(
            ActionEnvelope::new(Button::Preview { item_id: ItemId(4) }, origin).with_index(2),
        );
        let json = serde_json::to_value(&message).expect("json");
        assert_eq!(
            json,
            serde_json::json!({
                "type": "ACTION",
                "button": { "type": "preview", "data": { "itemId": 4 } },
                "index": 2,
                "originTimestamp": 1_700_000_000_000i64,
            })
        );
    }

    #[test]
    fn unit_buttons_decode_without_data() {
        let raw = r#"{"type":"ACTION","button":{"type":"next"},"originTimestamp":100}"#;
        let message = SyncMessage::from_text(raw).expect("decode");
        let SyncMessage::Action(action) = message else {
            panic!("expected action");
        };
        assert_eq!(action.button, Button::Next);
        assert_eq!(action.index, None);
        assert_eq!(action.origin_timestamp.timestamp_millis(), 100);
    }

    #[test]
    fn state_frame_carries_segments_and_episode() {
        let snapshot = Snapshot {
            state: ExecutionState::stopped(),
            segments: vec![Segment {
                id: SegmentId(1),
                title: "Open".into(),
                allotted_time_seconds: 90,
                cues: vec![Cue {
                    id: CueId(1),
                    title: String::new(),
                    items: vec![RundownItem {
                        id: ItemId(1),
                        kind: ItemKind::StandardMedia,
                        cue_id: CueId(1),
                        title: "VT".into(),
                        automation_mode: AutomationMode::Auto,
                        automation_duration_seconds: 5.0,
                        overlay: None,
                        manual_items: Vec::new(),
                    }],
                }],
            }],
            current_episode_id: Some(EpisodeId(3)),
        };
        let text = SyncMessage::State(snapshot.clone()).to_text().expect("encode");
        let json: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(json["type"], "STATE");
        assert_eq!(json["currentEpisodeId"], 3);
        assert_eq!(json["segments"][0]["cues"][0]["items"][0]["type"], "standard_media");

        let decoded = SyncMessage::from_text(&text).expect("decode");
        assert_eq!(decoded, SyncMessage::State(snapshot));
    }

    #[test]
    fn presenter_subscription_filters_other_episodes() {
        let subscription = Subscription {
            role: SurfaceRole::Presenter,
            episode_id: Some(EpisodeId(1)),
        };
        let mut snapshot = Snapshot {
            state: ExecutionState::stopped(),
            segments: Vec::new(),
            current_episode_id: Some(EpisodeId(2)),
        };
        assert!(!subscription.accepts(&snapshot));
        snapshot.current_episode_id = Some(EpisodeId(1));
        assert!(subscription.accepts(&snapshot));

        let pad = Subscription {
            role: SurfaceRole::Pad,
            episode_id: Some(EpisodeId(9)),
        };
        assert!(pad.accepts(&snapshot));
    }
}
