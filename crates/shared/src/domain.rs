use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);
    };
}

id_newtype!(EpisodeId);
id_newtype!(SegmentId);
id_newtype!(CueId);
id_newtype!(ItemId);
id_newtype!(ManualItemId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    StandardMedia,
    ManualBlock,
    PresenterNote,
    Overlay,
    Other,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::StandardMedia => "standard_media",
            ItemKind::ManualBlock => "manual_block",
            ItemKind::PresenterNote => "presenter_note",
            ItemKind::Overlay => "overlay",
            ItemKind::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "standard_media" | "media" | "video" | "graphic" | "audio" => {
                Some(ItemKind::StandardMedia)
            }
            "manual_block" | "manual" => Some(ItemKind::ManualBlock),
            "presenter_note" | "note" => Some(ItemKind::PresenterNote),
            "overlay" => Some(ItemKind::Overlay),
            "other" => Some(ItemKind::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutomationMode {
    #[default]
    Manual,
    Auto,
}

impl AutomationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AutomationMode::Manual => "manual",
            AutomationMode::Auto => "auto",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "manual" => Some(AutomationMode::Manual),
            "auto" => Some(AutomationMode::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayPersistence {
    #[default]
    AutoOut,
    LeaveInLocal,
    LeaveInGlobal,
    Manual,
}

impl OverlayPersistence {
    pub fn as_str(self) -> &'static str {
        match self {
            OverlayPersistence::AutoOut => "auto_out",
            OverlayPersistence::LeaveInLocal => "leave_in_local",
            OverlayPersistence::LeaveInGlobal => "leave_in_global",
            OverlayPersistence::Manual => "manual",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto_out" => Some(OverlayPersistence::AutoOut),
            "leave_in_local" => Some(OverlayPersistence::LeaveInLocal),
            "leave_in_global" => Some(OverlayPersistence::LeaveInGlobal),
            "manual" => Some(OverlayPersistence::Manual),
            _ => None,
        }
    }
}

/// Transition token armed ahead of the next cut and forwarded to the scene sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Cut,
    Mix,
    Wipe,
    Stinger,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlaySettings {
    pub in_point_seconds: f64,
    pub duration_seconds: f64,
    pub persistence: OverlayPersistence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_index: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualItem {
    pub id: ManualItemId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RundownItem {
    pub id: ItemId,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub cue_id: CueId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub automation_mode: AutomationMode,
    #[serde(default)]
    pub automation_duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<OverlaySettings>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manual_items: Vec<ManualItem>,
}

impl RundownItem {
    pub fn is_auto(&self) -> bool {
        self.automation_mode == AutomationMode::Auto && self.automation_duration_seconds > 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cue {
    pub id: CueId,
    #[serde(default)]
    pub title: String,
    pub items: Vec<RundownItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: SegmentId,
    pub title: String,
    pub allotted_time_seconds: u32,
    pub cues: Vec<Cue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceRole {
    Control,
    Presenter,
    Pad,
}
