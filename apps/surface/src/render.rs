use chrono::{DateTime, Utc};
use client_core::Follower;
use shared::domain::RundownItem;

fn describe(item: Option<&RundownItem>) -> String {
    match item {
        Some(item) => format!("#{} {}", item.id.0, item.title),
        None => "-".to_string(),
    }
}

pub fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}

/// One status line for the operator view.
pub fn status_line(follower: &Follower) -> String {
    let link = match follower.link() {
        Some(tier) => tier.as_str().to_string(),
        None => "disconnected, stale".to_string(),
    };
    let Some(state) = follower.state() else {
        return format!("[{link}] waiting for state");
    };
    if state.stopped {
        return format!(
            "[{link}] STOPPED | overlays on air: {}",
            state.active_overlays.len()
        );
    }
    let mut line = format!(
        "[{link}] LIVE {} | NEXT {}",
        describe(follower.live_item()),
        describe(follower.preview_item())
    );
    if let Some(transition) = state.armed_transition {
        line.push_str(&format!(" | ARMED {transition:?}"));
    }
    if let Some(manual) = state.current_manual_item {
        line.push_str(&format!(" | MANUAL #{}", manual.0));
    }
    if state.paused {
        let remaining = state.remaining_time_seconds.unwrap_or_default();
        line.push_str(&format!(" | PAUSED {remaining:.1}s left"));
    }
    if !state.active_overlays.is_empty() {
        let ids: Vec<String> = state
            .active_overlays
            .iter()
            .map(|overlay| format!("#{}", overlay.overlay_id.0))
            .collect();
        line.push_str(&format!(" | OVERLAYS {}", ids.join(",")));
    }
    line
}

/// The presenter's big clock.
pub fn timer_line(follower: &Follower, now: DateTime<Utc>) -> String {
    let marker = if follower.timer().is_running() { ">" } else { "||" };
    format!("{marker} {}", clock(follower.elapsed(now)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use client_core::{FollowerEvent, Tier};
    use shared::{
        domain::{AutomationMode, Cue, CueId, ItemId, ItemKind, Segment, SegmentId, SurfaceRole},
        protocol::{Snapshot, Subscription, SyncMessage},
        state::ExecutionState,
    };

    fn follower_with(state: ExecutionState) -> Follower {
        let mut follower = Follower::new(Subscription {
            role: SurfaceRole::Control,
            episode_id: None,
        });
        let now = Utc::now();
        follower.apply_event(FollowerEvent::Connected(Tier::Socket), now);
        follower.apply_frame(
            SyncMessage::State(Snapshot {
                state,
                segments: vec![Segment {
                    id: SegmentId(1),
                    title: "open".into(),
                    allotted_time_seconds: 60,
                    cues: vec![Cue {
                        id: CueId(1),
                        title: String::new(),
                        items: vec![RundownItem {
                            id: ItemId(7),
                            kind: ItemKind::StandardMedia,
                            cue_id: CueId(1),
                            title: "Headlines".into(),
                            automation_mode: AutomationMode::Manual,
                            automation_duration_seconds: 0.0,
                            overlay: None,
                            manual_items: Vec::new(),
                        }],
                    }],
                }],
                current_episode_id: None,
            }),
            now,
        );
        follower
    }

    #[test]
    fn clock_formats_hours_minutes_seconds() {
        assert_eq!(clock(0.0), "00:00:00");
        assert_eq!(clock(3_725.9), "01:02:05");
        assert_eq!(clock(-3.0), "00:00:00");
    }

    #[test]
    fn live_line_names_the_item_and_pause() {
        let mut state = ExecutionState::stopped();
        state.stopped = false;
        state.current_item_id = Some(ItemId(7));
        state.paused = true;
        state.remaining_time_seconds = Some(4.0);
        let line = status_line(&follower_with(state));
        assert_eq!(line, "[socket] LIVE #7 Headlines | NEXT - | PAUSED 4.0s left");
    }

    #[test]
    fn lost_link_marks_the_view_stale() {
        let mut follower = follower_with(ExecutionState::stopped());
        follower.apply_event(FollowerEvent::Disconnected, Utc::now());
        assert!(status_line(&follower).starts_with("[disconnected, stale] STOPPED"));
    }
}
