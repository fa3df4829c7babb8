use chrono::{DateTime, Duration, Utc};
use shared::{
    domain::{ItemId, RundownItem, Segment},
    protocol::{ActionEnvelope, Button, Snapshot, Subscription, SyncMessage},
    state::ExecutionState,
};
use tracing::debug;

use crate::{supervisor::FollowerEvent, timer_feed::TimerFeed, transport::Tier};

/// Render-side mirror of the authority. Holds the last accepted snapshot,
/// the timer feed and the link state; never mutates execution state itself.
#[derive(Debug, Clone)]
pub struct Follower {
    subscription: Subscription,
    snapshot: Option<Snapshot>,
    timer: TimerFeed,
    link: Option<Tier>,
    last_stamp: Option<DateTime<Utc>>,
    next_index: u32,
}

impl Follower {
    pub fn new(subscription: Subscription) -> Self {
        Self {
            subscription,
            snapshot: None,
            timer: TimerFeed::new(),
            link: None,
            last_stamp: None,
            next_index: 0,
        }
    }

    pub fn subscription(&self) -> Subscription {
        self.subscription
    }

    /// Returns whether anything a surface renders changed.
    pub fn apply_event(&mut self, event: FollowerEvent, now: DateTime<Utc>) -> bool {
        match event {
            FollowerEvent::Connected(tier) => {
                let changed = self.link != Some(tier);
                self.link = Some(tier);
                changed
            }
            FollowerEvent::Disconnected => self.link.take().is_some(),
            FollowerEvent::Frame(frame) => self.apply_frame(frame, now),
        }
    }

    pub fn apply_frame(&mut self, frame: SyncMessage, now: DateTime<Utc>) -> bool {
        match frame {
            SyncMessage::State(snapshot) => {
                if !self.subscription.accepts(&snapshot) {
                    debug!(episode_id = ?snapshot.current_episode_id.map(|e| e.0), "snapshot filtered");
                    return false;
                }
                if self.snapshot.as_ref() == Some(&snapshot) {
                    return false;
                }
                self.snapshot = Some(snapshot);
                true
            }
            SyncMessage::Timer(pulse) => {
                self.timer.on_pulse(pulse, now);
                true
            }
            SyncMessage::Action(_) | SyncMessage::Subscribe(_) => false,
        }
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn state(&self) -> Option<&ExecutionState> {
        self.snapshot.as_ref().map(|snapshot| &snapshot.state)
    }

    pub fn segments(&self) -> &[Segment] {
        self.snapshot
            .as_ref()
            .map(|snapshot| snapshot.segments.as_slice())
            .unwrap_or_default()
    }

    pub fn item(&self, item_id: ItemId) -> Option<&RundownItem> {
        self.segments()
            .iter()
            .flat_map(|segment| &segment.cues)
            .flat_map(|cue| &cue.items)
            .find(|item| item.id == item_id)
    }

    pub fn live_item(&self) -> Option<&RundownItem> {
        self.state()?.current_item_id.and_then(|id| self.item(id))
    }

    pub fn preview_item(&self) -> Option<&RundownItem> {
        self.state()?.preview_item_id.and_then(|id| self.item(id))
    }

    pub fn link(&self) -> Option<Tier> {
        self.link
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> f64 {
        self.timer.elapsed(now)
    }

    pub fn timer(&self) -> &TimerFeed {
        &self.timer
    }

    /// Wraps a button press for the authority. Stamps are strictly increasing
    /// per follower so two quick presses are never read as a duplicate.
    pub fn stamp(&mut self, button: Button, now: DateTime<Utc>) -> ActionEnvelope {
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + Duration::milliseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        let index = self.next_index;
        self.next_index = self.next_index.wrapping_add(1);
        ActionEnvelope::new(button, stamp).with_index(index)
    }
}

#[cfg(test)]
#[path = "tests/follower_tests.rs"]
mod tests;
