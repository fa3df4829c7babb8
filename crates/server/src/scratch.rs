//! Tertiary sync tier: a small shared space the authority writes frames into
//! and followers poll over HTTP. Actions posted by followers queue here until
//! the authority drains them on its poll interval.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

use shared::protocol::{ActionEnvelope, Snapshot, SyncMessage, TimerPulse};

const MAX_PENDING_ACTIONS: usize = 64;

#[derive(Debug, Default)]
struct Frames {
    state: Option<Snapshot>,
    timer: Option<TimerPulse>,
}

#[derive(Debug, Default)]
pub struct ScratchSpace {
    frames: Mutex<Frames>,
    actions: Mutex<VecDeque<ActionEnvelope>>,
}

impl ScratchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_state(&self, snapshot: Snapshot) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .state = Some(snapshot);
    }

    pub fn write_timer(&self, pulse: TimerPulse) {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .timer = Some(pulse);
    }

    /// The latest state frame followed by the latest timer pulse, whichever exist.
    pub fn read_frames(&self) -> Vec<SyncMessage> {
        let frames = self.frames.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::with_capacity(2);
        if let Some(state) = &frames.state {
            out.push(SyncMessage::State(state.clone()));
        }
        if let Some(timer) = frames.timer {
            out.push(SyncMessage::Timer(timer));
        }
        out
    }

    /// Queues a follower action. The oldest entry is dropped when the queue is
    /// full; the staleness window would reject it anyway.
    pub fn post_action(&self, action: ActionEnvelope) {
        let mut actions = self.actions.lock().unwrap_or_else(PoisonError::into_inner);
        if actions.len() >= MAX_PENDING_ACTIONS {
            actions.pop_front();
        }
        actions.push_back(action);
    }

    pub fn take_actions(&self) -> Vec<ActionEnvelope> {
        self.actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}
