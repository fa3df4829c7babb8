//! In-process publish/subscribe channel used when a surface shares the
//! authority's process. Carries the same frames as the socket tier.

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, watch};

use crate::protocol::{ActionEnvelope, SyncMessage};

#[derive(Debug, Error)]
#[error("local bus is closed")]
pub struct BusClosed;

#[derive(Clone)]
pub struct LocalBus {
    frames: broadcast::Sender<SyncMessage>,
    latest_state: watch::Sender<Option<SyncMessage>>,
    actions: mpsc::Sender<ActionEnvelope>,
}

impl LocalBus {
    /// Returns the bus handle and the action receiver the authority drains.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ActionEnvelope>) {
        let (frames, _) = broadcast::channel(capacity);
        let (latest_state, _) = watch::channel(None);
        let (actions, actions_rx) = mpsc::channel(capacity);
        (
            Self {
                frames,
                latest_state,
                actions,
            },
            actions_rx,
        )
    }

    pub fn publish(&self, message: SyncMessage) {
        if matches!(message, SyncMessage::State(_)) {
            self.latest_state.send_replace(Some(message.clone()));
        }
        let _ = self.frames.send(message);
    }

    /// The most recent state frame plus a receiver for everything after it.
    pub fn subscribe(&self) -> (Option<SyncMessage>, broadcast::Receiver<SyncMessage>) {
        let rx = self.frames.subscribe();
        let latest = self.latest_state.borrow().clone();
        (latest, rx)
    }

    pub async fn send_action(&self, action: ActionEnvelope) -> Result<(), BusClosed> {
        self.actions.send(action).await.map_err(|_| BusClosed)
    }

    pub fn is_open(&self) -> bool {
        !self.actions.is_closed()
    }

    /// Resolves once the authority has dropped its action receiver.
    pub async fn closed(&self) {
        self.actions.closed().await
    }
}
