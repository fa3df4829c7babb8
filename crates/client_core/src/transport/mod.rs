use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use shared::protocol::{ActionEnvelope, Subscription, SyncMessage};
use thiserror::Error;

mod local;
mod polling;
mod ws;

pub use local::LocalBusTransport;
pub use polling::PollingTransport;
pub use ws::WebSocketTransport;

/// Sync tiers in preference order: lower sorts first and is preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Socket,
    LocalBus,
    Polling,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Socket => "socket",
            Tier::LocalBus => "local_bus",
            Tier::Polling => "polling",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{tier} transport unavailable: {reason}")]
    Unavailable { tier: Tier, reason: String },
    #[error("{0} transport is not subscribed")]
    NotSubscribed(Tier),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl TransportError {
    pub fn unavailable(tier: Tier, reason: impl fmt::Display) -> Self {
        Self::Unavailable {
            tier,
            reason: reason.to_string(),
        }
    }
}

/// Inbound frames for one link. The stream ending means the link is gone.
pub type FrameStream = BoxStream<'static, SyncMessage>;

/// One rung of the tier ladder. Implementations carry the same frames; only
/// latency and reachability differ.
#[async_trait]
pub trait SyncTransport: Send + Sync {
    fn tier(&self) -> Tier;

    /// Cheap liveness probe used before connecting and when looking to
    /// promote back to this tier.
    async fn is_available(&self) -> bool;

    async fn subscribe(&self, subscription: Subscription) -> Result<FrameStream, TransportError>;

    async fn send(&self, action: ActionEnvelope) -> Result<(), TransportError>;
}

/// Applies the presenter episode filter on tiers that cannot filter
/// server-side. Non-state frames always pass.
pub(crate) fn accepts(subscription: &Subscription, frame: &SyncMessage) -> bool {
    match frame {
        SyncMessage::State(snapshot) => subscription.accepts(snapshot),
        SyncMessage::Timer(_) => true,
        SyncMessage::Action(_) | SyncMessage::Subscribe(_) => false,
    }
}

pub(crate) fn http_to_ws(server_url: &str) -> Option<String> {
    let server_url = server_url.trim_end_matches('/');
    if server_url.starts_with("https://") {
        Some(server_url.replacen("https://", "wss://", 1))
    } else if server_url.starts_with("http://") {
        Some(server_url.replacen("http://", "ws://", 1))
    } else {
        None
    }
}

#[cfg(test)]
#[path = "../tests/transport_tests.rs"]
mod tests;
