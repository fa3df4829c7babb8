use async_trait::async_trait;
use futures::{stream, StreamExt};
use shared::{
    bus::LocalBus,
    protocol::{ActionEnvelope, Subscription},
};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::warn;

use super::{accepts, FrameStream, SyncTransport, Tier, TransportError};

/// Secondary tier: surfaces running in the authority's process talk over the
/// in-memory bus instead of a socket.
#[derive(Clone)]
pub struct LocalBusTransport {
    bus: LocalBus,
}

impl LocalBusTransport {
    pub fn new(bus: LocalBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl SyncTransport for LocalBusTransport {
    fn tier(&self) -> Tier {
        Tier::LocalBus
    }

    async fn is_available(&self) -> bool {
        self.bus.is_open()
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<FrameStream, TransportError> {
        if !self.bus.is_open() {
            return Err(TransportError::unavailable(Tier::LocalBus, "bus is closed"));
        }
        let (latest, rx) = self.bus.subscribe();
        let live = BroadcastStream::new(rx).filter_map(|frame| async move {
            match frame {
                Ok(frame) => Some(frame),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "local bus follower lagging");
                    None
                }
            }
        });
        let bus = self.bus.clone();
        let frames = stream::iter(latest)
            .chain(live)
            .take_until(async move { bus.closed().await })
            .filter(move |frame| futures::future::ready(accepts(&subscription, frame)));
        Ok(frames.boxed())
    }

    async fn send(&self, action: ActionEnvelope) -> Result<(), TransportError> {
        self.bus
            .send_action(action)
            .await
            .map_err(|closed| TransportError::unavailable(Tier::LocalBus, closed))
    }
}
