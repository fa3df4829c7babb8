use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use shared::protocol::{ActionEnvelope, Subscription, SyncMessage};
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

use super::{http_to_ws, FrameStream, SyncTransport, Tier, TransportError};

/// Primary tier: one persistent full-duplex socket to the authority.
pub struct WebSocketTransport {
    health_url: Url,
    ws_url: String,
    client: reqwest::Client,
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
}

impl WebSocketTransport {
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        let ws_base = http_to_ws(server_url)
            .ok_or_else(|| anyhow!("server_url must start with http:// or https://"))?;
        let health_url = Url::parse(server_url)
            .and_then(|base| base.join("healthz"))
            .with_context(|| format!("invalid server url '{server_url}'"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            health_url,
            ws_url: format!("{ws_base}/ws"),
            client,
            outbound: Mutex::new(None),
        })
    }
}

#[async_trait]
impl SyncTransport for WebSocketTransport {
    fn tier(&self) -> Tier {
        Tier::Socket
    }

    async fn is_available(&self) -> bool {
        self.client
            .get(self.health_url.clone())
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<FrameStream, TransportError> {
        let (ws_stream, _) = connect_async(&self.ws_url)
            .await
            .map_err(|error| TransportError::unavailable(Tier::Socket, error))?;
        let (mut writer, reader) = ws_stream.split();

        let hello = SyncMessage::Subscribe(subscription).to_text()?;
        writer
            .send(Message::Text(hello))
            .await
            .map_err(|error| TransportError::unavailable(Tier::Socket, error))?;

        let (tx, mut rx) = mpsc::channel::<Message>(64);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if writer.send(message).await.is_err() {
                    break;
                }
            }
            let _ = writer.close().await;
        });
        *self.outbound.lock().await = Some(tx);
        debug!(url = %self.ws_url, "socket subscribed");

        let frames = reader
            .take_while(|message| future::ready(message.is_ok()))
            .filter_map(|message| async move {
                match message {
                    Ok(Message::Text(text)) => match SyncMessage::from_text(&text) {
                        Ok(frame) => Some(frame),
                        Err(error) => {
                            warn!(%error, "malformed frame from authority");
                            None
                        }
                    },
                    _ => None,
                }
            });
        Ok(frames.boxed())
    }

    async fn send(&self, action: ActionEnvelope) -> Result<(), TransportError> {
        let outbound = self
            .outbound
            .lock()
            .await
            .clone()
            .ok_or(TransportError::NotSubscribed(Tier::Socket))?;
        let text = SyncMessage::Action(action).to_text()?;
        outbound
            .send(Message::Text(text))
            .await
            .map_err(|_| TransportError::unavailable(Tier::Socket, "socket writer closed"))
    }
}
