use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::{stream, StreamExt};
use reqwest::StatusCode;
use shared::protocol::{ActionEnvelope, Snapshot, Subscription, SyncMessage, TimerPulse};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, warn};
use url::Url;

use super::{accepts, FrameStream, SyncTransport, Tier, TransportError};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Last-resort tier: polls the authority's scratch space over plain HTTP and
/// posts actions into its queue.
pub struct PollingTransport {
    client: reqwest::Client,
    base: Url,
    interval: Duration,
}

impl PollingTransport {
    pub fn new(server_url: &str) -> anyhow::Result<Self> {
        Self::with_interval(server_url, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(server_url: &str, interval: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(server_url)
            .with_context(|| format!("invalid server url '{server_url}'"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            base,
            interval,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path)
            .map_err(|error| TransportError::unavailable(Tier::Polling, error))
    }
}

struct Poller {
    client: reqwest::Client,
    url: Url,
    ticks: Interval,
    subscription: Subscription,
    last_state: Option<Snapshot>,
    last_timer: Option<TimerPulse>,
}

impl Poller {
    async fn fetch(&self) -> reqwest::Result<Vec<SyncMessage>> {
        let response = self.client.get(self.url.clone()).send().await?;
        if response.status() == StatusCode::SERVICE_UNAVAILABLE {
            return Ok(Vec::new());
        }
        response.error_for_status()?.json().await
    }

    /// Frames that differ from what this follower already saw.
    fn fresh(&mut self, frames: Vec<SyncMessage>) -> Vec<SyncMessage> {
        let mut out = Vec::new();
        for frame in frames {
            if !accepts(&self.subscription, &frame) {
                continue;
            }
            match &frame {
                SyncMessage::State(snapshot) => {
                    if self.last_state.as_ref() == Some(snapshot) {
                        continue;
                    }
                    self.last_state = Some(snapshot.clone());
                }
                SyncMessage::Timer(pulse) => {
                    if self.last_timer == Some(*pulse) {
                        continue;
                    }
                    self.last_timer = Some(*pulse);
                }
                SyncMessage::Action(_) | SyncMessage::Subscribe(_) => continue,
            }
            out.push(frame);
        }
        out
    }
}

#[async_trait]
impl SyncTransport for PollingTransport {
    fn tier(&self) -> Tier {
        Tier::Polling
    }

    async fn is_available(&self) -> bool {
        let Ok(url) = self.endpoint("healthz") else {
            return false;
        };
        self.client
            .get(url)
            .send()
            .await
            .map(|response| response.status().is_success())
            .unwrap_or(false)
    }

    async fn subscribe(&self, subscription: Subscription) -> Result<FrameStream, TransportError> {
        if !self.is_available().await {
            return Err(TransportError::unavailable(
                Tier::Polling,
                "scratch space unreachable",
            ));
        }
        let mut ticks = tokio::time::interval(self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let poller = Poller {
            client: self.client.clone(),
            url: self.endpoint("scratch/state")?,
            ticks,
            subscription,
            last_state: None,
            last_timer: None,
        };

        let batches = stream::unfold(poller, |mut poller| async move {
            loop {
                poller.ticks.tick().await;
                match poller.fetch().await {
                    Ok(frames) => {
                        let fresh = poller.fresh(frames);
                        if !fresh.is_empty() {
                            return Some((fresh, poller));
                        }
                    }
                    Err(error) => {
                        warn!(%error, "scratch poll failed; dropping polling link");
                        return None;
                    }
                }
            }
        });
        debug!(base = %self.base, "polling scratch space");
        Ok(batches.flat_map(stream::iter).boxed())
    }

    async fn send(&self, action: ActionEnvelope) -> Result<(), TransportError> {
        self.client
            .post(self.endpoint("scratch/actions")?)
            .json(&action)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|error| TransportError::unavailable(Tier::Polling, error))?;
        Ok(())
    }
}
