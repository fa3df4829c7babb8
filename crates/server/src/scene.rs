//! Outbound scene-switcher commands. Delivery is fire-and-forget: failures
//! are logged and never reach the state machine.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use engine::SceneCommand;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use url::Url;

#[async_trait]
pub trait SceneSink: Send + Sync {
    async fn dispatch(&self, command: &SceneCommand) -> anyhow::Result<()>;
}

/// Used when no switcher endpoint is configured.
pub struct LogSceneSink;

#[async_trait]
impl SceneSink for LogSceneSink {
    async fn dispatch(&self, command: &SceneCommand) -> anyhow::Result<()> {
        debug!(?command, "scene command (no sink configured)");
        Ok(())
    }
}

pub struct HttpSceneSink {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpSceneSink {
    pub fn new(endpoint: &str) -> anyhow::Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid scene sink url '{endpoint}'"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .context("failed to build scene sink http client")?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl SceneSink for HttpSceneSink {
    async fn dispatch(&self, command: &SceneCommand) -> anyhow::Result<()> {
        self.client
            .post(self.endpoint.clone())
            .json(command)
            .send()
            .await
            .with_context(|| format!("scene sink {} unreachable", self.endpoint))?
            .error_for_status()
            .context("scene sink rejected command")?;
        Ok(())
    }
}

pub fn sink_from_settings(scene_sink_url: Option<&str>) -> anyhow::Result<Arc<dyn SceneSink>> {
    match scene_sink_url {
        Some(url) => Ok(Arc::new(HttpSceneSink::new(url)?)),
        None => Ok(Arc::new(LogSceneSink)),
    }
}

/// Delivers commands in order on a background task.
pub fn spawn_dispatcher(sink: Arc<dyn SceneSink>) -> mpsc::UnboundedSender<SceneCommand> {
    let (tx, mut rx) = mpsc::unbounded_channel::<SceneCommand>();
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            if let Err(error) = sink.dispatch(&command).await {
                warn!(error = %format!("{error:#}"), ?command, "scene command failed");
            }
        }
    });
    tx
}

#[cfg(test)]
#[path = "tests/scene_tests.rs"]
mod tests;
