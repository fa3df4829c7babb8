use std::{sync::Arc, time::Duration};

use shared::bus::LocalBus;

use crate::transport::{
    LocalBusTransport, PollingTransport, SyncTransport, Tier, WebSocketTransport,
};

/// The transports a follower may use, highest preference first. At most one
/// transport per tier.
#[derive(Clone)]
pub struct TierLadder {
    rungs: Vec<Arc<dyn SyncTransport>>,
}

impl TierLadder {
    pub fn new(mut rungs: Vec<Arc<dyn SyncTransport>>) -> Self {
        rungs.sort_by_key(|rung| rung.tier());
        rungs.dedup_by_key(|rung| rung.tier());
        Self { rungs }
    }

    /// Socket and polling against `server_url`, plus the local bus when the
    /// surface shares the authority's process.
    pub fn for_server(
        server_url: &str,
        bus: Option<LocalBus>,
        poll_interval: Duration,
    ) -> anyhow::Result<Self> {
        let mut rungs: Vec<Arc<dyn SyncTransport>> = vec![
            Arc::new(WebSocketTransport::new(server_url)?),
            Arc::new(PollingTransport::with_interval(server_url, poll_interval)?),
        ];
        if let Some(bus) = bus {
            rungs.push(Arc::new(LocalBusTransport::new(bus)));
        }
        Ok(Self::new(rungs))
    }

    pub fn is_empty(&self) -> bool {
        self.rungs.is_empty()
    }

    pub fn tiers(&self) -> Vec<Tier> {
        self.rungs.iter().map(|rung| rung.tier()).collect()
    }

    pub fn top(&self) -> Option<Tier> {
        self.rungs.first().map(|rung| rung.tier())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SyncTransport>> {
        self.rungs.iter()
    }

    /// Rungs preferred over `tier`.
    pub fn above(&self, tier: Tier) -> impl Iterator<Item = &Arc<dyn SyncTransport>> {
        self.rungs.iter().take_while(move |rung| rung.tier() < tier)
    }

    /// Rungs less preferred than `tier`.
    pub fn below(&self, tier: Tier) -> impl Iterator<Item = &Arc<dyn SyncTransport>> {
        self.rungs.iter().filter(move |rung| rung.tier() > tier)
    }
}
