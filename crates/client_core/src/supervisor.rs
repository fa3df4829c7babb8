//! Keeps a follower linked to the authority over the best tier that works.
//! A lost stream demotes to the next reachable tier; a periodic probe promotes
//! back up once a preferred tier answers again.

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use futures::StreamExt;
use shared::protocol::{ActionEnvelope, Subscription, SyncMessage};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    ladder::TierLadder,
    transport::{FrameStream, SyncTransport, Tier},
};

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Scratch-space poll interval for the polling tier.
    pub poll_interval: Duration,
    pub promote_probe: Duration,
    pub reconnect_backoff: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            promote_probe: Duration::from_secs(2),
            reconnect_backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FollowerEvent {
    Connected(Tier),
    Frame(SyncMessage),
    /// Every tier is down; the surface should show its stale indicator.
    Disconnected,
}

pub struct SupervisorHandle {
    events: mpsc::Receiver<FollowerEvent>,
    actions: mpsc::Sender<ActionEnvelope>,
    task: JoinHandle<()>,
}

impl SupervisorHandle {
    pub async fn next_event(&mut self) -> Option<FollowerEvent> {
        self.events.recv().await
    }

    pub async fn send(&self, action: ActionEnvelope) -> anyhow::Result<()> {
        self.actions
            .send(action)
            .await
            .map_err(|_| anyhow!("sync supervisor has stopped"))
    }

    pub fn actions(&self) -> mpsc::Sender<ActionEnvelope> {
        self.actions.clone()
    }

    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type Link = (Arc<dyn SyncTransport>, FrameStream);

pub struct SyncSupervisor {
    ladder: TierLadder,
    subscription: Subscription,
    config: SupervisorConfig,
}

impl SyncSupervisor {
    pub fn new(ladder: TierLadder, subscription: Subscription, config: SupervisorConfig) -> Self {
        Self {
            ladder,
            subscription,
            config,
        }
    }

    pub fn spawn(self) -> SupervisorHandle {
        let (events_tx, events) = mpsc::channel(256);
        let (actions, actions_rx) = mpsc::channel(64);
        let task = tokio::spawn(self.run(events_tx, actions_rx));
        SupervisorHandle {
            events,
            actions,
            task,
        }
    }

    async fn open(&self, transport: &Arc<dyn SyncTransport>) -> Option<Link> {
        match transport.subscribe(self.subscription).await {
            Ok(frames) => Some((transport.clone(), frames)),
            Err(error) => {
                debug!(tier = %transport.tier(), %error, "tier unavailable");
                None
            }
        }
    }

    /// First tier, from the top, that accepts a subscription.
    async fn connect(&self) -> Option<Link> {
        for transport in self.ladder.iter() {
            if let Some(link) = self.open(transport).await {
                return Some(link);
            }
        }
        None
    }

    async fn promote(&self, active: Tier) -> Option<Link> {
        for transport in self.ladder.above(active) {
            if !transport.is_available().await {
                continue;
            }
            if let Some(link) = self.open(transport).await {
                return Some(link);
            }
        }
        None
    }

    /// Sends on the active tier, falling back down the ladder on failure.
    async fn send_action(&self, active: &Arc<dyn SyncTransport>, action: ActionEnvelope) {
        let error = match active.send(action.clone()).await {
            Ok(()) => return,
            Err(error) => error,
        };
        warn!(tier = %active.tier(), %error, "action send failed; trying lower tiers");
        for transport in self.ladder.below(active.tier()) {
            match transport.send(action.clone()).await {
                Ok(()) => {
                    info!(tier = %transport.tier(), "action delivered on fallback tier");
                    return;
                }
                Err(error) => debug!(tier = %transport.tier(), %error, "fallback send failed"),
            }
        }
        warn!(button = ?action.button, "no tier accepted the action; dropped");
    }

    async fn run(
        self,
        events: mpsc::Sender<FollowerEvent>,
        mut actions: mpsc::Receiver<ActionEnvelope>,
    ) {
        let mut announced_down = false;
        loop {
            let Some((mut transport, mut frames)) = self.connect().await else {
                if !announced_down {
                    warn!("every sync tier is down");
                    if events.send(FollowerEvent::Disconnected).await.is_err() {
                        return;
                    }
                    announced_down = true;
                }
                tokio::select! {
                    _ = tokio::time::sleep(self.config.reconnect_backoff) => {}
                    action = actions.recv() => match action {
                        Some(action) => warn!(button = ?action.button, "no link; action dropped"),
                        None => return,
                    },
                }
                continue;
            };
            announced_down = false;
            info!(tier = %transport.tier(), "sync link up");
            if events
                .send(FollowerEvent::Connected(transport.tier()))
                .await
                .is_err()
            {
                return;
            }

            let mut probe = interval_at(
                Instant::now() + self.config.promote_probe,
                self.config.promote_probe,
            );
            probe.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                let at_top = Some(transport.tier()) == self.ladder.top();
                tokio::select! {
                    frame = frames.next() => match frame {
                        Some(frame) => {
                            if events.send(FollowerEvent::Frame(frame)).await.is_err() {
                                return;
                            }
                        }
                        None => {
                            warn!(tier = %transport.tier(), "sync link lost; demoting");
                            break;
                        }
                    },
                    action = actions.recv() => match action {
                        Some(action) => self.send_action(&transport, action).await,
                        None => return,
                    },
                    _ = probe.tick(), if !at_top => {
                        if let Some((promoted, promoted_frames)) = self.promote(transport.tier()).await {
                            info!(from = %transport.tier(), to = %promoted.tier(), "sync link promoted");
                            transport = promoted;
                            frames = promoted_frames;
                            if events
                                .send(FollowerEvent::Connected(transport.tier()))
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/supervisor_tests.rs"]
mod tests;
