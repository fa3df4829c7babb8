//! The single task that owns the [`Engine`]. Every mutation, whether it comes
//! from a socket, the local bus, the scratch space or an HTTP route, is
//! funnelled through here in arrival order.

use std::{sync::Arc, time::Duration};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use engine::{ActionGate, ActionRejected, Engine, SceneCommand};
use shared::{
    bus::LocalBus,
    domain::{EpisodeId, Segment},
    protocol::{ActionEnvelope, Snapshot, SyncMessage},
};
use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{config::Settings, scratch::ScratchSpace};

/// Which tier an action arrived on, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionSource {
    Socket,
    LocalBus,
    Scratch,
}

impl ActionSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionSource::Socket => "socket",
            ActionSource::LocalBus => "local_bus",
            ActionSource::Scratch => "scratch",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorityConfig {
    pub staleness_window: chrono::Duration,
    pub tick_interval: Duration,
    pub pulse_interval: Duration,
    pub scratch_poll: Duration,
}

impl From<&Settings> for AuthorityConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            staleness_window: settings.staleness_window(),
            tick_interval: settings.tick_interval(),
            pulse_interval: settings.pulse_interval(),
            scratch_poll: settings.scratch_poll(),
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

enum Command {
    Action {
        action: ActionEnvelope,
        source: ActionSource,
    },
    LoadEpisode {
        episode_id: EpisodeId,
        segments: Vec<Segment>,
        reply: oneshot::Sender<Snapshot>,
    },
    Refresh {
        segments: Vec<Segment>,
        reply: oneshot::Sender<Snapshot>,
    },
}

/// Cloneable front door to the authority task.
#[derive(Clone)]
pub struct AuthorityHandle {
    commands: mpsc::Sender<Command>,
    frames: broadcast::Sender<SyncMessage>,
    latest: watch::Receiver<Snapshot>,
}

impl AuthorityHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.frames.subscribe()
    }

    pub fn latest(&self) -> Snapshot {
        self.latest.borrow().clone()
    }

    pub fn current_episode(&self) -> Option<EpisodeId> {
        self.latest.borrow().current_episode_id
    }

    pub async fn submit(&self, action: ActionEnvelope, source: ActionSource) -> anyhow::Result<()> {
        self.commands
            .send(Command::Action { action, source })
            .await
            .map_err(|_| anyhow!("authority task has stopped"))
    }

    pub async fn load_episode(
        &self,
        episode_id: EpisodeId,
        segments: Vec<Segment>,
    ) -> anyhow::Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::LoadEpisode {
                episode_id,
                segments,
                reply,
            })
            .await
            .map_err(|_| anyhow!("authority task has stopped"))?;
        rx.await.map_err(|_| anyhow!("authority dropped the load request"))
    }

    pub async fn refresh(&self, segments: Vec<Segment>) -> anyhow::Result<Snapshot> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Refresh { segments, reply })
            .await
            .map_err(|_| anyhow!("authority task has stopped"))?;
        rx.await
            .map_err(|_| anyhow!("authority dropped the refresh request"))
    }
}

/// Engine plus its outbound fan-out. Methods take `now` so the task loop and
/// the tests drive it the same way.
pub struct Authority {
    engine: Engine,
    gate: ActionGate,
    frames: broadcast::Sender<SyncMessage>,
    latest: watch::Sender<Snapshot>,
    bus: Option<LocalBus>,
    scratch: Arc<ScratchSpace>,
    scene: mpsc::UnboundedSender<SceneCommand>,
}

impl Authority {
    pub fn new(
        staleness_window: chrono::Duration,
        bus: Option<LocalBus>,
        scratch: Arc<ScratchSpace>,
        scene: mpsc::UnboundedSender<SceneCommand>,
    ) -> Self {
        let engine = Engine::new();
        let (frames, _) = broadcast::channel(256);
        let (latest, _) = watch::channel(engine.snapshot());
        let authority = Self {
            engine,
            gate: ActionGate::new(staleness_window),
            frames,
            latest,
            bus,
            scratch,
            scene,
        };
        authority.publish();
        authority
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn gate(&self) -> &ActionGate {
        &self.gate
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.frames.subscribe()
    }

    /// Admits the action through the staleness gate and applies it. Returns
    /// whether the state changed.
    pub fn apply_action(
        &mut self,
        action: ActionEnvelope,
        source: ActionSource,
        now: DateTime<Utc>,
    ) -> Result<bool, ActionRejected> {
        if let Err(rejected) = self.gate.admit(action.origin_timestamp, now) {
            debug!(source = source.as_str(), button = ?action.button, %rejected, "action discarded");
            return Err(rejected);
        }
        let changed = self.engine.apply_button(action.button, now);
        info!(
            source = source.as_str(),
            button = ?action.button,
            index = ?action.index,
            changed,
            "action applied"
        );
        if changed {
            self.publish();
        }
        self.flush_scene_commands();
        Ok(changed)
    }

    pub fn tick(&mut self, now: DateTime<Utc>) {
        if self.engine.tick(now) {
            self.publish();
        }
        self.flush_scene_commands();
    }

    pub fn pulse(&self, now: DateTime<Utc>) {
        let pulse = self.engine.timer_pulse(now);
        self.scratch.write_timer(pulse);
        let frame = SyncMessage::Timer(pulse);
        if let Some(bus) = &self.bus {
            bus.publish(frame.clone());
        }
        let _ = self.frames.send(frame);
    }

    pub fn drain_scratch(&mut self, now: DateTime<Utc>) {
        for action in self.scratch.take_actions() {
            let _ = self.apply_action(action, ActionSource::Scratch, now);
        }
    }

    pub fn load_episode(&mut self, episode_id: EpisodeId, segments: Vec<Segment>) -> Snapshot {
        self.engine.load_episode(episode_id, segments);
        self.publish()
    }

    pub fn refresh(&mut self, segments: Vec<Segment>, now: DateTime<Utc>) -> Snapshot {
        self.engine.refresh_rundown(segments, now);
        self.flush_scene_commands();
        self.publish()
    }

    fn publish(&self) -> Snapshot {
        let snapshot = self.engine.snapshot();
        self.latest.send_replace(snapshot.clone());
        self.scratch.write_state(snapshot.clone());
        let frame = SyncMessage::State(snapshot.clone());
        if let Some(bus) = &self.bus {
            bus.publish(frame.clone());
        }
        let receivers = self.frames.send(frame).unwrap_or(0);
        debug!(receivers, "snapshot published");
        snapshot
    }

    fn flush_scene_commands(&mut self) {
        for command in self.engine.take_scene_commands() {
            if self.scene.send(command).is_err() {
                warn!("scene dispatcher is gone; dropping command");
            }
        }
    }

    fn handle(&self, commands: mpsc::Sender<Command>) -> AuthorityHandle {
        AuthorityHandle {
            commands,
            frames: self.frames.clone(),
            latest: self.latest.subscribe(),
        }
    }

    fn handle_command(&mut self, command: Command, now: DateTime<Utc>) {
        match command {
            Command::Action { action, source } => {
                let _ = self.apply_action(action, source, now);
            }
            Command::LoadEpisode {
                episode_id,
                segments,
                reply,
            } => {
                let snapshot = self.load_episode(episode_id, segments);
                let _ = reply.send(snapshot);
            }
            Command::Refresh { segments, reply } => {
                let snapshot = self.refresh(segments, now);
                let _ = reply.send(snapshot);
            }
        }
    }

    async fn run(
        mut self,
        config: AuthorityConfig,
        mut commands: mpsc::Receiver<Command>,
        mut bus_actions: Option<mpsc::Receiver<ActionEnvelope>>,
    ) {
        let mut tick = tokio::time::interval(config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut pulse = tokio::time::interval(config.pulse_interval);
        pulse.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut scratch_poll = tokio::time::interval(config.scratch_poll);
        scratch_poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("authority task started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command, Utc::now()),
                    None => break,
                },
                Some(action) = recv_bus(&mut bus_actions) => {
                    let _ = self.apply_action(action, ActionSource::LocalBus, Utc::now());
                }
                _ = tick.tick() => self.tick(Utc::now()),
                _ = pulse.tick() => self.pulse(Utc::now()),
                _ = scratch_poll.tick() => self.drain_scratch(Utc::now()),
            }
        }
        info!("authority task stopped");
    }
}

async fn recv_bus(rx: &mut Option<mpsc::Receiver<ActionEnvelope>>) -> Option<ActionEnvelope> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Starts the authority task and returns its handle.
pub fn spawn_authority(
    config: AuthorityConfig,
    bus: Option<(LocalBus, mpsc::Receiver<ActionEnvelope>)>,
    scratch: Arc<ScratchSpace>,
    scene: mpsc::UnboundedSender<SceneCommand>,
) -> AuthorityHandle {
    let (bus, bus_actions) = match bus {
        Some((bus, actions)) => (Some(bus), Some(actions)),
        None => (None, None),
    };
    let authority = Authority::new(config.staleness_window, bus, scratch, scene);
    let (commands_tx, commands_rx) = mpsc::channel(256);
    let handle = authority.handle(commands_tx);
    tokio::spawn(authority.run(config, commands_rx, bus_actions));
    handle
}

#[cfg(test)]
#[path = "tests/authority_tests.rs"]
mod tests;
