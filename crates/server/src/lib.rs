use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use shared::{bus::LocalBus, domain::EpisodeId};
use storage::{ContentSource, Storage};
use tokio::{net::TcpListener, task::JoinHandle};
use tracing::{error, info, warn};

mod app_state;
pub mod authority;
pub mod config;
pub mod routes;
pub mod scene;
pub mod scratch;

use app_state::AppState;
use authority::{spawn_authority, AuthorityConfig, AuthorityHandle};
use config::{prepare_database_url, Settings};
use scene::{sink_from_settings, spawn_dispatcher};
use scratch::ScratchSpace;

/// A bound authority: HTTP/WebSocket listener plus the in-process bus for
/// surfaces sharing this process.
pub struct RunningServer {
    pub local_addr: SocketAddr,
    pub bus: LocalBus,
    pub authority: AuthorityHandle,
    serve: JoinHandle<std::io::Result<()>>,
}

impl RunningServer {
    pub async fn wait(self) -> anyhow::Result<()> {
        self.serve.await.context("server task panicked")??;
        Ok(())
    }

    pub fn shutdown(&self) {
        self.serve.abort();
    }
}

pub async fn start(settings: Settings) -> anyhow::Result<RunningServer> {
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    start_with_content(settings, Arc::new(storage)).await
}

pub async fn start_with_content(
    settings: Settings,
    content: Arc<dyn ContentSource>,
) -> anyhow::Result<RunningServer> {
    let scratch = Arc::new(ScratchSpace::new());
    let (bus, bus_actions) = LocalBus::new(256);
    let scene = spawn_dispatcher(sink_from_settings(settings.scene_sink_url.as_deref())?);
    let authority = spawn_authority(
        AuthorityConfig::from(&settings),
        Some((bus.clone(), bus_actions)),
        scratch.clone(),
        scene,
    );

    if let Some(episode_id) = settings.episode_id {
        load_initial_episode(&authority, content.as_ref(), episode_id).await;
    }

    let app = routes::build_router(Arc::new(AppState {
        authority: authority.clone(),
        content,
        scratch,
    }));
    let listener = TcpListener::bind(&settings.server_bind)
        .await
        .with_context(|| format!("failed to bind {}", settings.server_bind))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "authority listening");
    let serve = tokio::spawn(async move { axum::serve(listener, app).await });

    Ok(RunningServer {
        local_addr,
        bus,
        authority,
        serve,
    })
}

async fn load_initial_episode(
    authority: &AuthorityHandle,
    content: &dyn ContentSource,
    episode_id: EpisodeId,
) {
    match content.has_episode(episode_id).await {
        Ok(true) => {}
        Ok(false) => {
            warn!(episode_id = episode_id.0, "configured episode not found; starting empty");
            return;
        }
        Err(error) => {
            warn!(episode_id = episode_id.0, %error, "content source unavailable; starting empty");
            return;
        }
    }
    let loaded = match content.get_segments(episode_id).await {
        Ok(segments) => authority.load_episode(episode_id, segments).await,
        Err(error) => Err(error),
    };
    if let Err(error) = loaded {
        warn!(episode_id = episode_id.0, %error, "initial episode load failed");
    }
}
