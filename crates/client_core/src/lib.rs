//! Follower side of rundown sync: transports for each tier, the supervisor
//! that moves between them, and the render-side state mirror.

use anyhow::Result;
use shared::{bus::LocalBus, protocol::Subscription};

pub mod follower;
pub mod ladder;
pub mod supervisor;
pub mod timer_feed;
pub mod transport;

pub use follower::Follower;
pub use ladder::TierLadder;
pub use supervisor::{FollowerEvent, SupervisorConfig, SupervisorHandle, SyncSupervisor};
pub use timer_feed::TimerFeed;
pub use transport::{SyncTransport, Tier, TransportError};

/// Builds the standard ladder for `server_url` and starts supervising it.
pub fn connect(
    server_url: &str,
    bus: Option<LocalBus>,
    subscription: Subscription,
    config: SupervisorConfig,
) -> Result<SupervisorHandle> {
    let ladder = TierLadder::for_server(server_url, bus, config.poll_interval)?;
    Ok(SyncSupervisor::new(ladder, subscription, config).spawn())
}
