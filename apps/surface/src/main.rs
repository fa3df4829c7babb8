use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, ValueEnum};
use client_core::{Follower, SupervisorConfig};
use shared::{
    domain::{EpisodeId, SurfaceRole},
    protocol::Subscription,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod input;
mod render;

use input::{parse_line, Input, HELP};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Control,
    Presenter,
    Pad,
}

impl From<Role> for SurfaceRole {
    fn from(role: Role) -> Self {
        match role {
            Role::Control => SurfaceRole::Control,
            Role::Presenter => SurfaceRole::Presenter,
            Role::Pad => SurfaceRole::Pad,
        }
    }
}

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, value_enum, default_value = "control")]
    role: Role,
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    server_url: String,
    /// Presenters only follow this episode.
    #[arg(long)]
    episode_id: Option<i64>,
    /// Host the authority in this process and join it over the local bus.
    #[arg(long)]
    embedded: bool,
    #[arg(long, default_value_t = 500)]
    poll_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let (server_url, bus, authority) = if args.embedded {
        let running = server::start(server::config::load_settings()).await?;
        info!(addr = %running.local_addr, "embedded authority started");
        (
            format!("http://{}", running.local_addr),
            Some(running.bus.clone()),
            Some(running),
        )
    } else {
        (args.server_url.clone(), None, None)
    };

    let subscription = Subscription {
        role: args.role.into(),
        episode_id: args.episode_id.map(EpisodeId),
    };
    let config = SupervisorConfig {
        poll_interval: Duration::from_millis(args.poll_ms.max(1)),
        ..SupervisorConfig::default()
    };
    let mut sync = client_core::connect(&server_url, bus, subscription, config)?;
    let mut follower = Follower::new(subscription);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut clock = tokio::time::interval(Duration::from_secs(1));
    let presenter = args.role == Role::Presenter;

    println!("{HELP}");
    loop {
        tokio::select! {
            event = sync.next_event() => {
                let Some(event) = event else {
                    warn!("sync supervisor stopped");
                    break;
                };
                if follower.apply_event(event, Utc::now()) && !presenter {
                    println!("{}", render::status_line(&follower));
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(&line) {
                    Ok(Input::Press(button)) => {
                        sync.send(follower.stamp(button, Utc::now())).await?;
                    }
                    Ok(Input::Status) => println!("{}", render::status_line(&follower)),
                    Ok(Input::Quit) => break,
                    Err(error) => eprintln!("{error}; {HELP}"),
                }
            }
            _ = clock.tick(), if presenter => {
                println!(
                    "{}  {}",
                    render::timer_line(&follower, Utc::now()),
                    render::status_line(&follower)
                );
            }
        }
    }

    sync.shutdown();
    if let Some(authority) = authority {
        authority.shutdown();
    }
    Ok(())
}
