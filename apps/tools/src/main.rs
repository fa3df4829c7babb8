use std::fs;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use shared::domain::{
    AutomationMode, CueId, EpisodeId, ItemId, ItemKind, OverlayPersistence, OverlaySettings,
    RundownItem, Segment, SegmentId,
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/rundown.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    CreateEpisode {
        title: String,
    },
    ListEpisodes,
    DeleteEpisode {
        episode_id: i64,
    },
    /// Print an episode's rundown as JSON.
    Show {
        episode_id: i64,
    },
    /// Create an episode from a JSON array of segments.
    Import {
        title: String,
        path: String,
    },
    AddSegment {
        episode_id: i64,
        title: String,
        #[arg(long, default_value_t = 0)]
        allotted_seconds: u32,
    },
    AddCue {
        segment_id: i64,
        #[arg(default_value = "")]
        title: String,
    },
    AddItem {
        cue_id: i64,
        title: String,
        /// standard_media, manual_block, presenter_note, overlay or other.
        #[arg(long, default_value = "standard_media")]
        kind: String,
        /// Auto-advance after this many seconds.
        #[arg(long)]
        auto_seconds: Option<f64>,
        #[arg(long, default_value_t = 0.0)]
        in_point: f64,
        #[arg(long, default_value_t = 0.0)]
        duration: f64,
        /// auto_out, leave_in_local, leave_in_global or manual.
        #[arg(long, default_value = "auto_out")]
        persistence: String,
    },
    AddManualItem {
        item_id: i64,
        title: String,
    },
}

fn build_item(
    cue_id: i64,
    title: String,
    kind: &str,
    auto_seconds: Option<f64>,
    in_point: f64,
    duration: f64,
    persistence: &str,
) -> Result<RundownItem> {
    let kind = ItemKind::parse(kind).ok_or_else(|| anyhow!("unknown item kind '{kind}'"))?;
    let overlay = if kind == ItemKind::Overlay {
        let persistence = OverlayPersistence::parse(persistence)
            .ok_or_else(|| anyhow!("unknown persistence '{persistence}'"))?;
        Some(OverlaySettings {
            in_point_seconds: in_point,
            duration_seconds: duration,
            persistence,
            color_index: None,
        })
    } else {
        None
    };
    Ok(RundownItem {
        id: ItemId(0),
        kind,
        cue_id: CueId(cue_id),
        title,
        automation_mode: if auto_seconds.is_some() {
            AutomationMode::Auto
        } else {
            AutomationMode::Manual
        },
        automation_duration_seconds: auto_seconds.unwrap_or_default(),
        overlay,
        manual_items: Vec::new(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::CreateEpisode { title } => {
            let episode_id = storage.create_episode(&title).await?;
            println!("created episode_id={}", episode_id.0);
        }
        Command::ListEpisodes => {
            for episode in storage.list_episodes().await? {
                println!(
                    "{}\t{}\t{}",
                    episode.episode_id.0, episode.title, episode.created_at
                );
            }
        }
        Command::DeleteEpisode { episode_id } => {
            if storage.delete_episode(EpisodeId(episode_id)).await? {
                println!("deleted episode_id={episode_id}");
            } else {
                println!("episode_id={episode_id} not found");
            }
        }
        Command::Show { episode_id } => {
            let segments = storage.load_segments(EpisodeId(episode_id)).await?;
            println!("{}", serde_json::to_string_pretty(&segments)?);
        }
        Command::Import { title, path } => {
            let raw = fs::read_to_string(&path).with_context(|| format!("failed to read {path}"))?;
            let segments: Vec<Segment> =
                serde_json::from_str(&raw).with_context(|| format!("{path} is not a rundown"))?;
            let episode_id = storage.import_episode(&title, &segments).await?;
            println!("imported episode_id={} ({} segments)", episode_id.0, segments.len());
        }
        Command::AddSegment {
            episode_id,
            title,
            allotted_seconds,
        } => {
            let segment_id = storage
                .add_segment(EpisodeId(episode_id), &title, allotted_seconds)
                .await?;
            println!("created segment_id={}", segment_id.0);
        }
        Command::AddCue { segment_id, title } => {
            let cue_id = storage.add_cue(SegmentId(segment_id), &title).await?;
            println!("created cue_id={}", cue_id.0);
        }
        Command::AddItem {
            cue_id,
            title,
            kind,
            auto_seconds,
            in_point,
            duration,
            persistence,
        } => {
            let item = build_item(
                cue_id,
                title,
                &kind,
                auto_seconds,
                in_point,
                duration,
                &persistence,
            )?;
            let item_id = storage.add_item(CueId(cue_id), &item).await?;
            println!("created item_id={}", item_id.0);
        }
        Command::AddManualItem { item_id, title } => {
            let manual_item_id = storage.add_manual_item(ItemId(item_id), &title).await?;
            println!("created manual_item_id={}", manual_item_id.0);
        }
    }

    Ok(())
}
