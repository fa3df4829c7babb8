use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::warn;

use shared::domain::{
    AutomationMode, Cue, CueId, EpisodeId, ItemId, ItemKind, ManualItem, ManualItemId,
    OverlayPersistence, OverlaySettings, RundownItem, Segment, SegmentId,
};

/// Read-only rundown content. The authority reads it at session start and on
/// explicit refresh, never as a live feed.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn get_segments(&self, episode_id: EpisodeId) -> Result<Vec<Segment>>;

    async fn has_episode(&self, episode_id: EpisodeId) -> Result<bool>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct EpisodeSummary {
    pub episode_id: EpisodeId,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn create_episode(&self, title: &str) -> Result<EpisodeId> {
        let rec = sqlx::query("INSERT INTO episodes (title) VALUES (?) RETURNING id")
            .bind(title)
            .fetch_one(&self.pool)
            .await?;
        Ok(EpisodeId(rec.get::<i64, _>(0)))
    }

    pub async fn list_episodes(&self) -> Result<Vec<EpisodeSummary>> {
        let rows = sqlx::query("SELECT id, title, created_at FROM episodes ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| EpisodeSummary {
                episode_id: EpisodeId(r.get::<i64, _>(0)),
                title: r.get::<String, _>(1),
                created_at: r.get::<DateTime<Utc>, _>(2),
            })
            .collect())
    }

    pub async fn episode_exists(&self, episode_id: EpisodeId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM episodes WHERE id = ?")
            .bind(episode_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn delete_episode(&self, episode_id: EpisodeId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM episodes WHERE id = ?")
            .bind(episode_id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Appends a segment at the end of the episode.
    pub async fn add_segment(
        &self,
        episode_id: EpisodeId,
        title: &str,
        allotted_time_seconds: u32,
    ) -> Result<SegmentId> {
        let rec = sqlx::query(
            "INSERT INTO segments (episode_id, position, title, allotted_time_seconds)
             VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM segments WHERE episode_id = ?1), ?2, ?3)
             RETURNING id",
        )
        .bind(episode_id.0)
        .bind(title)
        .bind(i64::from(allotted_time_seconds))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to add segment to episode {}", episode_id.0))?;
        Ok(SegmentId(rec.get::<i64, _>(0)))
    }

    pub async fn add_cue(&self, segment_id: SegmentId, title: &str) -> Result<CueId> {
        let rec = sqlx::query(
            "INSERT INTO cues (segment_id, position, title)
             VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM cues WHERE segment_id = ?1), ?2)
             RETURNING id",
        )
        .bind(segment_id.0)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to add cue to segment {}", segment_id.0))?;
        Ok(CueId(rec.get::<i64, _>(0)))
    }

    /// Appends `item` to the cue, together with its manual items. The ids
    /// carried by `item` are ignored; fresh ones are assigned.
    pub async fn add_item(&self, cue_id: CueId, item: &RundownItem) -> Result<ItemId> {
        let overlay = item.overlay.as_ref();
        let rec = sqlx::query(
            "INSERT INTO items (
                cue_id, position, kind, title, automation_mode, automation_duration_seconds,
                in_point_seconds, duration_seconds, persistence, color_index
             )
             VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM items WHERE cue_id = ?1),
                     ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             RETURNING id",
        )
        .bind(cue_id.0)
        .bind(item.kind.as_str())
        .bind(&item.title)
        .bind(item.automation_mode.as_str())
        .bind(item.automation_duration_seconds)
        .bind(overlay.map(|o| o.in_point_seconds))
        .bind(overlay.map(|o| o.duration_seconds))
        .bind(overlay.map(|o| o.persistence.as_str()))
        .bind(overlay.and_then(|o| o.color_index).map(i64::from))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to add item to cue {}", cue_id.0))?;
        let item_id = ItemId(rec.get::<i64, _>(0));

        for manual in &item.manual_items {
            self.add_manual_item(item_id, &manual.title).await?;
        }
        Ok(item_id)
    }

    pub async fn add_manual_item(&self, item_id: ItemId, title: &str) -> Result<ManualItemId> {
        let rec = sqlx::query(
            "INSERT INTO manual_items (item_id, position, title)
             VALUES (?1, (SELECT COALESCE(MAX(position), -1) + 1 FROM manual_items WHERE item_id = ?1), ?2)
             RETURNING id",
        )
        .bind(item_id.0)
        .bind(title)
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("failed to add manual item to item {}", item_id.0))?;
        Ok(ManualItemId(rec.get::<i64, _>(0)))
    }

    /// Seeds a whole rundown tree under a new episode.
    pub async fn import_episode(&self, title: &str, segments: &[Segment]) -> Result<EpisodeId> {
        let episode_id = self.create_episode(title).await?;
        for segment in segments {
            let segment_id = self
                .add_segment(episode_id, &segment.title, segment.allotted_time_seconds)
                .await?;
            for cue in &segment.cues {
                let cue_id = self.add_cue(segment_id, &cue.title).await?;
                for item in &cue.items {
                    self.add_item(cue_id, item).await?;
                }
            }
        }
        Ok(episode_id)
    }

    pub async fn load_segments(&self, episode_id: EpisodeId) -> Result<Vec<Segment>> {
        let manual_rows = sqlx::query(
            "SELECT m.id, m.item_id, m.title
             FROM manual_items m
             JOIN items i ON i.id = m.item_id
             JOIN cues c ON c.id = i.cue_id
             JOIN segments s ON s.id = c.segment_id
             WHERE s.episode_id = ?
             ORDER BY m.position, m.id",
        )
        .bind(episode_id.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to load manual items")?;
        let mut manual_by_item: HashMap<i64, Vec<ManualItem>> = HashMap::new();
        for r in manual_rows {
            manual_by_item
                .entry(r.get::<i64, _>(1))
                .or_default()
                .push(ManualItem {
                    id: ManualItemId(r.get::<i64, _>(0)),
                    title: r.get::<String, _>(2),
                });
        }

        let item_rows = sqlx::query(
            "SELECT i.id, i.cue_id, i.kind, i.title, i.automation_mode, i.automation_duration_seconds,
                    i.in_point_seconds, i.duration_seconds, i.persistence, i.color_index
             FROM items i
             JOIN cues c ON c.id = i.cue_id
             JOIN segments s ON s.id = c.segment_id
             WHERE s.episode_id = ?
             ORDER BY i.position, i.id",
        )
        .bind(episode_id.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to load items")?;
        let mut items_by_cue: HashMap<i64, Vec<RundownItem>> = HashMap::new();
        for r in item_rows {
            let mut item = item_from_row(&r);
            item.manual_items = manual_by_item.remove(&item.id.0).unwrap_or_default();
            items_by_cue.entry(item.cue_id.0).or_default().push(item);
        }

        let cue_rows = sqlx::query(
            "SELECT c.id, c.segment_id, c.title
             FROM cues c
             JOIN segments s ON s.id = c.segment_id
             WHERE s.episode_id = ?
             ORDER BY c.position, c.id",
        )
        .bind(episode_id.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to load cues")?;
        let mut cues_by_segment: HashMap<i64, Vec<Cue>> = HashMap::new();
        for r in cue_rows {
            let cue_id = r.get::<i64, _>(0);
            cues_by_segment
                .entry(r.get::<i64, _>(1))
                .or_default()
                .push(Cue {
                    id: CueId(cue_id),
                    title: r.get::<String, _>(2),
                    items: items_by_cue.remove(&cue_id).unwrap_or_default(),
                });
        }

        let segment_rows = sqlx::query(
            "SELECT id, title, allotted_time_seconds
             FROM segments
             WHERE episode_id = ?
             ORDER BY position, id",
        )
        .bind(episode_id.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to load segments")?;
        Ok(segment_rows
            .into_iter()
            .map(|r| {
                let segment_id = r.get::<i64, _>(0);
                Segment {
                    id: SegmentId(segment_id),
                    title: r.get::<String, _>(1),
                    allotted_time_seconds: u32::try_from(r.get::<i64, _>(2)).unwrap_or(0),
                    cues: cues_by_segment.remove(&segment_id).unwrap_or_default(),
                }
            })
            .collect())
    }
}

#[async_trait]
impl ContentSource for Storage {
    async fn get_segments(&self, episode_id: EpisodeId) -> Result<Vec<Segment>> {
        self.load_segments(episode_id).await
    }

    async fn has_episode(&self, episode_id: EpisodeId) -> Result<bool> {
        self.episode_exists(episode_id).await
    }
}

fn item_from_row(r: &SqliteRow) -> RundownItem {
    let id = ItemId(r.get::<i64, _>(0));
    let raw_kind = r.get::<String, _>(2);
    let kind = ItemKind::parse(&raw_kind).unwrap_or_else(|| {
        warn!(item_id = id.0, kind = %raw_kind, "unknown item kind, treating as other");
        ItemKind::Other
    });
    let overlay = (kind == ItemKind::Overlay).then(|| OverlaySettings {
        in_point_seconds: r.get::<Option<f64>, _>(6).unwrap_or(0.0),
        duration_seconds: r.get::<Option<f64>, _>(7).unwrap_or(0.0),
        persistence: r
            .get::<Option<String>, _>(8)
            .as_deref()
            .and_then(OverlayPersistence::parse)
            .unwrap_or_default(),
        color_index: r
            .get::<Option<i64>, _>(9)
            .and_then(|c| u8::try_from(c).ok()),
    });

    RundownItem {
        id,
        kind,
        cue_id: CueId(r.get::<i64, _>(1)),
        title: r.get::<String, _>(3),
        automation_mode: AutomationMode::parse(&r.get::<String, _>(4)).unwrap_or_default(),
        automation_duration_seconds: r.get::<f64, _>(5),
        overlay,
        manual_items: Vec::new(),
    }
}

/// In-memory content keyed by episode, for tests and file-backed rundowns.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    episodes: HashMap<EpisodeId, Vec<Segment>>,
}

impl StaticContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_episode(mut self, episode_id: EpisodeId, segments: Vec<Segment>) -> Self {
        self.episodes.insert(episode_id, segments);
        self
    }
}

#[async_trait]
impl ContentSource for StaticContent {
    async fn get_segments(&self, episode_id: EpisodeId) -> Result<Vec<Segment>> {
        Ok(self.episodes.get(&episode_id).cloned().unwrap_or_default())
    }

    async fn has_episode(&self, episode_id: EpisodeId) -> Result<bool> {
        Ok(self.episodes.contains_key(&episode_id))
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
