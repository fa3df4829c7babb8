use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use shared::domain::EpisodeId;
use tracing::warn;

pub const SETTINGS_FILE: &str = "rundown.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub server_bind: String,
    pub database_url: String,
    pub episode_id: Option<EpisodeId>,
    pub scene_sink_url: Option<String>,
    pub staleness_window_ms: u64,
    pub tick_interval_ms: u64,
    pub pulse_interval_ms: u64,
    pub scratch_poll_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:8787".into(),
            database_url: "sqlite://./data/rundown.db".into(),
            episode_id: None,
            scene_sink_url: None,
            staleness_window_ms: 5_000,
            tick_interval_ms: 100,
            pulse_interval_ms: 1_000,
            scratch_poll_ms: 100,
        }
    }
}

impl Settings {
    pub fn staleness_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(i64::try_from(self.staleness_window_ms).unwrap_or(i64::MAX))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn pulse_interval(&self) -> Duration {
        Duration::from_millis(self.pulse_interval_ms.max(1))
    }

    pub fn scratch_poll(&self) -> Duration {
        Duration::from_millis(self.scratch_poll_ms.max(1))
    }
}

pub fn load_settings() -> Settings {
    let file = fs::read_to_string(SETTINGS_FILE).ok();
    load_settings_from(file.as_deref(), |key| std::env::var(key).ok())
}

/// Defaults, then the optional settings file, then environment overrides.
pub fn load_settings_from(
    file: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Settings {
    let mut settings = Settings::default();

    if let Some(raw) = file {
        match toml::from_str::<toml::Table>(raw) {
            Ok(table) => apply_file(&mut settings, &table),
            Err(error) => warn!(%error, file = SETTINGS_FILE, "ignoring unreadable settings file"),
        }
    }

    if let Some(v) = env("SERVER_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = env("APP__EPISODE_ID") {
        if let Ok(parsed) = v.trim().parse::<i64>() {
            settings.episode_id = Some(EpisodeId(parsed));
        }
    }
    if let Some(v) = env("APP__SCENE_SINK_URL") {
        settings.scene_sink_url = Some(v).filter(|url| !url.trim().is_empty());
    }

    for (key, slot) in [
        ("APP__STALENESS_WINDOW_MS", &mut settings.staleness_window_ms),
        ("APP__TICK_INTERVAL_MS", &mut settings.tick_interval_ms),
        ("APP__PULSE_INTERVAL_MS", &mut settings.pulse_interval_ms),
        ("APP__SCRATCH_POLL_MS", &mut settings.scratch_poll_ms),
    ] {
        if let Some(parsed) = env(key).and_then(|v| v.trim().parse::<u64>().ok()) {
            *slot = parsed;
        }
    }

    settings
}

fn apply_file(settings: &mut Settings, table: &toml::Table) {
    if let Some(v) = table.get("bind_addr").and_then(toml::Value::as_str) {
        settings.server_bind = v.to_string();
    }
    if let Some(v) = table.get("database_url").and_then(toml::Value::as_str) {
        settings.database_url = v.to_string();
    }
    if let Some(v) = table.get("episode_id").and_then(toml::Value::as_integer) {
        settings.episode_id = Some(EpisodeId(v));
    }
    if let Some(v) = table.get("scene_sink_url").and_then(toml::Value::as_str) {
        settings.scene_sink_url = Some(v.to_string());
    }
    for (key, slot) in [
        ("staleness_window_ms", &mut settings.staleness_window_ms),
        ("tick_interval_ms", &mut settings.tick_interval_ms),
        ("pulse_interval_ms", &mut settings.pulse_interval_ms),
        ("scratch_poll_ms", &mut settings.scratch_poll_ms),
    ] {
        if let Some(v) = table
            .get(key)
            .and_then(toml::Value::as_integer)
            .and_then(|v| u64::try_from(v).ok())
        {
            *slot = v;
        }
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    ensure_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

fn ensure_parent_dir_exists(database_url: &str) -> anyhow::Result<()> {
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
#[path = "tests/config_tests.rs"]
mod tests;
