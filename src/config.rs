//! Application configuration.
//!
//! Loaded from `conf/config.toml` (or `--config`). Missing or invalid entries
//! fall back to defaults so a session can always start. Values here are the
//! starting point; per-content overrides in the cache take precedence.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_max_time_diff")]
    pub max_time_diff: f64,
    #[serde(default = "default_look_ahead_limit")]
    pub look_ahead_limit: usize,
    #[serde(default = "default_subtitle_offset")]
    pub subtitle_offset: f64,
    #[serde(default = "default_save_progress_interval_ms")]
    pub save_progress_interval_ms: u64,
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_video_file")]
    pub video_file: String,
    #[serde(default = "default_primary_track")]
    pub primary_track: String,
    #[serde(default = "default_secondary_track")]
    pub secondary_track: String,
    #[serde(default)]
    pub log_level: LogLevel,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            max_time_diff: default_max_time_diff(),
            look_ahead_limit: default_look_ahead_limit(),
            subtitle_offset: default_subtitle_offset(),
            save_progress_interval_ms: default_save_progress_interval_ms(),
            frame_interval_ms: default_frame_interval_ms(),
            cache_dir: default_cache_dir(),
            video_file: default_video_file(),
            primary_track: default_primary_track(),
            secondary_track: default_secondary_track(),
            log_level: LogLevel::default(),
        }
    }
}

impl AppConfig {
    pub fn save_progress_interval(&self) -> Duration {
        Duration::from_millis(self.save_progress_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

/// Load configuration from the given path, falling back to defaults on error.
pub fn load_config(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(path = %path.display(), "Falling back to default config: {err}");
            return AppConfig::default();
        }
    };
    parse_config(&contents).unwrap_or_else(|err| {
        warn!(path = %path.display(), "Invalid config TOML: {err}");
        AppConfig::default()
    })
}

pub fn parse_config(contents: &str) -> Result<AppConfig, toml::de::Error> {
    let cfg = toml::from_str::<AppConfig>(contents)?;
    debug!("Parsed configuration from disk");
    Ok(cfg)
}

fn default_max_time_diff() -> f64 {
    1.0
}

fn default_look_ahead_limit() -> usize {
    5
}

fn default_subtitle_offset() -> f64 {
    0.5
}

fn default_save_progress_interval_ms() -> u64 {
    2000
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_video_file() -> String {
    "movie.mp4".to_string()
}

fn default_primary_track() -> String {
    "en.vtt".to_string()
}

fn default_secondary_track() -> String {
    "fa.vtt".to_string()
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_filter_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg.max_time_diff, 1.0);
        assert_eq!(cfg.look_ahead_limit, 5);
        assert_eq!(cfg.subtitle_offset, 0.5);
        assert_eq!(cfg.primary_track, "en.vtt");
        assert_eq!(cfg.log_level, LogLevel::Info);
    }

    #[test]
    fn partial_file_overrides_named_fields() {
        let cfg = parse_config("max_time_diff = 1.5\nlog_level = \"debug\"\n").unwrap();
        assert_eq!(cfg.max_time_diff, 1.5);
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.save_progress_interval(), Duration::from_secs(2));
    }

    #[test]
    fn missing_or_broken_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load_config(&dir.path().join("absent.toml")).frame_interval_ms, 16);

        let path = dir.path().join("config.toml");
        fs::write(&path, "look_ahead_limit = \"many\"").unwrap();
        assert_eq!(load_config(&path).look_ahead_limit, 5);
    }
}
