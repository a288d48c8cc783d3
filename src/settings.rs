//! Per-content tunables.
//!
//! Only `max_time_diff` feeds the aligner; the offset and secondary
//! visibility are read at display time. [`Settings::apply`] reports which
//! kind of change happened so the session re-aligns only when needed.

use crate::aligner::AlignmentConfig;
use crate::config::AppConfig;
use crate::error::EngineError;
use crate::store::{ContentIdentity, ContentStore};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    /// Seconds the transcript runs ahead of the video.
    pub subtitle_offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingChange {
    MaxTimeDiff(f64),
    SubtitleOffset(f64),
    SecondaryVisible(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingEffect {
    /// The bilingual rows must be rebuilt.
    Realign,
    /// Only playback sync or rendering is affected.
    DisplayOnly,
    /// The value was not a finite number and nothing changed.
    Rejected,
}

/// Values the user changed for one piece of content. Only edited fields are
/// stored, so later changes to the base config still apply to the rest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Overrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_time_diff: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subtitle_offset: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secondary_visible: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub alignment: AlignmentConfig,
    pub sync: SyncConfig,
    pub secondary_visible: bool,
    overrides: Overrides,
}

impl Settings {
    pub fn from_config(config: &AppConfig) -> Self {
        Settings {
            alignment: AlignmentConfig {
                max_time_diff: config.max_time_diff,
                look_ahead_limit: config.look_ahead_limit,
            },
            sync: SyncConfig {
                subtitle_offset: config.subtitle_offset,
            },
            secondary_visible: true,
            overrides: Overrides::default(),
        }
    }

    /// Defaults from `config`, overlaid with whatever valid overrides are
    /// stored for `identity`. Each field falls back on its own.
    pub fn load(store: &ContentStore, identity: &ContentIdentity, config: &AppConfig) -> Self {
        let mut settings = Settings::from_config(config);
        let data = match store.read(identity, SETTINGS_FILE) {
            Ok(Some(data)) => data,
            Ok(None) => return settings,
            Err(err) => {
                warn!(%identity, "Could not read settings overrides: {err}");
                return settings;
            }
        };
        let table = match toml::from_str::<toml::Table>(&data) {
            Ok(table) => table,
            Err(err) => {
                warn!(%identity, "Ignoring malformed settings overrides: {err}");
                return settings;
            }
        };

        let overrides = Overrides {
            max_time_diff: table.get("max_time_diff").and_then(number),
            subtitle_offset: table.get("subtitle_offset").and_then(number),
            secondary_visible: table.get("secondary_visible").and_then(flag),
        };
        if let Some(v) = overrides.max_time_diff {
            settings.alignment.max_time_diff = v;
        }
        if let Some(v) = overrides.subtitle_offset {
            settings.sync.subtitle_offset = v;
        }
        if let Some(v) = overrides.secondary_visible {
            settings.secondary_visible = v;
        }
        debug!(%identity, ?overrides, "Loaded settings overrides");
        settings.overrides = overrides;
        settings
    }

    pub fn apply(&mut self, change: SettingChange) -> SettingEffect {
        match change {
            SettingChange::MaxTimeDiff(v) if v.is_finite() => {
                self.alignment.max_time_diff = v;
                self.overrides.max_time_diff = Some(v);
                SettingEffect::Realign
            }
            SettingChange::SubtitleOffset(v) if v.is_finite() => {
                self.sync.subtitle_offset = v;
                self.overrides.subtitle_offset = Some(v);
                SettingEffect::DisplayOnly
            }
            SettingChange::SecondaryVisible(v) => {
                self.secondary_visible = v;
                self.overrides.secondary_visible = Some(v);
                SettingEffect::DisplayOnly
            }
            SettingChange::MaxTimeDiff(_) | SettingChange::SubtitleOffset(_) => {
                info!(?change, "Ignoring non-numeric setting");
                SettingEffect::Rejected
            }
        }
    }

    pub fn persist(&self, store: &ContentStore, identity: &ContentIdentity) -> Result<(), EngineError> {
        let contents = toml::to_string(&self.overrides).unwrap_or_default();
        store.write(identity, SETTINGS_FILE, &contents)
    }
}

fn number(value: &toml::Value) -> Option<f64> {
    let n = match value {
        toml::Value::Float(f) => *f,
        toml::Value::Integer(i) => *i as f64,
        toml::Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn flag(value: &toml::Value) -> Option<bool> {
    match value {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, ContentStore, ContentIdentity) {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        (dir, store, ContentIdentity::new("show-s01e01"))
    }

    #[test]
    fn defaults_come_from_config() {
        let (_dir, store, id) = setup();
        let settings = Settings::load(&store, &id, &AppConfig::default());
        assert_eq!(settings.alignment.max_time_diff, 1.0);
        assert_eq!(settings.alignment.look_ahead_limit, 5);
        assert_eq!(settings.sync.subtitle_offset, 0.5);
        assert!(settings.secondary_visible);
    }

    #[test]
    fn only_max_time_diff_requires_realignment() {
        let mut settings = Settings::from_config(&AppConfig::default());
        assert_eq!(settings.apply(SettingChange::MaxTimeDiff(2.0)), SettingEffect::Realign);
        assert_eq!(settings.apply(SettingChange::SubtitleOffset(-0.2)), SettingEffect::DisplayOnly);
        assert_eq!(settings.apply(SettingChange::SecondaryVisible(false)), SettingEffect::DisplayOnly);
        assert_eq!(settings.apply(SettingChange::MaxTimeDiff(f64::NAN)), SettingEffect::Rejected);
        assert_eq!(settings.alignment.max_time_diff, 2.0);
        assert_eq!(settings.sync.subtitle_offset, -0.2);
        assert!(!settings.secondary_visible);
    }

    #[test]
    fn edited_fields_persist() {
        let (_dir, store, id) = setup();
        let mut settings = Settings::load(&store, &id, &AppConfig::default());
        settings.apply(SettingChange::SubtitleOffset(1.25));
        settings.persist(&store, &id).unwrap();

        let config = AppConfig {
            max_time_diff: 3.0,
            ..AppConfig::default()
        };
        let reloaded = Settings::load(&store, &id, &config);
        assert_eq!(reloaded.sync.subtitle_offset, 1.25);
        // Never edited, so the new base value shows through.
        assert_eq!(reloaded.alignment.max_time_diff, 3.0);
    }

    #[test]
    fn bad_fields_fall_back_individually() {
        let (_dir, store, id) = setup();
        store
            .write(
                &id,
                SETTINGS_FILE,
                "max_time_diff = \"wide\"\nsubtitle_offset = \"0.75\"\nsecondary_visible = 3\n",
            )
            .unwrap();
        let settings = Settings::load(&store, &id, &AppConfig::default());
        assert_eq!(settings.alignment.max_time_diff, 1.0);
        assert_eq!(settings.sync.subtitle_offset, 0.75);
        assert!(settings.secondary_visible);

        store.write(&id, SETTINGS_FILE, "this is = not [toml").unwrap();
        let settings = Settings::load(&store, &id, &AppConfig::default());
        assert_eq!(settings, Settings::from_config(&AppConfig::default()));
    }
}
