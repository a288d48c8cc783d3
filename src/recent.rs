//! Recently opened content, kept at the cache root.

use crate::store::{ContentIdentity, ContentStore};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

const RECENT_FILE: &str = "recent.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentEntry {
    pub id: u64,
    pub name: String,
    pub path: PathBuf,
}

#[derive(Debug)]
pub struct RecentRegistry {
    store: ContentStore,
    entries: Vec<RecentEntry>,
}

impl RecentRegistry {
    pub fn load(store: ContentStore) -> Self {
        let entries = match store.read_shared(RECENT_FILE) {
            Ok(Some(data)) => serde_json::from_str(&data).unwrap_or_else(|err| {
                warn!("Ignoring malformed recent list: {err}");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!("Could not read recent list: {err}");
                Vec::new()
            }
        };
        RecentRegistry { store, entries }
    }

    /// Records `path` unless content with the same name is already listed.
    pub fn add(&mut self, identity: &ContentIdentity, path: &Path) -> bool {
        if self.entries.iter().any(|e| e.name == identity.as_str()) {
            return false;
        }
        let id = self.entries.iter().map(|e| e.id).max().map_or(1, |max| max + 1);
        self.entries.push(RecentEntry {
            id,
            name: identity.to_string(),
            path: path.to_path_buf(),
        });
        self.save();
        true
    }

    pub fn remove(&mut self, id: u64) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        let removed = self.entries.len() != before;
        if removed {
            self.save();
        }
        removed
    }

    /// Most recently added first.
    pub fn list(&self) -> impl Iterator<Item = &RecentEntry> {
        self.entries.iter().rev()
    }

    fn save(&self) {
        let contents = match serde_json::to_string_pretty(&self.entries) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("Could not encode recent list: {err}");
                return;
            }
        };
        if let Err(err) = self.store.write_shared(RECENT_FILE, &contents) {
            warn!("Keeping recent list in memory only: {err}");
        }
    }
}
