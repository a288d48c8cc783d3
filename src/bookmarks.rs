//! Saved transcript rows.
//!
//! A bookmark copies the row's text and start time when it is made, so a
//! later re-alignment cannot change what was saved. The whole list for one
//! content identity is rewritten on every change.

use crate::cue::BilingualCue;
use crate::store::{ContentIdentity, ContentStore};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, warn};

const BOOKMARKS_FILE: &str = "bookmarks.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bookmark {
    pub cue_index: usize,
    pub primary: String,
    pub secondary: String,
    pub start: f64,
}

impl From<&BilingualCue> for Bookmark {
    fn from(cue: &BilingualCue) -> Self {
        Bookmark {
            cue_index: cue.index,
            primary: cue.primary.clone(),
            secondary: cue.secondary.clone(),
            start: cue.start,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Added,
    Removed,
}

#[derive(Debug)]
pub struct BookmarkStore {
    store: ContentStore,
    identity: ContentIdentity,
    bookmarks: Vec<Bookmark>,
}

impl BookmarkStore {
    /// Reads the saved list; anything unreadable starts an empty one.
    pub fn load(store: ContentStore, identity: ContentIdentity) -> Self {
        let bookmarks = match store.read(&identity, BOOKMARKS_FILE) {
            Ok(Some(data)) => parse_list(&identity, &data),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(%identity, "Could not read bookmarks: {err}");
                Vec::new()
            }
        };
        debug!(%identity, count = bookmarks.len(), "Loaded bookmarks");
        BookmarkStore {
            store,
            identity,
            bookmarks,
        }
    }

    pub fn list(&self) -> &[Bookmark] {
        &self.bookmarks
    }

    pub fn contains(&self, cue_index: usize) -> bool {
        self.bookmarks.iter().any(|b| b.cue_index == cue_index)
    }

    /// Removes the bookmark for `cue_index` if there is one, otherwise
    /// snapshots `cues[cue_index]`. Returns `None` when neither applies.
    pub fn toggle(&mut self, cue_index: usize, cues: &[BilingualCue]) -> Option<Toggle> {
        if self.take(cue_index) {
            self.save();
            return Some(Toggle::Removed);
        }
        let cue = cues.iter().find(|c| c.index == cue_index)?;
        self.bookmarks.push(Bookmark::from(cue));
        self.save();
        Some(Toggle::Added)
    }

    pub fn remove(&mut self, cue_index: usize) -> bool {
        let removed = self.take(cue_index);
        if removed {
            self.save();
        }
        removed
    }

    pub fn clear(&mut self) {
        self.bookmarks.clear();
        self.save();
    }

    fn take(&mut self, cue_index: usize) -> bool {
        let before = self.bookmarks.len();
        self.bookmarks.retain(|b| b.cue_index != cue_index);
        self.bookmarks.len() != before
    }

    /// Writes the full list. A failed write leaves the in-memory list as the
    /// only copy for the rest of the session.
    pub fn save(&self) {
        let contents = match serde_json::to_string_pretty(&self.bookmarks) {
            Ok(contents) => contents,
            Err(err) => {
                warn!(identity = %self.identity, "Could not encode bookmarks: {err}");
                return;
            }
        };
        if let Err(err) = self.store.write(&self.identity, BOOKMARKS_FILE, &contents) {
            warn!(identity = %self.identity, "Keeping bookmarks in memory only: {err}");
        }
    }
}

fn parse_list(identity: &ContentIdentity, data: &str) -> Vec<Bookmark> {
    match serde_json::from_str(data) {
        Ok(list) => list,
        Err(err) => {
            warn!(%identity, "Ignoring malformed bookmarks: {err}");
            Vec::new()
        }
    }
}

/// A bookmark together with the content it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedItem {
    pub identity: ContentIdentity,
    pub bookmark: Bookmark,
}

/// Bookmarks of every stored content, ordered by content then start time.
pub fn saved_items(store: &ContentStore) -> Vec<SavedItem> {
    let identities = match store.identities() {
        Ok(identities) => identities,
        Err(err) => {
            warn!("Could not list stored content: {err}");
            return Vec::new();
        }
    };

    let mut items: Vec<SavedItem> = identities
        .into_iter()
        .flat_map(|identity| {
            let data = match store.read(&identity, BOOKMARKS_FILE) {
                Ok(data) => data.unwrap_or_default(),
                Err(err) => {
                    warn!(%identity, "Could not read bookmarks: {err}");
                    String::new()
                }
            };
            let list = if data.is_empty() {
                Vec::new()
            } else {
                parse_list(&identity, &data)
            };
            list.into_iter().map(move |bookmark| SavedItem {
                identity: identity.clone(),
                bookmark,
            })
        })
        .collect();

    items.sort_by(|a, b| {
        a.identity.cmp(&b.identity).then_with(|| {
            a.bookmark
                .start
                .partial_cmp(&b.bookmark.start)
                .unwrap_or(Ordering::Equal)
        })
    });
    items
}
