//! Playback progress persistence.
//!
//! Position updates arrive far more often than they are worth writing, so
//! saves go through a single-slot timer: the first update arms it, later
//! updates ride along, and the position is read when the timer fires.

use crate::error::EngineError;
use crate::store::{ContentIdentity, ContentStore};

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const PROGRESS_FILE: &str = "progress.toml";
/// Positions this close to the start are not worth resuming from.
const MIN_RESUME_POSITION: f64 = 1.0;
/// Positions this close to the end count as finished.
const END_MARGIN: f64 = 5.0;

#[derive(Serialize, Deserialize)]
struct ProgressEntry {
    position: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressWrite {
    Saved(f64),
    Skipped,
    Cleared,
}

/// Saved position for `identity`, if one exists and is readable.
pub fn load_progress(store: &ContentStore, identity: &ContentIdentity) -> Option<f64> {
    let data = match store.read(identity, PROGRESS_FILE) {
        Ok(data) => data?,
        Err(err) => {
            warn!(%identity, "Could not read progress: {err}");
            return None;
        }
    };
    match toml::from_str::<ProgressEntry>(&data) {
        Ok(entry) if entry.position.is_finite() && entry.position >= 0.0 => Some(entry.position),
        Ok(_) => None,
        Err(err) => {
            warn!(%identity, "Ignoring malformed progress: {err}");
            None
        }
    }
}

/// Persist `position`, or clear the saved value once playback has ended.
pub fn save_progress(
    store: &ContentStore,
    identity: &ContentIdentity,
    position: f64,
    duration: f64,
    ended: bool,
) -> Result<ProgressWrite, EngineError> {
    if ended {
        store.remove(identity, PROGRESS_FILE)?;
        return Ok(ProgressWrite::Cleared);
    }
    if position < MIN_RESUME_POSITION || position > duration - END_MARGIN {
        return Ok(ProgressWrite::Skipped);
    }
    let contents = toml::to_string(&ProgressEntry { position }).unwrap_or_default();
    store.write(identity, PROGRESS_FILE, &contents)?;
    debug!(%identity, position, "Saved progress");
    Ok(ProgressWrite::Saved(position))
}

pub fn clear_progress(store: &ContentStore, identity: &ContentIdentity) -> Result<(), EngineError> {
    store.remove(identity, PROGRESS_FILE)
}

/// Single-slot save timer. At most one deadline is pending at any time.
#[derive(Debug)]
pub struct PendingSave {
    interval: Duration,
    deadline: Option<Instant>,
}

impl PendingSave {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    /// Arms the timer unless it is already armed. Returns whether a new
    /// deadline was set.
    pub fn schedule(&mut self, now: Instant) -> bool {
        if self.deadline.is_some() {
            return false;
        }
        self.deadline = Some(now + self.interval);
        true
    }

    /// True once per armed deadline, when it has passed; disarms the timer.
    pub fn fire_if_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }

    /// Disarms the timer, returning whether a save was pending.
    pub fn take(&mut self) -> bool {
        self.deadline.take().is_some()
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }
}
