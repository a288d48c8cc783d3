//! One opened piece of content and all state derived from it.
//!
//! The session owns the parsed tracks, the settings, the aligned rows and
//! the bookmarks. Rendering code only ever sees snapshots: the rows are
//! shared as an `Arc` that is swapped, never edited, when they are rebuilt.

use crate::aligner::align;
use crate::bookmarks::{Bookmark, BookmarkStore, Toggle};
use crate::clock::PlaybackClock;
use crate::config::AppConfig;
use crate::content::{load_tracks, ContentSource};
use crate::cue::{BilingualCue, CueSequence};
use crate::error::EngineError;
use crate::progress::{clear_progress, load_progress, save_progress, PendingSave, ProgressWrite};
use crate::settings::{SettingChange, SettingEffect, Settings};
use crate::store::{ContentIdentity, ContentStore};
use crate::sync::{self, CueListener, SharedTimeline, SyncHandle, SyncLoop, Timeline};

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct Session {
    identity: ContentIdentity,
    store: ContentStore,
    primary: CueSequence,
    secondary: CueSequence,
    settings: Settings,
    timeline: SharedTimeline,
    bookmarks: BookmarkStore,
    pending_save: PendingSave,
    playback: Option<Playback>,
}

struct Playback {
    clock: Arc<dyn PlaybackClock>,
    sync: SyncHandle,
}

impl Session {
    /// Loads both tracks of `source` and aligns them with the stored
    /// settings.
    pub fn open(source: &ContentSource, config: &AppConfig) -> Self {
        let (primary, secondary) = load_tracks(source);
        let store = ContentStore::new(&config.cache_dir);
        Session::from_tracks(source.identity.clone(), store, primary, secondary, config)
    }

    pub fn from_tracks(
        identity: ContentIdentity,
        store: ContentStore,
        primary: CueSequence,
        secondary: CueSequence,
        config: &AppConfig,
    ) -> Self {
        let settings = Settings::load(&store, &identity, config);
        let bookmarks = BookmarkStore::load(store.clone(), identity.clone());
        let cues = align(&primary, &secondary, settings.alignment);
        info!(
            %identity,
            rows = cues.len(),
            bookmarks = bookmarks.list().len(),
            "Opened session"
        );
        let timeline = Arc::new(RwLock::new(Timeline {
            cues: Arc::new(cues),
            offset: settings.sync.subtitle_offset,
            active: None,
        }));
        Session {
            identity,
            store,
            primary,
            secondary,
            settings,
            timeline,
            bookmarks,
            pending_save: PendingSave::new(config.save_progress_interval()),
            playback: None,
        }
    }

    pub fn identity(&self) -> &ContentIdentity {
        &self.identity
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cues(&self) -> Arc<Vec<BilingualCue>> {
        self.view(|view| Arc::clone(&view.cues))
    }

    pub fn active_index(&self) -> Option<usize> {
        self.view(|view| view.active)
    }

    pub fn bookmarks(&self) -> &[Bookmark] {
        self.bookmarks.list()
    }

    pub fn is_bookmarked(&self, cue_index: usize) -> bool {
        self.bookmarks.contains(cue_index)
    }

    pub fn toggle_bookmark(&mut self, cue_index: usize) -> Option<Toggle> {
        let cues = self.cues();
        self.bookmarks.toggle(cue_index, &cues)
    }

    pub fn remove_bookmark(&mut self, cue_index: usize) -> bool {
        self.bookmarks.remove(cue_index)
    }

    pub fn clear_bookmarks(&mut self) {
        self.bookmarks.clear()
    }

    /// Toggles the bookmark of the row playing now.
    pub fn bookmark_active(&mut self) -> Option<(usize, Toggle)> {
        let index = self.active_index()?;
        let toggle = self.toggle_bookmark(index)?;
        Some((index, toggle))
    }

    /// Applies and persists one setting. Only a new `max_time_diff` rebuilds
    /// the rows.
    pub fn change_setting(&mut self, change: SettingChange) -> SettingEffect {
        let effect = self.settings.apply(change);
        match effect {
            SettingEffect::Realign => self.realign(),
            SettingEffect::DisplayOnly => {
                let offset = self.settings.sync.subtitle_offset;
                self.update_view(|view| view.offset = offset);
            }
            SettingEffect::Rejected => return effect,
        }
        if let Err(err) = self.settings.persist(&self.store, &self.identity) {
            warn!(identity = %self.identity, "Setting kept for this session only: {err}");
        }
        effect
    }

    fn realign(&mut self) {
        let cues = Arc::new(align(&self.primary, &self.secondary, self.settings.alignment));
        debug!(
            identity = %self.identity,
            max_time_diff = self.settings.alignment.max_time_diff,
            "Re-aligned tracks"
        );
        self.update_view(|view| view.cues = cues);
    }

    /// Position saved by an earlier session.
    pub fn resume_position(&self) -> Option<f64> {
        load_progress(&self.store, &self.identity)
    }

    /// Drops the saved position so the next playback starts from the top.
    pub fn forget_progress(&self) {
        if let Err(err) = clear_progress(&self.store, &self.identity) {
            warn!(identity = %self.identity, "Progress not cleared: {err}");
        }
    }

    /// Starts the per-frame sync loop against `clock`, first seeking to the
    /// saved position if there is one. A previous loop is stopped.
    pub fn start_playback(
        &mut self,
        clock: Arc<dyn PlaybackClock>,
        listener: Box<dyn CueListener>,
        frame: Duration,
    ) -> Result<(), EngineError> {
        if let Some(previous) = self.playback.take() {
            previous.sync.stop();
        }
        if let Some(position) = self.resume_position() {
            info!(identity = %self.identity, position, "Resuming playback");
            clock.seek(position);
        }
        let sync = SyncLoop::start(Arc::clone(&self.timeline), Arc::clone(&clock), listener, frame)
            .map_err(|err| EngineError::Playback(format!("could not start cue sync: {err}")))?;
        self.playback = Some(Playback { clock, sync });
        Ok(())
    }

    /// Host notification that the position moved; arms the progress save.
    pub fn on_time_update(&mut self, now: Instant) {
        self.pending_save.schedule(now);
    }

    /// Runs the progress save once its timer has expired.
    pub fn poll(&mut self, now: Instant) -> Option<ProgressWrite> {
        if self.pending_save.fire_if_due(now) {
            self.save_progress()
        } else {
            None
        }
    }

    fn save_progress(&self) -> Option<ProgressWrite> {
        let clock = &self.playback.as_ref()?.clock;
        match save_progress(
            &self.store,
            &self.identity,
            clock.current_time(),
            clock.duration(),
            clock.ended(),
        ) {
            Ok(write) => Some(write),
            Err(err) => {
                warn!(identity = %self.identity, "Progress not saved: {err}");
                None
            }
        }
    }

    /// Seeks so that row `cue_index` starts showing; returns the position.
    pub fn seek_to_cue(&self, cue_index: usize) -> Option<f64> {
        let offset = self.settings.sync.subtitle_offset;
        let cues = self.cues();
        let target = sync::seek_target(cues.iter().find(|c| c.index == cue_index)?, offset);
        self.seek(target)
    }

    pub fn next_cue(&self) -> Option<f64> {
        self.jump(sync::next_cue)
    }

    pub fn previous_cue(&self) -> Option<f64> {
        self.jump(sync::previous_cue)
    }

    fn jump(
        &self,
        pick: for<'a> fn(&'a [BilingualCue], f64, f64) -> Option<&'a BilingualCue>,
    ) -> Option<f64> {
        let now = self.playback.as_ref()?.clock.current_time();
        let offset = self.settings.sync.subtitle_offset;
        let cues = self.cues();
        let target = sync::seek_target(pick(&cues, now, offset)?, offset);
        self.seek(target)
    }

    /// Pauses a playing clock or resumes a paused one; returns whether
    /// playback is now paused.
    pub fn toggle_pause(&self) -> Option<bool> {
        let clock = &self.playback.as_ref()?.clock;
        if clock.is_paused() {
            clock.play();
            Some(false)
        } else {
            clock.pause();
            Some(true)
        }
    }

    fn seek(&self, target: f64) -> Option<f64> {
        let clock = &self.playback.as_ref()?.clock;
        let target = target.max(0.0);
        clock.seek(target);
        if clock.is_paused() {
            clock.play();
        }
        debug!(target, "Seeked");
        Some(target)
    }

    /// Stops the sync loop and writes everything that is still pending.
    pub fn teardown(mut self) {
        self.pending_save.take();
        if self.playback.is_some() {
            self.save_progress();
        }
        if let Some(playback) = self.playback.take() {
            playback.sync.stop();
        }
        self.bookmarks.save();
        info!(identity = %self.identity, "Session closed");
    }

    fn view<R>(&self, f: impl FnOnce(&Timeline) -> R) -> R {
        let view = self.timeline.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&*view)
    }

    fn update_view(&self, f: impl FnOnce(&mut Timeline)) {
        let mut view = self.timeline.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut *view)
    }
}
