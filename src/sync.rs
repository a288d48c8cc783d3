//! Maps the playback position onto the bilingual transcript.
//!
//! [`Synchronizer`] is the edge-triggered core: it is fed positions and only
//! reports when the active row changes. [`SyncLoop`] runs it once per frame
//! on a background thread until the returned [`SyncHandle`] is stopped.

use crate::cancellation::CancellationToken;
use crate::clock::PlaybackClock;
use crate::cue::BilingualCue;

use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, trace, warn};

/// How far behind the current position a cue must start before "previous"
/// selects it, so the cue being played is not picked again.
const PREVIOUS_CUE_MARGIN: f64 = 1.0;

/// First row containing `t` once shifted by `offset`.
pub fn active_index(cues: &[BilingualCue], t: f64, offset: f64) -> Option<usize> {
    cues.iter().position(|cue| cue.contains(t, offset))
}

/// Playback position that shows `cue` from its start.
pub fn seek_target(cue: &BilingualCue, offset: f64) -> f64 {
    (cue.start - offset).max(0.0)
}

pub fn next_cue(cues: &[BilingualCue], t: f64, offset: f64) -> Option<&BilingualCue> {
    cues.iter().find(|cue| cue.start - offset > t)
}

pub fn previous_cue(cues: &[BilingualCue], t: f64, offset: f64) -> Option<&BilingualCue> {
    cues.iter()
        .rev()
        .find(|cue| cue.start - offset < t - PREVIOUS_CUE_MARGIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CueChange {
    pub previous: Option<usize>,
    pub current: Option<usize>,
    /// Set when the new row should be brought into view; never while the
    /// user is scrubbing.
    pub scroll_into_view: bool,
}

/// Receives active-row transitions, e.g. to move a highlight.
pub trait CueListener: Send {
    fn active_cue_changed(&mut self, change: CueChange, cues: &[BilingualCue]);
}

impl<F> CueListener for F
where
    F: FnMut(CueChange, &[BilingualCue]) + Send,
{
    fn active_cue_changed(&mut self, change: CueChange, cues: &[BilingualCue]) {
        self(change, cues)
    }
}

#[derive(Debug, Default)]
pub struct Synchronizer {
    active: Option<usize>,
}

impl Synchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn active(&self) -> Option<usize> {
        self.active
    }

    /// Feeds one position; returns a change only when the active row differs
    /// from the previous tick.
    pub fn tick(
        &mut self,
        cues: &[BilingualCue],
        t: f64,
        offset: f64,
        scrubbing: bool,
    ) -> Option<CueChange> {
        let current = active_index(cues, t, offset);
        if current == self.active {
            return None;
        }
        let change = CueChange {
            previous: self.active,
            current,
            scroll_into_view: current.is_some() && !scrubbing,
        };
        self.active = current;
        Some(change)
    }
}

/// What the frame loop reads: the current rows, the display offset and the
/// last active row it computed.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    pub cues: Arc<Vec<BilingualCue>>,
    pub offset: f64,
    pub active: Option<usize>,
}

pub type SharedTimeline = Arc<RwLock<Timeline>>;

pub struct SyncLoop;

impl SyncLoop {
    /// Starts ticking every `frame`. The loop runs until the handle is
    /// stopped.
    pub fn start(
        timeline: SharedTimeline,
        clock: Arc<dyn PlaybackClock>,
        mut listener: Box<dyn CueListener>,
        frame: Duration,
    ) -> std::io::Result<SyncHandle> {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let thread = thread::Builder::new()
            .name("cue-sync".to_string())
            .spawn(move || {
                let mut sync = Synchronizer::new();
                debug!(frame_ms = frame.as_millis() as u64, "Cue sync loop started");
                while !loop_token.is_cancelled() {
                    let (cues, offset) = match timeline.read() {
                        Ok(view) => (Arc::clone(&view.cues), view.offset),
                        Err(_) => {
                            warn!("Timeline lock poisoned; stopping cue sync");
                            break;
                        }
                    };
                    let t = clock.current_time();
                    if let Some(change) = sync.tick(&cues, t, offset, clock.is_scrubbing()) {
                        trace!(t, current = ?change.current, "Active cue changed");
                        if let Ok(mut view) = timeline.write() {
                            view.active = change.current;
                        }
                        listener.active_cue_changed(change, &cues);
                    }
                    thread::sleep(frame);
                }
                debug!("Cue sync loop stopped");
            })?;

        Ok(SyncHandle {
            token,
            thread: Some(thread),
        })
    }
}

/// Owner of a running [`SyncLoop`].
#[derive(Debug)]
pub struct SyncHandle {
    token: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Cancels the loop and waits for its last tick to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.token.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Cue sync loop panicked");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            warn!("Cue sync handle dropped without stop(); cancelling");
            self.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Mutex;
    use std::time::Instant;

    fn rows(spans: &[(f64, f64)]) -> Vec<BilingualCue> {
        spans
            .iter()
            .enumerate()
            .map(|(index, &(start, end))| BilingualCue {
                index,
                primary: format!("p{index}"),
                secondary: String::new(),
                start,
                end,
            })
            .collect()
    }

    #[test]
    fn active_index_honours_offset() {
        let cues = rows(&[(0.0, 2.0), (10.0, 12.0)]);
        assert_eq!(active_index(&cues, 9.6, 0.5), Some(1));
        assert_eq!(active_index(&cues, 9.4, 0.5), None);
        assert_eq!(active_index(&cues, 1.4, 0.5), Some(0));
        assert_eq!(active_index(&cues, 1.5, 0.5), None);
        assert_eq!(active_index(&cues, 3.0, 0.0), None);
        assert_eq!(active_index(&[], 3.0, 0.0), None);
    }

    #[test]
    fn overlapping_rows_resolve_to_the_first() {
        let cues = rows(&[(0.0, 5.0), (1.0, 3.0)]);
        assert_eq!(active_index(&cues, 2.0, 0.0), Some(0));
    }

    #[test]
    fn emits_once_per_row_entry() {
        let cues = rows(&[(0.0, 2.0), (2.0, 4.0)]);
        let mut sync = Synchronizer::new();
        let changes: Vec<CueChange> = [0.1, 0.5, 1.0, 1.9, 2.0, 2.5, 4.5, 5.0]
            .iter()
            .filter_map(|&t| sync.tick(&cues, t, 0.0, false))
            .collect();
        let seen: Vec<Option<usize>> = changes.iter().map(|c| c.current).collect();
        assert_eq!(seen, vec![Some(0), Some(1), None]);
        assert!(changes[0].scroll_into_view);
        assert!(!changes[2].scroll_into_view);
        assert_eq!(changes[1].previous, Some(0));
    }

    #[test]
    fn seeking_back_into_the_same_row_is_silent() {
        let cues = rows(&[(0.0, 10.0)]);
        let mut sync = Synchronizer::new();
        assert!(sync.tick(&cues, 1.0, 0.0, false).is_some());
        assert!(sync.tick(&cues, 8.0, 0.0, false).is_none());
        assert!(sync.tick(&cues, 0.5, 0.0, false).is_none());
        assert_eq!(sync.active(), Some(0));
    }

    #[test]
    fn scrubbing_suppresses_scroll() {
        let cues = rows(&[(0.0, 2.0)]);
        let mut sync = Synchronizer::new();
        let change = sync.tick(&cues, 1.0, 0.0, true).unwrap();
        assert_eq!(change.current, Some(0));
        assert!(!change.scroll_into_view);
    }

    #[test]
    fn next_and_previous_use_shifted_starts() {
        let cues = rows(&[(0.0, 2.0), (2.0, 4.0), (6.0, 8.0)]);
        let next = next_cue(&cues, 1.0, 0.5).unwrap();
        assert_eq!(next.index, 1);
        assert_eq!(seek_target(next, 0.5), 1.5);
        assert!(next_cue(&cues, 5.6, 0.5).is_none());

        // Cue 1 starts (shifted) at 1.5, less than a second before 2.3.
        assert_eq!(previous_cue(&cues, 2.3, 0.5).map(|c| c.index), Some(0));
        assert_eq!(previous_cue(&cues, 2.6, 0.5).map(|c| c.index), Some(1));
        assert!(previous_cue(&cues, 0.2, 0.5).is_none());
        assert_eq!(seek_target(&cues[0], 0.5), 0.0);
    }

    #[test]
    fn loop_publishes_changes_until_stopped() {
        let timeline: SharedTimeline = Arc::new(RwLock::new(Timeline {
            cues: Arc::new(rows(&[(0.0, 2.0), (2.0, 4.0)])),
            offset: 0.0,
            active: None,
        }));
        let clock = Arc::new(ManualClock::new(4.0));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = move |change: CueChange, _: &[BilingualCue]| {
            sink.lock().unwrap().push(change.current);
        };

        let handle = SyncLoop::start(
            Arc::clone(&timeline),
            clock.clone(),
            Box::new(listener),
            Duration::from_millis(1),
        )
        .unwrap();

        let wait_for = |expected: Option<usize>| {
            let deadline = Instant::now() + Duration::from_secs(2);
            while timeline.read().unwrap().active != expected && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(1));
            }
            assert_eq!(timeline.read().unwrap().active, expected);
        };

        clock.set(0.5);
        wait_for(Some(0));
        clock.set(1.5);
        clock.set(2.5);
        wait_for(Some(1));
        handle.stop();

        clock.set(0.5);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(timeline.read().unwrap().active, Some(1));
        assert_eq!(*seen.lock().unwrap(), vec![Some(0), Some(1)]);
    }

    #[test]
    fn loop_reads_scrubbing_from_the_clock() {
        let timeline: SharedTimeline = Arc::new(RwLock::new(Timeline {
            cues: Arc::new(rows(&[(0.0, 2.0)])),
            offset: 0.0,
            active: None,
        }));
        let clock = Arc::new(ManualClock::new(4.0));
        clock.set_scrubbing(true);
        clock.set(1.0);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = SyncLoop::start(
            Arc::clone(&timeline),
            clock,
            Box::new(move |change: CueChange, _: &[BilingualCue]| {
                sink.lock().unwrap().push(change);
            }),
            Duration::from_millis(1),
        )
        .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while seen.lock().unwrap().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        handle.stop();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].current, Some(0));
        assert!(!seen[0].scroll_into_view);
    }
}
