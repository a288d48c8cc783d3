//! Playback position sources.
//!
//! The engine never decodes media itself; it only needs something that can
//! report where playback is and accept seek/play/pause commands.

use std::sync::Mutex;
use std::time::Instant;

pub trait PlaybackClock: Send + Sync {
    fn current_time(&self) -> f64;
    fn duration(&self) -> f64;
    fn seek(&self, t: f64);
    fn play(&self);
    fn pause(&self);
    fn is_paused(&self) -> bool;

    /// True while the user drags the timeline.
    fn is_scrubbing(&self) -> bool {
        false
    }

    fn ended(&self) -> bool {
        self.current_time() >= self.duration()
    }
}

/// A clock that advances with real time while playing. It has no timeline
/// to drag, so it never reports scrubbing.
#[derive(Debug)]
pub struct WallClock {
    duration: f64,
    state: Mutex<WallState>,
}

#[derive(Debug)]
struct WallState {
    base: f64,
    anchor: Option<Instant>,
}

impl WallClock {
    /// A paused clock positioned at `start`.
    pub fn new(start: f64, duration: f64) -> Self {
        let duration = duration.max(0.0);
        Self {
            duration,
            state: Mutex::new(WallState {
                base: start.clamp(0.0, duration),
                anchor: None,
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut WallState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut state)
    }

    fn position(&self, state: &WallState) -> f64 {
        let elapsed = state
            .anchor
            .map_or(0.0, |anchor| anchor.elapsed().as_secs_f64());
        (state.base + elapsed).min(self.duration)
    }
}

impl PlaybackClock for WallClock {
    fn current_time(&self) -> f64 {
        self.with_state(|state| self.position(state))
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn seek(&self, t: f64) {
        let t = t.clamp(0.0, self.duration);
        self.with_state(|state| {
            state.base = t;
            if state.anchor.is_some() {
                state.anchor = Some(Instant::now());
            }
        });
    }

    fn play(&self) {
        self.with_state(|state| {
            if state.anchor.is_none() {
                state.anchor = Some(Instant::now());
            }
        });
    }

    fn pause(&self) {
        self.with_state(|state| {
            state.base = self.position(state);
            state.anchor = None;
        });
    }

    fn is_paused(&self) -> bool {
        self.with_state(|state| state.anchor.is_none())
    }
}

/// Clock driven by hand, for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct ManualClock {
    state: Mutex<(f64, bool, bool)>,
    duration: f64,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(duration: f64) -> Self {
        Self {
            state: Mutex::new((0.0, true, false)),
            duration,
        }
    }

    pub(crate) fn set(&self, t: f64) {
        self.state.lock().unwrap().0 = t;
    }

    pub(crate) fn set_scrubbing(&self, scrubbing: bool) {
        self.state.lock().unwrap().2 = scrubbing;
    }
}

#[cfg(test)]
impl PlaybackClock for ManualClock {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().0
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn seek(&self, t: f64) {
        self.set(t.max(0.0));
    }

    fn play(&self) {
        self.state.lock().unwrap().1 = false;
    }

    fn pause(&self) {
        self.state.lock().unwrap().1 = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().1
    }

    fn is_scrubbing(&self) -> bool {
        self.state.lock().unwrap().2
    }
}
