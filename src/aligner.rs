use crate::cue::{BilingualCue, Cue};

use tracing::debug;

/// Parameters of one alignment pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlignmentConfig {
    /// Largest start-time distance (seconds, exclusive) for a match.
    pub max_time_diff: f64,
    /// Number of secondary cues examined per primary cue.
    pub look_ahead_limit: usize,
}

/// Pairs every primary cue with at most one secondary cue.
///
/// The secondary track is walked with a cursor that only moves forward: for
/// each primary cue the next `look_ahead_limit` secondary cues are examined
/// and the one with the closest start time (strictly within
/// `max_time_diff`, first one wins on ties) is consumed. Secondary cues that
/// were never consumed are appended to the row with the latest start strictly
/// before theirs; those preceding the first primary cue are dropped.
///
/// The function is pure; re-running it with the same input yields the same
/// rows.
pub fn align(primary: &[Cue], secondary: &[Cue], cfg: AlignmentConfig) -> Vec<BilingualCue> {
    let mut search_start = 0;
    let mut matched = vec![false; secondary.len()];

    let mut rows: Vec<BilingualCue> = primary
        .iter()
        .enumerate()
        .map(|(index, cue)| {
            let secondary_text = match best_match(cue, secondary, search_start, cfg) {
                Some(j) => {
                    search_start = j + 1;
                    matched[j] = true;
                    secondary[j].text.clone()
                }
                None => String::new(),
            };
            BilingualCue {
                index,
                primary: cue.text.clone(),
                secondary: secondary_text,
                start: cue.start,
                end: cue.end,
            }
        })
        .collect();

    let mut orphans = 0;
    let mut dropped = 0;
    for (cue, _) in secondary.iter().zip(&matched).filter(|(_, m)| !**m) {
        match rows.iter().rposition(|row| row.start < cue.start) {
            Some(target) => {
                let row = &mut rows[target];
                row.secondary.push('\n');
                row.secondary.push_str(&cue.text);
                orphans += 1;
            }
            None => dropped += 1,
        }
    }

    debug!(
        primary = primary.len(),
        secondary = secondary.len(),
        orphans,
        dropped,
        max_time_diff = cfg.max_time_diff,
        look_ahead_limit = cfg.look_ahead_limit,
        "Aligned tracks"
    );
    rows
}

fn best_match(cue: &Cue, secondary: &[Cue], from: usize, cfg: AlignmentConfig) -> Option<usize> {
    let until = secondary.len().min(from.saturating_add(cfg.look_ahead_limit));
    let mut best: Option<(usize, f64)> = None;
    for (j, candidate) in secondary.iter().enumerate().take(until).skip(from) {
        let diff = (cue.start - candidate.start).abs();
        if diff < cfg.max_time_diff && best.map_or(true, |(_, d)| diff < d) {
            best = Some((j, diff));
        }
    }
    best.map(|(j, _)| j)
}
