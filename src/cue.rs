/// A single timed subtitle entry. Times are in seconds and
/// `0 <= start < end` holds for every cue the parser produces.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub(crate) start: f64,
    pub(crate) end: f64,
    pub(crate) text: String,
}

impl Cue {
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }
}

/// Cues of one track, ordered by start time as found in the source file.
pub type CueSequence = Vec<Cue>;

/// One row of the bilingual transcript. `index` is the position of the
/// primary cue this row was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct BilingualCue {
    pub index: usize,
    pub primary: String,
    pub secondary: String,
    pub start: f64,
    pub end: f64,
}

impl BilingualCue {
    pub fn contains(&self, t: f64, offset: f64) -> bool {
        t >= self.start - offset && t < self.end - offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_is_shifted_by_offset() {
        let cue = BilingualCue {
            index: 0,
            primary: String::new(),
            secondary: String::new(),
            start: 10.0,
            end: 12.0,
        };
        assert!(cue.contains(9.6, 0.5));
        assert!(!cue.contains(9.4, 0.5));
        assert!(cue.contains(11.4, 0.5));
        assert!(!cue.contains(11.5, 0.5));
    }
}
