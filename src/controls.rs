//! Line commands accepted while following playback.

/// One command typed at the terminal during `play`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Next,
    Previous,
    /// Jump to the row with this index.
    Seek(usize),
    TogglePause,
    /// Bookmark the active row, or remove its bookmark.
    Bookmark,
    Quit,
}

impl Control {
    /// Parses one input line. Unknown input yields `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let word = line.trim();
        match word {
            "" | "space" => Some(Control::TogglePause),
            "n" | "next" => Some(Control::Next),
            "p" | "prev" | "previous" => Some(Control::Previous),
            "b" | "bookmark" => Some(Control::Bookmark),
            "q" | "quit" => Some(Control::Quit),
            _ => word.parse().ok().map(Control::Seek),
        }
    }
}

pub const HELP: &str = "Enter: play/pause, n: next, p: previous, <row>: jump, b: bookmark, q: quit";
