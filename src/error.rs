use std::path::PathBuf;

use thiserror::Error;

/// Failures the engine distinguishes. Only `Playback` is fatal for a session;
/// everything else degrades to less data.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to load subtitle track '{path}': {reason}")]
    Load { path: PathBuf, reason: String },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("persistence failure for '{path}': {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no playable media: {0}")]
    Playback(String),
}

/// A malformed cue block. Normally the block is dropped and this is only
/// logged; strict parsing returns it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("malformed cue block {block}: {reason}")]
pub struct ParseError {
    pub block: usize,
    pub reason: String,
}

impl EngineError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EngineError::Persistence {
            path: path.into(),
            source,
        }
    }
}
