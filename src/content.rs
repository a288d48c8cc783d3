//! Locating and loading the files of one piece of content.
//!
//! A content directory holds a video and two subtitle tracks. The configured
//! file names are tried first; anything missing is searched for among the
//! directory entries (`*.mp4`, and `*.vtt` files whose names mention `en` or
//! `fa`).

use crate::config::AppConfig;
use crate::cue::CueSequence;
use crate::error::{EngineError, ParseError};
use crate::parser::Parser;
use crate::store::ContentIdentity;

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ContentSource {
    pub identity: ContentIdentity,
    pub video: Option<PathBuf>,
    pub primary: Option<PathBuf>,
    pub secondary: Option<PathBuf>,
}

impl ContentSource {
    pub fn discover(dir: &Path, config: &AppConfig) -> Result<Self, EngineError> {
        if !dir.is_dir() {
            return Err(EngineError::Load {
                path: dir.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        let named = |name: &str| Some(dir.join(name)).filter(|p| p.is_file());
        let mut source = ContentSource {
            identity: ContentIdentity::from_path(dir),
            video: named(&config.video_file),
            primary: named(&config.primary_track),
            secondary: named(&config.secondary_track),
        };

        if source.video.is_none() || source.primary.is_none() || source.secondary.is_none() {
            source.fill_from_listing(dir);
        }
        debug!(?source, "Discovered content");
        Ok(source)
    }

    fn fill_from_listing(&mut self, dir: &Path) {
        let mut files: Vec<PathBuf> = match fs::read_dir(dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file())
                .collect(),
            Err(err) => {
                warn!(dir = %dir.display(), "Could not list content directory: {err}");
                return;
            }
        };
        files.sort();

        for path in files {
            let name = match path.file_name() {
                Some(name) => name.to_string_lossy().to_lowercase(),
                None => continue,
            };
            if name.ends_with(".mp4") {
                self.video.get_or_insert(path);
            } else if name.ends_with(".vtt") && name.contains("en") {
                self.primary.get_or_insert(path);
            } else if name.ends_with(".vtt") && name.contains("fa") {
                self.secondary.get_or_insert(path);
            }
        }
    }

    pub fn require_video(&self) -> Result<&Path, EngineError> {
        self.video.as_deref().ok_or_else(|| {
            EngineError::Playback(format!("no video file found for '{}'", self.identity))
        })
    }
}

/// Raw text of a subtitle file.
pub fn read_track(path: &Path) -> Result<String, EngineError> {
    let bytes = fs::read(path).map_err(|err| EngineError::Load {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    String::from_utf8(bytes).map_err(|err| EngineError::Load {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })
}

/// Reads and parses one track, returning its cues and the blocks that were
/// dropped. A strict parse fails on the first malformed block instead.
pub fn parse_track(path: &Path, strict: bool) -> Result<(CueSequence, Vec<ParseError>), EngineError> {
    let text = read_track(path)?;
    let mut parser = if strict { Parser::strict() } else { Parser::new() };
    let cues = parser.parse(&text)?;
    Ok((cues, parser.rejected().to_vec()))
}

/// Reads and parses one track. Any failure yields an empty track.
pub fn load_track(path: Option<&Path>) -> CueSequence {
    let path = match path {
        Some(path) => path,
        None => {
            warn!("Subtitle track missing; continuing without it");
            return Vec::new();
        }
    };
    match parse_track(path, false) {
        Ok((cues, dropped)) => {
            info!(
                path = %path.display(),
                cues = cues.len(),
                dropped = dropped.len(),
                "Loaded subtitle track"
            );
            cues
        }
        Err(err) => {
            warn!("{err}; continuing without it");
            Vec::new()
        }
    }
}

/// Loads both tracks in parallel; returns once both are done.
pub fn load_tracks(source: &ContentSource) -> (CueSequence, CueSequence) {
    thread::scope(|scope| {
        let secondary = scope.spawn(|| load_track(source.secondary.as_deref()));
        let primary = load_track(source.primary.as_deref());
        let secondary = secondary.join().unwrap_or_else(|_| {
            warn!("Secondary track loader panicked");
            Vec::new()
        });
        (primary, secondary)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const EN: &str = "WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nHi\n\n00:00:02.000 --> 00:00:04.000\nBye\n";
    const FA: &str = "WEBVTT\n\n00:00:00.300 --> 00:00:02.100\nسلام\n";

    #[test]
    fn configured_names_are_used() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("movie.mp4"), b"").unwrap();
        fs::write(dir.path().join("en.vtt"), EN).unwrap();
        fs::write(dir.path().join("fa.vtt"), FA).unwrap();

        let source = ContentSource::discover(dir.path(), &AppConfig::default()).unwrap();
        assert_eq!(source.primary, Some(dir.path().join("en.vtt")));
        assert!(source.require_video().is_ok());

        let (primary, secondary) = load_tracks(&source);
        assert_eq!(primary.len(), 2);
        assert_eq!(secondary.len(), 1);
    }

    #[test]
    fn falls_back_to_listing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Episode.MP4"), b"").unwrap();
        fs::write(dir.path().join("episode.en.vtt"), EN).unwrap();
        fs::write(dir.path().join("episode.fa.vtt"), FA).unwrap();
        fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let source = ContentSource::discover(dir.path(), &AppConfig::default()).unwrap();
        assert_eq!(source.video, Some(dir.path().join("Episode.MP4")));
        assert_eq!(source.primary, Some(dir.path().join("episode.en.vtt")));
        assert_eq!(source.secondary, Some(dir.path().join("episode.fa.vtt")));
    }

    #[test]
    fn missing_or_undecodable_tracks_degrade_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("en.vtt"), [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let source = ContentSource::discover(dir.path(), &AppConfig::default()).unwrap();
        assert!(matches!(
            read_track(source.primary.as_deref().unwrap()),
            Err(EngineError::Load { .. })
        ));
        let (primary, secondary) = load_tracks(&source);
        assert!(primary.is_empty());
        assert!(secondary.is_empty());
        assert!(matches!(source.require_video(), Err(EngineError::Playback(_))));
    }

    #[test]
    fn strict_parse_failure_surfaces_as_engine_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("en.vtt");
        fs::write(&path, format!("{EN}\n00:00:05.000 --> 00:00:04.000\nBackwards\n")).unwrap();

        let (cues, dropped) = parse_track(&path, false).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(dropped.len(), 1);
        match parse_track(&path, true) {
            Err(EngineError::Parse(err)) => assert_eq!(err.block, 4),
            other => panic!("expected a parse error, got {other:?}"),
        }
        assert!(matches!(
            parse_track(&dir.path().join("gone.vtt"), true),
            Err(EngineError::Load { .. })
        ));
    }

    #[test]
    fn missing_directory_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ContentSource::discover(&dir.path().join("gone"), &AppConfig::default());
        assert!(matches!(err, Err(EngineError::Load { .. })));
    }
}
