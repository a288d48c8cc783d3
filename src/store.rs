//! On-disk cache of per-content state.
//!
//! Every content identity gets its own directory under the cache root, named
//! by the SHA-256 of the identity to avoid filesystem issues. The directory
//! also holds an `identity` file with the plain name so that all stored
//! content can be enumerated again. Writes replace whole documents through a
//! temporary file and a rename.

use crate::error::EngineError;

use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{trace, warn};

const IDENTITY_FILE: &str = "identity";

/// Stable name of the loaded content; namespaces all persisted state.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentIdentity(String);

impl ContentIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        ContentIdentity(name.into())
    }

    /// The directory or file name of `path`, or the whole path when it has
    /// no final component. `.` and `..` are resolved first when the path
    /// exists, so relative spellings of one directory share an identity.
    pub fn from_path(path: &Path) -> Self {
        let resolved = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| resolved.to_string_lossy().into_owned());
        ContentIdentity(name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn content_dir(&self, identity: &ContentIdentity) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(identity.as_str().as_bytes());
        let hash = format!("{:x}", hasher.finalize());
        self.root.join(hash)
    }

    /// Contents of `name` for `identity`; `None` when it was never written.
    pub fn read(&self, identity: &ContentIdentity, name: &str) -> Result<Option<String>, EngineError> {
        read_optional(&self.content_dir(identity).join(name))
    }

    pub fn write(&self, identity: &ContentIdentity, name: &str, contents: &str) -> Result<(), EngineError> {
        let dir = self.content_dir(identity);
        let marker = dir.join(IDENTITY_FILE);
        if !marker.exists() {
            replace_file(&marker, identity.as_str())?;
        }
        replace_file(&dir.join(name), contents)
    }

    pub fn remove(&self, identity: &ContentIdentity, name: &str) -> Result<(), EngineError> {
        let path = self.content_dir(identity).join(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(EngineError::persistence(path, err)),
        }
    }

    /// Every identity that has stored anything. Directories without a
    /// readable identity file are skipped.
    pub fn identities(&self) -> Result<Vec<ContentIdentity>, EngineError> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(EngineError::persistence(&self.root, err)),
        };

        let mut identities = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| EngineError::persistence(&self.root, err))?;
            let marker = entry.path().join(IDENTITY_FILE);
            if !marker.is_file() {
                continue;
            }
            match fs::read_to_string(&marker) {
                Ok(name) => identities.push(ContentIdentity(name)),
                Err(err) => warn!(path = %marker.display(), "Unreadable identity file: {err}"),
            }
        }
        identities.sort();
        Ok(identities)
    }

    /// A document stored directly under the cache root.
    pub fn read_shared(&self, name: &str) -> Result<Option<String>, EngineError> {
        read_optional(&self.root.join(name))
    }

    pub fn write_shared(&self, name: &str, contents: &str) -> Result<(), EngineError> {
        replace_file(&self.root.join(name), contents)
    }
}

fn read_optional(path: &Path) -> Result<Option<String>, EngineError> {
    match fs::read_to_string(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(EngineError::persistence(path, err)),
    }
}

fn replace_file(path: &Path, contents: &str) -> Result<(), EngineError> {
    let fail = |err| EngineError::persistence(path, err);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(fail)?;
    }
    let tmp = path.with_extension("tmp");
    let mut file = fs::File::create(&tmp).map_err(fail)?;
    file.write_all(contents.as_bytes()).map_err(fail)?;
    file.sync_all().map_err(fail)?;
    fs::rename(&tmp, path).map_err(fail)?;
    trace!(path = %path.display(), bytes = contents.len(), "Replaced cache file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_the_final_path_component() {
        assert_eq!(
            ContentIdentity::from_path(Path::new("/media/films/Heat (1995)")).as_str(),
            "Heat (1995)"
        );
        assert_eq!(ContentIdentity::from_path(Path::new("/")).as_str(), "/");
    }

    #[test]
    fn relative_spellings_resolve_to_the_directory_name() {
        let dir = tempfile::tempdir().unwrap();
        let heat = dir.path().join("heat");
        fs::create_dir_all(heat.join("extras")).unwrap();

        assert_eq!(ContentIdentity::from_path(&heat.join("extras").join("..")).as_str(), "heat");
        assert_eq!(ContentIdentity::from_path(&heat.join(".")).as_str(), "heat");
        assert_ne!(ContentIdentity::from_path(Path::new(".")).as_str(), ".");
    }

    #[test]
    fn documents_round_trip_per_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path());
        let a = ContentIdentity::new("a");
        let b = ContentIdentity::new("b");

        assert_eq!(store.read(&a, "doc").unwrap(), None);
        store.write(&a, "doc", "first").unwrap();
        store.write(&a, "doc", "second").unwrap();
        store.write(&b, "doc", "other").unwrap();
        assert_eq!(store.read(&a, "doc").unwrap().as_deref(), Some("second"));
        assert_eq!(store.read(&b, "doc").unwrap().as_deref(), Some("other"));

        store.remove(&a, "doc").unwrap();
        store.remove(&a, "doc").unwrap();
        assert_eq!(store.read(&a, "doc").unwrap(), None);
        assert_eq!(store.identities().unwrap(), vec![a, b]);
    }

    #[test]
    fn missing_root_has_no_identities() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::new(dir.path().join("nothing-here"));
        assert!(store.identities().unwrap().is_empty());
        assert_eq!(store.read_shared("recent.json").unwrap(), None);
    }

    #[test]
    fn unwritable_root_reports_persistence_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "not a directory").unwrap();
        let store = ContentStore::new(&blocker);
        let err = store.write(&ContentIdentity::new("x"), "doc", "data").unwrap_err();
        assert!(matches!(err, EngineError::Persistence { .. }));
    }
}
