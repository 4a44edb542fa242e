//! Persistence for small keyed JSON blobs.
//!
//! Writes go through [`write_json_atomic`]: the value is written to a unique
//! temporary file in the target's directory and renamed over the target, so
//! readers never observe a partially written blob.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::rotation::RecencyHistory;
use crate::Error;

/// Keyed storage for recency histories.
///
/// Implementations must be usable from concurrent request handlers. Loads and
/// saves are not coordinated with each other: two overlapping selections may
/// both read the same history and the later save wins.
pub trait HistoryStore: Send + Sync {
    /// Load the history stored under `key`, or `None` if nothing is stored.
    fn load(&self, key: &str) -> Result<Option<RecencyHistory>, Error>;

    /// Replace the history stored under `key`.
    fn save(&self, key: &str, history: &RecencyHistory) -> Result<(), Error>;
}

/// One JSON file per key inside a directory.
///
/// # Example
///
/// ```no_run
/// use bloomin8_pull::store::{HistoryStore, JsonFileStore};
///
/// let store = JsonFileStore::new("/config/bloomin8_pull");
/// let history = store.load("originals").ok().flatten().unwrap_or_default();
/// println!("{} recent images", history.len());
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `dir`. The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the blob for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

impl HistoryStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<RecencyHistory>, Error> {
        read_json(&self.path_for(key))
    }

    fn save(&self, key: &str, history: &RecencyHistory) -> Result<(), Error> {
        write_json_atomic(&self.path_for(key), history)
    }
}

/// In-process store, mostly useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, RecencyHistory>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<RecencyHistory>, Error> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| Error::PersistenceRead("memory store poisoned".to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, history: &RecencyHistory) -> Result<(), Error> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::PersistenceWrite("memory store poisoned".to_string()))?;
        entries.insert(key.to_string(), history.clone());
        Ok(())
    }
}

/// Read and parse a JSON file.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, Error> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::PersistenceRead(format!(
                "Failed to read '{}': {}",
                path.display(),
                e
            )))
        }
    };
    serde_json::from_str(&content).map(Some).map_err(|e| {
        Error::PersistenceRead(format!("Invalid JSON in '{}': {}", path.display(), e))
    })
}

/// Serialize `value` to `path` via a temporary file and an atomic rename.
///
/// Every call writes its own uniquely named temporary file next to `path`, so
/// concurrent writers never share a partially written file; the last rename
/// wins.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Error> {
    let write_err =
        |e: std::io::Error| Error::PersistenceWrite(format!("'{}': {}", path.display(), e));

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let json = serde_json::to_vec(value)
        .map_err(|e| Error::PersistenceWrite(format!("'{}': {}", path.display(), e)))?;

    let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&json).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Keep keys usable as file names.
fn sanitize_key(key: &str) -> String {
    let cleaned: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "default".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn history(ids: &[&str]) -> RecencyHistory {
        RecencyHistory::from_entries(ids.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_sanitize_key() {
        assert_eq!(sanitize_key("originals"), "originals");
        assert_eq!(sanitize_key("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_key(""), "default");
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested"));

        assert!(store.load("pool").unwrap().is_none());

        let saved = history(&["a.jpg", "b.jpg", "c.jpg"]);
        store.save("pool", &saved).unwrap();

        let loaded = store.load("pool").unwrap().unwrap();
        assert_eq!(loaded, saved);
    }

    #[test]
    fn test_file_store_shape() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.save("pool", &history(&["old.jpg", "new.jpg"])).unwrap();

        let raw = std::fs::read_to_string(store.path_for("pool")).unwrap();
        assert_eq!(raw, r#"{"recent":["old.jpg","new.jpg"]}"#);
        // Only the blob itself is left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_file_store_corrupt_blob() {
        let dir = tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        std::fs::write(store.path_for("pool"), "{not json").unwrap();

        assert!(matches!(
            store.load("pool"),
            Err(Error::PersistenceRead(_))
        ));
    }

    #[test]
    fn test_file_store_save_failure() {
        let dir = tempdir().unwrap();
        // A regular file where the store directory should be
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let store = JsonFileStore::new(&blocker);

        assert!(matches!(
            store.save("pool", &history(&["a.jpg"])),
            Err(Error::PersistenceWrite(_))
        ));
    }

    #[test]
    fn test_concurrent_writers_never_tear() {
        let dir = tempdir().unwrap();
        let path = Arc::new(dir.path().join("pool.json"));
        let big: Vec<String> = (0..2000).map(|i| format!("image-{:05}.jpg", i)).collect();
        write_json_atomic(&path, &RecencyHistory::from_entries(big.clone())).unwrap();

        let done = Arc::new(AtomicBool::new(false));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let path = path.clone();
                let done = done.clone();
                let mut entries = big.clone();
                entries[0] = format!("writer-{}.jpg", w);
                thread::spawn(move || {
                    let history = RecencyHistory::from_entries(entries);
                    let mut failures = 0;
                    while !done.load(Ordering::SeqCst) {
                        if write_json_atomic(&path, &history).is_err() {
                            failures += 1;
                        }
                    }
                    failures
                })
            })
            .collect();

        for _ in 0..2000 {
            let loaded: RecencyHistory = read_json(&path).unwrap().unwrap();
            assert_eq!(loaded.len(), 2000);
        }
        done.store(true, Ordering::SeqCst);

        for writer in writers {
            assert_eq!(writer.join().unwrap(), 0);
        }
        // No stray temporary files
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.load("k").unwrap().is_none());
        store.save("k", &history(&["x.jpg"])).unwrap();
        assert_eq!(store.load("k").unwrap().unwrap(), history(&["x.jpg"]));
    }
}
