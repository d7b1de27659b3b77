//! File-backed store
//!
//! Persists all objects as one JSON snapshot. Every operation loads the
//! snapshot, applies the change through [`StoreState`], and writes the
//! result back atomically through a uniquely named temp file. A missing
//! file is an empty store.
//!
//! Any number of handles, in any number of processes, may share one file.
//! Each load-modify-save holds an exclusive lock on the sidecar
//! `<path>.lock`, so resource-version checks see the latest committed state.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use annotator_model::{ObjectKey, Overlay, StoreError, Target};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::state::StoreState;
use super::Store;

/// Schema version for the snapshot file
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "annotator/store@1";

/// On-disk form of the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub schema_version: u32,
    pub schema_id: String,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub overlays: Vec<Overlay>,
}

impl StoreSnapshot {
    pub fn from_state(state: &StoreState) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            targets: state.targets().cloned().collect(),
            overlays: state.overlays().cloned().collect(),
        }
    }

    pub fn into_state(self) -> StoreState {
        StoreState::from_objects(self.overlays, self.targets)
    }
}

fn io_error(path: &Path, err: io::Error) -> StoreError {
    StoreError::Unavailable(format!("{}: {}", path.display(), err))
}

/// Exclusive advisory lock, released on drop.
struct FileLock {
    file: File,
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        Self {
            path,
            lock_path: PathBuf::from(lock_path),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Block until this handle holds the sidecar lock.
    fn lock(&self) -> Result<FileLock, StoreError> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| io_error(&self.lock_path, e))?;
        file.lock_exclusive()
            .map_err(|e| io_error(&self.lock_path, e))?;
        Ok(FileLock { file })
    }

    fn load_unlocked(&self) -> Result<StoreState, StoreError> {
        let json = match fs::read_to_string(&self.path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(StoreState::new()),
            Err(e) => return Err(io_error(&self.path, e)),
        };
        let snapshot: StoreSnapshot = serde_json::from_str(&json).map_err(|e| {
            StoreError::Unavailable(format!("{}: invalid snapshot: {}", self.path.display(), e))
        })?;
        if snapshot.schema_version != SCHEMA_VERSION {
            return Err(StoreError::Unavailable(format!(
                "{}: unsupported schema version {}",
                self.path.display(),
                snapshot.schema_version
            )));
        }
        Ok(snapshot.into_state())
    }

    /// Write atomically to file (unique temp file, then rename)
    fn save_unlocked(&self, state: &StoreState) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&StoreSnapshot::from_state(state))
            .map_err(|e| StoreError::Unavailable(format!("serialize snapshot: {}", e)))?;

        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut temp = NamedTempFile::new_in(dir).map_err(|e| io_error(dir, e))?;
        temp.write_all(json.as_bytes())
            .map_err(|e| io_error(temp.path(), e))?;
        temp.persist(&self.path)
            .map_err(|e| io_error(&self.path, e.error))?;
        Ok(())
    }

    pub fn load(&self) -> Result<StoreState, StoreError> {
        let _lock = self.lock()?;
        self.load_unlocked()
    }

    pub fn save(&self, state: &StoreState) -> Result<(), StoreError> {
        let _lock = self.lock()?;
        self.save_unlocked(state)
    }

    /// Read-only access to a freshly loaded state.
    pub fn read<R>(
        &self,
        f: impl FnOnce(&StoreState) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let _lock = self.lock()?;
        f(&self.load_unlocked()?)
    }

    /// Load, mutate and save under the lock. Nothing is written if `f` fails.
    pub fn mutate<R>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let _lock = self.lock()?;
        let mut state = self.load_unlocked()?;
        let result = f(&mut state)?;
        self.save_unlocked(&state)?;
        Ok(result)
    }
}

impl Store for FileStore {
    fn get_overlay(&self, key: &ObjectKey) -> Result<Overlay, StoreError> {
        self.read(|state| state.get_overlay(key))
    }

    fn get_target(&self, name: &str) -> Result<Target, StoreError> {
        self.read(|state| state.get_target(name))
    }

    fn update_overlay(&self, overlay: &Overlay) -> Result<Overlay, StoreError> {
        self.mutate(|state| state.update_overlay(overlay))
    }

    fn update_overlay_status(&self, overlay: &Overlay) -> Result<Overlay, StoreError> {
        self.mutate(|state| state.update_overlay_status(overlay))
    }

    fn update_target(&self, target: &Target) -> Result<Target, StoreError> {
        self.mutate(|state| state.update_target(target))
    }

    fn list_overlays(&self, scope: Option<&str>) -> Result<Vec<Overlay>, StoreError> {
        self.read(|state| Ok(state.list_overlays(scope)))
    }

    fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
        self.read(|state| Ok(state.list_targets()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("state.json"));
        assert!(store.list_overlays(None).unwrap().is_empty());
        assert!(store.get_target("team-a").unwrap_err().is_not_found());
    }

    #[test]
    fn test_mutations_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::new(&path);
        store
            .mutate(|s| s.create_target(Target::new("team-a", [("c", "keep")])))
            .unwrap();

        let reopened = FileStore::new(&path);
        let target = reopened.get_target("team-a").unwrap();
        assert_eq!(target.attribute("c"), Some("keep"));
        assert_eq!(target.resource_version, 1);

        // Only the snapshot and its lock file remain; no temp files linger.
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["state.json", "state.json.lock"]);
    }

    #[test]
    fn test_failed_mutation_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::new(&path);
        let err = store
            .mutate(|s| s.set_target_attribute("ghost", "a", "1"))
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!path.exists());
    }

    #[test]
    fn test_separate_handles_do_not_lose_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        FileStore::new(&path)
            .mutate(|s| s.create_target(Target::new("team-a", Vec::<(String, String)>::new())))
            .unwrap();

        std::thread::scope(|scope| {
            for writer in ["left", "right"] {
                let store = FileStore::new(&path);
                scope.spawn(move || {
                    for i in 0..50 {
                        let key = format!("{}-{}", writer, i);
                        store
                            .mutate(|s| s.set_target_attribute("team-a", &key, "1"))
                            .unwrap();
                    }
                });
            }
        });

        let target = FileStore::new(&path).get_target("team-a").unwrap();
        assert_eq!(target.attributes.len(), 100);
        assert_eq!(target.resource_version, 101);
    }

    #[test]
    fn test_stale_version_from_other_handle_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let first = FileStore::new(&path);
        let second = FileStore::new(&path);
        first
            .mutate(|s| s.create_target(Target::new("team-a", [("a", "1")])))
            .unwrap();

        let stale = second.get_target("team-a").unwrap();
        first
            .mutate(|s| s.set_target_attribute("team-a", "b", "2"))
            .unwrap();

        let err = second.update_target(&stale).unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_rejects_unknown_schema_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"schema_version": 9, "schema_id": "x"}"#).unwrap();
        let store = FileStore::new(&path);
        assert!(matches!(store.load(), Err(StoreError::Unavailable(_))));
    }
}
