//! Byte-oriented key/value collaborator for resource snapshots
//!
//! The resource layer never interprets stored bytes. Keys are hrefs.

use std::collections::HashMap;
use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Opaque blob store keyed by href
pub trait PointStore: Send + Sync + Debug {
    /// Store `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: Bytes) -> StoreResult<()>;

    /// Fetch the value stored under `key`
    fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// All stored keys, sorted
    fn keys(&self) -> StoreResult<Vec<String>>;
}

/// In-memory point store
#[derive(Debug, Default)]
pub struct MemoryPointStore {
    points: RwLock<HashMap<String, Bytes>>,
}

impl MemoryPointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PointStore for MemoryPointStore {
    fn set(&self, key: &str, value: Bytes) -> StoreResult<()> {
        self.points.write().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        Ok(self.points.read().get(key).cloned())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys: Vec<String> = self.points.read().keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Replacement for `/` in file names
const SLASH_ESCAPE: &str = "^^^^";

/// One file per key under a root directory
#[derive(Debug)]
pub struct FsPointStore {
    root: PathBuf,
}

impl FsPointStore {
    /// Open (and create if needed) a store rooted at `root`
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        debug!(path = %root.display(), "Opened filesystem point store");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key.replace('/', SLASH_ESCAPE))
    }
}

impl PointStore for FsPointStore {
    fn set(&self, key: &str, value: Bytes) -> StoreResult<()> {
        fs::write(self.path_for(key), &value)?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        match fs::read(self.path_for(key)) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::from(e)),
        }
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                keys.push(name.replace(SLASH_ESCAPE, "/"));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn exercise(store: &dyn PointStore) {
        assert_eq!(store.get("/edev_0").unwrap(), None);
        store.set("/edev_0", Bytes::from_static(b"one")).unwrap();
        store.set("/derp_1_derc", Bytes::from_static(b"two")).unwrap();
        store.set("/edev_0", Bytes::from_static(b"three")).unwrap();

        assert_eq!(
            store.get("/edev_0").unwrap(),
            Some(Bytes::from_static(b"three"))
        );
        assert_eq!(
            store.keys().unwrap(),
            vec!["/derp_1_derc".to_string(), "/edev_0".to_string()]
        );
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryPointStore::new());
    }

    #[test]
    fn test_fs_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPointStore::open(dir.path().join("points")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_fs_store_escapes_slashes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPointStore::open(dir.path()).unwrap();
        store.set("/mup_0", Bytes::from_static(b"x")).unwrap();
        assert!(dir.path().join("^^^^mup_0").is_file());
    }

    #[test]
    fn test_fs_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FsPointStore::open(dir.path())
            .unwrap()
            .set("/tm", Bytes::from_static(b"t"))
            .unwrap();
        let reopened = FsPointStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get("/tm").unwrap(), Some(Bytes::from_static(b"t")));
    }
}
