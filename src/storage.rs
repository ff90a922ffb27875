//! Non-volatile key/value storage for the node.
//!
//! A small JSON-backed store living next to the rs-matter persistence file.
//! It plays the role NVS plays on an embedded target: it is initialized once
//! at startup, holds node-local values (boot counter, last factory reset) and
//! is wiped together with the Matter fabrics on factory reset.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Key/value file name inside the storage directory
pub const NVS_FILE: &str = "nvs.json";
/// rs-matter persistence file name inside the storage directory
pub const MATTER_FILE: &str = "matter.bin";

/// Well-known keys
pub mod keys {
    pub const BOOT_COUNT: &str = "boot_count";
    pub const FACTORY_RESETS: &str = "factory_resets";
}

/// Error types for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage directory could not be created.
    #[error("failed to create storage directory {path:?}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    /// The store file exists but could not be read or written.
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store file exists but is not valid JSON.
    #[error("corrupted store: {0}")]
    Corrupted(#[from] serde_json::Error),
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct NvsData {
    entries: BTreeMap<String, u64>,
}

/// JSON-backed key/value store.
///
/// Writes go straight to disk. A store created with [`NvsStore::volatile`]
/// keeps everything in memory, which is what the node falls back to when the
/// storage directory is unusable.
pub struct NvsStore {
    dir: Option<PathBuf>,
    data: RwLock<NvsData>,
}

impl NvsStore {
    /// Initialize the store in `dir`, creating the directory if needed.
    ///
    /// A corrupted store file is discarded and the store starts empty.
    pub fn init(dir: &Path) -> Result<Self, StorageError> {
        fs::create_dir_all(dir).map_err(|source| StorageError::CreateDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let path = dir.join(NVS_FILE);
        let data = match fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<NvsData>(&bytes) {
                Ok(data) => {
                    info!(
                        "[NVS] Loaded {} entries from {:?}",
                        data.entries.len(),
                        path
                    );
                    data
                }
                Err(e) => {
                    warn!("[NVS] Discarding corrupted store {:?}: {}", path, e);
                    NvsData::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("[NVS] No store found at {:?} (first boot)", path);
                NvsData::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            dir: Some(dir.to_path_buf()),
            data: RwLock::new(data),
        })
    }

    /// A store that is never written to disk.
    pub fn volatile() -> Self {
        Self {
            dir: None,
            data: RwLock::new(NvsData::default()),
        }
    }

    /// Whether values survive a restart.
    pub fn is_persistent(&self) -> bool {
        self.dir.is_some()
    }

    /// Path of the rs-matter persistence file, if the store is persistent.
    pub fn matter_path(&self) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(MATTER_FILE))
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.data.read().entries.get(key).copied()
    }

    pub fn set_u64(&self, key: &str, value: u64) -> Result<(), StorageError> {
        self.commit(|data| {
            data.entries.insert(key.to_string(), value);
        })
    }

    /// Increment a counter and return its new value.
    pub fn increment(&self, key: &str) -> Result<u64, StorageError> {
        self.commit(|data| {
            let counter = data.entries.entry(key.to_string()).or_insert(0);
            *counter = counter.saturating_add(1);
            *counter
        })
    }

    /// Erase every key and delete the Matter persistence file.
    ///
    /// The factory reset counter survives so the number of resets can be
    /// inspected afterwards. The Matter file goes first: when it can't be
    /// removed, the store is left untouched.
    pub fn erase_all(&self) -> Result<(), StorageError> {
        if let Some(matter_path) = self.matter_path() {
            match fs::remove_file(&matter_path) {
                Ok(()) => info!("[NVS] Removed {:?}", matter_path),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.commit(|data| {
            let resets = data.entries.get(keys::FACTORY_RESETS).copied().unwrap_or(0);
            data.entries.clear();
            data.entries
                .insert(keys::FACTORY_RESETS.to_string(), resets.saturating_add(1));
        })
    }

    /// Apply `change` to a copy, write the copy, then make it current.
    ///
    /// Memory only changes once the file is written.
    fn commit<T>(&self, change: impl FnOnce(&mut NvsData) -> T) -> Result<T, StorageError> {
        let mut data = self.data.write();
        let mut next = data.clone();
        let result = change(&mut next);
        self.save(&next)?;
        *data = next;
        Ok(result)
    }

    fn save(&self, data: &NvsData) -> Result<(), StorageError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(data)?;
        fs::write(dir.join(NVS_FILE), bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_creates_directory_and_starts_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested").join("node");

        let store = NvsStore::init(&dir).unwrap();
        assert!(dir.is_dir());
        assert!(store.is_persistent());
        assert_eq!(store.get_u64(keys::BOOT_COUNT), None);
        assert_eq!(store.matter_path(), Some(dir.join(MATTER_FILE)));
    }

    #[test]
    fn test_values_survive_reopen() {
        let tmp = tempfile::tempdir().unwrap();

        let store = NvsStore::init(tmp.path()).unwrap();
        assert_eq!(store.increment(keys::BOOT_COUNT).unwrap(), 1);
        assert_eq!(store.increment(keys::BOOT_COUNT).unwrap(), 2);
        store.set_u64("custom", 42).unwrap();
        drop(store);

        let store = NvsStore::init(tmp.path()).unwrap();
        assert_eq!(store.get_u64(keys::BOOT_COUNT), Some(2));
        assert_eq!(store.get_u64("custom"), Some(42));
    }

    #[test]
    fn test_corrupted_store_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join(NVS_FILE), b"{not json").unwrap();

        let store = NvsStore::init(tmp.path()).unwrap();
        assert_eq!(store.get_u64(keys::BOOT_COUNT), None);
    }

    #[test]
    fn test_erase_all_clears_keys_and_matter_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NvsStore::init(tmp.path()).unwrap();
        store.increment(keys::BOOT_COUNT).unwrap();
        fs::write(tmp.path().join(MATTER_FILE), b"fabrics").unwrap();

        store.erase_all().unwrap();

        assert_eq!(store.get_u64(keys::BOOT_COUNT), None);
        assert_eq!(store.get_u64(keys::FACTORY_RESETS), Some(1));
        assert!(!tmp.path().join(MATTER_FILE).exists());

        // Erasing again without a Matter file is fine
        store.erase_all().unwrap();
        assert_eq!(store.get_u64(keys::FACTORY_RESETS), Some(2));
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("node");
        let store = NvsStore::init(&dir).unwrap();
        store.increment(keys::BOOT_COUNT).unwrap();

        fs::remove_dir_all(&dir).unwrap();

        assert!(matches!(store.set_u64("custom", 7), Err(StorageError::Io(_))));
        assert!(store.increment(keys::BOOT_COUNT).is_err());
        assert!(store.erase_all().is_err());

        assert_eq!(store.get_u64("custom"), None);
        assert_eq!(store.get_u64(keys::BOOT_COUNT), Some(1));
        assert_eq!(store.get_u64(keys::FACTORY_RESETS), None);
    }

    #[test]
    fn test_erase_keeps_store_when_matter_file_stays() {
        let tmp = tempfile::tempdir().unwrap();
        let store = NvsStore::init(tmp.path()).unwrap();
        store.increment(keys::BOOT_COUNT).unwrap();

        // A directory can't be removed as a file
        fs::create_dir(tmp.path().join(MATTER_FILE)).unwrap();
        fs::write(tmp.path().join(MATTER_FILE).join("fabric"), b"x").unwrap();

        assert!(matches!(store.erase_all(), Err(StorageError::Io(_))));
        assert_eq!(store.get_u64(keys::BOOT_COUNT), Some(1));
        assert_eq!(store.get_u64(keys::FACTORY_RESETS), None);
        drop(store);

        let reopened = NvsStore::init(tmp.path()).unwrap();
        assert_eq!(reopened.get_u64(keys::BOOT_COUNT), Some(1));
    }

    #[test]
    fn test_counter_saturates() {
        let store = NvsStore::volatile();
        store.set_u64(keys::BOOT_COUNT, u64::MAX).unwrap();
        assert_eq!(store.increment(keys::BOOT_COUNT).unwrap(), u64::MAX);
    }

    #[test]
    fn test_volatile_store_has_no_matter_path() {
        let store = NvsStore::volatile();
        assert!(!store.is_persistent());
        assert_eq!(store.matter_path(), None);
        assert_eq!(store.increment(keys::BOOT_COUNT).unwrap(), 1);
        store.erase_all().unwrap();
        assert_eq!(store.get_u64(keys::BOOT_COUNT), None);
    }
}
