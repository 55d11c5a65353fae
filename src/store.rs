use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};

use crate::record::TransferRecord;
use crate::utils::sanitize_filename;

/// Persistence boundary for transfer checkpoints.
///
/// The engine treats the store as synchronous and authoritative: no caching
/// beyond the in-flight record. Implementations must be safe under concurrent
/// load/save for distinct keys; same-key concurrent sessions are a caller
/// error.
pub trait CheckpointStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<TransferRecord>>;
    fn save(&self, record: &TransferRecord) -> Result<()>;
}

/// Default store: one JSON document per key in a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_filename(key)))
    }
}

impl CheckpointStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<TransferRecord>> {
        let path = self.path_for(key);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context(format!("Failed to read checkpoint {:?}", path)),
        };
        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                // Unreadable checkpoint: treat as absent so the download
                // restarts from scratch instead of failing forever.
                warn!("discarding corrupt checkpoint {:?}: {}", path, e);
                Ok(None)
            }
        }
    }

    fn save(&self, record: &TransferRecord) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .context(format!("Failed to create checkpoint dir {:?}", self.dir))?;
        let path = self.path_for(&record.key);
        let content = serde_json::to_string(record)?;
        fs::write(&path, content).context(format!("Failed to write checkpoint {:?}", path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());

        let mut rec = TransferRecord::new("f1.bin", "http://host/f1.bin", "/tmp/f1.bin");
        rec.download_position = 4096;
        rec.total_size = 65536;
        store.save(&rec).unwrap();

        let loaded = store.load("f1.bin").unwrap().unwrap();
        assert_eq!(loaded, rec);
    }

    #[test]
    fn missing_key_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(store.load("nope").unwrap().is_none());
    }

    #[test]
    fn corrupt_checkpoint_loads_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        assert!(store.load("bad").unwrap().is_none());
    }

    #[test]
    fn keys_are_sanitized_to_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let rec = TransferRecord::new("a/b:c", "http://host/x", "/tmp/x");
        store.save(&rec).unwrap();
        assert!(store.load("a/b:c").unwrap().is_some());
        assert!(dir.path().join("a_b_c.json").exists());
    }
}
