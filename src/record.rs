use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `total_size` value meaning "not yet probed".
pub const LENGTH_UNKNOWN: i64 = 0;
/// `total_size` value meaning "probe failed / cannot determine length".
pub const LENGTH_UNDETERMINED: i64 = -1;

/// Checkpoint describing one logical download.
///
/// The same shape doubles as the progress snapshot delivered to listeners:
/// a snapshot is a clone of the record taken at emission time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransferRecord {
    pub key: String,
    pub url: String,
    pub save_path: PathBuf,
    /// Bytes already durably written to `save_path`.
    pub download_position: i64,
    /// Expected total byte count; see `LENGTH_UNKNOWN` / `LENGTH_UNDETERMINED`.
    pub total_size: i64,
    /// Set when the transfer stopped due to cooperative cancellation.
    pub exited: bool,
}

impl TransferRecord {
    pub fn new(key: impl Into<String>, url: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            save_path: save_path.into(),
            download_position: 0,
            total_size: LENGTH_UNKNOWN,
            exited: false,
        }
    }

    /// Record keyed by a name derived from the URL's last path segment.
    pub fn for_url(url: impl Into<String>, save_path: impl Into<PathBuf>) -> Self {
        let url = url.into();
        let key = crate::utils::derive_key(&url);
        Self::new(key, url, save_path)
    }

    /// True once the known total has been reached.
    pub fn is_finished(&self) -> bool {
        self.total_size > 0 && self.download_position >= self.total_size
    }

    /// Reset to the fresh-download state, adopting a newly probed length.
    pub fn reset_for_length(&mut self, total_size: i64) {
        self.download_position = 0;
        self.total_size = total_size;
        self.exited = false;
    }

    /// Sync `download_position` with the actual on-disk length, if the file
    /// exists. The physical file always wins over the stored position.
    pub fn sync_with_file(&mut self) {
        if let Ok(meta) = std::fs::metadata(&self.save_path) {
            self.download_position = meta.len() as i64;
        }
    }

    pub fn save_path(&self) -> &Path {
        &self.save_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_starts_at_zero() {
        let rec = TransferRecord::new("k", "http://host/f.bin", "/tmp/f.bin");
        assert_eq!(rec.download_position, 0);
        assert_eq!(rec.total_size, LENGTH_UNKNOWN);
        assert!(!rec.exited);
        assert!(!rec.is_finished());
    }

    #[test]
    fn finished_only_with_known_positive_total() {
        let mut rec = TransferRecord::new("k", "http://host/f.bin", "/tmp/f.bin");
        assert!(!rec.is_finished());
        rec.total_size = 100;
        rec.download_position = 100;
        assert!(rec.is_finished());
        rec.total_size = LENGTH_UNDETERMINED;
        assert!(!rec.is_finished());
    }

    #[test]
    fn reset_discards_progress_and_exit_flag() {
        let mut rec = TransferRecord::new("k", "http://host/f.bin", "/tmp/f.bin");
        rec.download_position = 512;
        rec.total_size = 1024;
        rec.exited = true;
        rec.reset_for_length(2048);
        assert_eq!(rec.download_position, 0);
        assert_eq!(rec.total_size, 2048);
        assert!(!rec.exited);
    }

    #[test]
    fn key_derived_from_url_path() {
        let rec = TransferRecord::for_url("http://host/dir/archive.tar.gz", "/tmp/a");
        assert_eq!(rec.key, "archive.tar.gz");
    }
}
