//! Durable per-block progress records.
//!
//! One JSON file per fingerprint under a dedicated directory. Records are
//! rewritten whole on every update through a temp file and a rename, so a
//! crash mid-write never leaves a truncated record behind.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use blockput_protocol::constants::RECORD_EXTENSION;
use blockput_protocol::{BlockResult, ProgressRecord};
use tracing::{debug, info, warn};

use crate::TransferError;

/// File-backed store of progress records.
pub struct ProgressStore {
    dir: PathBuf,
    /// In-memory copies of the records currently leased to a session.
    open: Arc<Mutex<HashMap<String, ProgressRecord>>>,
}

impl ProgressStore {
    /// Creates a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            open: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Directory holding the record files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `fingerprint`.
    pub fn record_path(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.{RECORD_EXTENSION}"))
    }

    /// Reads the record for `fingerprint`.
    ///
    /// A missing file and an unreadable or corrupt one both yield `None`; the
    /// caller starts fresh either way.
    pub fn load(&self, fingerprint: &str) -> Option<ProgressRecord> {
        let path = self.record_path(fingerprint);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(fingerprint, "no progress record");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read progress record, starting fresh");
                return None;
            }
        };
        match serde_json::from_slice::<ProgressRecord>(&data) {
            Ok(record) => {
                debug!(fingerprint, filled = record.filled(), "loaded progress record");
                Some(record)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt progress record, starting fresh");
                None
            }
        }
    }

    /// Checks a loaded record before it is trusted for resumption.
    ///
    /// Returns an all-empty record of `block_count` slots when the slot count
    /// does not match or when any stored result has expired. Expiry is
    /// all-or-nothing: the remote invalidates contexts for the whole file.
    pub fn validate<F>(
        record: ProgressRecord,
        block_count: usize,
        now: i64,
        is_expired: F,
    ) -> ProgressRecord
    where
        F: Fn(&BlockResult, i64) -> bool,
    {
        if record.block_count() != block_count {
            info!(
                stored = record.block_count(),
                expected = block_count,
                "progress record does not match block layout, discarding"
            );
            return ProgressRecord::empty(block_count);
        }
        if let Some((index, result)) = record.iter_set().find(|(_, r)| is_expired(r, now)) {
            info!(
                block = index,
                expired_at = result.expired_at,
                "stored block context expired, discarding record"
            );
            return ProgressRecord::empty(block_count);
        }
        record
    }

    /// Installs `record` as the live copy for `fingerprint` and takes the
    /// per-fingerprint lock.
    ///
    /// Fails with [`TransferError::RecordBusy`] while another lease is alive.
    pub fn open(
        &self,
        fingerprint: &str,
        record: ProgressRecord,
    ) -> Result<RecordLease, TransferError> {
        let mut open = self.open.lock().unwrap();
        if open.contains_key(fingerprint) {
            return Err(TransferError::RecordBusy(fingerprint.to_string()));
        }
        open.insert(fingerprint.to_string(), record);
        Ok(RecordLease {
            fingerprint: fingerprint.to_string(),
            open: Arc::clone(&self.open),
        })
    }

    /// Returns a copy of the live record for `fingerprint`.
    pub fn snapshot(&self, fingerprint: &str) -> Option<ProgressRecord> {
        self.open.lock().unwrap().get(fingerprint).cloned()
    }

    /// Stores `result` in slot `index` and rewrites the record file.
    ///
    /// The lock is held across the write, so concurrent callers never
    /// interleave their read-modify-write cycles.
    pub fn save_block(
        &self,
        fingerprint: &str,
        index: usize,
        result: BlockResult,
    ) -> Result<(), TransferError> {
        let mut open = self.open.lock().unwrap();
        let record = open
            .get_mut(fingerprint)
            .ok_or_else(|| TransferError::RecordNotOpen(fingerprint.to_string()))?;
        let block_count = record.block_count();
        if !record.set(index, result) {
            return Err(TransferError::BlockOutOfRange { index, block_count });
        }
        let bytes = serde_json::to_vec(&*record)?;
        write_atomic(&self.record_path(fingerprint), &bytes)?;
        Ok(())
    }

    /// Removes the record file for `fingerprint`.
    ///
    /// A missing file is not an error.
    pub fn clear(&self, fingerprint: &str) -> Result<(), TransferError> {
        let mut open = self.open.lock().unwrap();
        if let Some(record) = open.get_mut(fingerprint) {
            *record = ProgressRecord::empty(record.block_count());
        }
        match std::fs::remove_file(self.record_path(fingerprint)) {
            Ok(()) => {
                debug!(fingerprint, "progress record cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Exclusive claim on one fingerprint's record. Released on drop.
pub struct RecordLease {
    fingerprint: String,
    open: Arc<Mutex<HashMap<String, ProgressRecord>>>,
}

impl RecordLease {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

impl Drop for RecordLease {
    fn drop(&mut self) {
        if let Ok(mut open) = self.open.lock() {
            open.remove(&self.fingerprint);
        }
    }
}

/// Writes `bytes` to a sibling temp file and renames it over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}
