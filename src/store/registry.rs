//! Subscription registry implementation.

use crate::error::{NotifyError, Result};
use crate::types::{record_file_name, RecordState, SubscriptionRecord, RECORD_EXTENSION};
use fs2::FileExt;
use std::fs::{self, File, ReadDir};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Quarantine subdirectory, relative to the registry directory.
pub const REVOKED_DIR: &str = "revoked";

/// Advisory lock file held while a store is open.
pub const LOCK_FILE: &str = ".lock";

/// Durable collection of subscription records, one file per record.
///
/// At most one `SubscriptionStore` may be open on a directory at a time;
/// the second opener gets [`NotifyError::Locked`].
pub struct SubscriptionStore {
    /// Directory holding active records.
    path: PathBuf,

    /// Directory holding quarantined records.
    revoked: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,
}

impl SubscriptionStore {
    /// Open the registry at `path`, creating the directory if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;

        let lock_file = Self::acquire_lock(&path)?;
        let revoked = path.join(REVOKED_DIR);

        Ok(Self {
            path,
            revoked,
            _lock_file: lock_file,
        })
    }

    /// Create or replace the record keyed by its client key.
    ///
    /// The file is written under a hidden temporary name, synced, and then
    /// renamed into place, so readers never see a partial record.
    pub fn put(&self, record: &SubscriptionRecord) -> Result<PathBuf> {
        record.validate()?;

        let name = record.file_name();
        let final_path = self.path.join(&name);
        let tmp_path = self.path.join(format!(".{name}.tmp"));

        let mut encoded = serde_json::to_vec_pretty(record)?;
        encoded.push(b'\n');

        let result = (|| -> Result<()> {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&encoded)?;
            file.sync_all()?;
            fs::rename(&tmp_path, &final_path)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result?;

        tracing::debug!(path = %final_path.display(), "stored subscription");
        Ok(final_path)
    }

    /// Enumerate the active records.
    ///
    /// The iterator is lazy and yields one item per record file in directory
    /// order. A file that can't be read back as a record is yielded as an
    /// `Err` and enumeration carries on. Call again to restart.
    pub fn list(&self) -> Result<SubscriptionIter> {
        Ok(SubscriptionIter::new(fs::read_dir(&self.path)?))
    }

    /// Enumerate the quarantined records.
    pub fn list_quarantined(&self) -> Result<SubscriptionIter> {
        match fs::read_dir(&self.revoked) {
            Ok(dir) => Ok(SubscriptionIter::new(dir)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(SubscriptionIter::empty()),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a record out of the active set.
    ///
    /// The file is renamed into the revoked directory under its original
    /// name with its content unchanged. Returns `false` when the record was
    /// not active, which makes repeated calls a no-op.
    pub fn quarantine(&self, record: &SubscriptionRecord) -> Result<bool> {
        let name = record.file_name();
        let src = self.path.join(&name);
        let dst = self.revoked.join(&name);

        fs::create_dir_all(&self.revoked)?;

        match fs::rename(&src, &dst) {
            Ok(()) => {
                tracing::debug!(from = %src.display(), to = %dst.display(), "quarantined subscription");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Report whether a key is active, quarantined or unknown.
    ///
    /// A re-enrolled key counts as active even if an older copy sits in
    /// quarantine.
    pub fn state_of(&self, key: &str) -> Result<Option<RecordState>> {
        let name = record_file_name(key);
        if self.path.join(&name).try_exists()? {
            return Ok(Some(RecordState::Active));
        }
        if self.revoked.join(&name).try_exists()? {
            return Ok(Some(RecordState::Quarantined));
        }
        Ok(None)
    }

    /// Paths of the active record files, sorted.
    pub fn active_paths(&self) -> Result<Vec<PathBuf>> {
        Self::paths(&self.path)
    }

    /// Paths of the quarantined record files, sorted.
    pub fn quarantined_paths(&self) -> Result<Vec<PathBuf>> {
        Self::paths(&self.revoked)
    }

    /// Sorted record file paths directly under `dir`, without opening a store.
    ///
    /// Takes no lock and creates nothing, so it works on a read-only
    /// registry or one a dispatch run currently holds. A missing directory
    /// has no records.
    pub fn paths(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        match record_paths(dir.as_ref()) {
            Err(NotifyError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            other => other,
        }
    }

    /// Path an active record is stored at.
    pub fn record_path(&self, record: &SubscriptionRecord) -> PathBuf {
        self.path.join(record.file_name())
    }

    /// The registry directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The quarantine directory.
    pub fn revoked_path(&self) -> &Path {
        &self.revoked
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join(LOCK_FILE))?;

        lock_file
            .try_lock_exclusive()
            .map_err(|_| NotifyError::Locked)?;

        Ok(lock_file)
    }
}

/// Lazy iterator over the records of one registry directory.
pub struct SubscriptionIter {
    entries: Option<ReadDir>,
}

impl SubscriptionIter {
    fn new(entries: ReadDir) -> Self {
        Self {
            entries: Some(entries),
        }
    }

    fn empty() -> Self {
        Self { entries: None }
    }

    /// Count the record files not visited yet, without reading them, and
    /// end the iteration.
    pub fn count_remaining(&mut self) -> usize {
        let Some(entries) = self.entries.take() else {
            return 0;
        };

        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                is_record_file(&entry.path()) && entry.file_type().map_or(false, |ft| ft.is_file())
            })
            .count()
    }
}

impl Iterator for SubscriptionIter {
    type Item = Result<SubscriptionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let entries = self.entries.as_mut()?;

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }
            match entry.file_type() {
                Ok(ft) if ft.is_file() => {}
                Ok(_) => continue,
                Err(e) => return Some(Err(NotifyError::integrity(path, e.to_string()))),
            }
            return Some(read_record(&path));
        }

        None
    }
}

/// Read and check one record file.
fn read_record(path: &Path) -> Result<SubscriptionRecord> {
    let content =
        fs::read(path).map_err(|e| NotifyError::integrity(path, format!("unreadable: {e}")))?;

    let record: SubscriptionRecord = serde_json::from_slice(&content)
        .map_err(|e| NotifyError::integrity(path, format!("malformed: {e}")))?;

    record
        .validate()
        .map_err(|e| NotifyError::integrity(path, e.to_string()))?;

    let expected = record.file_name();
    if path.file_name().and_then(|n| n.to_str()) != Some(expected.as_str()) {
        return Err(NotifyError::integrity(
            path,
            format!("key does not match file name (expected {expected})"),
        ));
    }

    Ok(record)
}

/// Visible `*.json` files directly under a directory.
fn is_record_file(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .map_or(true, |n| n.starts_with('.'));
    !hidden && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
}

fn record_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if is_record_file(&path) && entry.file_type()?.is_file() {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}
