//! consent::file_store
//!
//! JSON-file consent store.
//!
//! # Storage
//!
//! - `<path>` holds a JSON object mapping record id to record
//! - `<path>.lock` serializes read-modify-write cycles across processes
//!
//! Writes go to `<path>.tmp`, which is renamed over the store, so readers
//! never observe a partially written file. On Unix the file is created
//! with 0600 permissions, since records carry repository content.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use fs2::FileExt;
use uuid::Uuid;

use super::{ConsentError, ConsentRecord, ConsentStore};

/// Consent records in one JSON file.
#[derive(Debug, Clone)]
pub struct FileConsentStore {
    path: PathBuf,
}

/// Exclusive lock held for one read-modify-write cycle; released on drop.
struct StoreLock(File);

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.0.unlock();
    }
}

impl FileConsentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<path>.<suffix>`, keeping the store's own extension.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".");
        name.push(suffix);
        PathBuf::from(name)
    }

    fn lock(&self) -> Result<StoreLock, ConsentError> {
        self.ensure_parent()?;
        let lock_path = self.sibling("lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                ConsentError::WriteError(format!("cannot open {}: {}", lock_path.display(), e))
            })?;
        file.lock_exclusive()
            .map_err(|e| ConsentError::WriteError(format!("cannot lock consent store: {}", e)))?;
        Ok(StoreLock(file))
    }

    fn ensure_parent(&self) -> Result<(), ConsentError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| ConsentError::WriteError(format!("cannot create directory: {}", e)))?;
        }
        Ok(())
    }

    fn read_records(&self) -> Result<BTreeMap<Uuid, ConsentRecord>, ConsentError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)
            .map_err(|e| ConsentError::ReadError(format!("cannot read consent store: {}", e)))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content)
            .map_err(|e| ConsentError::ReadError(format!("cannot parse consent store: {}", e)))
    }

    fn write_records(&self, records: &BTreeMap<Uuid, ConsentRecord>) -> Result<(), ConsentError> {
        let content = serde_json::to_string_pretty(records)
            .map_err(|e| ConsentError::WriteError(format!("cannot serialize records: {}", e)))?;

        let temp_path = self.sibling("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)
                .map_err(|e| ConsentError::WriteError(format!("cannot create temp file: {}", e)))?;

            #[cfg(unix)]
            file.set_permissions(fs::Permissions::from_mode(0o600))
                .map_err(|e| ConsentError::WriteError(format!("cannot set permissions: {}", e)))?;

            file.write_all(content.as_bytes())
                .map_err(|e| ConsentError::WriteError(format!("cannot write records: {}", e)))?;
            file.sync_all()
                .map_err(|e| ConsentError::WriteError(format!("cannot sync to disk: {}", e)))?;
        }

        fs::rename(&temp_path, &self.path)
            .map_err(|e| ConsentError::WriteError(format!("cannot rename temp file: {}", e)))
    }
}

impl ConsentStore for FileConsentStore {
    fn load(&self, id: &Uuid) -> Result<Option<ConsentRecord>, ConsentError> {
        Ok(self.read_records()?.remove(id))
    }

    fn save(&self, record: &ConsentRecord) -> Result<(), ConsentError> {
        let _lock = self.lock()?;
        let mut records = self.read_records()?;
        records.insert(record.id, record.clone());
        self.write_records(&records)
    }

    fn list(&self) -> Result<Vec<ConsentRecord>, ConsentError> {
        let mut records: Vec<_> = self.read_records()?.into_values().collect();
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    fn remove(&self, id: &Uuid) -> Result<bool, ConsentError> {
        let _lock = self.lock()?;
        let mut records = self.read_records()?;
        let removed = records.remove(id).is_some();
        if removed {
            self.write_records(&records)?;
        }
        Ok(removed)
    }
}
