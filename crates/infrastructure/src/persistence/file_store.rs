//! File-backed key-value store.
//!
//! All entries live in one JSON object file written in the deterministic
//! format of [`crate::serialization`]:
//!
//! ```json
//! {
//!   "auth_token": "eyJhbGciOi...",
//!   "auth_user": "{\"username\":\"alice\",\"roles\":[\"ADMIN\"]}"
//! }
//! ```
//!
//! Writes go to a sibling temporary file that is then renamed over the
//! original, so a crash never leaves a half-written file behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tokenrelay_application::ports::{KeyValueStore, StorageError};
use tracing::debug;

use crate::serialization::{SerializationError, from_json_bytes, to_json_stable_bytes};

/// File name used under the platform data directory.
pub const CREDENTIALS_FILE: &str = "credentials.json";

/// Key-value store persisted to a single JSON file.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileKeyValueStore {
    /// Opens the store at `path`, loading existing entries.
    ///
    /// A missing file is an empty store; it is created on the first write.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = if path.exists() {
            let content = fs::read(&path)?;
            from_json_bytes(&content).map_err(to_storage_error)?
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "opened credential file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Returns the default location: `<data dir>/tokenrelay/credentials.json`.
    #[must_use]
    pub fn default_location() -> Option<PathBuf> {
        dirs::data_dir().map(|p| p.join("tokenrelay").join(CREDENTIALS_FILE))
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let content = to_json_stable_bytes(entries).map_err(to_storage_error)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.write(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.write(&next)?;
        *entries = next;
        Ok(())
    }
}

fn to_storage_error(error: SerializationError) -> StorageError {
    match error {
        SerializationError::Io(e) => StorageError::Io(e),
        other => StorageError::Serialization(other.to_string()),
    }
}
