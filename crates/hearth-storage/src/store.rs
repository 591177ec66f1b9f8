//! Credential storage and retrieval.

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, StorageError};

/// Reserved identifier under which the service-server public key is
/// stored.
pub const SERVICE_SERVER_ID: &str = "SERVICE_SERVER_ID";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    id: String,
    #[serde(with = "base64_bytes")]
    key: Vec<u8>,
    admin: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
    entries: Vec<StoredEntry>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<StoredEntry>,
    dirty: bool,
}

/// Persistent map of principal identifiers to credential entries.
///
/// Entries keep insertion order for serialization; lookup is by id.
/// Every operation runs under a single mutex and mutations are written
/// through to disk before returning, replacing the backing file
/// atomically.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    inner: Mutex<Inner>,
}

impl CredentialStore {
    /// Load the store at `path`, or create an empty one.
    ///
    /// Creation writes an empty document and restricts the file to
    /// owner-only read/write.
    pub fn init(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let store = if path.exists() {
            let document: StoreDocument = serde_json::from_str(&fs::read_to_string(&path)?)?;
            info!(path = %path.display(), entries = document.entries.len(), "credential store loaded");
            Self {
                path,
                inner: Mutex::new(Inner {
                    entries: document.entries,
                    dirty: false,
                }),
            }
        } else {
            let store = Self {
                path,
                inner: Mutex::new(Inner::default()),
            };
            store.save(&mut store.inner.lock())?;
            info!(path = %store.path.display(), "credential store created");
            store
        };
        Ok(store)
    }

    /// Whether an entry exists for `id`.
    pub fn has_entry(&self, id: &str) -> bool {
        self.inner.lock().entries.iter().any(|entry| entry.id == id)
    }

    /// Key material stored for `id`.
    pub fn get_credentials(&self, id: &str) -> Result<Vec<u8>> {
        self.inner
            .lock()
            .entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.key.clone())
            .ok_or_else(|| StorageError::NotAvailable(id.to_string()))
    }

    /// Insert a new entry and persist.
    ///
    /// Fails with [`StorageError::AlreadyExists`] when `id` is taken,
    /// unless `overwrite` is set.
    pub fn add_credentials(&self, id: &str, key: &[u8], admin: bool, overwrite: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.entries.iter().position(|entry| entry.id == id) {
            Some(index) => {
                if !overwrite {
                    return Err(StorageError::AlreadyExists(id.to_string()));
                }
                let entry = &mut inner.entries[index];
                entry.key = key.to_vec();
                entry.admin = admin;
            }
            None => inner.entries.push(StoredEntry {
                id: id.to_string(),
                key: key.to_vec(),
                admin,
            }),
        }
        inner.dirty = true;
        self.save(&mut inner)
    }

    /// Replace the key material of an existing entry and persist.
    pub fn set_credentials(&self, id: &str, key: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| StorageError::NotAvailable(id.to_string()))?;
        entry.key = key.to_vec();
        inner.dirty = true;
        self.save(&mut inner)
    }

    /// Remove an entry unconditionally and persist.
    ///
    /// Policy (who may remove what) is enforced by the controller.
    pub fn remove_entry(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock();
        let position = inner
            .entries
            .iter()
            .position(|entry| entry.id == id)
            .ok_or_else(|| StorageError::NotAvailable(id.to_string()))?;
        inner.entries.remove(position);
        inner.dirty = true;
        self.save(&mut inner)
    }

    /// Whether `id` exists and carries the admin flag.
    pub fn is_admin(&self, id: &str) -> bool {
        self.inner
            .lock()
            .entries
            .iter()
            .any(|entry| entry.id == id && entry.admin)
    }

    /// Set the admin flag of an existing entry and persist.
    pub fn set_admin(&self, id: &str, admin: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| StorageError::NotAvailable(id.to_string()))?;
        entry.admin = admin;
        inner.dirty = true;
        self.save(&mut inner)
    }

    /// Number of entries.
    pub fn size(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Flush pending state to disk.
    pub fn shutdown(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.dirty {
            return self.save(&mut inner);
        }
        Ok(())
    }

    fn save(&self, inner: &mut Inner) -> Result<()> {
        let document = StoreDocument {
            entries: inner.entries.clone(),
        };
        let json = serde_json::to_string_pretty(&document)?;

        // Write to a sibling temp file and rename over the store so a
        // crash mid-write never leaves a torn document.
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json)?;
        set_restrictive_permissions(&tmp_path)?;
        fs::rename(&tmp_path, &self.path)?;
        inner.dirty = false;
        Ok(())
    }
}

/// Restrict a file to owner-only read/write (0600).
#[cfg(unix)]
pub fn set_restrictive_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

/// Restrict a file to owner-only read/write (no-op off unix).
#[cfg(not(unix))]
pub fn set_restrictive_permissions(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
