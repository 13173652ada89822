#![forbid(unsafe_code)]

//! Device-local key/value persistence.
//!
//! The gate keeps its remembered authorization here. Values are opaque
//! strings; callers own their encoding.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

const LOCAL_STORE_SCHEMA_VERSION: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported local store schema version {0}")]
    SchemaVersion(u8),
}

pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), LocalStoreError>;
    /// Returns whether a value was present.
    fn delete(&mut self, key: &str) -> Result<bool, LocalStoreError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        (**self).set(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<bool, LocalStoreError> {
        (**self).delete(key)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: BTreeMap<String, String>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        validate_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        validate_key(key)?;
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, LocalStoreError> {
        validate_key(key)?;
        Ok(self.entries.remove(key).is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LocalStoreDocument {
    schema_version: u8,
    entries: BTreeMap<String, String>,
}

/// Single JSON document on disk, rewritten atomically on every mutation.
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    path: PathBuf,
}

impl FileKeyValueStore {
    pub fn default_local() -> Self {
        let path = env::var("CRM_LOCAL_STORE_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_store_path);
        Self::for_path(path)
    }

    pub fn for_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<Option<LocalStoreDocument>, LocalStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Some(LocalStoreDocument::default()));
        }
        let doc = serde_json::from_str::<LocalStoreDocument>(&raw)?;
        if doc.schema_version != LOCAL_STORE_SCHEMA_VERSION {
            return Err(LocalStoreError::SchemaVersion(doc.schema_version));
        }
        Ok(Some(doc))
    }

    /// Loads the document a mutation starts from. An unparsable or
    /// foreign-version document is replaced rather than blocking every write.
    fn load_for_write(&self) -> Result<(LocalStoreDocument, bool), LocalStoreError> {
        match self.read_document() {
            Ok(doc) => Ok((doc.unwrap_or_default(), false)),
            Err(err @ (LocalStoreError::Json(_) | LocalStoreError::SchemaVersion(_))) => {
                tracing::warn!(
                    error = %err,
                    path = %self.path.display(),
                    "local store document unreadable, replacing it"
                );
                Ok((LocalStoreDocument::default(), true))
            }
            Err(err) => Err(err),
        }
    }

    fn write_document(&self, doc: &LocalStoreDocument) -> Result<(), LocalStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_vec_pretty(doc)?;
        atomic_write(&self.path, &serialized)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, LocalStoreError> {
        validate_key(key)?;
        let Some(doc) = self.read_document()? else {
            return Ok(None);
        };
        Ok(doc.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LocalStoreError> {
        validate_key(key)?;
        let (mut doc, _) = self.load_for_write()?;
        doc.schema_version = LOCAL_STORE_SCHEMA_VERSION;
        doc.entries.insert(key.to_string(), value.to_string());
        self.write_document(&doc)?;
        tracing::debug!(key, path = %self.path.display(), "local store entry written");
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<bool, LocalStoreError> {
        validate_key(key)?;
        let (mut doc, replaced) = self.load_for_write()?;
        let removed = doc.entries.remove(key).is_some();
        if removed || replaced {
            doc.schema_version = LOCAL_STORE_SCHEMA_VERSION;
            self.write_document(&doc)?;
            tracing::debug!(key, path = %self.path.display(), "local store entry removed");
        }
        Ok(removed)
    }
}

fn validate_key(key: &str) -> Result<(), LocalStoreError> {
    if key.trim().is_empty() || key.len() > 128 {
        return Err(LocalStoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}

fn default_store_path() -> PathBuf {
    if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg_config_home)
            .join("crm")
            .join("local_store.json");
    }
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("crm")
            .join("local_store.json");
    }
    PathBuf::from(".crm").join("local_store.json")
}

fn atomic_write(path: &Path, data: &[u8]) -> Result<(), LocalStoreError> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    fs::write(&tmp, data)?;
    fs::rename(tmp, path)?;
    Ok(())
}
