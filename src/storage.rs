//! Persisted client storage.
//!
//! Key-value store standing in for browser local storage. Every key is
//! written under the `amapill_` prefix. Two backends:
//! - `MemoryStore` for tests and ephemeral sessions
//! - `FileStore` writing one JSON object to the user data directory

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::STORAGE_PREFIX;

// ═══════════════════════════════════════════════════════════
// Keys
// ═══════════════════════════════════════════════════════════

/// Every key the client persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    AuthToken,
    RefreshToken,
    User,
    SelectedRole,
    DevMode,
    FamilyGroup,
    DietLogsSeed,
    OcrStateId,
    KakaoOAuthState,
}

impl StorageKey {
    pub const ALL: [StorageKey; 9] = [
        Self::AuthToken,
        Self::RefreshToken,
        Self::User,
        Self::SelectedRole,
        Self::DevMode,
        Self::FamilyGroup,
        Self::DietLogsSeed,
        Self::OcrStateId,
        Self::KakaoOAuthState,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            Self::AuthToken => "auth_token",
            Self::RefreshToken => "refresh_token",
            Self::User => "user",
            Self::SelectedRole => "selected_role",
            Self::DevMode => "dev_mode",
            Self::FamilyGroup => "family_group",
            Self::DietLogsSeed => "diet_logs_seed",
            Self::OcrStateId => "ocr_state_id",
            Self::KakaoOAuthState => "kakao_oauth_state",
        }
    }

    /// Full persisted key, including the app prefix.
    pub fn key(&self) -> String {
        format!("{STORAGE_PREFIX}{}", self.suffix())
    }

    /// Keys wiped on logout.
    pub fn session_keys() -> &'static [StorageKey] {
        &[
            Self::AuthToken,
            Self::RefreshToken,
            Self::User,
            Self::SelectedRole,
            Self::FamilyGroup,
        ]
    }
}

// ═══════════════════════════════════════════════════════════
// KeyValueStore
// ═══════════════════════════════════════════════════════════

/// String-valued persistent storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError>;
    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: StorageKey) -> Result<(), StorageError>;
}

/// Typed JSON access over any `KeyValueStore`.
pub trait KeyValueStoreExt: KeyValueStore {
    fn get_json<T: DeserializeOwned>(&self, key: StorageKey) -> Result<Option<T>, StorageError> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize + ?Sized>(&self, key: StorageKey, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }

    fn remove_all(&self, keys: &[StorageKey]) -> Result<(), StorageError> {
        for key in keys {
            self.remove(*key)?;
        }
        Ok(())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// Errors from client storage.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Internal lock error")]
    LockPoisoned,
}

// ═══════════════════════════════════════════════════════════
// MemoryStore
// ═══════════════════════════════════════════════════════════

/// In-memory storage; contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(&key.key()).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.key(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.remove(&key.key());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// FileStore
// ═══════════════════════════════════════════════════════════

/// JSON-file storage, written through on every mutation.
///
/// Writes go to a sibling temp file and are renamed into place so a crash
/// never leaves a truncated file behind.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or create) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(path = %path.display(), keys = entries.len(), "Client storage opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(&key.key()).cloned())
    }

    fn set(&self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.key(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::LockPoisoned)?;
        if entries.remove(&key.key()).is_some() {
            self.persist(&entries)?;
        }
        Ok(())
    }
}
