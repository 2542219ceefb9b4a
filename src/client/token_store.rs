use std::{
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use serde_json::{Map, Value};
use tempfile::NamedTempFile;

/// Name under which the credential is kept.
pub const TOKEN_KEY: &str = "authToken";

/// TokenStore
///
/// Holds at most one credential. None of the operations report failure to the caller: a storage
/// problem is logged and `get` then answers `None`, which the session treats as signed out.
/// `clear` on an empty store is a no-op.
pub trait TokenStore: Send + Sync {
    fn get(&self) -> Option<String>;
    fn set(&self, token: &str);
    fn clear(&self);
}

/// FileTokenStore
///
/// Keeps the credential under `authToken` in a JSON object file. Other keys in the same file are
/// left untouched.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty object.
    fn read_entries(&self) -> Result<Map<String, Value>, String> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(err) => return Err(err.to_string()),
        };
        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Map::new());
        }
        serde_json::from_slice(&raw).map_err(|e| e.to_string())
    }

    /// Writes a sibling temp file and renames it over the store, so readers see either the old
    /// document or the new one and never a truncated file.
    fn write_entries(&self, entries: &Map<String, Value>) -> Result<(), String> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
                parent
            }
            None => Path::new("."),
        };
        let raw = serde_json::to_vec_pretty(entries).map_err(|e| e.to_string())?;
        let mut staged = NamedTempFile::new_in(dir).map_err(|e| e.to_string())?;
        staged.write_all(&raw).map_err(|e| e.to_string())?;
        staged
            .persist(&self.path)
            .map(|_| ())
            .map_err(|e| e.error.to_string())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self) -> Option<String> {
        match self.read_entries() {
            Ok(entries) => entries
                .get(TOKEN_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read token store");
                None
            }
        }
    }

    fn set(&self, token: &str) {
        // An unreadable file is replaced rather than blocking login.
        let mut entries = self.read_entries().unwrap_or_else(|err| {
            tracing::warn!(path = %self.path.display(), error = %err, "token store unreadable, starting fresh");
            Map::new()
        });
        entries.insert(TOKEN_KEY.to_string(), Value::String(token.to_string()));
        if let Err(err) = self.write_entries(&entries) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to write token store");
        }
    }

    fn clear(&self) {
        let mut entries = match self.read_entries() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to read token store");
                return;
            }
        };
        if entries.remove(TOKEN_KEY).is_none() {
            return;
        }
        if let Err(err) = self.write_entries(&entries) {
            tracing::warn!(path = %self.path.display(), error = %err, "failed to clear token store");
        }
    }
}

/// MemoryTokenStore
///
/// Process-local store for tests and headless tools.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    slot: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: &str) -> Self {
        Self {
            slot: RwLock::new(Some(token.to_string())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self) -> Option<String> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set(&self, token: &str) {
        *self.slot.write().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
    }

    fn clear(&self) {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}
