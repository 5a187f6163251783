//! Redaction layer persistence for debugging sessions
//!
//! Redaction blocks can be saved per document and restored later, e.g. to
//! reproduce an export problem. Payloads are JSON values in a key-value store.
//! This is a convenience, not a durability guarantee.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::element::RedactionBlock;

const PAYLOAD_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid stored payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("unsupported payload version {0}")]
    Version(u32),

    #[error("no platform data directory available")]
    NoDataDir,
}

/// Minimal string key-value store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store
#[derive(Debug, Default, Clone)]
pub struct MemoryKeyValueStore {
    values: HashMap<String, String>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.values.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileKeyValueStore {
    dir: PathBuf,
}

impl FileKeyValueStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the platform data directory
    ///
    /// - Linux: ~/.local/share/folio/redactions
    /// - macOS: ~/Library/Application Support/folio/redactions
    /// - Windows: %APPDATA%\folio\redactions
    pub fn in_data_dir() -> Result<Self, StoreError> {
        let base = dirs::data_dir().ok_or(StoreError::NoDataDir)?;
        Ok(Self::new(base.join("folio").join("redactions")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);

        // Write atomically using a temporary file
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, value)?;
        fs::rename(&temp_path, &path)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Payload {
    version: u32,
    blocks: Vec<RedactionBlock>,
}

/// Saves and restores redaction blocks per document
#[derive(Debug, Clone)]
pub struct RedactionStore<S> {
    store: S,
}

impl<S: KeyValueStore> RedactionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn save(&mut self, document_key: &str, blocks: &[RedactionBlock]) -> Result<(), StoreError> {
        let payload = Payload {
            version: PAYLOAD_VERSION,
            blocks: blocks.to_vec(),
        };
        self.store.set(document_key, &serde_json::to_string(&payload)?)?;
        tracing::debug!(document_key, count = blocks.len(), "redactions saved");
        Ok(())
    }

    /// Stored blocks, or an empty list when nothing was saved
    pub fn load(&self, document_key: &str) -> Result<Vec<RedactionBlock>, StoreError> {
        let Some(raw) = self.store.get(document_key)? else {
            return Ok(Vec::new());
        };
        let payload: Payload = serde_json::from_str(&raw)?;
        if payload.version != PAYLOAD_VERSION {
            return Err(StoreError::Version(payload.version));
        }
        Ok(payload.blocks)
    }

    pub fn clear(&mut self, document_key: &str) -> Result<(), StoreError> {
        self.store.remove(document_key)
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

/// Stable key for a document: file stem, byte length and FNV-1a hash
pub fn document_key(file_name: &str, bytes: &[u8]) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");

    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    format!("{stem}-{}-{hash:016x}", bytes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Color;
    use crate::transform::DocRect;
    use tempfile::TempDir;

    fn blocks() -> Vec<RedactionBlock> {
        let mut white = RedactionBlock::new(2, DocRect::new(5.0, 6.0, 70.0, 8.0));
        white.fill = Color::WHITE;
        vec![RedactionBlock::new(1, DocRect::new(10.0, 20.0, 30.0, 40.0)), white]
    }

    #[test]
    fn test_memory_round_trip() {
        let mut store = RedactionStore::new(MemoryKeyValueStore::new());
        let saved = blocks();
        store.save("doc", &saved).unwrap();

        assert_eq!(store.load("doc").unwrap(), saved);
        assert!(store.load("other").unwrap().is_empty());

        store.clear("doc").unwrap();
        assert!(store.load("doc").unwrap().is_empty());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = RedactionStore::new(FileKeyValueStore::new(dir.path().join("nested")));
        let key = document_key("report.pdf", b"%PDF-1.7");

        let saved = blocks();
        store.save(&key, &saved).unwrap();
        assert_eq!(store.load(&key).unwrap(), saved);

        let files: Vec<_> = fs::read_dir(dir.path().join("nested")).unwrap().collect();
        assert_eq!(files.len(), 1);

        store.clear(&key).unwrap();
        store.clear(&key).unwrap();
        assert!(store.load(&key).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_payload() {
        let mut kv = MemoryKeyValueStore::new();
        kv.set("doc", "{not json").unwrap();
        let store = RedactionStore::new(kv);
        assert!(matches!(store.load("doc"), Err(StoreError::Payload(_))));
    }

    #[test]
    fn test_unknown_version() {
        let mut kv = MemoryKeyValueStore::new();
        kv.set("doc", r#"{"version": 7, "blocks": []}"#).unwrap();
        let store = RedactionStore::new(kv);
        assert!(matches!(store.load("doc"), Err(StoreError::Version(7))));
    }

    #[test]
    fn test_document_key() {
        let a = document_key("/tmp/report.pdf", b"abc");
        assert!(a.starts_with("report-3-"));
        assert_eq!(a, document_key("report.pdf", b"abc"));
        assert_ne!(a, document_key("report.pdf", b"abd"));
    }
}
