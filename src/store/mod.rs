//! Persistent JSON document store.
//!
//! Each [`JsonStore`] owns one document at one filesystem path. All access
//! goes through an async mutex held for the full read-modify-write cycle, so
//! two logically concurrent operations can never interleave their reads and
//! writes on the same document. Writes go to a temporary file first and are
//! renamed into place, so a crash mid-write never leaves a half-written
//! document behind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::StoreError;

/// A single JSON document persisted at a fixed path.
#[derive(Clone)]
pub struct JsonStore {
    path: PathBuf,
    /// Serializes every read-modify-write cycle on this document.
    lock: Arc<Mutex<()>>,
}

impl JsonStore {
    /// Create a store for the document at `path`. The file need not exist
    /// yet; reads of a missing file yield the provided default.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// The path this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, or `default` if the file does not exist.
    pub async fn load_or(&self, default: Value) -> Result<Value, StoreError> {
        let _guard = self.lock.lock().await;
        read_document(&self.path, default).await
    }

    /// Replace the document wholesale, atomically.
    pub async fn replace(&self, value: &Value) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        write_atomic(&self.path, value).await
    }

    /// Run a read-modify-write cycle under the document lock.
    ///
    /// The closure receives the current document (or `default` if absent),
    /// mutates it in place, and returns a result. The mutated document is
    /// persisted atomically before the lock is released.
    pub async fn update<R>(
        &self,
        default: Value,
        f: impl FnOnce(&mut Value) -> R,
    ) -> Result<R, StoreError> {
        let _guard = self.lock.lock().await;
        let mut doc = read_document(&self.path, default).await?;
        let result = f(&mut doc);
        write_atomic(&self.path, &doc).await?;
        Ok(result)
    }

    /// Copy the current document verbatim to `dest`, atomically. Used for
    /// the rolling config backup; any previous file at `dest` is overwritten.
    pub async fn snapshot_to(&self, dest: &Path) -> Result<Value, StoreError> {
        let _guard = self.lock.lock().await;
        let doc = read_document(&self.path, Value::Null).await?;
        write_atomic(dest, &doc).await?;
        Ok(doc)
    }
}

async fn read_document(path: &Path, default: Value) -> Result<Value, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(default),
        Err(e) => Err(StoreError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Write `value` to `path` via a sibling temp file plus rename.
async fn write_atomic(path: &Path, value: &Value) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("tmp");

    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| StoreError::WriteFailed {
            path: tmp.display().to_string(),
            reason: e.to_string(),
        })?;

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::WriteFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })
}
