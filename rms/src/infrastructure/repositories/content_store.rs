// /////////////////////////////////////////////////////////////////////////////
// Provenance RMS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Content Store
//!
//! A flat content-addressed directory holding serialized resource
//! payloads: one file per resource, named by the raw resource id, no
//! extension. Resources whose value must survive across process exits
//! are dumped here; everything else stays in memory and is regenerable
//! through lineage re-execution.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tokio::fs;
use tracing::debug;

use rms_domain::value_objects::ResourceId;
use rms_domain::RmsError;

/// Flat directory of serialized resource payloads keyed by resource id.
#[derive(Debug, Clone)]
pub struct ContentStore {
    dir: PathBuf,
}

impl ContentStore {
    /// Opens the store, creating the directory when missing.
    pub async fn open(dir: &Path) -> Result<Self, RmsError> {
        fs::create_dir_all(dir).await.map_err(|e| {
            RmsError::io_error(format!("cannot create content dir {}: {}", dir.display(), e))
        })?;
        Ok(Self { dir: dir.to_path_buf() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, rid: &ResourceId) -> PathBuf {
        self.dir.join(rid.as_str())
    }

    /// Serializes and writes a resource payload.
    pub async fn store(&self, rid: &ResourceId, value: &Value) -> Result<(), RmsError> {
        let bytes = serde_json::to_vec(value)?;
        let path = self.path_for(rid);
        fs::write(&path, bytes).await.map_err(|e| {
            RmsError::io_error(format!("cannot write {}: {}", path.display(), e))
        })?;
        debug!(rid = %rid, "dumped resource content");
        Ok(())
    }

    /// Reads and deserializes a resource payload.
    ///
    /// # Errors
    /// `RmsError::ContentMissing` when no payload exists for the id.
    pub async fn load(&self, rid: &ResourceId) -> Result<Value, RmsError> {
        let path = self.path_for(rid);
        let bytes = match fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RmsError::content_missing(format!(
                    "no stored content for resource {rid}"
                )));
            }
            Err(e) => {
                return Err(RmsError::io_error(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        serde_json::from_slice(&bytes).map_err(RmsError::from)
    }

    /// Metadata-only presence check.
    pub async fn exists(&self, rid: &ResourceId) -> bool {
        fs::try_exists(self.path_for(rid)).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_store_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(dir.path()).await.unwrap();
        let rid = ResourceId::new();

        store.store(&rid, &json!({"k": [1, 2, 3]})).await.unwrap();
        assert!(store.exists(&rid).await);
        assert_eq!(store.load(&rid).await.unwrap(), json!({"k": [1, 2, 3]}));
    }

    #[tokio::test]
    async fn test_load_missing_fails_with_content_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(dir.path()).await.unwrap();
        let err = store.load(&ResourceId::new()).await;
        assert!(matches!(err, Err(RmsError::ContentMissing(_))));
    }

    #[tokio::test]
    async fn test_payload_file_is_named_by_raw_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = ContentStore::open(dir.path()).await.unwrap();
        let rid = ResourceId::new();
        store.store(&rid, &json!(null)).await.unwrap();
        assert!(dir.path().join(rid.as_str()).exists());
    }
}
