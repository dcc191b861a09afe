// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hybrid checkpoint blob storage: small compressed blobs live in the
//! gateway's KV tier, large ones spill to the filesystem.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;

use crate::error::StorageError;
use crate::gateway::PersistenceGateway;

/// Compressed blobs at or above this size spill to the filesystem instead
/// of the gateway's KV tier.
pub const INLINE_SIZE_THRESHOLD: usize = 1024 * 1024;

pub struct CheckpointBlobStore {
    root: PathBuf,
    gateway: Arc<dyn PersistenceGateway>,
}

impl CheckpointBlobStore {
    pub fn new(root: impl Into<PathBuf>, gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self { root: root.into(), gateway }
    }

    /// Compresses `raw` and stores it under `<task_id>/<name>`, returning
    /// the storage reference to record in the task's checkpoint state.
    pub async fn store(
        &self,
        task_id: &str,
        name: &str,
        raw: &[u8],
    ) -> Result<(String, u64), StorageError> {
        let compressed = compress(raw)?;
        let size = compressed.len() as u64;
        if compressed.len() < INLINE_SIZE_THRESHOLD {
            let key = format!("db_{task_id}_{}", uuid::Uuid::new_v4());
            self.gateway.store_blob(&key, compressed).await?;
            Ok((key, size))
        } else {
            let rel = format!("{task_id}/{name}.gz");
            let path = self.root.join(&rel);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &compressed).await?;
            Ok((format!("fs_{rel}"), size))
        }
    }

    pub async fn load(&self, storage_ref: &str) -> Result<Vec<u8>, StorageError> {
        let compressed = if storage_ref.starts_with("db_") {
            self.gateway
                .load_blob(storage_ref)
                .await?
                .ok_or_else(|| StorageError::NotFound(format!("blob {storage_ref}")))?
        } else if let Some(rel) = storage_ref.strip_prefix("fs_") {
            tokio::fs::read(self.path_for(rel)).await?
        } else {
            return Err(StorageError::NotFound(format!("unrecognized storage ref {storage_ref}")));
        };
        decompress(&compressed)
    }

    pub async fn delete_task(&self, task_id: &str) -> Result<(), StorageError> {
        self.gateway.delete_blobs_with_prefix(&format!("db_{task_id}_")).await.ok();
        let dir = task_dir(&self.root, task_id);
        if dir.exists() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }

    fn path_for(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }
}

fn task_dir(root: &Path, task_id: &str) -> PathBuf {
    root.join(task_id)
}

fn compress(raw: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), GzLevel::new(6));
    encoder.write_all(raw)?;
    encoder.finish()
}

fn decompress(compressed: &[u8]) -> Result<Vec<u8>, StorageError> {
    let mut decoder = GzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
