// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Checkpoint orchestration: joins the hybrid blob store, the merge
//! function, and the gateway's checkpoint bookkeeping into the three
//! operations the rest of the daemon needs — record an incoming
//! checkpoint (compacting when the delta chain grows past the
//! threshold), reconstruct a task's current state, and decide whether a
//! task is eligible to resume from checkpoint rather than restart.

use std::sync::Arc;
use std::time::Duration;

use foreman_core::{Compression, TaskId};
use foreman_storage::{merge, new_delta, CheckpointBlobStore, PersistenceGateway};
use foreman_wire::envelope::ResumeTaskData;

use crate::error::DaemonError;

pub struct CheckpointManager {
    blob_store: CheckpointBlobStore,
    gateway: Arc<dyn PersistenceGateway>,
    compaction_threshold: usize,
}

impl CheckpointManager {
    pub fn new(
        blob_store: CheckpointBlobStore,
        gateway: Arc<dyn PersistenceGateway>,
        compaction_threshold: usize,
    ) -> Self {
        Self { blob_store, gateway, compaction_threshold }
    }

    /// Records one checkpoint frame reported by a worker (`TASK_CHECKPOINT`).
    /// `raw` is the already-decoded (from hex) state payload, either a full
    /// base snapshot or an incremental delta. Triggers compaction once the
    /// delta chain reaches the configured threshold.
    pub async fn store_checkpoint(
        &self,
        task_id: &TaskId,
        is_base: bool,
        raw: &[u8],
        progress_percent: f64,
        checkpoint_id: u64,
        now_ms: u64,
    ) -> Result<(), DaemonError> {
        let name = if is_base { "base".to_string() } else { format!("delta_{checkpoint_id}") };
        let (storage_ref, size) = self
            .blob_store
            .store(task_id.as_str(), &name, raw)
            .await
            .map_err(|e| DaemonError::Checkpoint(e.to_string()))?;

        if is_base {
            self.gateway
                .store_base_checkpoint(task_id, storage_ref, size, progress_percent, checkpoint_id, now_ms)
                .await?;
        } else {
            let delta = new_delta(checkpoint_id, size, now_ms, Compression::Gzip, storage_ref);
            self.gateway.append_delta_checkpoint(task_id, delta, progress_percent, now_ms).await?;
        }

        let state = self.gateway.get_checkpoint(task_id).await?;
        if state.deltas.len() >= self.compaction_threshold {
            self.compact(task_id, now_ms).await?;
        }
        Ok(())
    }

    /// Folds the base checkpoint with every recorded delta, in order. A
    /// delta whose blob is missing is logged and skipped rather than
    /// failing reconstruction outright — the state simply lags by that
    /// one increment. Returns `None` if the task has no checkpoint at all.
    pub async fn reconstruct_state(&self, task_id: &TaskId) -> Result<Option<Vec<u8>>, DaemonError> {
        let state = self.gateway.get_checkpoint(task_id).await?;
        let Some(base_ref) = state.base_ref.clone() else {
            return Ok(None);
        };
        let mut data =
            self.blob_store.load(&base_ref).await.map_err(|e| DaemonError::Checkpoint(e.to_string()))?;
        for delta in &state.deltas {
            match self.blob_store.load(&delta.storage_ref).await {
                Ok(delta_bytes) => data = merge(&data, &delta_bytes),
                Err(err) => {
                    tracing::warn!(%task_id, delta_id = delta.id, %err, "missing checkpoint delta, skipping");
                }
            }
        }
        Ok(Some(data))
    }

    /// Collapses `(base, deltas...)` into a single new base: reconstructs
    /// first (while the old blobs are still present), then deletes the old
    /// blobs and writes the reconstructed state as the new base.
    async fn compact(&self, task_id: &TaskId, now_ms: u64) -> Result<(), DaemonError> {
        let Some(reconstructed) = self.reconstruct_state(task_id).await? else {
            return Ok(());
        };
        let state = self.gateway.get_checkpoint(task_id).await?;
        let next_checkpoint_id = state.next_delta_id();

        self.blob_store
            .delete_task(task_id.as_str())
            .await
            .map_err(|e| DaemonError::Checkpoint(e.to_string()))?;
        let (storage_ref, size) = self
            .blob_store
            .store(task_id.as_str(), "base", &reconstructed)
            .await
            .map_err(|e| DaemonError::Checkpoint(e.to_string()))?;

        self.gateway.replace_with_compacted_base(task_id, storage_ref, size, next_checkpoint_id).await?;
        tracing::info!(%task_id, "compacted checkpoint chain");
        Ok(())
    }

    pub async fn clear(&self, task_id: &TaskId) -> Result<(), DaemonError> {
        self.blob_store.delete_task(task_id.as_str()).await.map_err(|e| DaemonError::Checkpoint(e.to_string()))?;
        self.gateway.clear_checkpoint(task_id).await?;
        Ok(())
    }

    /// Builds a `resume_task` payload if, and only if, the task has a
    /// non-stale checkpoint to resume from. Staleness and "must have a
    /// base" are evaluated by `CheckpointState::is_resumable`; this just
    /// adds the reconstruction and hex-encoding step.
    pub async fn build_resume_envelope(
        &self,
        task_id: &TaskId,
        func_code: String,
        remaining_args: Vec<serde_json::Value>,
        now_ms: u64,
        staleness_budget: Duration,
    ) -> Result<Option<ResumeTaskData>, DaemonError> {
        let state = self.gateway.get_checkpoint(task_id).await?;
        if !state.is_resumable(now_ms, staleness_budget.as_millis() as u64) {
            return Ok(None);
        }
        let Some(reconstructed) = self.reconstruct_state(task_id).await? else {
            return Ok(None);
        };
        Ok(Some(ResumeTaskData {
            task_id: task_id.to_string(),
            func_code,
            reconstructed_state_hex: hex::encode(reconstructed),
            remaining_args,
            checkpoint_count: state.checkpoint_count,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use foreman_core::{JobId, Task};
    use foreman_storage::MemoryGateway;

    fn manager(dir: &tempfile::TempDir, gateway: Arc<dyn PersistenceGateway>, threshold: usize) -> CheckpointManager {
        CheckpointManager::new(CheckpointBlobStore::new(dir.path(), gateway.clone()), gateway, threshold)
    }

    async fn seed_task(gateway: &Arc<dyn PersistenceGateway>, job_id: &JobId) {
        let job = foreman_core::Job::new(job_id.clone(), "noop".into(), 1, 0);
        let task = Task::new(job_id.clone(), 0, serde_json::Value::Null);
        gateway.create_job_and_tasks(job, vec![task]).await.unwrap();
    }

    #[tokio::test]
    async fn store_then_reconstruct_round_trips_base_only() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir, gateway.clone(), 50);
        let job_id = JobId::new("j1");
        let task_id = TaskId::for_index(&job_id, 0);
        seed_task(&gateway, &job_id).await;

        let base = serde_json::to_vec(&serde_json::json!({"step": 0})).unwrap();
        mgr.store_checkpoint(&task_id, true, &base, 0.0, 1, 1_000).await.unwrap();

        let reconstructed = mgr.reconstruct_state(&task_id).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&reconstructed).unwrap();
        assert_eq!(value, serde_json::json!({"step": 0}));
    }

    #[tokio::test]
    async fn deltas_fold_onto_base_in_order() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir, gateway.clone(), 50);
        let job_id = JobId::new("j2");
        let task_id = TaskId::for_index(&job_id, 0);
        seed_task(&gateway, &job_id).await;

        let base = serde_json::to_vec(&serde_json::json!({"step": 0})).unwrap();
        mgr.store_checkpoint(&task_id, true, &base, 0.0, 1, 1_000).await.unwrap();
        let delta = serde_json::to_vec(&serde_json::json!({"step": 1})).unwrap();
        mgr.store_checkpoint(&task_id, false, &delta, 50.0, 2, 2_000).await.unwrap();

        let reconstructed = mgr.reconstruct_state(&task_id).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&reconstructed).unwrap();
        assert_eq!(value, serde_json::json!({"step": 1}));
    }

    #[tokio::test]
    async fn reaching_the_threshold_compacts_deltas_away() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir, gateway.clone(), 2);
        let job_id = JobId::new("j3");
        let task_id = TaskId::for_index(&job_id, 0);
        seed_task(&gateway, &job_id).await;

        let base = serde_json::to_vec(&serde_json::json!({"step": 0})).unwrap();
        mgr.store_checkpoint(&task_id, true, &base, 0.0, 1, 1_000).await.unwrap();
        for (i, step) in [1, 2].into_iter().enumerate() {
            let delta = serde_json::to_vec(&serde_json::json!({"step": step})).unwrap();
            mgr.store_checkpoint(&task_id, false, &delta, 0.0, (i + 2) as u64, 1_000).await.unwrap();
        }

        let state = gateway.get_checkpoint(&task_id).await.unwrap();
        assert!(state.deltas.is_empty(), "compaction should have collapsed the delta chain");
        let reconstructed = mgr.reconstruct_state(&task_id).await.unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_slice(&reconstructed).unwrap();
        assert_eq!(value, serde_json::json!({"step": 2}));
    }

    #[tokio::test]
    async fn resume_envelope_is_none_without_a_checkpoint() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir, gateway.clone(), 50);
        let job_id = JobId::new("j4");
        let task_id = TaskId::for_index(&job_id, 0);
        seed_task(&gateway, &job_id).await;

        let out = mgr
            .build_resume_envelope(&task_id, "square".into(), vec![], 10_000, Duration::from_secs(3_600))
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn resume_envelope_is_none_once_stale() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir, gateway.clone(), 50);
        let job_id = JobId::new("j5");
        let task_id = TaskId::for_index(&job_id, 0);
        seed_task(&gateway, &job_id).await;

        let base = serde_json::to_vec(&serde_json::json!({"step": 0})).unwrap();
        mgr.store_checkpoint(&task_id, true, &base, 0.0, 1, 1_000).await.unwrap();

        let out = mgr
            .build_resume_envelope(&task_id, "square".into(), vec![], 1_000 + 3_600_001, Duration::from_secs(3_600))
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn resume_envelope_carries_hex_encoded_state() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(&dir, gateway.clone(), 50);
        let job_id = JobId::new("j6");
        let task_id = TaskId::for_index(&job_id, 0);
        seed_task(&gateway, &job_id).await;

        let base = serde_json::to_vec(&serde_json::json!({"step": 0})).unwrap();
        mgr.store_checkpoint(&task_id, true, &base, 0.0, 1, 1_000).await.unwrap();

        let out = mgr
            .build_resume_envelope(&task_id, "square".into(), vec![serde_json::json!(3)], 1_500, Duration::from_secs(3_600))
            .await
            .unwrap()
            .unwrap();
        let decoded = hex::decode(out.reconstructed_state_hex).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(value, serde_json::json!({"step": 0}));
        assert_eq!(out.remaining_args, vec![serde_json::json!(3)]);
    }
}
