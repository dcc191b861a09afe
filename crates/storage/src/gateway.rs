// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The abstract persistence gateway: scoped, transactional access to the
//! job/task/worker relations plus a KV tier for small checkpoint blobs.

use async_trait::async_trait;

use foreman_core::{
    CheckpointState, Compression, DeltaDescriptor, Job, JobId, JobStatus, Task, TaskId,
    TaskStatus, Worker, WorkerFailure, WorkerId, WorkerStatus,
};

use crate::error::StorageError;

/// Result of a compare-and-set completion attempt. Distinguishes a fresh
/// acceptance from a stale/duplicate retry so the caller can stay
/// idempotent under at-least-once task execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Accepted { job_complete: bool },
    Rejected,
}

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Atomically writes the job row and all of its task rows. Fails with
    /// `Conflict` if the job id already exists.
    async fn create_job_and_tasks(&self, job: Job, tasks: Vec<Task>) -> Result<(), StorageError>;

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, StorageError>;

    async fn list_jobs(&self) -> Result<Vec<Job>, StorageError>;

    async fn get_job_tasks(&self, job_id: &JobId) -> Result<Vec<Task>, StorageError>;

    /// Pending tasks, optionally restricted to one job, in index order.
    async fn get_pending_tasks(&self, job_id: Option<&JobId>) -> Result<Vec<Task>, StorageError>;

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StorageError>;

    async fn update_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
        now_ms: u64,
    ) -> Result<(), StorageError>;

    /// Compare-and-set `pending -> assigned`. Returns `false` (no error) if
    /// the task was not pending when the call ran — the caller treats this
    /// as "someone else got there first" and does not roll back further.
    async fn assign_task(
        &self,
        task_id: &TaskId,
        worker_id: &WorkerId,
        now_ms: u64,
    ) -> Result<bool, StorageError>;

    /// Compare-and-set `assigned(by worker_id) -> completed`. A stale or
    /// duplicate result (task not assigned, or assigned to a different
    /// worker) reports `Rejected` without mutating counters.
    async fn complete_task_if_assigned(
        &self,
        task_id: &TaskId,
        worker_id: &WorkerId,
        result: serde_json::Value,
        now_ms: u64,
    ) -> Result<CompletionOutcome, StorageError>;

    /// Resets a task to `pending` after a worker-reported failure,
    /// recording the error and incrementing `retry_count`.
    async fn reset_task_to_pending(
        &self,
        task_id: &TaskId,
        error_message: String,
    ) -> Result<(), StorageError>;

    /// Marks a task terminally `failed` (retry cap exceeded).
    async fn fail_task(&self, task_id: &TaskId, error_message: String) -> Result<(), StorageError>;

    /// Rolls an assignment back to `pending` without touching `retry_count`
    /// or `error_message` — used when emitting the assignment itself
    /// failed, which is a dispatch-layer problem, not a task execution
    /// failure.
    async fn unassign_task(&self, task_id: &TaskId) -> Result<(), StorageError>;

    async fn upsert_worker_online(
        &self,
        worker_id: &WorkerId,
        now_ms: u64,
    ) -> Result<(), StorageError>;

    async fn update_worker_status(
        &self,
        worker_id: &WorkerId,
        status: WorkerStatus,
        current_task_id: Option<TaskId>,
    ) -> Result<(), StorageError>;

    async fn touch_worker_last_seen(
        &self,
        worker_id: &WorkerId,
        now_ms: u64,
    ) -> Result<(), StorageError>;

    async fn update_worker_stats(
        &self,
        worker_id: &WorkerId,
        completed_delta: u64,
        failed_delta: u64,
    ) -> Result<(), StorageError>;

    async fn record_worker_failure(&self, failure: WorkerFailure) -> Result<(), StorageError>;

    async fn get_worker(&self, worker_id: &WorkerId) -> Result<Option<Worker>, StorageError>;

    async fn list_workers(&self) -> Result<Vec<Worker>, StorageError>;

    async fn get_checkpoint(&self, task_id: &TaskId) -> Result<CheckpointState, StorageError>;

    async fn store_base_checkpoint(
        &self,
        task_id: &TaskId,
        base_ref: String,
        base_size: u64,
        progress_percent: f64,
        checkpoint_id: u64,
        now_ms: u64,
    ) -> Result<(), StorageError>;

    async fn append_delta_checkpoint(
        &self,
        task_id: &TaskId,
        delta: DeltaDescriptor,
        progress_percent: f64,
        now_ms: u64,
    ) -> Result<(), StorageError>;

    /// Replaces `(base, deltas...)` with a single compacted base, as the
    /// final step of compaction.
    async fn replace_with_compacted_base(
        &self,
        task_id: &TaskId,
        base_ref: String,
        base_size: u64,
        checkpoint_id: u64,
    ) -> Result<(), StorageError>;

    async fn clear_checkpoint(&self, task_id: &TaskId) -> Result<(), StorageError>;

    /// Resets every task in `assigned` status whose `assigned_at` predates
    /// `stale_before_ms` back to `pending`, returning the affected ids.
    async fn sweep_stale_assigned(&self, stale_before_ms: u64) -> Result<Vec<TaskId>, StorageError>;

    async fn store_blob(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    async fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    async fn delete_blobs_with_prefix(&self, prefix: &str) -> Result<(), StorageError>;
}

/// Used by `DeltaDescriptor` construction in the checkpoint manager; kept
/// here so callers of the gateway trait don't need a direct dependency on
/// the compression enum's home module.
pub fn new_delta(
    id: u64,
    size: u64,
    stored_at_ms: u64,
    compression: Compression,
    storage_ref: String,
) -> DeltaDescriptor {
    DeltaDescriptor { id, size, stored_at_ms, compression, storage_ref }
}

pub(crate) fn task_is_stale(task: &Task, stale_before_ms: u64) -> bool {
    task.status == TaskStatus::Assigned
        && task.assigned_at_ms.map(|t| t < stale_before_ms).unwrap_or(false)
}
