// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory [`PersistenceGateway`] implementation.
//!
//! Backs the daemon in tests and in single-process deployments where a
//! durable external store isn't wired up. All state lives behind one
//! `parking_lot::Mutex`; this is deliberately coarse-grained — the
//! gateway's contract promises per-call atomicity, not fine-grained
//! concurrency, and every call here is O(tasks) at worst.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use foreman_core::{
    CheckpointState, DeltaDescriptor, Job, JobId, JobStatus, Task, TaskId, TaskStatus, Worker,
    WorkerFailure, WorkerId, WorkerStatus,
};

use crate::error::StorageError;
use crate::gateway::{task_is_stale, CompletionOutcome, PersistenceGateway};

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    tasks: HashMap<TaskId, Task>,
    job_task_order: HashMap<JobId, Vec<TaskId>>,
    workers: HashMap<WorkerId, Worker>,
    failures: Vec<WorkerFailure>,
    blobs: HashMap<String, Vec<u8>>,
}

pub struct MemoryGateway {
    state: Mutex<State>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self { state: Mutex::new(State::default()) }
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn create_job_and_tasks(&self, job: Job, tasks: Vec<Task>) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        if state.jobs.contains_key(&job.id) {
            return Err(StorageError::Conflict(format!("job {} already exists", job.id)));
        }
        let order = tasks.iter().map(|t| t.id.clone()).collect();
        state.job_task_order.insert(job.id.clone(), order);
        for task in tasks {
            state.tasks.insert(task.id.clone(), task);
        }
        state.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, job_id: &JobId) -> Result<Option<Job>, StorageError> {
        Ok(self.state.lock().jobs.get(job_id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<Job>, StorageError> {
        Ok(self.state.lock().jobs.values().cloned().collect())
    }

    async fn get_job_tasks(&self, job_id: &JobId) -> Result<Vec<Task>, StorageError> {
        let state = self.state.lock();
        let Some(order) = state.job_task_order.get(job_id) else {
            return Ok(Vec::new());
        };
        Ok(order.iter().filter_map(|id| state.tasks.get(id).cloned()).collect())
    }

    async fn get_pending_tasks(&self, job_id: Option<&JobId>) -> Result<Vec<Task>, StorageError> {
        let state = self.state.lock();
        let mut out: Vec<Task> = match job_id {
            Some(job_id) => state
                .job_task_order
                .get(job_id)
                .into_iter()
                .flatten()
                .filter_map(|id| state.tasks.get(id))
                .filter(|t| t.status == TaskStatus::Pending)
                .cloned()
                .collect(),
            None => state
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::Pending)
                .cloned()
                .collect(),
        };
        out.sort_by_key(|t| t.index);
        Ok(out)
    }

    async fn get_task(&self, task_id: &TaskId) -> Result<Option<Task>, StorageError> {
        Ok(self.state.lock().tasks.get(task_id).cloned())
    }

    async fn update_job_status(
        &self,
        job_id: &JobId,
        status: JobStatus,
        error_message: Option<String>,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.status = status;
        if error_message.is_some() {
            job.error_message = error_message;
        }
        if matches!(status, JobStatus::Completed | JobStatus::Failed) {
            job.completed_at_ms.get_or_insert(now_ms);
        }
        Ok(())
    }

    async fn assign_task(
        &self,
        task_id: &TaskId,
        worker_id: &WorkerId,
        now_ms: u64,
    ) -> Result<bool, StorageError> {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(task_id) else {
            return Err(StorageError::NotFound(format!("task {task_id}")));
        };
        if task.status != TaskStatus::Pending {
            return Ok(false);
        }
        task.status = TaskStatus::Assigned;
        task.worker_id = Some(worker_id.clone());
        task.assigned_at_ms = Some(now_ms);
        Ok(true)
    }

    async fn complete_task_if_assigned(
        &self,
        task_id: &TaskId,
        worker_id: &WorkerId,
        result: serde_json::Value,
        now_ms: u64,
    ) -> Result<CompletionOutcome, StorageError> {
        let mut state = self.state.lock();
        let Some(task) = state.tasks.get_mut(task_id) else {
            return Err(StorageError::NotFound(format!("task {task_id}")));
        };
        let assigned_to_this_worker =
            task.status == TaskStatus::Assigned && task.worker_id.as_ref() == Some(worker_id);
        if !assigned_to_this_worker {
            return Ok(CompletionOutcome::Rejected);
        }
        task.status = TaskStatus::Completed;
        task.result = Some(result);
        task.completed_at_ms = Some(now_ms);
        let job_id = task.job_id.clone();
        let job = state
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| StorageError::NotFound(format!("job {job_id}")))?;
        job.completed_tasks += 1;
        let job_complete = job.is_complete();
        Ok(CompletionOutcome::Accepted { job_complete })
    }

    async fn reset_task_to_pending(
        &self,
        task_id: &TaskId,
        error_message: String,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;
        task.status = TaskStatus::Pending;
        task.worker_id = None;
        task.assigned_at_ms = None;
        task.error_message = Some(error_message);
        task.retry_count += 1;
        Ok(())
    }

    async fn fail_task(&self, task_id: &TaskId, error_message: String) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;
        task.status = TaskStatus::Failed;
        task.worker_id = None;
        task.error_message = Some(error_message);
        Ok(())
    }

    async fn unassign_task(&self, task_id: &TaskId) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;
        task.status = TaskStatus::Pending;
        task.worker_id = None;
        task.assigned_at_ms = None;
        Ok(())
    }

    async fn upsert_worker_online(
        &self,
        worker_id: &WorkerId,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        state
            .workers
            .entry(worker_id.clone())
            .and_modify(|w| {
                w.status = WorkerStatus::Online;
                w.last_seen_ms = now_ms;
            })
            .or_insert_with(|| Worker::new(worker_id.clone(), now_ms));
        Ok(())
    }

    async fn update_worker_status(
        &self,
        worker_id: &WorkerId,
        status: WorkerStatus,
        current_task_id: Option<TaskId>,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let worker = state
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| StorageError::NotFound(format!("worker {worker_id}")))?;
        worker.status = status;
        worker.current_task_id = current_task_id;
        Ok(())
    }

    async fn touch_worker_last_seen(
        &self,
        worker_id: &WorkerId,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let worker = state
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| StorageError::NotFound(format!("worker {worker_id}")))?;
        worker.last_seen_ms = now_ms;
        Ok(())
    }

    async fn update_worker_stats(
        &self,
        worker_id: &WorkerId,
        completed_delta: u64,
        failed_delta: u64,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let worker = state
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| StorageError::NotFound(format!("worker {worker_id}")))?;
        worker.total_tasks_completed += completed_delta;
        worker.total_tasks_failed += failed_delta;
        Ok(())
    }

    async fn record_worker_failure(&self, failure: WorkerFailure) -> Result<(), StorageError> {
        self.state.lock().failures.push(failure);
        Ok(())
    }

    async fn get_worker(&self, worker_id: &WorkerId) -> Result<Option<Worker>, StorageError> {
        Ok(self.state.lock().workers.get(worker_id).cloned())
    }

    async fn list_workers(&self) -> Result<Vec<Worker>, StorageError> {
        Ok(self.state.lock().workers.values().cloned().collect())
    }

    async fn get_checkpoint(&self, task_id: &TaskId) -> Result<CheckpointState, StorageError> {
        let state = self.state.lock();
        let task = state
            .tasks
            .get(task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;
        Ok(task.checkpoint.clone())
    }

    async fn store_base_checkpoint(
        &self,
        task_id: &TaskId,
        base_ref: String,
        base_size: u64,
        progress_percent: f64,
        checkpoint_id: u64,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;
        task.checkpoint.base_ref = Some(base_ref);
        task.checkpoint.base_size = base_size;
        task.checkpoint.deltas.clear();
        task.checkpoint.progress_percent = progress_percent;
        task.checkpoint.checkpoint_count = checkpoint_id;
        task.checkpoint.last_checkpoint_at_ms = Some(now_ms);
        Ok(())
    }

    async fn append_delta_checkpoint(
        &self,
        task_id: &TaskId,
        delta: DeltaDescriptor,
        progress_percent: f64,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;
        let checkpoint_id = delta.id;
        task.checkpoint.deltas.push(delta);
        task.checkpoint.progress_percent = progress_percent;
        task.checkpoint.checkpoint_count = checkpoint_id;
        task.checkpoint.last_checkpoint_at_ms = Some(now_ms);
        Ok(())
    }

    async fn replace_with_compacted_base(
        &self,
        task_id: &TaskId,
        base_ref: String,
        base_size: u64,
        checkpoint_id: u64,
    ) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;
        task.checkpoint.base_ref = Some(base_ref);
        task.checkpoint.base_size = base_size;
        task.checkpoint.deltas.clear();
        task.checkpoint.checkpoint_count = checkpoint_id;
        Ok(())
    }

    async fn clear_checkpoint(&self, task_id: &TaskId) -> Result<(), StorageError> {
        let mut state = self.state.lock();
        let task = state
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;
        task.checkpoint = CheckpointState::default();
        Ok(())
    }

    async fn sweep_stale_assigned(&self, stale_before_ms: u64) -> Result<Vec<TaskId>, StorageError> {
        let mut state = self.state.lock();
        let stale_ids: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|t| task_is_stale(t, stale_before_ms))
            .map(|t| t.id.clone())
            .collect();
        for id in &stale_ids {
            if let Some(task) = state.tasks.get_mut(id) {
                task.status = TaskStatus::Pending;
                task.worker_id = None;
                task.assigned_at_ms = None;
            }
        }
        Ok(stale_ids)
    }

    async fn store_blob(&self, key: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.state.lock().blobs.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn load_blob(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.state.lock().blobs.get(key).cloned())
    }

    async fn delete_blobs_with_prefix(&self, prefix: &str) -> Result<(), StorageError> {
        self.state.lock().blobs.retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_tasks(id: &str, n: u32) -> (Job, Vec<Task>) {
        let job_id = JobId::new(id);
        let job = Job::new(job_id.clone(), "noop".into(), n, 0);
        let tasks = (0..n)
            .map(|i| Task::new(job_id.clone(), i as usize, serde_json::json!(i)))
            .collect();
        (job, tasks)
    }

    #[tokio::test]
    async fn create_job_rejects_duplicate_id() {
        let gw = MemoryGateway::new();
        let (job, tasks) = job_with_tasks("j1", 2);
        gw.create_job_and_tasks(job.clone(), tasks.clone()).await.unwrap();
        let err = gw.create_job_and_tasks(job, tasks).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
    }

    #[tokio::test]
    async fn assign_task_is_compare_and_set() {
        let gw = MemoryGateway::new();
        let (job, tasks) = job_with_tasks("j2", 1);
        let task_id = tasks[0].id.clone();
        gw.create_job_and_tasks(job, tasks).await.unwrap();
        let w = WorkerId::new("w1");
        assert!(gw.assign_task(&task_id, &w, 10).await.unwrap());
        assert!(!gw.assign_task(&task_id, &w, 20).await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_completion_is_rejected_and_does_not_double_count() {
        let gw = MemoryGateway::new();
        let (job, tasks) = job_with_tasks("j3", 1);
        let task_id = tasks[0].id.clone();
        let job_id = job.id.clone();
        gw.create_job_and_tasks(job, tasks).await.unwrap();
        let w = WorkerId::new("w1");
        gw.assign_task(&task_id, &w, 10).await.unwrap();

        let first = gw
            .complete_task_if_assigned(&task_id, &w, serde_json::json!(42), 20)
            .await
            .unwrap();
        assert_eq!(first, CompletionOutcome::Accepted { job_complete: true });

        let second = gw
            .complete_task_if_assigned(&task_id, &w, serde_json::json!(99), 30)
            .await
            .unwrap();
        assert_eq!(second, CompletionOutcome::Rejected);

        let job = gw.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.completed_tasks, 1);
    }

    #[tokio::test]
    async fn sweep_stale_assigned_resets_to_pending() {
        let gw = MemoryGateway::new();
        let (job, tasks) = job_with_tasks("j4", 1);
        let task_id = tasks[0].id.clone();
        gw.create_job_and_tasks(job, tasks).await.unwrap();
        gw.assign_task(&task_id, &WorkerId::new("w1"), 100).await.unwrap();

        let swept = gw.sweep_stale_assigned(500).await.unwrap();
        assert_eq!(swept, vec![task_id.clone()]);
        let task = gw.get_task(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.worker_id.is_none());
    }

    #[tokio::test]
    async fn blob_roundtrips_and_prefix_delete() {
        let gw = MemoryGateway::new();
        gw.store_blob("t1/base.gz", vec![1, 2, 3]).await.unwrap();
        gw.store_blob("t1/delta_1.gz", vec![4]).await.unwrap();
        gw.store_blob("t2/base.gz", vec![9]).await.unwrap();
        assert_eq!(gw.load_blob("t1/base.gz").await.unwrap(), Some(vec![1, 2, 3]));
        gw.delete_blobs_with_prefix("t1/").await.unwrap();
        assert_eq!(gw.load_blob("t1/base.gz").await.unwrap(), None);
        assert_eq!(gw.load_blob("t2/base.gz").await.unwrap(), Some(vec![9]));
    }
}
