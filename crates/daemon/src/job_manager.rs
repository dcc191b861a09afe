// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle manager: batch creation, per-task transitions, and
//! ordered result assembly.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use foreman_core::{Clock, Job, JobId, Task, TaskId, WorkerId};
use foreman_storage::{CompletionOutcome, PersistenceGateway, StorageError};

/// Outcome of a task result arriving from a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionResult {
    pub accepted: bool,
    pub job_complete: bool,
}

pub struct JobManager<C: Clock> {
    gateway: Arc<dyn PersistenceGateway>,
    clock: C,
    /// `job_id -> func_code`, populated on acceptance and evicted on
    /// finalization; lets the dispatcher thread the task kind through to
    /// newly-assigned workers without a storage round trip per assignment.
    func_cache: Mutex<HashMap<JobId, String>>,
}

impl<C: Clock> JobManager<C> {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, clock: C) -> Self {
        Self { gateway, clock, func_cache: Mutex::new(HashMap::new()) }
    }

    pub fn func_code(&self, job_id: &JobId) -> Option<String> {
        self.func_cache.lock().get(job_id).cloned()
    }

    /// Atomically writes the job row and all task rows. Fails if `job_id`
    /// already exists (the gateway surfaces this as `Conflict`).
    pub async fn create_job(
        &self,
        job_id: JobId,
        func_code: String,
        args_list: Vec<serde_json::Value>,
        total_tasks: u32,
    ) -> Result<Job, StorageError> {
        let now = self.clock.epoch_ms();
        let job = Job::new(job_id.clone(), func_code.clone(), total_tasks, now);
        let tasks: Vec<Task> = args_list
            .into_iter()
            .enumerate()
            .map(|(i, args)| Task::new(job_id.clone(), i, args))
            .collect();
        self.gateway.create_job_and_tasks(job.clone(), tasks).await?;
        self.func_cache.lock().insert(job_id, func_code);
        Ok(job)
    }

    pub async fn mark_task_completed(
        &self,
        task_id: &TaskId,
        worker_id: &WorkerId,
        result: serde_json::Value,
    ) -> Result<CompletionResult, StorageError> {
        let now = self.clock.epoch_ms();
        let outcome = self.gateway.complete_task_if_assigned(task_id, worker_id, result, now).await?;
        Ok(match outcome {
            CompletionOutcome::Accepted { job_complete } => {
                CompletionResult { accepted: true, job_complete }
            }
            CompletionOutcome::Rejected => CompletionResult { accepted: false, job_complete: false },
        })
    }

    /// Resets the task to `pending` for retry, unless it has already hit
    /// the retry cap, in which case it terminates `failed`.
    pub async fn mark_task_failed(
        &self,
        task_id: &TaskId,
        error_message: String,
        retry_cap: u32,
    ) -> Result<(), StorageError> {
        let task = self
            .gateway
            .get_task(task_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("task {task_id}")))?;
        if task.retry_count + 1 >= retry_cap {
            self.gateway.fail_task(task_id, error_message).await
        } else {
            self.gateway.reset_task_to_pending(task_id, error_message).await
        }
    }

    /// Ordered results for a job, or `None` if it isn't complete yet.
    /// Missing or failed tasks contribute a `null` slot.
    pub async fn get_job_results(
        &self,
        job_id: &JobId,
    ) -> Result<Option<Vec<Option<serde_json::Value>>>, StorageError> {
        let Some(job) = self.gateway.get_job(job_id).await? else {
            return Ok(None);
        };
        if !job.is_complete() {
            return Ok(None);
        }
        let tasks = self.gateway.get_job_tasks(job_id).await?;
        let mut by_index: HashMap<usize, Task> = tasks.into_iter().map(|t| (t.index, t)).collect();
        let results = (0..job.total_tasks as usize)
            .map(|i| by_index.remove(&i).and_then(|t| t.result))
            .collect();
        Ok(Some(results))
    }

    pub async fn finalize_job(&self, job_id: &JobId) -> Result<(), StorageError> {
        let now = self.clock.epoch_ms();
        self.gateway
            .update_job_status(job_id, foreman_core::JobStatus::Completed, None, now)
            .await?;
        self.func_cache.lock().remove(job_id);
        Ok(())
    }
}
