// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task dispatcher: joins the scheduler, the connection registry, and
//! persistence. Owns the one critical section in the whole service —
//! `_assign` — where worker availability and task assignment must move
//! together or not at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use foreman_core::{Clock, JobId, Task, WorkerId, WorkerStatus};
use foreman_storage::{PersistenceGateway, StorageError};
use foreman_wire::{envelope::AssignTaskData, Envelope};

use crate::checkpoint::CheckpointManager;
use crate::job_manager::JobManager;
use crate::registry::ConnectionRegistry;
use crate::scheduler::Scheduler;

pub struct Dispatcher<C: Clock> {
    gateway: Arc<dyn PersistenceGateway>,
    registry: Arc<ConnectionRegistry>,
    scheduler: Arc<dyn Scheduler>,
    checkpoint_manager: Arc<CheckpointManager>,
    resume_staleness: Duration,
    clock: C,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        registry: Arc<ConnectionRegistry>,
        scheduler: Arc<dyn Scheduler>,
        checkpoint_manager: Arc<CheckpointManager>,
        resume_staleness: Duration,
        clock: C,
    ) -> Self {
        Self { gateway, registry, scheduler, checkpoint_manager, resume_staleness, clock }
    }

    async fn workers_map(&self) -> Result<HashMap<WorkerId, foreman_core::Worker>, StorageError> {
        Ok(self.gateway.list_workers().await?.into_iter().map(|w| (w.id.clone(), w)).collect())
    }

    /// For each pending task of the job, while the available set is
    /// non-empty, picks a worker and assigns. Returns the number of
    /// successful assignments.
    pub async fn assign_tasks_for_job(
        &self,
        job_manager: &JobManager<C>,
        job_id: &JobId,
    ) -> Result<usize, StorageError> {
        let pending = self.gateway.get_pending_tasks(Some(job_id)).await?;
        let mut assigned = 0;
        for task in &pending {
            let available = self.registry.available_snapshot();
            if available.is_empty() {
                break;
            }
            let workers = self.workers_map().await?;
            let Some(worker_id) = self.scheduler.select_worker(task, &available, &workers) else {
                break;
            };
            if self.assign(job_manager, task, &worker_id).await? {
                assigned += 1;
            }
        }
        Ok(assigned)
    }

    /// Picks one pending task (any job) for a newly-available worker.
    /// Returns whether a task was assigned.
    pub async fn assign_one_to_worker(
        &self,
        job_manager: &JobManager<C>,
        worker_id: &WorkerId,
    ) -> Result<bool, StorageError> {
        let pending = self.gateway.get_pending_tasks(None).await?;
        if pending.is_empty() {
            return Ok(false);
        }
        let workers = self.workers_map().await?;
        let Some(idx) = self.scheduler.select_task(&pending, worker_id, &workers) else {
            return Ok(false);
        };
        self.assign(job_manager, &pending[idx], worker_id).await
    }

    /// The atomic assignment critical section: removes `worker_id` from
    /// the available set and compare-and-sets the task to `assigned` as
    /// one unit, before the assignment is ever emitted. On emit failure,
    /// both effects are rolled back. A task with a non-stale checkpoint
    /// is emitted as `resume_task` instead of a fresh `assign_task`.
    async fn assign(
        &self,
        job_manager: &JobManager<C>,
        task: &Task,
        worker_id: &WorkerId,
    ) -> Result<bool, StorageError> {
        if !self.registry.take_available(worker_id) {
            return Ok(false);
        }
        let now = self.clock.epoch_ms();
        let cas_ok = match self.gateway.assign_task(&task.id, worker_id, now).await {
            Ok(ok) => ok,
            Err(err) => {
                self.registry.mark_available(worker_id.clone());
                return Err(err);
            }
        };
        if !cas_ok {
            self.registry.mark_available(worker_id.clone());
            return Ok(false);
        }

        let func_code = job_manager.func_code(&task.job_id).unwrap_or_default();
        let resume = match self
            .checkpoint_manager
            .build_resume_envelope(&task.id, func_code.clone(), Vec::new(), now, self.resume_staleness)
            .await
        {
            Ok(resume) => resume,
            Err(err) => {
                tracing::warn!(task_id = %task.id, %err, "checkpoint resumability check failed, assigning fresh");
                None
            }
        };
        let envelope = match resume {
            Some(resume_data) => Envelope::ResumeTask(resume_data),
            None => Envelope::AssignTask(AssignTaskData {
                func_code,
                task_args: task.args.clone(),
                task_id: task.id.to_string(),
            }),
        };

        let emit_ok = match self.registry.worker_sender(worker_id) {
            Some(sender) => sender.try_send(envelope).is_ok(),
            None => false,
        };

        if emit_ok {
            self.gateway
                .update_worker_status(worker_id, WorkerStatus::Busy, Some(task.id.clone()))
                .await?;
            Ok(true)
        } else {
            tracing::warn!(task_id = %task.id, worker_id = %worker_id, "assign emit failed, rolling back");
            self.gateway.unassign_task(&task.id).await?;
            self.registry.mark_available(worker_id.clone());
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Fifo;
    use foreman_core::{FakeClock, TaskId, TaskStatus};
    use foreman_storage::MemoryGateway;
    use tokio::sync::mpsc;

    struct Harness {
        dispatcher: Dispatcher<FakeClock>,
        registry: Arc<ConnectionRegistry>,
        gateway: Arc<dyn PersistenceGateway>,
        checkpoint_manager: Arc<CheckpointManager>,
        clock: FakeClock,
        // kept alive for the harness's lifetime; the blob store writes under this path
        _tempdir: tempfile::TempDir,
    }

    fn dispatcher() -> Harness {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let scheduler: Arc<dyn Scheduler> = Arc::new(Fifo);
        let tempdir = tempfile::tempdir().unwrap();
        let checkpoint_manager = Arc::new(CheckpointManager::new(
            foreman_storage::CheckpointBlobStore::new(tempdir.path(), gateway.clone()),
            gateway.clone(),
            50,
        ));
        let clock = FakeClock::new();
        let dispatcher = Dispatcher::new(
            gateway.clone(),
            registry.clone(),
            scheduler,
            checkpoint_manager.clone(),
            Duration::from_secs(3_600),
            clock.clone(),
        );
        Harness { dispatcher, registry, gateway, checkpoint_manager, clock, _tempdir: tempdir }
    }

    #[tokio::test]
    async fn no_available_workers_assigns_nothing() {
        let h = dispatcher();
        let jm = JobManager::new(h.gateway.clone(), FakeClock::new());
        let job_id = JobId::new("j1");
        jm.create_job(job_id.clone(), "noop".into(), vec![serde_json::json!(1)], 1).await.unwrap();
        let n = h.dispatcher.assign_tasks_for_job(&jm, &job_id).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn assigns_pending_task_to_available_worker() {
        let h = dispatcher();
        let jm = JobManager::new(h.gateway.clone(), FakeClock::new());
        let job_id = JobId::new("j2");
        jm.create_job(job_id.clone(), "square".into(), vec![serde_json::json!(4)], 1).await.unwrap();

        h.gateway.upsert_worker_online(&WorkerId::new("w1"), 0).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        h.registry.register_worker(WorkerId::new("w1"), tx);

        let n = h.dispatcher.assign_tasks_for_job(&jm, &job_id).await.unwrap();
        assert_eq!(n, 1);
        assert!(!h.registry.is_available(&WorkerId::new("w1")));

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.tag(), "assign_task");

        let task = h.gateway.get_task(&TaskId::for_index(&job_id, 0)).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Assigned);
        assert_eq!(task.worker_id, Some(WorkerId::new("w1")));
    }

    #[tokio::test]
    async fn emit_failure_rolls_back_assignment() {
        let h = dispatcher();
        let jm = JobManager::new(h.gateway.clone(), FakeClock::new());
        let job_id = JobId::new("j3");
        jm.create_job(job_id.clone(), "noop".into(), vec![serde_json::json!(1)], 1).await.unwrap();

        h.gateway.upsert_worker_online(&WorkerId::new("w1"), 0).await.unwrap();
        // capacity-1 channel, pre-filled so the assign's try_send fails
        let (tx, mut rx) = mpsc::channel(1);
        tx.try_send(Envelope::Ping).unwrap();
        h.registry.register_worker(WorkerId::new("w1"), tx);

        let n = h.dispatcher.assign_tasks_for_job(&jm, &job_id).await.unwrap();
        assert_eq!(n, 0);
        assert!(h.registry.is_available(&WorkerId::new("w1")));

        let task = h.gateway.get_task(&TaskId::for_index(&job_id, 0)).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0, "rollback must not count as a retry");

        rx.try_recv().unwrap(); // drain the pre-filled Ping, not asserted further
    }

    #[tokio::test]
    async fn assign_one_to_worker_picks_a_pending_task() {
        let h = dispatcher();
        let jm = JobManager::new(h.gateway.clone(), FakeClock::new());
        let job_id = JobId::new("j4");
        jm.create_job(job_id.clone(), "noop".into(), vec![serde_json::json!(1)], 1).await.unwrap();

        h.gateway.upsert_worker_online(&WorkerId::new("w1"), 0).await.unwrap();
        let (tx, _rx) = mpsc::channel(8);
        h.registry.register_worker(WorkerId::new("w1"), tx);

        let assigned = h.dispatcher.assign_one_to_worker(&jm, &WorkerId::new("w1")).await.unwrap();
        assert!(assigned);
    }

    #[tokio::test]
    async fn assigns_resume_task_when_checkpoint_exists() {
        let h = dispatcher();
        let jm = JobManager::new(h.gateway.clone(), FakeClock::new());
        let job_id = JobId::new("j5");
        jm.create_job(job_id.clone(), "train".into(), vec![serde_json::json!(1)], 1).await.unwrap();
        let task_id = TaskId::for_index(&job_id, 0);

        let base = serde_json::to_vec(&serde_json::json!({"step": 3})).unwrap();
        h.checkpoint_manager.store_checkpoint(&task_id, true, &base, 30.0, 1, h.clock.epoch_ms()).await.unwrap();

        h.gateway.upsert_worker_online(&WorkerId::new("w1"), 0).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        h.registry.register_worker(WorkerId::new("w1"), tx);

        let n = h.dispatcher.assign_tasks_for_job(&jm, &job_id).await.unwrap();
        assert_eq!(n, 1);

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.tag(), "resume_task");
        match envelope {
            Envelope::ResumeTask(data) => {
                assert_eq!(data.task_id, task_id.to_string());
                let decoded = hex::decode(&data.reconstructed_state_hex).unwrap();
                let value: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
                assert_eq!(value, serde_json::json!({"step": 3}));
            }
            other => panic!("expected resume_task, got {}", other.tag()),
        }
    }

    #[tokio::test]
    async fn assigns_fresh_task_when_checkpoint_stale() {
        let h = dispatcher();
        let jm = JobManager::new(h.gateway.clone(), FakeClock::new());
        let job_id = JobId::new("j6");
        jm.create_job(job_id.clone(), "train".into(), vec![serde_json::json!(1)], 1).await.unwrap();
        let task_id = TaskId::for_index(&job_id, 0);

        let base = serde_json::to_vec(&serde_json::json!({"step": 3})).unwrap();
        h.checkpoint_manager.store_checkpoint(&task_id, true, &base, 30.0, 1, h.clock.epoch_ms()).await.unwrap();
        // push the dispatcher's clock past the harness's 1-hour staleness budget
        h.clock.advance(Duration::from_secs(3_601));

        h.gateway.upsert_worker_online(&WorkerId::new("w1"), 0).await.unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        h.registry.register_worker(WorkerId::new("w1"), tx);

        let n = h.dispatcher.assign_tasks_for_job(&jm, &job_id).await.unwrap();
        assert_eq!(n, 1);

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.tag(), "assign_task");
    }
}
