// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message router: the per-connection envelope handling described by the
//! client-role and worker-role tables. Pure with respect to transport —
//! it reads and writes `Envelope`s through the registry's outbound
//! channels, never touching a socket directly, so it can be driven in
//! tests without a real connection.

use std::sync::Arc;

use foreman_core::{Clock, JobId, TaskId, WorkerId, WorkerStatus};
use foreman_storage::PersistenceGateway;
use foreman_wire::{
    envelope::{CheckpointAckData, JobAcceptedData, JobErrorData, TaskCheckpointData, WorkerHeartbeatData},
    Envelope,
};

use crate::checkpoint::CheckpointManager;
use crate::completion;
use crate::dispatcher::Dispatcher;
use crate::job_manager::JobManager;
use crate::listener::connection::Role;
use crate::registry::{ConnectionRegistry, OutboundSender};

pub struct Router<C: Clock> {
    pub gateway: Arc<dyn PersistenceGateway>,
    pub registry: Arc<ConnectionRegistry>,
    pub job_manager: Arc<JobManager<C>>,
    pub dispatcher: Arc<Dispatcher<C>>,
    pub checkpoint_manager: Arc<CheckpointManager>,
    pub clock: C,
    pub retry_cap: u32,
}

/// What the caller (the per-connection task) should do after a handled
/// envelope.
pub enum Outcome {
    Continue,
    Close,
}

impl<C: Clock> Router<C> {
    /// Determines role from the first envelope received on a connection.
    /// Any envelope other than `submit_job` or `worker_ready` terminates
    /// the connection. Registers the connection's outbound sender under
    /// the established role and returns it.
    pub async fn handle_first(&self, envelope: Envelope, reply: OutboundSender) -> Option<Role> {
        match envelope {
            Envelope::SubmitJob(data) => {
                let job_id = JobId::new(uuid::Uuid::new_v4().to_string());
                self.registry.register_client(job_id.clone(), reply.clone());

                if data.args_list.len() != data.total_tasks as usize {
                    let _ = reply.try_send(Envelope::JobError(JobErrorData {
                        error: "args_list length does not match total_tasks".to_string(),
                    }));
                    self.registry.remove_client(&job_id);
                    return None;
                }

                if let Err(err) = self
                    .job_manager
                    .create_job(job_id.clone(), data.func_code, data.args_list, data.total_tasks)
                    .await
                {
                    let _ = reply.try_send(Envelope::JobError(JobErrorData { error: err.to_string() }));
                    self.registry.remove_client(&job_id);
                    return None;
                }

                if let Err(err) = self.dispatcher.assign_tasks_for_job(&self.job_manager, &job_id).await {
                    tracing::warn!(%job_id, %err, "initial dispatch failed");
                }

                let _ = reply.try_send(Envelope::JobAccepted(JobAcceptedData { job_id: job_id.to_string() }));
                Some(Role::Client { job_id })
            }
            Envelope::WorkerReady(data) => {
                let worker_id = WorkerId::new(data.worker_id);
                let now = self.clock.epoch_ms();
                if let Err(err) = self.gateway.upsert_worker_online(&worker_id, now).await {
                    tracing::warn!(%worker_id, %err, "worker registration failed");
                    return None;
                }
                self.registry.register_worker(worker_id.clone(), reply);
                if let Err(err) = self.dispatcher.assign_one_to_worker(&self.job_manager, &worker_id).await {
                    tracing::warn!(%worker_id, %err, "initial assignment failed");
                }
                Some(Role::Worker { worker_id })
            }
            _ => {
                tracing::warn!(tag = envelope.tag(), "unexpected first envelope, closing connection");
                None
            }
        }
    }

    pub async fn handle_client(&self, job_id: &JobId, envelope: Envelope) -> Outcome {
        match envelope {
            Envelope::Disconnect => Outcome::Close,
            other => {
                tracing::debug!(%job_id, tag = other.tag(), "ignoring envelope on client connection");
                Outcome::Continue
            }
        }
    }

    pub async fn handle_worker(&self, worker_id: &WorkerId, envelope: Envelope) -> Outcome {
        match envelope {
            Envelope::TaskResult(data) => {
                self.on_task_result(worker_id, data.task_id, data.result).await;
                Outcome::Continue
            }
            Envelope::TaskError(data) => {
                self.on_task_error(worker_id, data.task_id, data.error).await;
                Outcome::Continue
            }
            Envelope::Pong => {
                let now = self.clock.epoch_ms();
                if let Err(err) = self.gateway.touch_worker_last_seen(worker_id, now).await {
                    tracing::warn!(%worker_id, %err, "failed to record heartbeat");
                }
                Outcome::Continue
            }
            Envelope::TaskCheckpoint(data) => {
                self.on_task_checkpoint(worker_id, data).await;
                Outcome::Continue
            }
            Envelope::WorkerHeartbeat(WorkerHeartbeatData { .. }) => Outcome::Continue,
            other => {
                tracing::debug!(%worker_id, tag = other.tag(), "ignoring envelope on worker connection");
                Outcome::Continue
            }
        }
    }

    async fn on_task_result(&self, worker_id: &WorkerId, task_id: String, result: serde_json::Value) {
        let task_id = TaskId::new(task_id);
        let completion = match self.job_manager.mark_task_completed(&task_id, worker_id, result).await {
            Ok(c) => c,
            Err(err) => {
                tracing::warn!(%task_id, %worker_id, %err, "failed to record task completion");
                return;
            }
        };
        if !completion.accepted {
            tracing::debug!(%task_id, %worker_id, "duplicate or stale task result ignored");
            return;
        }
        if let Err(err) = self.checkpoint_manager.clear(&task_id).await {
            tracing::warn!(%task_id, %err, "failed to clear checkpoint after task completion");
        }
        if let Err(err) = self.gateway.update_worker_stats(worker_id, 1, 0).await {
            tracing::warn!(%worker_id, %err, "failed to update worker stats");
        }
        if let Err(err) = self.gateway.update_worker_status(worker_id, WorkerStatus::Online, None).await {
            tracing::warn!(%worker_id, %err, "failed to mark worker available");
        }
        self.registry.mark_available(worker_id.clone());

        if completion.job_complete {
            let job_id = task_id_job(&task_id);
            if let Err(err) = completion::complete_job(&self.job_manager, &self.registry, &job_id).await {
                tracing::warn!(%job_id, %err, "job completion handler failed");
            }
        }

        if let Err(err) = self.dispatcher.assign_one_to_worker(&self.job_manager, worker_id).await {
            tracing::warn!(%worker_id, %err, "post-completion dispatch failed");
        }
    }

    async fn on_task_error(&self, worker_id: &WorkerId, task_id: String, error: String) {
        let task_id = TaskId::new(task_id);
        let job_id = task_id_job(&task_id);
        if let Err(err) = self.job_manager.mark_task_failed(&task_id, error.clone(), self.retry_cap).await {
            tracing::warn!(%task_id, %worker_id, %err, "failed to record task failure");
            return;
        }
        let checkpoint_available =
            self.gateway.get_checkpoint(&task_id).await.map(|c| c.has_base()).unwrap_or(false);
        let now = self.clock.epoch_ms();
        let failure = foreman_core::WorkerFailure {
            worker_id: worker_id.clone(),
            task_id: task_id.clone(),
            job_id,
            error_message: error,
            failed_at_ms: now,
            checkpoint_available,
        };
        if let Err(err) = self.gateway.record_worker_failure(failure).await {
            tracing::warn!(%worker_id, %err, "failed to record worker failure");
        }
        if let Err(err) = self.gateway.update_worker_stats(worker_id, 0, 1).await {
            tracing::warn!(%worker_id, %err, "failed to update worker stats");
        }
        if let Err(err) = self.gateway.update_worker_status(worker_id, WorkerStatus::Online, None).await {
            tracing::warn!(%worker_id, %err, "failed to mark worker available");
        }
        self.registry.mark_available(worker_id.clone());

        if let Err(err) = self.dispatcher.assign_one_to_worker(&self.job_manager, worker_id).await {
            tracing::warn!(%worker_id, %err, "post-failure dispatch failed");
        }
    }

    async fn on_task_checkpoint(&self, worker_id: &WorkerId, data: TaskCheckpointData) {
        let task_id = TaskId::new(data.task_id);
        let Ok(raw) = hex::decode(&data.delta_data_hex) else {
            tracing::warn!(%task_id, %worker_id, "checkpoint payload was not valid hex, dropping");
            return;
        };
        let now = self.clock.epoch_ms();
        if let Err(err) = self
            .checkpoint_manager
            .store_checkpoint(&task_id, data.is_base, &raw, data.progress_percent, data.checkpoint_id, now)
            .await
        {
            tracing::warn!(%task_id, %worker_id, %err, "failed to store checkpoint");
            return;
        }
        if let Some(sender) = self.registry.worker_sender(worker_id) {
            let _ = sender.try_send(Envelope::CheckpointAck(CheckpointAckData {
                task_id: task_id.to_string(),
                checkpoint_id: data.checkpoint_id,
            }));
        }
    }

    pub async fn on_worker_disconnect(&self, worker_id: &WorkerId) {
        self.registry.remove_worker(worker_id);
        if let Err(err) = self.gateway.update_worker_status(worker_id, WorkerStatus::Offline, None).await {
            tracing::warn!(%worker_id, %err, "failed to mark worker offline on disconnect");
        }
    }

    pub fn on_client_disconnect(&self, job_id: &JobId) {
        self.registry.remove_client(job_id);
    }
}

/// Results of a job carry results via `JobResultsData`; completion reuses
/// the task id's embedded job id rather than threading a second parameter
/// through every call site.
fn task_id_job(task_id: &TaskId) -> JobId {
    let s = task_id.as_str();
    match s.rsplit_once("_task_") {
        Some((job, _)) => JobId::new(job),
        None => JobId::new(s),
    }
}
