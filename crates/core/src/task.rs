// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task entity and lifecycle.

use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointState;
use crate::ids::{JobId, TaskId, WorkerId};
use crate::simple_display;

/// A task's position in its `pending -> assigned -> {completed, pending}` machine.
///
/// `Failed` is terminal and only reached once a task exceeds its retry cap
/// (see `FOREMAN_RETRY_CAP`); ordinary worker failures reset a task to
/// `Pending` for reassignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Completed,
    Failed,
}

simple_display! {
    TaskStatus {
        Pending => "pending",
        Assigned => "assigned",
        Completed => "completed",
        Failed => "failed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub index: usize,
    pub status: TaskStatus,
    pub worker_id: Option<WorkerId>,
    /// Opaque serialized per-task argument, threaded through to the worker verbatim.
    pub args: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub assigned_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub priority: i64,
    pub retry_count: u32,
    pub checkpoint: CheckpointState,
}

impl Task {
    pub fn new(job_id: JobId, index: usize, args: serde_json::Value) -> Self {
        let id = TaskId::for_index(&job_id, index);
        Self {
            id,
            job_id,
            index,
            status: TaskStatus::Pending,
            worker_id: None,
            args,
            result: None,
            error_message: None,
            assigned_at_ms: None,
            completed_at_ms: None,
            priority: 0,
            retry_count: 0,
            checkpoint: CheckpointState::default(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

crate::builder! {
    pub struct TaskBuilder => Task {
        into { job_id: JobId = "job-test" }
        set { index: usize = 0 }
        set { status: TaskStatus = TaskStatus::Pending }
        option { worker_id: WorkerId = None }
        set { args: serde_json::Value = serde_json::Value::Null }
        option { result: serde_json::Value = None }
        option { error_message: String = None }
        option { assigned_at_ms: u64 = None }
        option { completed_at_ms: u64 = None }
        set { priority: i64 = 0 }
        set { retry_count: u32 = 0 }
        set { checkpoint: CheckpointState = CheckpointState::default() }
        computed { id: TaskId = TaskId::new("job-test_task_0") }
    }
}
