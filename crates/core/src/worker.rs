// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker entity, lifecycle, and failure history.

use serde::{Deserialize, Serialize};

use crate::ids::{JobId, TaskId, WorkerId};
use crate::simple_display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Online,
    Busy,
    Offline,
}

simple_display! {
    WorkerStatus {
        Online => "online",
        Busy => "busy",
        Offline => "offline",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub status: WorkerStatus,
    pub last_seen_ms: u64,
    pub current_task_id: Option<TaskId>,
    pub total_tasks_completed: u64,
    pub total_tasks_failed: u64,
}

impl Worker {
    pub fn new(id: WorkerId, now_ms: u64) -> Self {
        Self {
            id,
            status: WorkerStatus::Online,
            last_seen_ms: now_ms,
            current_task_id: None,
            total_tasks_completed: 0,
            total_tasks_failed: 0,
        }
    }

    /// `success_rate = completed / (completed + failed)`, defined as 1.0
    /// when the worker has no recorded outcomes yet (benefit of the doubt
    /// for a fresh worker — see the Performance/Priority scheduler strategies).
    pub fn success_rate(&self) -> f64 {
        let total = self.total_tasks_completed + self.total_tasks_failed;
        if total == 0 {
            1.0
        } else {
            self.total_tasks_completed as f64 / total as f64
        }
    }

    pub fn total_outcomes(&self) -> u64 {
        self.total_tasks_completed + self.total_tasks_failed
    }
}

crate::builder! {
    pub struct WorkerBuilder => Worker {
        into { id: WorkerId = "worker-test" }
        set { status: WorkerStatus = WorkerStatus::Online }
        set { last_seen_ms: u64 = 0 }
        option { current_task_id: TaskId = None }
        set { total_tasks_completed: u64 = 0 }
        set { total_tasks_failed: u64 = 0 }
    }
}

/// Append-only record of a task failure attributed to a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerFailure {
    pub worker_id: WorkerId,
    pub task_id: TaskId,
    pub job_id: JobId,
    pub error_message: String,
    pub failed_at_ms: u64,
    pub checkpoint_available: bool,
}
