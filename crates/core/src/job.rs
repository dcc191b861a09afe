// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job entity and lifecycle.

use serde::{Deserialize, Serialize};

use crate::ids::JobId;
use crate::simple_display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

simple_display! {
    JobStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Opaque task-kind tag threaded through to workers verbatim; never
    /// interpreted or executed foreman-side.
    pub func_code: String,
    pub total_tasks: u32,
    pub completed_tasks: u32,
    pub created_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub error_message: Option<String>,
    pub supports_checkpointing: bool,
}

impl Job {
    pub fn new(id: JobId, func_code: String, total_tasks: u32, now_ms: u64) -> Self {
        let status = if total_tasks == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Running
        };
        Self {
            id,
            status,
            func_code,
            total_tasks,
            completed_tasks: 0,
            created_at_ms: now_ms,
            completed_at_ms: if total_tasks == 0 { Some(now_ms) } else { None },
            error_message: None,
            supports_checkpointing: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed_tasks >= self.total_tasks
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into { id: JobId = "job-test" }
        set { status: JobStatus = JobStatus::Running }
        into { func_code: String = "noop" }
        set { total_tasks: u32 = 1 }
        set { completed_tasks: u32 = 0 }
        set { created_at_ms: u64 = 0 }
        option { completed_at_ms: u64 = None }
        option { error_message: String = None }
        set { supports_checkpointing: bool = false }
    }
}
