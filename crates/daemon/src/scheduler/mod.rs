// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pluggable worker/task selection policies.
//!
//! Every strategy is pure: no I/O, no locking, nothing beyond reading the
//! slices and maps it's handed. The dispatcher owns all the locking.

mod fifo;
mod least_loaded;
mod performance;
mod priority;
mod round_robin;

pub use fifo::Fifo;
pub use least_loaded::LeastLoaded;
pub use performance::Performance;
pub use priority::Priority;
pub use round_robin::RoundRobin;

use std::collections::HashMap;

use foreman_core::{Task, Worker, WorkerId};

/// A worker/task selection policy.
///
/// `select_worker` picks which of the currently-available workers should
/// take `task`. `select_task` picks which of the currently-pending tasks
/// `worker` should take next. Implementations never mutate their inputs.
pub trait Scheduler: Send + Sync {
    fn select_worker(
        &self,
        task: &Task,
        available: &[WorkerId],
        workers: &HashMap<WorkerId, Worker>,
    ) -> Option<WorkerId>;

    fn select_task(
        &self,
        pending: &[Task],
        worker_id: &WorkerId,
        workers: &HashMap<WorkerId, Worker>,
    ) -> Option<usize>;
}

pub(crate) fn success_rate(workers: &HashMap<WorkerId, Worker>, id: &WorkerId) -> f64 {
    workers.get(id).map(Worker::success_rate).unwrap_or(1.0)
}

pub(crate) fn total_outcomes(workers: &HashMap<WorkerId, Worker>, id: &WorkerId) -> u64 {
    workers.get(id).map(Worker::total_outcomes).unwrap_or(0)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use foreman_core::{JobId, TaskStatus};

    pub fn task(priority: i64, retry_count: u32) -> Task {
        let mut t = Task::new(JobId::new("j"), 0, serde_json::Value::Null);
        t.priority = priority;
        t.retry_count = retry_count;
        t.status = TaskStatus::Pending;
        t
    }

    pub fn worker_map(entries: &[(&str, u64, u64)]) -> HashMap<WorkerId, Worker> {
        entries
            .iter()
            .map(|(id, completed, failed)| {
                let id = WorkerId::new(*id);
                let w = Worker::builder()
                    .id(id.clone())
                    .total_tasks_completed(*completed)
                    .total_tasks_failed(*failed)
                    .build();
                (id, w)
            })
            .collect()
    }
}
