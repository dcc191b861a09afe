// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use foreman_core::{Task, Worker, WorkerId};

use super::{success_rate, Scheduler};

/// For a prioritized task (`priority > 0`), behaves like [`super::Performance`]
/// on the worker side; otherwise falls back to FIFO. Task selection always
/// prefers the highest priority, tie-broken by lowest retry count.
#[derive(Default)]
pub struct Priority;

impl Scheduler for Priority {
    fn select_worker(
        &self,
        task: &Task,
        available: &[WorkerId],
        workers: &HashMap<WorkerId, Worker>,
    ) -> Option<WorkerId> {
        if task.priority > 0 {
            available
                .iter()
                .max_by(|a, b| {
                    success_rate(workers, a)
                        .partial_cmp(&success_rate(workers, b))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .cloned()
        } else {
            available.first().cloned()
        }
    }

    fn select_task(
        &self,
        pending: &[Task],
        _worker_id: &WorkerId,
        _workers: &HashMap<WorkerId, Worker>,
    ) -> Option<usize> {
        pending
            .iter()
            .enumerate()
            .max_by_key(|(_, t)| (t.priority, -(t.retry_count as i64)))
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{task, worker_map};
    use super::*;

    #[test]
    fn low_priority_task_falls_back_to_fifo_worker_pick() {
        let p = Priority;
        let workers = worker_map(&[("a", 0, 10), ("b", 10, 0)]);
        let available = vec![WorkerId::new("a"), WorkerId::new("b")];
        assert_eq!(p.select_worker(&task(0, 0), &available, &workers), Some(WorkerId::new("a")));
    }

    #[test]
    fn high_priority_task_picks_best_success_rate_worker() {
        let p = Priority;
        let workers = worker_map(&[("a", 0, 10), ("b", 10, 0)]);
        let available = vec![WorkerId::new("a"), WorkerId::new("b")];
        assert_eq!(p.select_worker(&task(5, 0), &available, &workers), Some(WorkerId::new("b")));
    }
}
