// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use foreman_core::{Task, Worker, WorkerId};

use super::{success_rate, Scheduler};

/// Picks the available worker with the highest success rate, tie-broken
/// by most total completed tasks. Picks the pending task with the
/// highest priority, tie-broken by lowest retry count (prefer fresh
/// tasks over ones already being retried).
#[derive(Default)]
pub struct Performance;

impl Scheduler for Performance {
    fn select_worker(
        &self,
        _task: &Task,
        available: &[WorkerId],
        workers: &HashMap<WorkerId, Worker>,
    ) -> Option<WorkerId> {
        available
            .iter()
            .max_by(|a, b| {
                let rate_a = success_rate(workers, a);
                let rate_b = success_rate(workers, b);
                rate_a
                    .partial_cmp(&rate_b)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| {
                        workers.get(a).map(|w| w.total_tasks_completed).unwrap_or(0).cmp(
                            &workers.get(b).map(|w| w.total_tasks_completed).unwrap_or(0),
                        )
                    })
            })
            .cloned()
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
    fn picks_highest_success_rate_worker() {
        let perf = Performance;
        let workers = worker_map(&[("flaky", 1, 9), ("solid", 9, 1)]);
        let available = vec![WorkerId::new("flaky"), WorkerId::new("solid")];
        assert_eq!(perf.select_worker(&task(0, 0), &available, &workers), Some(WorkerId::new("solid")));
    }

    #[test]
    fn ties_break_on_total_completed() {
        let perf = Performance;
        let workers = worker_map(&[("a", 2, 0), ("b", 4, 0)]);
        let available = vec![WorkerId::new("a"), WorkerId::new("b")];
        assert_eq!(perf.select_worker(&task(0, 0), &available, &workers), Some(WorkerId::new("b")));
    }

    #[test]
    fn picks_highest_priority_task_tie_broken_by_retry_count() {
        let perf = Performance;
        let pending = vec![task(1, 0), task(5, 2), task(5, 0)];
        assert_eq!(perf.select_task(&pending, &WorkerId::new("w"), &HashMap::new()), Some(2));
    }
}
