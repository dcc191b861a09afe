// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use foreman_core::{Task, Worker, WorkerId};

use super::Scheduler;

/// Picks any available worker and the first pending task.
#[derive(Default)]
pub struct Fifo;

impl Scheduler for Fifo {
    fn select_worker(
        &self,
        _task: &Task,
        available: &[WorkerId],
        _workers: &HashMap<WorkerId, Worker>,
    ) -> Option<WorkerId> {
        available.first().cloned()
    }

    fn select_task(
        &self,
        pending: &[Task],
        _worker_id: &WorkerId,
        _workers: &HashMap<WorkerId, Worker>,
    ) -> Option<usize> {
        if pending.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{task, worker_map};
    use super::*;

    #[test]
    fn picks_first_available_worker() {
        let fifo = Fifo;
        let workers = worker_map(&[("w1", 0, 0), ("w2", 0, 0)]);
        let available = vec![WorkerId::new("w1"), WorkerId::new("w2")];
        let picked = fifo.select_worker(&task(0, 0), &available, &workers);
        assert_eq!(picked, Some(WorkerId::new("w1")));
    }

    #[test]
    fn picks_first_pending_task() {
        let fifo = Fifo;
        let pending = vec![task(0, 0), task(5, 0)];
        let workers = HashMap::new();
        assert_eq!(fifo.select_task(&pending, &WorkerId::new("w1"), &workers), Some(0));
    }

    #[test]
    fn no_workers_available_yields_none() {
        let fifo = Fifo;
        let workers = HashMap::new();
        assert_eq!(fifo.select_worker(&task(0, 0), &[], &workers), None);
    }
}
