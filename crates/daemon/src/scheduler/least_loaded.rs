// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;

use foreman_core::{Task, Worker, WorkerId};

use super::{total_outcomes, Scheduler};

/// Picks the available worker with the fewest total recorded outcomes
/// (completed + failed).
#[derive(Default)]
pub struct LeastLoaded;

impl Scheduler for LeastLoaded {
    fn select_worker(
        &self,
        _task: &Task,
        available: &[WorkerId],
        workers: &HashMap<WorkerId, Worker>,
    ) -> Option<WorkerId> {
        available.iter().min_by_key(|id| total_outcomes(workers, id)).cloned()
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
