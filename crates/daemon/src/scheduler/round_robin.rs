// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use foreman_core::{Task, Worker, WorkerId};

use super::Scheduler;

/// Rotates through the available set in stable sorted order, advancing a
/// shared cursor on every selection.
#[derive(Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl Scheduler for RoundRobin {
    fn select_worker(
        &self,
        _task: &Task,
        available: &[WorkerId],
        _workers: &HashMap<WorkerId, Worker>,
    ) -> Option<WorkerId> {
        if available.is_empty() {
            return None;
        }
        let mut sorted: Vec<&WorkerId> = available.iter().collect();
        sorted.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % sorted.len();
        Some(sorted[idx].clone())
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
