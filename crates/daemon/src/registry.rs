// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry: bidirectional maps {worker_id<->conn, job_id<->client_conn}
//! plus the available-workers set. Guarded by a single lock; emits no I/O
//! itself (sending goes through each connection's own bounded channel, fed
//! by that connection's dedicated writer task — see `listener`).

use std::collections::{HashMap, HashSet};

use foreman_core::{JobId, WorkerId};
use foreman_wire::Envelope;
use tokio::sync::mpsc;

pub type OutboundSender = mpsc::Sender<Envelope>;

#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryStats {
    pub connected_workers: usize,
    pub available_workers: usize,
    pub busy_workers: usize,
    pub active_jobs: usize,
}

#[derive(Default)]
struct Inner {
    workers: HashMap<WorkerId, OutboundSender>,
    clients: HashMap<JobId, OutboundSender>,
    available: HashSet<WorkerId>,
}

pub struct ConnectionRegistry {
    inner: parking_lot::Mutex<Inner>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self { inner: parking_lot::Mutex::new(Inner::default()) }
    }

    pub fn register_worker(&self, worker_id: WorkerId, sender: OutboundSender) {
        let mut inner = self.inner.lock();
        inner.workers.insert(worker_id.clone(), sender);
        inner.available.insert(worker_id);
    }

    pub fn register_client(&self, job_id: JobId, sender: OutboundSender) {
        self.inner.lock().clients.insert(job_id, sender);
    }

    pub fn remove_worker(&self, worker_id: &WorkerId) {
        let mut inner = self.inner.lock();
        inner.workers.remove(worker_id);
        inner.available.remove(worker_id);
    }

    pub fn remove_client(&self, job_id: &JobId) {
        self.inner.lock().clients.remove(job_id);
    }

    pub fn mark_available(&self, worker_id: WorkerId) {
        self.inner.lock().available.insert(worker_id);
    }

    pub fn mark_unavailable(&self, worker_id: &WorkerId) {
        self.inner.lock().available.remove(worker_id);
    }

    pub fn is_available(&self, worker_id: &WorkerId) -> bool {
        self.inner.lock().available.contains(worker_id)
    }

    pub fn available_snapshot(&self) -> Vec<WorkerId> {
        self.inner.lock().available.iter().cloned().collect()
    }

    pub fn connected_worker_ids(&self) -> Vec<WorkerId> {
        self.inner.lock().workers.keys().cloned().collect()
    }

    pub fn worker_sender(&self, worker_id: &WorkerId) -> Option<OutboundSender> {
        self.inner.lock().workers.get(worker_id).cloned()
    }

    pub fn client_sender(&self, job_id: &JobId) -> Option<OutboundSender> {
        self.inner.lock().clients.get(job_id).cloned()
    }

    /// Atomically removes `worker_id` from the available set, returning
    /// whether it was present. Used by the dispatcher's assign critical
    /// section (`available_workers` mutation must be atomic with the
    /// task compare-and-set it's paired with).
    pub fn take_available(&self, worker_id: &WorkerId) -> bool {
        self.inner.lock().available.remove(worker_id)
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.inner.lock();
        RegistryStats {
            connected_workers: inner.workers.len(),
            available_workers: inner.available.len(),
            busy_workers: inner.workers.len().saturating_sub(inner.available.len()),
            active_jobs: inner.clients.len(),
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (OutboundSender, mpsc::Receiver<Envelope>) {
        mpsc::channel(8)
    }

    #[test]
    fn registering_a_worker_makes_it_available() {
        let reg = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        reg.register_worker(WorkerId::new("w1"), tx);
        assert!(reg.is_available(&WorkerId::new("w1")));
        assert_eq!(reg.stats().connected_workers, 1);
        assert_eq!(reg.stats().available_workers, 1);
    }

    #[test]
    fn take_available_is_atomic_remove() {
        let reg = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        reg.register_worker(WorkerId::new("w1"), tx);
        assert!(reg.take_available(&WorkerId::new("w1")));
        assert!(!reg.take_available(&WorkerId::new("w1")));
        assert_eq!(reg.stats().busy_workers, 1);
    }

    #[test]
    fn remove_worker_clears_both_maps() {
        let reg = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let w = WorkerId::new("w1");
        reg.register_worker(w.clone(), tx);
        reg.remove_worker(&w);
        assert_eq!(reg.stats().connected_workers, 0);
        assert!(!reg.is_available(&w));
    }

    #[test]
    fn client_registration_round_trips() {
        let reg = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        let job = JobId::new("j1");
        reg.register_client(job.clone(), tx);
        assert!(reg.client_sender(&job).is_some());
        reg.remove_client(&job);
        assert!(reg.client_sender(&job).is_none());
    }
}
