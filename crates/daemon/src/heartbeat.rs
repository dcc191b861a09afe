// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic liveness probe. Wakes on `interval`, snapshots the connected
//! worker set, and sends a `ping` to each. Send failures are swallowed —
//! a dead connection is cleaned up by ordinary disconnect handling, not
//! by this loop.

use std::sync::Arc;
use std::time::Duration;

use foreman_wire::Envelope;
use tokio_util::sync::CancellationToken;

use crate::registry::ConnectionRegistry;

pub async fn run(registry: Arc<ConnectionRegistry>, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("heartbeat loop shutting down");
                return;
            }
            _ = ticker.tick() => {
                tick(&registry);
            }
        }
    }
}

fn tick(registry: &ConnectionRegistry) {
    let worker_ids = registry.connected_worker_ids();
    tracing::debug!(count = worker_ids.len(), "sending heartbeat ping");
    for worker_id in worker_ids {
        if let Some(sender) = registry.worker_sender(&worker_id) {
            if sender.try_send(Envelope::Ping).is_err() {
                tracing::debug!(%worker_id, "heartbeat send failed, leaving cleanup to disconnect handling");
            }
        }
    }
}
