// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Stalled-assigned sweeper: periodically resets tasks that have been
//! `assigned` for longer than the stale threshold back to `pending`, so
//! the next dispatch cycle can reassign them (to a resume-aware
//! assignment when a checkpoint exists, a fresh one otherwise — the
//! sweeper itself never picks a worker; it only makes the task visible
//! to dispatch again).

use std::sync::Arc;
use std::time::Duration;

use foreman_core::Clock;
use foreman_storage::PersistenceGateway;
use tokio_util::sync::CancellationToken;

pub async fn run<C: Clock>(
    gateway: Arc<dyn PersistenceGateway>,
    clock: C,
    interval: Duration,
    stale_after: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("stalled-assigned sweeper shutting down");
                return;
            }
            _ = ticker.tick() => {
                tick(&gateway, &clock, stale_after).await;
            }
        }
    }
}

async fn tick<C: Clock>(gateway: &Arc<dyn PersistenceGateway>, clock: &C, stale_after: Duration) {
    let stale_before_ms = clock.epoch_ms().saturating_sub(stale_after.as_millis() as u64);
    match gateway.sweep_stale_assigned(stale_before_ms).await {
        Ok(reset) if !reset.is_empty() => {
            tracing::warn!(count = reset.len(), "reset stalled-assigned tasks to pending");
        }
        Ok(_) => {}
        Err(err) => tracing::error!(%err, "stalled-assigned sweep failed"),
    }
}
