// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `foremand`: the foreman coordinator binary.

use std::sync::Arc;

use foreman_core::SystemClock;
use foreman_daemon::checkpoint::CheckpointManager;
use foreman_daemon::dispatcher::Dispatcher;
use foreman_daemon::job_manager::JobManager;
use foreman_daemon::listener::{self, Router};
use foreman_daemon::registry::ConnectionRegistry;
use foreman_daemon::scheduler::{Fifo, LeastLoaded, Performance, Priority, RoundRobin, Scheduler};
use foreman_daemon::{heartbeat, sweeper, Config};
use foreman_storage::{CheckpointBlobStore, MemoryGateway, PersistenceGateway};
use tokio_util::sync::CancellationToken;

fn scheduler_from_name(name: &str) -> Arc<dyn Scheduler> {
    match name {
        "round_robin" => Arc::new(RoundRobin::default()),
        "least_loaded" => Arc::new(LeastLoaded),
        "performance" => Arc::new(Performance),
        "priority" => Arc::new(Priority),
        "fifo" => Arc::new(Fifo),
        other => {
            tracing::warn!(scheduler = other, "unknown scheduler strategy, defaulting to fifo");
            Arc::new(Fifo)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let clock = SystemClock;
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(MemoryGateway::new());
    let registry = Arc::new(ConnectionRegistry::new());
    let scheduler = scheduler_from_name(&config.scheduler);

    let job_manager = Arc::new(JobManager::new(gateway.clone(), clock.clone()));
    let checkpoint_manager = Arc::new(CheckpointManager::new(
        CheckpointBlobStore::new(config.checkpoint_dir.clone(), gateway.clone()),
        gateway.clone(),
        config.compaction_threshold,
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        gateway.clone(),
        registry.clone(),
        scheduler,
        checkpoint_manager.clone(),
        config.resume_staleness,
        clock.clone(),
    ));

    let router = Arc::new(Router {
        gateway: gateway.clone(),
        registry: registry.clone(),
        job_manager,
        dispatcher,
        checkpoint_manager,
        clock: clock.clone(),
        retry_cap: config.retry_cap,
    });

    let shutdown = CancellationToken::new();

    let heartbeat_handle =
        tokio::spawn(heartbeat::run(registry.clone(), config.heartbeat_interval, shutdown.clone()));
    let sweeper_handle = tokio::spawn(sweeper::run(
        gateway.clone(),
        clock,
        config.sweeper_interval,
        config.stale_assigned_after,
        shutdown.clone(),
    ));

    let auth_token = config.auth_token.clone().map(Arc::from);
    let listen_addr = config.listen_addr.clone();
    let serve_shutdown = shutdown.clone();
    let serve_handle =
        tokio::spawn(async move { listener::serve(&listen_addr, router, auth_token, serve_shutdown).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
        result = serve_handle => {
            if let Ok(Err(err)) = result {
                tracing::error!(%err, "listener exited with error");
            }
        }
    }

    shutdown.cancel();
    let _ = heartbeat_handle.await;
    let _ = sweeper_handle.await;

    Ok(())
}
