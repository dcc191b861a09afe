// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment-variable driven configuration, read once at startup.

use std::time::Duration;

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env_var(name).and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub checkpoint_dir: String,
    pub heartbeat_interval: Duration,
    pub compaction_threshold: usize,
    pub resume_staleness: Duration,
    pub stale_assigned_after: Duration,
    pub sweeper_interval: Duration,
    pub retry_cap: u32,
    pub auth_token: Option<String>,
    pub scheduler: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            listen_addr: env_var("FOREMAN_LISTEN_ADDR").unwrap_or_else(|| "127.0.0.1:7420".to_string()),
            checkpoint_dir: env_var("FOREMAN_CHECKPOINT_DIR").unwrap_or_else(|| "./.checkpoints".to_string()),
            heartbeat_interval: Duration::from_millis(env_u64("FOREMAN_HEARTBEAT_INTERVAL_MS", 30_000)),
            compaction_threshold: env_u64("FOREMAN_COMPACTION_THRESHOLD", 50) as usize,
            resume_staleness: Duration::from_secs(env_u64("FOREMAN_RESUME_STALENESS_SECS", 3_600)),
            stale_assigned_after: Duration::from_secs(env_u64("FOREMAN_STALE_ASSIGNED_SECS", 300)),
            sweeper_interval: Duration::from_millis(env_u64("FOREMAN_SWEEPER_INTERVAL_MS", 60_000)),
            retry_cap: env_u32("FOREMAN_RETRY_CAP", 3),
            auth_token: env_var("FOREMAN_AUTH_TOKEN"),
            scheduler: env_var("FOREMAN_SCHEDULER").unwrap_or_else(|| "fifo".to_string()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
