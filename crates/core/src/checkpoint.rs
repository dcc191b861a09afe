// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental checkpoint state embedded in a [`crate::task::Task`].

use serde::{Deserialize, Serialize};

/// Compression algorithm applied to a stored checkpoint blob.
///
/// Only `Gzip` is produced by this codebase; other tags are accepted on
/// the wire so that a future worker implementation can introduce a new
/// codec without breaking deserialization of older checkpoint records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    Gzip,
    None,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::Gzip => "gzip",
            Compression::None => "none",
        }
    }
}

impl std::str::FromStr for Compression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gzip" => Ok(Compression::Gzip),
            "none" => Ok(Compression::None),
            other => Err(format!("unknown compression type: {other}")),
        }
    }
}

/// One incremental delta stored atop a task's base checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaDescriptor {
    pub id: u64,
    pub size: u64,
    pub stored_at_ms: u64,
    pub compression: Compression,
    pub storage_ref: String,
}

/// Per-task checkpoint bookkeeping.
///
/// Invariant: a base exists whenever any delta exists; delta ids are
/// strictly increasing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointState {
    pub base_ref: Option<String>,
    pub base_size: u64,
    pub deltas: Vec<DeltaDescriptor>,
    pub checkpoint_count: u64,
    pub last_checkpoint_at_ms: Option<u64>,
    pub progress_percent: f64,
}

impl CheckpointState {
    pub fn has_base(&self) -> bool {
        self.base_ref.is_some()
    }

    pub fn next_delta_id(&self) -> u64 {
        self.deltas.last().map(|d| d.id + 1).unwrap_or(1)
    }

    /// Resume eligibility requires a base, a non-stale last checkpoint.
    /// Terminal-status exclusion is checked by the caller against the
    /// owning task's status.
    pub fn is_resumable(&self, now_ms: u64, staleness_budget_ms: u64) -> bool {
        match (self.base_ref.as_ref(), self.last_checkpoint_at_ms) {
            (Some(_), Some(last)) => now_ms.saturating_sub(last) <= staleness_budget_ms,
            _ => false,
        }
    }
}
