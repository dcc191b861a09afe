// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level daemon error, composed from each layer's typed error. Only
//! used for logging at the connection boundary — handlers never propagate
//! a panic.

use thiserror::Error;

use foreman_storage::StorageError;
use foreman_wire::EnvelopeError;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("protocol error: {0}")]
    Protocol(#[from] EnvelopeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("transport send failed: {0}")]
    Send(String),
}
