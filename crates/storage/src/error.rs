// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed errors for the persistence gateway.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A transient failure the caller may retry (e.g. a lock timeout or a
    /// backend hiccup). `retryable` is always true for this variant; it
    /// exists as a field rather than folded into the variant so callers
    /// can match uniformly across error kinds when deciding whether to retry.
    #[error("transient storage error: {message}")]
    Transient { message: String, retryable: bool },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient { message: message.into(), retryable: true }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { retryable: true, .. })
    }
}
