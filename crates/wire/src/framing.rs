// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame-level helpers for transports that deliver whole messages
//! (a WebSocket text/binary frame) rather than a raw byte stream.
//!
//! Each message on the wire is one JSON-encoded [`crate::Envelope`].
//! This module is transport-agnostic: callers hand it the bytes of one
//! received message and get an `Envelope` back, or vice versa.

use thiserror::Error;

use crate::envelope::{Envelope, EnvelopeError, RawEnvelope};

#[derive(Debug, Error)]
pub enum FramingError {
    #[error("invalid utf-8 in frame: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

/// Decode one received message's bytes into an [`Envelope`].
pub fn read_frame(bytes: &[u8]) -> Result<Envelope, FramingError> {
    let text = std::str::from_utf8(bytes)?;
    Envelope::from_json(text).map_err(FramingError::from)
}

/// Encode an [`Envelope`] into the bytes of one outbound message.
pub fn write_frame(envelope: &Envelope) -> Result<Vec<u8>, FramingError> {
    let raw: RawEnvelope = envelope.to_raw()?;
    Ok(serde_json::to_vec(&raw).map_err(EnvelopeError::from)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::WorkerReadyData;

    #[test]
    fn write_then_read_round_trips() {
        let env = Envelope::WorkerReady(WorkerReadyData { worker_id: "w1".into() });
        let bytes = write_frame(&env).unwrap();
        let back = read_frame(&bytes).unwrap();
        assert_eq!(back.tag(), "worker_ready");
    }

    #[test]
    fn read_frame_rejects_invalid_utf8() {
        let bytes = [0xff, 0xfe, 0xfd];
        assert!(read_frame(&bytes).is_err());
    }
}
