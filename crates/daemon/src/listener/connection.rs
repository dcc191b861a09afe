// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection role state, established by the first envelope received
//! on a socket. Any other first envelope terminates the connection.

use foreman_core::{JobId, WorkerId};

#[derive(Debug, Clone)]
pub enum Role {
    Client { job_id: JobId },
    Worker { worker_id: WorkerId },
}
