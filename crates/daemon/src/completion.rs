// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job completion: assembles ordered results and emits them to the
//! submitting client, if it is still connected.

use std::sync::Arc;

use foreman_core::{Clock, JobId};
use foreman_storage::StorageError;
use foreman_wire::{envelope::JobResultsData, Envelope};

use crate::job_manager::JobManager;
use crate::registry::ConnectionRegistry;

pub async fn complete_job<C: Clock>(
    job_manager: &JobManager<C>,
    registry: &Arc<ConnectionRegistry>,
    job_id: &JobId,
) -> Result<(), StorageError> {
    let Some(results) = job_manager.get_job_results(job_id).await? else {
        tracing::warn!(%job_id, "completion handler invoked before job was actually complete");
        return Ok(());
    };

    match registry.client_sender(job_id) {
        Some(sender) => {
            let envelope = Envelope::JobResults(JobResultsData { results });
            if sender.try_send(envelope).is_err() {
                tracing::warn!(%job_id, "client disconnected before results could be delivered");
            }
        }
        None => {
            tracing::info!(%job_id, "job complete but client is no longer connected; results remain in storage");
        }
    }

    job_manager.finalize_job(job_id).await
}
