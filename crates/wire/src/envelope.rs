// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The tagged envelope: `{ "type": <tag>, "data": <payload>, "job_id": <id?> }`.
//!
//! Payload shapes are typed per tag. Encoding goes through an untyped
//! [`RawEnvelope`] so that an unrecognized tag can be logged and ignored
//! (forward compatibility) instead of failing the whole connection.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("unknown envelope tag: {0}")]
    UnknownTag(String),
    #[error("malformed payload for tag {tag}: {source}")]
    MalformedPayload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Untyped wire form. `type` drives which payload shape `data` must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEnvelope {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default = "serde_json::Value::default")]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

macro_rules! envelopes {
    (
        $( $tag:literal => $variant:ident $( ( $payload:ty ) )? ),+ $(,)?
    ) => {
        #[derive(Debug, Clone)]
        pub enum Envelope {
            $( $variant $( ($payload) )?, )+
        }

        impl Envelope {
            pub fn tag(&self) -> &'static str {
                match self {
                    $( Envelope::$variant $( (envelopes!(@bind $payload)) )? => $tag, )+
                }
            }

            pub fn to_raw(&self) -> Result<RawEnvelope, EnvelopeError> {
                let data = match self {
                    $(
                        Envelope::$variant $( (payload) )? => {
                            envelopes!(@encode $( $payload, )? payload)
                        }
                    )+
                };
                Ok(RawEnvelope { tag: self.tag().to_string(), data: data?, job_id: self.job_id() })
            }

            /// The envelope-level `job_id` sibling field is left unset by
            /// this encoder: every payload that needs a job or task id
            /// carries it in its own typed fields, and the router keys
            /// off the connection's registration, not this field.
            pub fn job_id(&self) -> Option<String> {
                None
            }

            pub fn from_raw(raw: RawEnvelope) -> Result<Self, EnvelopeError> {
                match raw.tag.as_str() {
                    $(
                        $tag => {
                            envelopes!(@decode $tag, raw.data, $variant $(, $payload)?)
                        }
                    )+
                    other => Err(EnvelopeError::UnknownTag(other.to_string())),
                }
            }
        }
    };

    (@bind $payload:ty) => { _payload };
    (@bind) => { };

    (@encode $payload:ty, $val:ident) => {
        serde_json::to_value($val).map_err(EnvelopeError::from)
    };
    (@encode $val:ident) => {
        Ok(serde_json::Value::Object(Default::default()))
    };

    (@decode $tag:literal, $data:expr, $variant:ident, $payload:ty) => {
        serde_json::from_value::<$payload>($data)
            .map(Envelope::$variant)
            .map_err(|source| EnvelopeError::MalformedPayload { tag: $tag.to_string(), source })
    };
    (@decode $tag:literal, $data:expr, $variant:ident) => {
        Ok(Envelope::$variant)
    };
}

envelopes! {
    "submit_job" => SubmitJob(SubmitJobData),
    "disconnect" => Disconnect,
    "job_accepted" => JobAccepted(JobAcceptedData),
    "job_results" => JobResults(JobResultsData),
    "job_error" => JobError(JobErrorData),
    "assign_task" => AssignTask(AssignTaskData),
    "ping" => Ping,
    "resume_task" => ResumeTask(ResumeTaskData),
    "checkpoint_ack" => CheckpointAck(CheckpointAckData),
    "worker_ready" => WorkerReady(WorkerReadyData),
    "worker_heartbeat" => WorkerHeartbeat(WorkerHeartbeatData),
    "task_result" => TaskResult(TaskResultData),
    "task_error" => TaskError(TaskErrorData),
    "task_checkpoint" => TaskCheckpoint(TaskCheckpointData),
    "pong" => Pong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJobData {
    pub func_code: String,
    pub args_list: Vec<serde_json::Value>,
    pub total_tasks: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAcceptedData {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultsData {
    pub results: Vec<Option<serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobErrorData {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignTaskData {
    pub func_code: String,
    pub task_args: serde_json::Value,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeTaskData {
    pub task_id: String,
    pub func_code: String,
    pub reconstructed_state_hex: String,
    #[serde(default)]
    pub remaining_args: Vec<serde_json::Value>,
    pub checkpoint_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointAckData {
    pub task_id: String,
    pub checkpoint_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReadyData {
    pub worker_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHeartbeatData {
    pub worker_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_task: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResultData {
    pub result: serde_json::Value,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskErrorData {
    pub error: String,
    pub task_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCheckpointData {
    pub task_id: String,
    pub is_base: bool,
    pub delta_data_hex: String,
    pub progress_percent: f64,
    pub checkpoint_id: u64,
    pub compression_type: String,
}

impl Envelope {
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(&self.to_raw()?)?)
    }

    pub fn from_json(s: &str) -> Result<Self, EnvelopeError> {
        let raw: RawEnvelope = serde_json::from_str(s)?;
        Self::from_raw(raw)
    }
}


impl std::fmt::Display for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}
