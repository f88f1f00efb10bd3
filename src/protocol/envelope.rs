//! Error envelope written in place of a success response.
//!
//! Wire form: `[EXCEPTION_THROWN:int][json blob]`, where the JSON object is
//!
//! ```json
//! {"errorClass":"DATA_SOURCE_TYPE_MISMATCH","message":"...","messageParameters":{"actual":"...","expected":"..."}}
//! ```

use std::collections::BTreeMap;

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use super::wire_format::{put_blob, put_int, special_lengths};
use crate::error::{Result, WorkerError};

/// Structured error payload for the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Machine-readable error class.
    pub error_class: String,
    /// Human-readable detail.
    pub message: String,
    /// Named parameters of the error class.
    #[serde(default)]
    pub message_parameters: BTreeMap<String, String>,
}

impl ErrorEnvelope {
    /// Build the envelope for a worker error.
    pub fn from_error(err: &WorkerError) -> Self {
        let mut message_parameters = BTreeMap::new();
        match err {
            WorkerError::TypeMismatch { expected, actual } => {
                message_parameters.insert("expected".to_string(), expected.clone());
                message_parameters.insert("actual".to_string(), actual.clone());
            }
            WorkerError::VersionMismatch { host, worker } => {
                message_parameters.insert("expected".to_string(), host.clone());
                message_parameters.insert("actual".to_string(), worker.clone());
            }
            _ => {}
        }

        Self {
            error_class: err.kind().as_str().to_string(),
            message: err.to_string(),
            message_parameters,
        }
    }

    /// Encode the sentinel and the JSON blob.
    pub fn encode(&self) -> Result<BytesMut> {
        let json = serde_json::to_vec(self)?;
        let mut buf = BytesMut::with_capacity(8 + json.len());
        put_int(&mut buf, special_lengths::EXCEPTION_THROWN);
        put_blob(&mut buf, &json)?;
        Ok(buf)
    }

    /// Parse the JSON blob that follows the sentinel.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

impl From<&WorkerError> for ErrorEnvelope {
    fn from(err: &WorkerError) -> Self {
        Self::from_error(err)
    }
}
