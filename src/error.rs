//! Error types for datasource-worker.

use thiserror::Error;

use crate::source::PluginError;

/// Machine-readable classification carried by the error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request did not match the plugin contract.
    TypeMismatch,
    /// The host expects a different worker runtime version.
    VersionMismatch,
    /// Plugin code raised an error or panicked.
    DataSourceFailure,
    /// Anything else: transport, serialization, broken invariants.
    Internal,
}

impl ErrorKind {
    /// Error class string written into the envelope.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TypeMismatch => "DATA_SOURCE_TYPE_MISMATCH",
            ErrorKind::VersionMismatch => "VERSION_MISMATCH",
            ErrorKind::DataSourceFailure => "DATA_SOURCE_FAILURE",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for all worker operations.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// I/O error on the host connection or a diagnostics file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (schemas, envelopes).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// A string frame was not valid UTF-8.
    #[error("Invalid UTF-8 in string frame: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Protocol error (bad length, unexpected sentinel, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Connection closed mid-frame.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The request does not conform to the data source contract.
    #[error("[DATA_SOURCE_TYPE_MISMATCH] Expected {expected}, but got {actual}.")]
    TypeMismatch {
        /// What the worker expected.
        expected: String,
        /// What it received.
        actual: String,
    },

    /// Host and worker runtime versions differ.
    #[error("[VERSION_MISMATCH] Host expects worker version {host}, but this worker is {worker}.")]
    VersionMismatch {
        /// Version announced by the host.
        host: String,
        /// Version of this worker.
        worker: String,
    },

    /// A resolution invariant did not hold.
    #[error("Assertion failed: {0}")]
    Assertion(String),

    /// Plugin code failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Environment configuration could not be parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication with the host failed.
    #[error("Authentication failed: {0}")]
    Auth(String),
}

impl WorkerError {
    /// Build a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        WorkerError::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Classify this error for the envelope.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            WorkerError::VersionMismatch { .. } => ErrorKind::VersionMismatch,
            WorkerError::Plugin(_) => ErrorKind::DataSourceFailure,
            _ => ErrorKind::Internal,
        }
    }
}

/// Result type alias using WorkerError.
pub type Result<T> = std::result::Result<T, WorkerError>;
