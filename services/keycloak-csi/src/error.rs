//! Node service errors and their gRPC status mapping
//!
//! Every status message carries the call's correlation id. Secret bytes are
//! never part of an error, so messages are passed through as they are.

use keycloak_secrets::{Interrupted, KeycloakError};
use std::path::PathBuf;
use thiserror::Error;
use tonic::{Code, Status};
use uuid::Uuid;

/// Filesystem operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOp {
    /// Creating the target directory
    CreateDir,
    /// Writing a credential file
    Write,
    /// Applying the file mode
    SetPermissions,
    /// Removing a credential file
    Remove,
}

impl std::fmt::Display for FsOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::CreateDir => "creating directory",
            Self::Write => "writing file",
            Self::SetPermissions => "setting permissions on",
            Self::Remove => "removing",
        })
    }
}

/// Errors surfaced by the CSI node service.
#[derive(Error, Debug)]
pub enum CsiError {
    /// The volume context carries no client name
    #[error("volume context is missing required key {key:?}")]
    MissingContext {
        /// Missing key
        key: &'static str,
    },

    /// A required request field is empty
    #[error("{field} is required")]
    MissingField {
        /// Missing field
        field: &'static str,
    },

    /// The client secret could not be resolved
    #[error(transparent)]
    Fetch(#[from] KeycloakError),

    /// A filesystem operation on the target path failed
    #[error("{op} {}: {source}", .path.display())]
    Io {
        /// Operation that failed
        op: FsOp,
        /// Path it failed on
        path: PathBuf,
        /// Underlying cause
        #[source]
        source: std::io::Error,
    },

    /// The caller cancelled the request
    #[error("request cancelled")]
    Cancelled,

    /// The caller's deadline passed
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Result type for node operations.
pub type CsiResult<T> = Result<T, CsiError>;

impl CsiError {
    /// Create a filesystem error.
    pub fn io(op: FsOp, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Get the gRPC status code for this error
    #[must_use]
    pub const fn grpc_code(&self) -> Code {
        match self {
            Self::MissingContext { .. } => Code::FailedPrecondition,
            Self::MissingField { .. } => Code::InvalidArgument,
            Self::Fetch(err) => fetch_code(err),
            Self::Io { .. } => Code::Internal,
            Self::Cancelled => Code::Cancelled,
            Self::DeadlineExceeded => Code::DeadlineExceeded,
        }
    }

    /// Convert to gRPC Status with correlation ID
    #[must_use]
    pub fn to_status(&self, correlation_id: Uuid) -> Status {
        let message = format!("{self} [correlation_id: {correlation_id}]");
        Status::new(self.grpc_code(), message)
    }
}

const fn fetch_code(err: &KeycloakError) -> Code {
    if err.is_misconfiguration() {
        return Code::FailedPrecondition;
    }
    if err.is_interrupted() {
        return if matches!(err, KeycloakError::Cancelled) {
            Code::Cancelled
        } else {
            Code::DeadlineExceeded
        };
    }
    match err {
        KeycloakError::Remote { .. } | KeycloakError::Transport { .. } => Code::Unavailable,
        _ => Code::Internal,
    }
}

impl From<Interrupted> for CsiError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::Cancelled => Self::Cancelled,
            Interrupted::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}
