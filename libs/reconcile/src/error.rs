//! Error types for cluster access and reconciliation.

use thiserror::Error;

use crate::InstanceState;

/// Result type for cluster API calls.
pub type ClientResult<T> = Result<T, ClientError>;

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Errors returned by the external cluster API.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The requested object does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// An object with the same name already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The API rejected the request.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request never reached the API.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request resolved to an empty path and was not sent.
    #[error("empty request path for {0}")]
    EmptyRequestPath(String),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl ClientError {
    /// Returns true if this error means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

/// Errors that abort a reconciliation cycle.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A cluster API call failed. Transient; the caller redelivers.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The workload spec could not be built for the object.
    #[error("cannot build workload spec for {instance}: {reason}")]
    PodSpec { instance: String, reason: String },

    /// The desired state is neither running nor stopped.
    #[error("unknown desire state {0} for instance")]
    UnknownDesireState(InstanceState),

    /// The workload runs on a different node than the one the instance
    /// was pinned to.
    #[error("instance {instance} is pinned to node {expected} but its workload runs on {actual}")]
    NodePinViolation {
        instance: String,
        expected: String,
        actual: String,
    },
}

impl ReconcileError {
    /// Returns true for consistency violations, as opposed to transient
    /// API failures.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            ReconcileError::UnknownDesireState(_) | ReconcileError::NodePinViolation { .. }
        )
    }
}
