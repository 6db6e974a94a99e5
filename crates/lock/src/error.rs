use std::time::Duration;

use thiserror::Error;

/// Status reported by the [`ClusterApi`](crate::cluster::ClusterApi) for a single call.
///
/// Mirrors the HTTP-like statuses a CRD-backed cluster actually returns: a create or
/// replace against an object that already exists comes back `Conflict`, a read or
/// replace against one that does not comes back `NotFound`. `ValidationQuirk` is
/// specific to CRD installation, where some clusters reject a definition with a
/// spurious "null conditions" validation error despite installing it successfully.
#[derive(Debug, Error)]
pub enum ClusterApiError {
    #[error("object not found")]
    NotFound,
    #[error("object already exists or was concurrently modified")]
    Conflict,
    #[error("CRD install reported a validation quirk but likely succeeded")]
    ValidationQuirk,
    #[error("cluster API error: {0}")]
    Other(String),
}

/// Errors surfaced by [`LockCoordinator`](crate::coordinator::LockCoordinator).
#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out acquiring lock {name:?} after {elapsed:?}")]
    Timeout { name: String, elapsed: Duration },

    #[error("lock {name:?} was usurped by another holder")]
    Usurped { name: String },

    #[error("cluster API error: {0}")]
    Fatal(String),
}

impl From<ClusterApiError> for LockError {
    fn from(err: ClusterApiError) -> Self {
        LockError::Fatal(err.to_string())
    }
}
