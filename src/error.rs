//! Error types for directory service operations

use thiserror::Error;

use crate::models::StateError;
use crate::ports::ca::CaError;
use crate::ports::mail::MailError;
use crate::ports::store::StoreError;
use crate::ports::vault::VaultError;

/// Result type alias for directory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the directory service
///
/// The variants mirror the RPC status taxonomy: callers receive them
/// verbatim from the registration surface, while the certificate manager
/// treats everything except `Internal` as log-and-continue.
#[derive(Error, Debug)]
pub enum Error {
    /// Caller-induced error, surfaced verbatim
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Requested entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique constraint violated (e.g. common name collision)
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A state-machine gate rejected the operation
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Transient failure; the caller should retry the whole RPC
    #[error("aborted: {0}")]
    Aborted(String),

    /// Bug or infrastructure failure; operators are notified
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Self {
        Error::FailedPrecondition(err.to_string())
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(entity) => Error::NotFound(entity),
            StoreError::AlreadyExists(entity) => Error::AlreadyExists(entity),
            StoreError::Serialization(msg) | StoreError::Corrupted(msg) => Error::Internal(msg),
            StoreError::Io(msg) => Error::Aborted(msg),
        }
    }
}

impl From<VaultError> for Error {
    fn from(err: VaultError) -> Self {
        match err {
            VaultError::NotFound(name) => Error::NotFound(name),
            other => Error::Internal(other.to_string()),
        }
    }
}

impl From<CaError> for Error {
    fn from(err: CaError) -> Self {
        // Every CA failure is transient from the caller's perspective;
        // request state is left unchanged and retried on a later tick.
        Error::Aborted(err.to_string())
    }
}

impl From<MailError> for Error {
    fn from(err: MailError) -> Self {
        Error::Aborted(err.to_string())
    }
}
