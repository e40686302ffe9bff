use std::path::PathBuf;

use dex_catalog::FetchError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse classification of a failure, as surfaced in views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    #[display("network")]
    Network,
    #[display("not found")]
    NotFound,
    #[display("storage")]
    Storage,
    #[display("cancelled")]
    Cancelled,
}

impl From<&FetchError> for ErrorKind {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::Cancelled => ErrorKind::Cancelled,
            FetchError::NotFound { .. } => ErrorKind::NotFound,
            FetchError::Status { status: 404, .. } => ErrorKind::NotFound,
            // timeouts, transport, server and decoding errors are all
            // reported as the catalog being unreachable
            FetchError::Timeout(_)
            | FetchError::Network { .. }
            | FetchError::Status { .. }
            | FetchError::Decode { .. } => ErrorKind::Network,
        }
    }
}

impl From<&StorageError> for ErrorKind {
    fn from(_: &StorageError) -> Self {
        ErrorKind::Storage
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key '{0}'")]
    InvalidKey(String),
    #[error("storage location {0} is not usable")]
    InvalidLocation(PathBuf),
    #[error("couldn't acquire storage lock")]
    AcquireLock(#[source] fslock::Error),
    #[error("couldn't read stored value")]
    Read(#[source] std::io::Error),
    #[error("couldn't write stored value")]
    Write(#[source] std::io::Error),
    #[error("couldn't replace stored value")]
    Persist(#[source] tempfile::PersistError),
    #[error("couldn't serialize value")]
    Serialize(#[source] serde_json::Error),
    #[error("storage is unavailable: {0}")]
    Unavailable(String),
}
