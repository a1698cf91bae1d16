//! Engine error taxonomy

use crate::callback::CallbackError;
use crate::transaction::{TxId, TxState};
use cardinal_core::{EndpointRole, NodeId};
use cardinal_storage::StorageError;
use thiserror::Error;

/// Result type alias using the engine Error
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown type: {0}")]
    UnknownType(String),

    #[error("{role} node not found: {id}")]
    EndpointNotFound { role: EndpointRole, id: NodeId },

    #[error("{role} node {id} has type {actual}, expected {expected}")]
    EndpointTypeMismatch {
        role: EndpointRole,
        id: NodeId,
        expected: String,
        actual: String,
    },

    #[error("Invalid property '{key}': {reason}")]
    InvalidProperty { key: String, reason: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transaction {id} is {state}")]
    TransactionClosed { id: TxId, state: TxState },

    #[error("Concurrent modification: commit conflicted {attempts} time(s)")]
    ConcurrentModification { attempts: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    #[error(transparent)]
    Callback(#[from] CallbackError),

    #[error(transparent)]
    Core(cardinal_core::Error),
}

impl Error {
    /// Errors caused by the request itself rather than by state or storage
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::EndpointNotFound { .. }
                | Self::EndpointTypeMismatch { .. }
                | Self::InvalidProperty { .. }
                | Self::Validation(_)
        )
    }
}

impl From<cardinal_core::Error> for Error {
    fn from(err: cardinal_core::Error) -> Self {
        match err {
            cardinal_core::Error::UnknownType(name) => Self::UnknownType(name),
            cardinal_core::Error::InvalidProperty { key, reason } => {
                Self::InvalidProperty { key, reason }
            }
            cardinal_core::Error::Validation(e) => Self::Validation(e.to_string()),
            other => Self::Core(other),
        }
    }
}
