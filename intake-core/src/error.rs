//! Error types for intake operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Duplicate application: {constraint}")]
    Duplicate { constraint: String },

    #[error("Connection failed: {reason}")]
    Connection { reason: String },

    #[error("Query failed: {reason}")]
    Query { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Submission validation errors. Raised before any transaction is opened.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required fields missing: {}", fields.join(", "))]
    RequiredFieldsMissing { fields: Vec<String> },

    #[error("Invalid payload: {reason}")]
    InvalidPayload { reason: String },
}

/// Mail dispatch errors. Logged by the caller, never surfaced to clients.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    #[error("No recipient address")]
    NoRecipient,

    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {reason}")]
    Build { reason: String },

    #[error("Transport failed: {reason}")]
    Transport { reason: String },
}

pub type StorageResult<T> = Result<T, StorageError>;
