//! Error types and result types for document store operations.
//!
//! This module provides the error taxonomy shared by stores, followers and caches.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur when interacting with a document store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentStoreError {
    /// The instance has not finished hatching yet, or it is shutting down and can
    /// no longer accept work.
    #[error("Instance is not ready yet")]
    NotReady,
    /// The instance has been closed. Closing is terminal.
    #[error("Instance is closed")]
    Closed,
    /// A malformed query, or a document that failed validation.
    #[error("Validation error: {0}")]
    Validation(String),
    /// Key material or a signature could not be decoded.
    #[error("Crypto error: {0}")]
    Crypto(String),
    /// Serialization error while building canonical query keys or signing payloads.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Error during setup, such as building a cache outside an async runtime.
    #[error("Initialization error: {0}")]
    Initialization(String),
}

impl DocumentStoreError {
    /// Shorthand for building a [`DocumentStoreError::Validation`].
    pub fn validation(msg: impl Into<String>) -> Self {
        DocumentStoreError::Validation(msg.into())
    }
}

/// A specialized `Result` type for document store operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}
