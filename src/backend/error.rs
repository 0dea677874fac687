//! # Backend Errors
//!
//! Failures reported by a [`Backend`](super::Backend) implementation. The
//! synced collection never lets these reach the view layer; it logs them and
//! republishes them as [`SyncError`](crate::collection::SyncError).

use thiserror::Error;

/// Errors that can occur while talking to the backend data store.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    /// The store task has shut down.
    #[error("Backend closed")]
    Closed,

    /// The store dropped the response channel before answering.
    #[error("Backend dropped response channel")]
    Dropped,

    /// The addressed row does not exist.
    #[error("Row not found: {0}")]
    NotFound(String),

    /// A read was rejected.
    #[error("Query failed: {0}")]
    Query(String),

    /// A push channel could not be opened or closed.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The request named a table this backend does not serve.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// A test double received a call nobody expected.
    #[error("Unexpected call: {0}")]
    Unexpected(String),
}
