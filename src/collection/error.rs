//! Error types for the synced collection.

use crate::backend::BackendError;
use thiserror::Error;

/// Failures a synced collection reports.
///
/// `FetchFailed` and `SubscriptionFailed` are never returned from handle
/// methods. They are logged and published on the collection's error-report
/// channel (see [`SyncedCollection::errors`](super::SyncedCollection::errors)).
/// An unresolved auth state is not an error at all: the collection simply
/// stays in its initial phase.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    /// A read failed. Previously loaded items were kept.
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// The push channel could not be opened, or the backend closed it.
    /// There is no automatic retry; `refetch` still works.
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    /// The collection has been detached and accepts no more requests.
    #[error("Collection detached")]
    Detached,
}

impl SyncError {
    pub fn fetch(error: BackendError) -> Self {
        SyncError::FetchFailed(error.to_string())
    }

    pub fn subscription(error: BackendError) -> Self {
        SyncError::SubscriptionFailed(error.to_string())
    }
}
