//! # Backend Collaborator
//!
//! The data store this crate reads from is external. This module pins down
//! the narrow interface the synced collection needs from it:
//!
//! - one **query**: rows of one table, equality-filtered on the owner and
//!   ordered by `created_at`;
//! - a **push channel**: change notifications on one table, filtered on the
//!   owner, delivered into a channel the caller provides.
//!
//! Notifications only say *that* something changed. Callers reconcile by
//! querying again.
//!
//! ## Implementations
//!
//! - [`memory::MemoryBackend`]: an in-process store running as its own task.
//! - [`mock::MockBackend`]: expectation-driven test double with failure and
//!   latency injection.

pub mod error;
pub mod memory;
pub mod mock;

pub use error::BackendError;

use crate::model::{SyncRecord, UserId};
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Sort direction on `created_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    CreatedAtDesc,
    CreatedAtAsc,
}

/// An owner-scoped read of one table. No limit: the whole scope is returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub table: &'static str,
    pub owner: UserId,
    pub order: Order,
}

impl Query {
    /// All rows of `T` owned by `owner`, newest first.
    pub fn owned_by<T: SyncRecord>(owner: UserId) -> Self {
        Self {
            table: T::TABLE,
            owner,
            order: Order::CreatedAtDesc,
        }
    }
}

/// Kind of row change a push channel reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Delete,
}

/// Server-side filter of a push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub table: &'static str,
    pub kind: ChangeKind,
    pub owner: UserId,
}

impl ChangeFilter {
    /// Inserts into `T`'s table for rows owned by `owner`.
    pub fn inserts_for<T: SyncRecord>(owner: UserId) -> Self {
        Self {
            table: T::TABLE,
            kind: ChangeKind::Insert,
            owner,
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.table == event.table && self.kind == event.kind && self.owner == event.owner
    }
}

/// A change notification. Carries no row data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub table: &'static str,
    pub kind: ChangeKind,
    pub owner: UserId,
}

/// Handle to an open push channel, used to close it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub id: u64,
    pub name: String,
}

impl fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.id)
    }
}

/// Name of the push channel watching `T`'s table.
pub fn channel_name<T: SyncRecord>() -> String {
    format!("{}_changes", T::TABLE)
}

/// Read and push-subscription interface of the backend data store.
///
/// # Contract
/// - `select` returns every row matching the query, ordered as requested.
/// - `open_channel` starts delivering matching [`ChangeEvent`]s into `events`
///   until the channel is closed or `events`' receiver is dropped.
/// - `close_channel` is idempotent: closing an unknown or already closed
///   handle succeeds.
#[async_trait]
pub trait Backend<T: SyncRecord>: Send + Sync + 'static {
    async fn select(&self, query: Query) -> Result<Vec<T>, BackendError>;

    async fn open_channel(
        &self,
        name: String,
        filter: ChangeFilter,
        events: mpsc::UnboundedSender<ChangeEvent>,
    ) -> Result<ChannelHandle, BackendError>;

    async fn close_channel(&self, handle: ChannelHandle) -> Result<(), BackendError>;
}
