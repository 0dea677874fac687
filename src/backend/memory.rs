//! # In-Process Store
//!
//! A single-table data store running as its own actor. It implements
//! [`Backend`] so a synced collection can run against it exactly as it would
//! against the remote store, and it adds the write side (`insert`, `delete`)
//! that the collection itself never uses.
//!
//! The store is split in two halves:
//!
//! - [`TableActor`] owns the rows and the open push channels and processes
//!   requests sequentially, so it needs no locks.
//! - [`MemoryBackend`] is the cheap, cloneable client that sends requests and
//!   awaits one-shot replies.
//!
//! Channels whose receiver has gone away are pruned on the next fan-out.

use super::{Backend, BackendError, ChangeEvent, ChangeFilter, ChangeKind, ChannelHandle, Order, Query};
use crate::model::{sort_newest_first, SyncRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Type alias for the one-shot response channel used by the store.
pub type Response<T> = oneshot::Sender<Result<T, BackendError>>;

/// Row and channel counts, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableStats {
    pub rows: usize,
    pub channels: usize,
}

/// Message sent to the [`TableActor`].
#[derive(Debug)]
pub enum TableRequest<T: SyncRecord> {
    Insert {
        params: T::Insert,
        respond_to: Response<T::Id>,
    },
    Delete {
        id: T::Id,
        respond_to: Response<()>,
    },
    Select {
        query: Query,
        respond_to: Response<Vec<T>>,
    },
    Open {
        name: String,
        filter: ChangeFilter,
        events: mpsc::UnboundedSender<ChangeEvent>,
        respond_to: Response<ChannelHandle>,
    },
    Close {
        handle: ChannelHandle,
        respond_to: Response<()>,
    },
    Stats {
        respond_to: Response<TableStats>,
    },
}

struct OpenChannel {
    handle: ChannelHandle,
    filter: ChangeFilter,
    events: mpsc::UnboundedSender<ChangeEvent>,
}

/// The server half of the in-process store.
///
/// Ids come from a sequential counter starting at 1. `created_at` is stamped
/// from the wall clock but never goes backwards and never repeats, so the
/// newest-first order is total.
pub struct TableActor<T: SyncRecord> {
    receiver: mpsc::Receiver<TableRequest<T>>,
    store: HashMap<T::Id, T>,
    channels: Vec<OpenChannel>,
    next_id: u64,
    next_channel: u64,
    last_stamp: Option<DateTime<Utc>>,
}

impl<T: SyncRecord> TableActor<T> {
    /// Creates the actor and its client.
    ///
    /// `buffer_size` is the request queue capacity; callers wait when it is full.
    pub fn new(buffer_size: usize) -> (Self, MemoryBackend<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            store: HashMap::new(),
            channels: Vec::new(),
            next_id: 1,
            next_channel: 1,
            last_stamp: None,
        };
        (actor, MemoryBackend { sender })
    }

    /// Runs the request loop until every client is dropped.
    pub async fn run(mut self) {
        let table = T::TABLE;
        info!(table, "Store started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                TableRequest::Insert { params, respond_to } => {
                    debug!(table, ?params, "Insert");
                    let id = T::Id::from(self.next_id);
                    self.next_id += 1;
                    let owner = T::insert_owner(&params).clone();
                    let row = T::from_insert(id.clone(), self.stamp(), params);
                    self.store.insert(id.clone(), row);
                    info!(table, %id, %owner, size = self.store.len(), "Inserted");
                    self.fan_out(ChangeEvent {
                        table,
                        kind: ChangeKind::Insert,
                        owner,
                    });
                    let _ = respond_to.send(Ok(id));
                }
                TableRequest::Delete { id, respond_to } => {
                    debug!(table, %id, "Delete");
                    match self.store.remove(&id) {
                        Some(row) => {
                            info!(table, %id, size = self.store.len(), "Deleted");
                            self.fan_out(ChangeEvent {
                                table,
                                kind: ChangeKind::Delete,
                                owner: row.owner_id().clone(),
                            });
                            let _ = respond_to.send(Ok(()));
                        }
                        None => {
                            warn!(table, %id, "Not found");
                            let _ = respond_to.send(Err(BackendError::NotFound(id.to_string())));
                        }
                    }
                }
                TableRequest::Select { query, respond_to } => {
                    let _ = respond_to.send(self.select(&query));
                }
                TableRequest::Open {
                    name,
                    filter,
                    events,
                    respond_to,
                } => {
                    if filter.table != table {
                        warn!(table, requested = filter.table, "Channel on unknown table");
                        let _ = respond_to.send(Err(BackendError::UnknownTable(filter.table.to_string())));
                        continue;
                    }
                    let handle = ChannelHandle {
                        id: self.next_channel,
                        name,
                    };
                    self.next_channel += 1;
                    info!(table, channel = %handle, owner = %filter.owner, "Channel opened");
                    self.channels.push(OpenChannel {
                        handle: handle.clone(),
                        filter,
                        events,
                    });
                    let _ = respond_to.send(Ok(handle));
                }
                TableRequest::Close { handle, respond_to } => {
                    let before = self.channels.len();
                    self.channels.retain(|c| c.handle != handle);
                    if self.channels.len() < before {
                        info!(table, channel = %handle, "Channel closed");
                    } else {
                        debug!(table, channel = %handle, "Close on unknown channel");
                    }
                    let _ = respond_to.send(Ok(()));
                }
                TableRequest::Stats { respond_to } => {
                    self.channels.retain(|c| !c.events.is_closed());
                    let _ = respond_to.send(Ok(TableStats {
                        rows: self.store.len(),
                        channels: self.channels.len(),
                    }));
                }
            }
        }

        info!(table, size = self.store.len(), "Store shutdown");
    }

    fn select(&self, query: &Query) -> Result<Vec<T>, BackendError> {
        if query.table != T::TABLE {
            warn!(table = T::TABLE, requested = query.table, "Select on unknown table");
            return Err(BackendError::UnknownTable(query.table.to_string()));
        }
        let mut rows: Vec<T> = self
            .store
            .values()
            .filter(|row| row.owner_id() == &query.owner)
            .cloned()
            .collect();
        sort_newest_first(&mut rows);
        if query.order == Order::CreatedAtAsc {
            rows.reverse();
        }
        debug!(table = T::TABLE, owner = %query.owner, rows = rows.len(), "Select");
        Ok(rows)
    }

    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_stamp {
            Some(last) if now <= last => last + chrono::Duration::microseconds(1),
            _ => now,
        };
        self.last_stamp = Some(stamp);
        stamp
    }

    fn fan_out(&mut self, event: ChangeEvent) {
        self.channels.retain(|c| {
            if !c.filter.matches(&event) {
                return !c.events.is_closed();
            }
            let delivered = c.events.send(event.clone()).is_ok();
            if !delivered {
                debug!(channel = %c.handle, "Pruned channel with dropped receiver");
            }
            delivered
        });
    }
}

/// Client half of the in-process store.
#[derive(Debug)]
pub struct MemoryBackend<T: SyncRecord> {
    sender: mpsc::Sender<TableRequest<T>>,
}

impl<T: SyncRecord> Clone for MemoryBackend<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Creates a store and spawns its actor on the current runtime.
pub fn spawn<T: SyncRecord>() -> (MemoryBackend<T>, JoinHandle<()>) {
    let (actor, client) = TableActor::new(64);
    let handle = tokio::spawn(actor.run());
    (client, handle)
}

impl<T: SyncRecord> MemoryBackend<T> {
    async fn call<R>(
        &self,
        request: impl FnOnce(Response<R>) -> TableRequest<T>,
    ) -> Result<R, BackendError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(request(respond_to))
            .await
            .map_err(|_| BackendError::Closed)?;
        response.await.map_err(|_| BackendError::Dropped)?
    }

    /// Inserts a row and notifies matching channels. Returns the assigned id.
    pub async fn insert(&self, params: T::Insert) -> Result<T::Id, BackendError> {
        self.call(|respond_to| TableRequest::Insert { params, respond_to })
            .await
    }

    pub async fn delete(&self, id: T::Id) -> Result<(), BackendError> {
        self.call(|respond_to| TableRequest::Delete { id, respond_to })
            .await
    }

    pub async fn stats(&self) -> Result<TableStats, BackendError> {
        self.call(|respond_to| TableRequest::Stats { respond_to }).await
    }
}

#[async_trait]
impl<T: SyncRecord> Backend<T> for MemoryBackend<T> {
    async fn select(&self, query: Query) -> Result<Vec<T>, BackendError> {
        self.call(|respond_to| TableRequest::Select { query, respond_to })
            .await
    }

    async fn open_channel(
        &self,
        name: String,
        filter: ChangeFilter,
        events: mpsc::UnboundedSender<ChangeEvent>,
    ) -> Result<ChannelHandle, BackendError> {
        self.call(|respond_to| TableRequest::Open {
            name,
            filter,
            events,
            respond_to,
        })
        .await
    }

    async fn close_channel(&self, handle: ChannelHandle) -> Result<(), BackendError> {
        self.call(|respond_to| TableRequest::Close { handle, respond_to })
            .await
    }
}
