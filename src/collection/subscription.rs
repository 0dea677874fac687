//! Push channel scoped to one identity.
//!
//! A [`Subscription`] holds at most one open channel. Opening while one is
//! already open is refused, so repeated mounts or identity changes can never
//! stack channels; the owner must `close` first. `close` is idempotent.
//!
//! Each open gets a fresh event receiver. Closing drops it, so notifications
//! that were queued for a previous identity are discarded with it.

use crate::backend::{channel_name, Backend, ChangeEvent, ChangeFilter, ChannelHandle};
use crate::collection::SyncError;
use crate::model::SyncRecord;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct Subscription<T: SyncRecord, B: Backend<T>> {
    backend: Arc<B>,
    channel: Option<(ChannelHandle, mpsc::UnboundedReceiver<ChangeEvent>)>,
    _record: PhantomData<fn() -> T>,
}

impl<T: SyncRecord, B: Backend<T>> Subscription<T, B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            channel: None,
            _record: PhantomData,
        }
    }

    pub fn is_open(&self) -> bool {
        self.channel.is_some()
    }

    pub fn handle(&self) -> Option<&ChannelHandle> {
        self.channel.as_ref().map(|(handle, _)| handle)
    }

    /// Opens the channel for `filter`. A no-op (with a warning) when already open.
    pub async fn open(&mut self, filter: ChangeFilter) -> Result<(), SyncError> {
        if let Some(handle) = self.handle() {
            warn!(channel = %handle, "Channel already open for this scope");
            return Ok(());
        }
        let (events, receiver) = mpsc::unbounded_channel();
        let owner = filter.owner.clone();
        let handle = self
            .backend
            .open_channel(channel_name::<T>(), filter, events)
            .await
            .map_err(SyncError::subscription)?;
        info!(channel = %handle, %owner, "Subscribed");
        self.channel = Some((handle, receiver));
        Ok(())
    }

    /// Releases the channel, if any. Backend errors are logged, not returned.
    pub async fn close(&mut self) {
        let Some((handle, receiver)) = self.channel.take() else {
            return;
        };
        drop(receiver);
        match self.backend.close_channel(handle.clone()).await {
            Ok(()) => info!(channel = %handle, "Unsubscribed"),
            Err(e) => warn!(channel = %handle, error = %e, "Unsubscribe failed"),
        }
    }

    /// Next notification. Never resolves while closed. Resolves to `None`
    /// when the backend drops its end of an open channel.
    pub async fn next_event(&mut self) -> Option<ChangeEvent> {
        match &mut self.channel {
            Some((_, receiver)) => receiver.recv().await,
            None => std::future::pending().await,
        }
    }
}
