//! # Collection Actor
//!
//! The server half of a synced collection. It owns the collection state, the
//! push channel and the bookkeeping for in-flight reads, and it is the only
//! writer of the state it publishes.
//!
//! One loop multiplexes these inputs:
//!
//! - requests from [`SyncedCollection`](super::SyncedCollection) handles;
//! - auth publishes from the shared [`AuthWatch`];
//! - completions of reads spawned by `load`;
//! - notifications from the push channel;
//! - an optional stop signal from an orchestrator (see [`CollectionActor::stop_on`]).
//!
//! The stop signal is a `watch` receiver, not a request sender, so whoever
//! holds it never keeps the actor alive once every handle is dropped.
//!
//! Reads run in their own tasks so the loop stays responsive and several may
//! overlap. Each read carries the generation that was current when it was
//! issued. Identity changes bump the generation, and completions from an
//! older generation are dropped. Among current-generation completions, the
//! last one to arrive wins.

use super::{CollectionState, Phase, Subscription, SyncError, SyncedCollection};
use crate::auth::AuthWatch;
use crate::backend::{Backend, BackendError, ChangeEvent, ChangeFilter, ChangeKind, Query};
use crate::config::Mode;
use crate::model::{sort_newest_first, AuthState, SyncRecord, UserId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Capacity of the error-report channel. Slow readers lose the oldest reports.
const ERROR_REPORT_CAPACITY: usize = 16;

/// Message sent from a handle to the actor.
#[derive(Debug)]
pub enum CollectionRequest {
    /// Issue a load. Acknowledged once issued, not once completed.
    Load { respond_to: oneshot::Sender<()> },
    /// Stop the actor. Acknowledged after the push channel is released.
    Detach { respond_to: oneshot::Sender<()> },
}

#[derive(Debug)]
struct FetchCompleted<T> {
    generation: u64,
    owner: UserId,
    result: Result<Vec<T>, BackendError>,
}

/// The server half of a synced collection.
pub struct CollectionActor<T: SyncRecord, B: Backend<T>> {
    receiver: mpsc::Receiver<CollectionRequest>,
    backend: Arc<B>,
    mode: Mode,
    auth: AuthWatch,
    state: watch::Sender<CollectionState<T>>,
    errors: broadcast::Sender<SyncError>,
    subscription: Subscription<T, B>,
    owner: Option<UserId>,
    generation: u64,
    in_flight: usize,
    completions_tx: mpsc::UnboundedSender<FetchCompleted<T>>,
    completions: mpsc::UnboundedReceiver<FetchCompleted<T>>,
    stop: Option<watch::Receiver<bool>>,
}

impl<T: SyncRecord, B: Backend<T>> CollectionActor<T, B> {
    /// Creates the actor and its first handle.
    ///
    /// Nothing happens until the actor is spawned with [`run`](Self::run).
    pub fn new(backend: Arc<B>, mode: Mode, auth: AuthWatch) -> (Self, SyncedCollection<T>) {
        let (sender, receiver) = mpsc::channel(32);
        let (state, state_rx) = watch::channel(CollectionState::default());
        let (errors, _) = broadcast::channel(ERROR_REPORT_CAPACITY);
        let (completions_tx, completions) = mpsc::unbounded_channel();

        let handle = SyncedCollection::new(sender, state_rx, errors.clone());
        let actor = Self {
            receiver,
            subscription: Subscription::new(backend.clone()),
            backend,
            mode,
            auth,
            state,
            errors,
            owner: None,
            generation: 0,
            in_flight: 0,
            completions_tx,
            completions,
            stop: None,
        };
        (actor, handle)
    }

    /// Also stops the actor once `signal` turns true.
    ///
    /// If the signal's sender is dropped without sending, the actor keeps
    /// running until it is detached or every handle is dropped.
    pub fn stop_on(mut self, signal: watch::Receiver<bool>) -> Self {
        self.stop = Some(signal);
        self
    }

    /// Runs the actor until it is detached or every handle is dropped.
    ///
    /// On exit the push channel is released and the state sender is dropped,
    /// so results that resolve later have nowhere to go.
    pub async fn run(mut self) {
        let table = T::TABLE;
        info!(table, mode = %self.mode, "Collection attached");

        let initial = self.auth.mark_seen();
        self.owner = initial.user_id().cloned();
        self.activate().await;

        let mut auth_open = true;
        let mut detached = None;
        loop {
            tokio::select! {
                msg = self.receiver.recv() => match msg {
                    Some(CollectionRequest::Load { respond_to }) => {
                        self.load();
                        let _ = respond_to.send(());
                    }
                    Some(CollectionRequest::Detach { respond_to }) => {
                        detached = Some(respond_to);
                        break;
                    }
                    None => break,
                },
                changed = self.auth.changed(), if auth_open => match changed {
                    Some(state) => self.on_auth_changed(state).await,
                    None => {
                        debug!(table, "Auth provider gone, identity frozen");
                        auth_open = false;
                    }
                },
                Some(done) = self.completions.recv() => self.commit(done),
                event = self.subscription.next_event() => match event {
                    Some(event) => self.on_change(event),
                    None => self.on_channel_lost().await,
                },
                () = stop_requested(&mut self.stop) => {
                    info!(table, "Stop requested");
                    break;
                }
            }
        }

        self.subscription.close().await;
        info!(table, generation = self.generation, "Collection detached");
        if let Some(ack) = detached {
            let _ = ack.send(());
        }
    }

    /// Loads for the current scope and, in live mode with a user, opens the push channel.
    async fn activate(&mut self) {
        self.load();
        if self.mode.is_demo() {
            return;
        }
        let Some(owner) = self.owner.clone() else {
            return;
        };
        match self
            .subscription
            .open(ChangeFilter::inserts_for::<T>(owner))
            .await
        {
            Ok(()) => self.state.send_modify(|s| s.live = true),
            Err(e) => {
                error!(table = T::TABLE, error = %e, "Subscription failed");
                self.report(e);
            }
        }
    }

    /// Issues a load for the current scope.
    ///
    /// - Demo mode: fixtures are published immediately. No backend call.
    /// - Live mode without a user: nothing happens and `loading` is left as is.
    /// - Live mode with a user: one owner-scoped read is spawned.
    fn load(&mut self) {
        let table = T::TABLE;
        if self.mode.is_demo() {
            let mut items = T::demo_fixtures();
            sort_newest_first(&mut items);
            debug!(table, rows = items.len(), "Serving demo fixtures");
            self.state.send_modify(|s| {
                s.items = items;
                s.loading = false;
                s.phase = Phase::Ready;
            });
            return;
        }

        let Some(owner) = self.owner.clone() else {
            debug!(table, "Load skipped, nobody signed in");
            return;
        };

        self.in_flight += 1;
        self.state.send_modify(|s| {
            s.loading = true;
            s.phase = Phase::Loading;
        });

        let generation = self.generation;
        let backend = self.backend.clone();
        let completions = self.completions_tx.clone();
        debug!(table, %owner, generation, in_flight = self.in_flight, "Fetch issued");
        tokio::spawn(async move {
            let result = backend.select(Query::owned_by::<T>(owner.clone())).await;
            let _ = completions.send(FetchCompleted {
                generation,
                owner,
                result,
            });
        });
    }

    fn commit(&mut self, done: FetchCompleted<T>) {
        let table = T::TABLE;
        if done.generation != self.generation {
            debug!(
                table,
                stale = done.generation,
                current = self.generation,
                "Discarded result from previous identity"
            );
            return;
        }

        self.in_flight = self.in_flight.saturating_sub(1);
        let loading = self.in_flight > 0;
        let phase = if loading { Phase::Loading } else { Phase::Ready };

        match done.result {
            Ok(rows) => {
                let items = scrub(&done.owner, rows);
                info!(table, owner = %done.owner, rows = items.len(), "Fetch applied");
                self.state.send_modify(|s| {
                    s.items = items;
                    s.loading = loading;
                    s.phase = phase;
                });
            }
            Err(e) => {
                error!(table, owner = %done.owner, error = %e, "Error loading records");
                self.report(SyncError::fetch(e));
                self.state.send_modify(|s| {
                    s.loading = loading;
                    s.phase = phase;
                });
            }
        }
    }

    async fn on_auth_changed(&mut self, state: AuthState) {
        let next = state.user_id().cloned();
        if next == self.owner {
            debug!(table = T::TABLE, "Auth update without identity change");
            return;
        }

        info!(table = T::TABLE, from = ?self.owner, to = ?next, "Identity changed, resetting");
        self.subscription.close().await;
        self.generation += 1;
        self.in_flight = 0;
        self.owner = next;
        self.state.send_replace(CollectionState::default());
        self.activate().await;
    }

    fn on_change(&mut self, event: ChangeEvent) {
        debug!(table = T::TABLE, kind = ?event.kind, owner = %event.owner, "Change notified");
        if event.kind == ChangeKind::Insert {
            self.load();
        }
    }

    async fn on_channel_lost(&mut self) {
        let channel = self.subscription.handle().map(ToString::to_string);
        error!(table = T::TABLE, ?channel, "Push channel closed by backend");
        self.subscription.close().await;
        self.state.send_modify(|s| s.live = false);
        self.report(SyncError::SubscriptionFailed(
            "channel closed by backend".to_string(),
        ));
    }

    fn report(&self, error: SyncError) {
        // No receivers is fine: the error has already been logged.
        let _ = self.errors.send(error);
    }
}

/// Resolves once the stop signal turns true. Never resolves without a signal,
/// or after its sender is gone.
async fn stop_requested(stop: &mut Option<watch::Receiver<bool>>) {
    if let Some(signal) = stop {
        let requested = signal.wait_for(|stop| *stop).await.map(|_| ());
        if requested.is_ok() {
            return;
        }
    }
    std::future::pending().await
}

/// Keeps only rows owned by `owner`, first occurrence per id, newest first.
fn scrub<T: SyncRecord>(owner: &UserId, rows: Vec<T>) -> Vec<T> {
    let received = rows.len();
    let mut seen = HashSet::new();
    let mut items: Vec<T> = rows
        .into_iter()
        .filter(|row| row.owner_id() == owner)
        .filter(|row| seen.insert(row.id().clone()))
        .collect();
    if items.len() < received {
        warn!(
            table = T::TABLE,
            %owner,
            dropped = received - items.len(),
            "Dropped rows with foreign owner or duplicate id"
        );
    }
    sort_newest_first(&mut items);
    items
}
