//! # Synced Collection
//!
//! Keeps a local, owner-scoped copy of one backend table and keeps it fresh
//! through push notifications.
//!
//! ## Lifecycle
//!
//! ```text
//! INIT ──load──▶ LOADING ──fetch settles──▶ READY
//!                   ▲                         │
//!                   └──── insert notified ────┘
//! (identity change or detach: back to INIT, channel released)
//! ```
//!
//! - In **demo** mode, loads are served from the record type's fixtures and
//!   the backend is never touched, whatever the auth state says.
//! - In **live** mode, a load needs a signed-in user. With one, the collection
//!   reads every row the user owns, newest first, and opens exactly one push
//!   channel for inserts on those rows. Every notification triggers a full
//!   reload.
//! - Failed reads are logged and published on [`SyncedCollection::errors`];
//!   the items already on screen stay where they are.
//!
//! ## Structure
//!
//! - [`CollectionActor`]: the server half, spawned as a Tokio task.
//! - [`SyncedCollection`]: cheap, cloneable handle used by views.
//! - [`Subscription`]: identity-scoped push channel.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use tva_sync::auth::AuthProvider;
//! use tva_sync::backend::mock::MockBackend;
//! use tva_sync::collection::CollectionActor;
//! use tva_sync::config::Mode;
//! use tva_sync::model::TvaRecord;
//!
//! #[tokio::main]
//! async fn main() {
//!     let auth = AuthProvider::resolved(None);
//!     let backend = Arc::new(MockBackend::<TvaRecord>::new());
//!     let (actor, collection) = CollectionActor::new(backend, Mode::Demo, auth.watch());
//!     tokio::spawn(actor.run());
//!
//!     let state = collection.settled().await.unwrap();
//!     assert_eq!(state.items.len(), 2);
//!     collection.detach().await.unwrap();
//! }
//! ```

pub mod actor;
pub mod error;
pub mod state;
pub mod subscription;

pub use actor::{CollectionActor, CollectionRequest};
pub use error::SyncError;
pub use state::{CollectionState, Phase};
pub use subscription::Subscription;

use crate::auth::AuthWatch;
use crate::backend::Backend;
use crate::config::Mode;
use crate::model::SyncRecord;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, instrument};

/// Creates a collection. The actor does nothing until spawned with
/// `tokio::spawn(actor.run())`.
pub fn new<T: SyncRecord, B: Backend<T>>(
    backend: Arc<B>,
    mode: Mode,
    auth: AuthWatch,
) -> (CollectionActor<T, B>, SyncedCollection<T>) {
    CollectionActor::new(backend, mode, auth)
}

/// Handle to a running collection.
///
/// Reads (`items`, `loading`, `snapshot`, `watch`) are served from the
/// latest published state without a round-trip. `load`, `refetch` and
/// `detach` go through the actor.
pub struct SyncedCollection<T: SyncRecord> {
    sender: mpsc::Sender<CollectionRequest>,
    state: watch::Receiver<CollectionState<T>>,
    errors: broadcast::Sender<SyncError>,
}

impl<T: SyncRecord> Clone for SyncedCollection<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            state: self.state.clone(),
            errors: self.errors.clone(),
        }
    }
}

impl<T: SyncRecord> SyncedCollection<T> {
    pub(crate) fn new(
        sender: mpsc::Sender<CollectionRequest>,
        state: watch::Receiver<CollectionState<T>>,
        errors: broadcast::Sender<SyncError>,
    ) -> Self {
        Self {
            sender,
            state,
            errors,
        }
    }

    /// Copy of the latest published state.
    pub fn snapshot(&self) -> CollectionState<T> {
        self.state.borrow().clone()
    }

    /// Rows, newest first.
    pub fn items(&self) -> Vec<T> {
        self.state.borrow().items.clone()
    }

    /// True while a load is in flight, and before the first one.
    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    /// True while the push channel is open.
    pub fn is_live(&self) -> bool {
        self.state.borrow().live
    }

    /// Reactive view of the state. Closed once the collection is detached.
    pub fn watch(&self) -> watch::Receiver<CollectionState<T>> {
        self.state.clone()
    }

    /// Error-report channel. Only reports sent after subscribing are received.
    pub fn errors(&self) -> broadcast::Receiver<SyncError> {
        self.errors.subscribe()
    }

    /// Issues a load and returns once it is in flight.
    ///
    /// Fetch failures are not returned here; see [`errors`](Self::errors).
    #[instrument(skip(self))]
    pub async fn load(&self) -> Result<(), SyncError> {
        debug!("Sending request");
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CollectionRequest::Load { respond_to })
            .await
            .map_err(|_| SyncError::Detached)?;
        response.await.map_err(|_| SyncError::Detached)
    }

    /// Manual invalidation. Same as [`load`](Self::load).
    pub async fn refetch(&self) -> Result<(), SyncError> {
        self.load().await
    }

    /// Waits until no load is in flight and returns that state.
    ///
    /// In live mode with nobody signed in this waits until someone signs in.
    pub async fn settled(&self) -> Result<CollectionState<T>, SyncError> {
        self.wait_until(|s| !s.loading).await
    }

    /// Waits until the published state satisfies `predicate`.
    pub async fn wait_until(
        &self,
        mut predicate: impl FnMut(&CollectionState<T>) -> bool,
    ) -> Result<CollectionState<T>, SyncError> {
        let mut state = self.state.clone();
        let current = state
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| SyncError::Detached)?;
        Ok(current.clone())
    }

    /// Stops the collection and releases its push channel.
    ///
    /// Returns after the channel is closed. Later fetch results and
    /// notifications are discarded. Other clones of this handle see
    /// [`SyncError::Detached`] from then on.
    #[instrument(skip(self))]
    pub async fn detach(self) -> Result<(), SyncError> {
        debug!("Sending request");
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(CollectionRequest::Detach { respond_to })
            .await
            .map_err(|_| SyncError::Detached)?;
        response.await.map_err(|_| SyncError::Detached)
    }
}
