use crate::auth::AuthWatch;
use crate::backend::Backend;
use crate::collection::{self, SyncedCollection};
use crate::config::Mode;
use crate::gate::AccessGate;
use crate::model::SyncRecord;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info};

/// Runtime orchestrator for one table.
///
/// `DataLayer` is responsible for:
/// - **Wiring**: every gate and collection it hands out shares the same
///   [`Mode`], auth observer and backend.
/// - **Lifecycle**: it spawns one actor per mounted collection. The layer
///   keeps only the task, never a handle, so a collection whose handles are
///   all dropped stops and releases its push channel on its own.
/// - **Shutdown**: it signals every collection still running to stop, then
///   waits for all of them. Dropping the layer without calling
///   [`shutdown`](Self::shutdown) aborts the collections instead.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tva_sync::auth::AuthProvider;
/// use tva_sync::backend::memory;
/// use tva_sync::config::Mode;
/// use tva_sync::gate::GateDecision;
/// use tva_sync::lifecycle::DataLayer;
/// use tva_sync::model::TvaRecord;
///
/// #[tokio::main]
/// async fn main() -> Result<(), String> {
///     let auth = AuthProvider::resolved(None);
///     let (backend, _store) = memory::spawn::<TvaRecord>();
///     let mut layer = DataLayer::new(Mode::Demo, auth.watch(), Arc::new(backend));
///
///     assert_eq!(layer.gate().decision(), GateDecision::RenderChildren);
///     let records = layer.mount();
///     let state = records.settled().await.map_err(|e| e.to_string())?;
///     assert_eq!(state.items.len(), 2);
///
///     layer.shutdown().await
/// }
/// ```
pub struct DataLayer<T: SyncRecord, B: Backend<T>> {
    mode: Mode,
    auth: AuthWatch,
    backend: Arc<B>,
    stop: watch::Sender<bool>,
    tasks: JoinSet<()>,
    failure: Option<String>,
    _record: PhantomData<fn() -> T>,
}

impl<T: SyncRecord, B: Backend<T>> DataLayer<T, B> {
    pub fn new(mode: Mode, auth: AuthWatch, backend: Arc<B>) -> Self {
        info!(table = T::TABLE, %mode, "Data layer ready");
        let (stop, _) = watch::channel(false);
        Self {
            mode,
            auth,
            backend,
            stop,
            tasks: JoinSet::new(),
            failure: None,
            _record: PhantomData,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// A gate bound to the shared auth state.
    pub fn gate(&self) -> AccessGate {
        AccessGate::new(self.auth.clone(), self.mode)
    }

    /// Spawns a new collection and returns its handle.
    ///
    /// Each call is an independent mount with its own state and push channel.
    /// Dropping every clone of the returned handle unmounts it.
    pub fn mount(&mut self) -> SyncedCollection<T> {
        self.reap();
        let (actor, collection) =
            collection::new(self.backend.clone(), self.mode, self.auth.clone());
        self.tasks.spawn(actor.stop_on(self.stop.subscribe()).run());
        debug!(table = T::TABLE, running = self.tasks.len(), "Collection mounted");
        collection
    }

    /// Number of mounted collections still running.
    pub fn mounted(&mut self) -> usize {
        self.reap();
        self.tasks.len()
    }

    /// Stops every running collection and waits for all of them.
    ///
    /// Every collection is signalled before any task is awaited, so one
    /// failed task cannot leave another collection's channel open.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if every actor exited cleanly
    /// - `Err(String)` for the first actor task that panicked, including
    ///   ones that ended before shutdown
    pub async fn shutdown(mut self) -> Result<(), String> {
        info!(table = T::TABLE, running = self.tasks.len(), "Shutting down data layer...");

        self.stop.send_replace(true);
        while let Some(result) = self.tasks.join_next().await {
            self.record(result);
        }

        match self.failure {
            Some(failure) => Err(failure),
            None => {
                info!(table = T::TABLE, "Data layer shutdown complete.");
                Ok(())
            }
        }
    }

    /// Collects tasks that already finished.
    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            self.record(result);
        }
    }

    fn record(&mut self, result: Result<(), JoinError>) {
        if let Err(e) = result {
            error!("Collection task failed: {:?}", e);
            if self.failure.is_none() {
                self.failure = Some(format!("Collection task failed: {:?}", e));
            }
        }
    }
}
