//! # Mock Backend
//!
//! Expectation-driven test double for [`Backend`]. It lets a test script what
//! each read returns, hold a read open until the test decides to answer it,
//! fail channel opens, and fire change notifications on demand.
//!
//! | Feature | MockBackend | MemoryBackend |
//! |---------|-------------|---------------|
//! | **Rows** | Scripted per call | Real store |
//! | **Latency** | Controlled (`return_pending`) | Immediate |
//! | **Error Injection** | Easy (`return_err`, `fail_next_open`) | None |
//! | **Use Case** | Collection lifecycle edge cases | End-to-end flows |
//!
//! ```rust
//! use tva_sync::backend::mock::MockBackend;
//! use tva_sync::backend::{Backend, Query};
//! use tva_sync::model::{TvaRecord, UserId};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mock = MockBackend::<TvaRecord>::new();
//!     mock.expect_select().return_ok(vec![]);
//!
//!     let rows = mock.select(Query::owned_by::<TvaRecord>(UserId::from("u-1"))).await;
//!     assert_eq!(rows, Ok(vec![]));
//!     mock.verify();
//! }
//! ```
//!
//! Calls with no matching expectation do not panic (they usually run inside a
//! spawned task where a panic would go unnoticed). They return
//! [`BackendError::Unexpected`] and make [`MockBackend::verify`] fail.

use super::{Backend, BackendError, ChangeEvent, ChangeFilter, ChangeKind, ChannelHandle, Query};
use crate::model::{SyncRecord, UserId};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

type SelectResult<T> = Result<Vec<T>, BackendError>;

enum SelectExpectation<T> {
    Ready(SelectResult<T>),
    Pending(oneshot::Receiver<SelectResult<T>>),
}

struct MockChannel {
    handle: ChannelHandle,
    filter: ChangeFilter,
    events: mpsc::UnboundedSender<ChangeEvent>,
}

struct MockState<T> {
    selects: VecDeque<SelectExpectation<T>>,
    open_failures: VecDeque<BackendError>,
    queries: Vec<Query>,
    channels: Vec<MockChannel>,
    next_channel: u64,
    opened: usize,
    closed: usize,
    unexpected: Vec<String>,
}

/// A scripted backend.
pub struct MockBackend<T: SyncRecord> {
    state: Arc<Mutex<MockState<T>>>,
}

impl<T: SyncRecord> Clone for MockBackend<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: SyncRecord> Default for MockBackend<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SyncRecord> MockBackend<T> {
    /// Creates a mock with no expectations. Channel opens succeed by default.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                selects: VecDeque::new(),
                open_failures: VecDeque::new(),
                queries: Vec::new(),
                channels: Vec::new(),
                next_channel: 1,
                opened: 0,
                closed: 0,
                unexpected: Vec::new(),
            })),
        }
    }

    /// Expects one more `select`. Expectations are consumed in order.
    pub fn expect_select(&self) -> SelectExpectationBuilder<T> {
        SelectExpectationBuilder {
            state: self.state.clone(),
        }
    }

    /// Makes the next `open_channel` fail with `error`.
    pub fn fail_next_open(&self, error: BackendError) {
        self.state.lock().unwrap().open_failures.push_back(error);
    }

    /// Fires an insert notification for `owner` on every matching open channel.
    /// Returns how many channels were notified.
    pub fn emit_insert(&self, owner: &UserId) -> usize {
        self.emit(ChangeEvent {
            table: T::TABLE,
            kind: ChangeKind::Insert,
            owner: owner.clone(),
        })
    }

    /// Fires `event` on every matching open channel.
    pub fn emit(&self, event: ChangeEvent) -> usize {
        let state = self.state.lock().unwrap();
        state
            .channels
            .iter()
            .filter(|c| c.filter.matches(&event))
            .filter(|c| c.events.send(event.clone()).is_ok())
            .count()
    }

    /// Drops the sending side of every open channel, as a server-side disconnect would.
    pub fn disconnect_channels(&self) {
        self.state.lock().unwrap().channels.clear();
    }

    pub fn select_count(&self) -> usize {
        self.state.lock().unwrap().queries.len()
    }

    /// Every query received so far, in order.
    pub fn queries(&self) -> Vec<Query> {
        self.state.lock().unwrap().queries.clone()
    }

    /// Channels opened and not yet closed.
    pub fn active_channels(&self) -> usize {
        self.state.lock().unwrap().channels.len()
    }

    /// Filters of the channels currently open.
    pub fn active_filters(&self) -> Vec<ChangeFilter> {
        let state = self.state.lock().unwrap();
        state.channels.iter().map(|c| c.filter.clone()).collect()
    }

    pub fn opened_total(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn closed_total(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    /// Panics if a scripted read was never consumed or an unscripted call happened.
    pub fn verify(&self) {
        let state = self.state.lock().unwrap();
        if !state.unexpected.is_empty() {
            panic!("Unexpected calls: {:?}", state.unexpected);
        }
        if !state.selects.is_empty() {
            panic!("Not all expectations were met. {} remaining", state.selects.len());
        }
    }
}

/// Builder for `select` expectations.
pub struct SelectExpectationBuilder<T: SyncRecord> {
    state: Arc<Mutex<MockState<T>>>,
}

impl<T: SyncRecord> SelectExpectationBuilder<T> {
    fn push(self, expectation: SelectExpectation<T>) {
        self.state.lock().unwrap().selects.push_back(expectation);
    }

    /// The read succeeds with `rows`.
    pub fn return_ok(self, rows: Vec<T>) {
        self.push(SelectExpectation::Ready(Ok(rows)));
    }

    /// The read fails with `error`.
    pub fn return_err(self, error: BackendError) {
        self.push(SelectExpectation::Ready(Err(error)));
    }

    /// The read stays in flight until the returned handle is resolved.
    /// Dropping the handle fails the read with [`BackendError::Dropped`].
    pub fn return_pending(self) -> PendingSelect<T> {
        let (sender, receiver) = oneshot::channel();
        self.push(SelectExpectation::Pending(receiver));
        PendingSelect { sender }
    }
}

/// An in-flight read held open by a test.
pub struct PendingSelect<T> {
    sender: oneshot::Sender<SelectResult<T>>,
}

impl<T> PendingSelect<T> {
    pub fn resolve_ok(self, rows: Vec<T>) {
        let _ = self.sender.send(Ok(rows));
    }

    pub fn resolve_err(self, error: BackendError) {
        let _ = self.sender.send(Err(error));
    }
}

#[async_trait]
impl<T: SyncRecord> Backend<T> for MockBackend<T> {
    async fn select(&self, query: Query) -> Result<Vec<T>, BackendError> {
        let expectation = {
            let mut state = self.state.lock().unwrap();
            state.queries.push(query);
            let next = state.selects.pop_front();
            if next.is_none() {
                state.unexpected.push("select".to_string());
            }
            next
        };

        match expectation {
            Some(SelectExpectation::Ready(result)) => result,
            Some(SelectExpectation::Pending(receiver)) => {
                receiver.await.unwrap_or(Err(BackendError::Dropped))
            }
            None => Err(BackendError::Unexpected("select".to_string())),
        }
    }

    async fn open_channel(
        &self,
        name: String,
        filter: ChangeFilter,
        events: mpsc::UnboundedSender<ChangeEvent>,
    ) -> Result<ChannelHandle, BackendError> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.open_failures.pop_front() {
            return Err(error);
        }
        let handle = ChannelHandle {
            id: state.next_channel,
            name,
        };
        state.next_channel += 1;
        state.opened += 1;
        state.channels.push(MockChannel {
            handle: handle.clone(),
            filter,
            events,
        });
        Ok(handle)
    }

    async fn close_channel(&self, handle: ChannelHandle) -> Result<(), BackendError> {
        let mut state = self.state.lock().unwrap();
        let before = state.channels.len();
        state.channels.retain(|c| c.handle != handle);
        if state.channels.len() < before {
            state.closed += 1;
        }
        Ok(())
    }
}
