//! Reactive collection state published to consumers.

/// Lifecycle phase of a synced collection.
///
/// `Init` means nothing has been loaded for the current identity yet, which
/// is distinct from a completed load that returned no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Loading,
    Ready,
}

/// Snapshot of a synced collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionState<T> {
    /// Rows, newest first.
    pub items: Vec<T>,
    /// True while at least one load is in flight, and before the first load.
    pub loading: bool,
    pub phase: Phase,
    /// True while the push channel is open.
    pub live: bool,
}

impl<T> Default for CollectionState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loading: true,
            phase: Phase::Init,
            live: false,
        }
    }
}

impl<T> CollectionState<T> {
    pub fn is_ready(&self) -> bool {
        self.phase == Phase::Ready
    }
}
