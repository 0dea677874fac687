use chrono::{TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep, timeout};
use tva_sync::auth::AuthProvider;
use tva_sync::backend::mock::MockBackend;
use tva_sync::backend::{BackendError, Order};
use tva_sync::collection::{self, CollectionState, Phase, SyncError, SyncedCollection};
use tva_sync::config::Mode;
use tva_sync::model::{RecordId, SyncRecord, TvaInsert, TvaRecord, User, UserId};

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(50);

fn row(id: u64, owner: &str, day: u32) -> TvaRecord {
    let at = Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap();
    TvaRecord::from_insert(RecordId(id), at, TvaInsert::new(owner))
}

fn ids(state: &CollectionState<TvaRecord>) -> Vec<u64> {
    state.items.iter().map(|r| r.id.0).collect()
}

/// Spawns a collection, subscribing to its error reports before the actor starts.
fn mount(
    mode: Mode,
    auth: &AuthProvider,
    mock: &MockBackend<TvaRecord>,
) -> (SyncedCollection<TvaRecord>, broadcast::Receiver<SyncError>) {
    let (actor, records) = collection::new(Arc::new(mock.clone()), mode, auth.watch());
    let errors = records.errors();
    tokio::spawn(actor.run());
    (records, errors)
}

async fn until(
    records: &SyncedCollection<TvaRecord>,
    predicate: impl FnMut(&CollectionState<TvaRecord>) -> bool,
) -> CollectionState<TvaRecord> {
    timeout(WAIT, records.wait_until(predicate))
        .await
        .expect("timed out waiting for collection state")
        .expect("collection detached")
}

async fn selects_issued(mock: &MockBackend<TvaRecord>, n: usize) {
    timeout(WAIT, async {
        while mock.select_count() < n {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("timed out waiting for selects");
}

async fn next_error(errors: &mut broadcast::Receiver<SyncError>) -> SyncError {
    timeout(WAIT, errors.recv())
        .await
        .expect("timed out waiting for error report")
        .expect("error channel closed")
}

fn signed_in(id: &str) -> AuthProvider {
    AuthProvider::resolved(Some(User::new(id)))
}

#[tokio::test]
async fn demo_mode_serves_fixtures_without_touching_backend() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    let (records, _errors) = mount(Mode::Demo, &auth, &mock);

    let state = until(&records, |s| !s.loading).await;
    assert_eq!(ids(&state), vec![1, 2]);
    assert_eq!(state.phase, Phase::Ready);
    assert!(!state.live);
    assert_eq!(
        state.items[0].invoice_number.as_deref(),
        Some("FAC001"),
        "2024-01-15 receipt comes first"
    );

    records.refetch().await.unwrap();
    assert_eq!(records.items().len(), 2);
    assert_eq!(mock.select_count(), 0);
    assert_eq!(mock.opened_total(), 0);
    mock.verify();
}

#[tokio::test]
async fn demo_mode_ignores_missing_user() {
    let auth = AuthProvider::resolved(None);
    let mock = MockBackend::new();
    let (records, _errors) = mount(Mode::Demo, &auth, &mock);

    let state = until(&records, |s| !s.loading).await;
    assert_eq!(state.items.len(), 2);
    assert_eq!(mock.select_count(), 0);
}

#[tokio::test]
async fn live_mode_without_user_does_nothing() {
    let auth = AuthProvider::resolved(None);
    let mock = MockBackend::new();
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    records.load().await.unwrap();
    let state = records.snapshot();
    assert_eq!(state, CollectionState::default());
    assert!(state.loading, "initial loading flag is left as is");
    assert_eq!(mock.select_count(), 0);
    assert_eq!(mock.opened_total(), 0);
}

#[tokio::test]
async fn live_load_reads_owned_rows_newest_first() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select()
        .return_ok(vec![row(1, "alice", 1), row(2, "alice", 20), row(3, "alice", 10)]);
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    let state = until(&records, |s| s.live && !s.loading).await;
    assert_eq!(ids(&state), vec![2, 3, 1]);
    assert_eq!(records.phase(), Phase::Ready);
    assert!(records.is_live());
    assert!(state.is_ready());

    let queries = mock.queries();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].table, "total_tva");
    assert_eq!(queries[0].owner, UserId::from("alice"));
    assert_eq!(queries[0].order, Order::CreatedAtDesc);

    let filters = mock.active_filters();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].owner, UserId::from("alice"));
    mock.verify();
}

#[tokio::test]
async fn empty_result_is_ready_not_init() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select().return_ok(vec![]);
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    let state = until(&records, |s| !s.loading).await;
    assert!(state.items.is_empty());
    assert_eq!(state.phase, Phase::Ready);
}

#[tokio::test]
async fn empty_refetch_clears_previous_items() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select().return_ok(vec![row(1, "alice", 1)]);
    mock.expect_select().return_ok(vec![]);
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    until(&records, |s| s.items.len() == 1 && !s.loading).await;
    records.refetch().await.unwrap();
    let state = until(&records, |s| !s.loading).await;
    assert!(state.items.is_empty());
    assert_eq!(state.phase, Phase::Ready);
}

#[tokio::test]
async fn foreign_and_duplicate_rows_are_dropped() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select().return_ok(vec![
        row(1, "alice", 1),
        row(2, "mallory", 2),
        row(1, "alice", 1),
    ]);
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    let state = until(&records, |s| !s.loading).await;
    assert_eq!(ids(&state), vec![1]);
}

#[tokio::test]
async fn failed_refetch_keeps_items_and_reports_once() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select().return_ok(vec![row(1, "alice", 1)]);
    mock.expect_select()
        .return_err(BackendError::Query("timeout".into()));
    let (records, mut errors) = mount(Mode::Live, &auth, &mock);

    until(&records, |s| s.items.len() == 1 && !s.loading).await;
    records.refetch().await.unwrap();
    let state = until(&records, |s| !s.loading).await;

    assert_eq!(ids(&state), vec![1]);
    assert_eq!(
        next_error(&mut errors).await,
        SyncError::FetchFailed("Query failed: timeout".into())
    );
    sleep(QUIET).await;
    assert!(errors.try_recv().is_err());
    mock.verify();
}

#[tokio::test]
async fn failed_first_load_still_settles() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select()
        .return_err(BackendError::Query("offline".into()));
    let (records, mut errors) = mount(Mode::Live, &auth, &mock);

    let state = until(&records, |s| !s.loading).await;
    assert!(state.items.is_empty());
    assert!(matches!(next_error(&mut errors).await, SyncError::FetchFailed(_)));
}

#[tokio::test]
async fn repeated_loads_do_not_duplicate_rows_or_channels() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    let rows = vec![row(1, "alice", 1), row(2, "alice", 2)];
    for _ in 0..3 {
        mock.expect_select().return_ok(rows.clone());
    }
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    records.load().await.unwrap();
    records.load().await.unwrap();
    let state = until(&records, |s| !s.loading).await;

    assert_eq!(ids(&state), vec![2, 1]);
    assert_eq!(mock.select_count(), 3);
    assert_eq!(mock.active_channels(), 1);
    mock.verify();
}

#[tokio::test]
async fn loading_stays_true_until_every_overlapping_fetch_settles() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    let first = mock.expect_select().return_pending();
    let second = mock.expect_select().return_pending();
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    records.refetch().await.unwrap();
    selects_issued(&mock, 2).await;

    first.resolve_ok(vec![row(1, "alice", 1)]);
    let state = until(&records, |s| s.items.len() == 1).await;
    assert!(state.loading);
    assert_eq!(state.phase, Phase::Loading);

    second.resolve_ok(vec![row(1, "alice", 1), row(2, "alice", 2)]);
    let state = until(&records, |s| !s.loading).await;
    assert_eq!(ids(&state), vec![2, 1]);
    assert_eq!(state.phase, Phase::Ready);
}

#[tokio::test]
async fn one_failed_read_among_overlapping_reads_does_not_clear_loading() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    let first = mock.expect_select().return_pending();
    let second = mock.expect_select().return_pending();
    let (records, mut errors) = mount(Mode::Live, &auth, &mock);

    records.refetch().await.unwrap();
    selects_issued(&mock, 2).await;

    first.resolve_err(BackendError::Query("timeout".into()));
    assert_eq!(
        next_error(&mut errors).await,
        SyncError::FetchFailed("Query failed: timeout".into())
    );
    assert!(records.loading());
    assert_eq!(records.phase(), Phase::Loading);

    second.resolve_ok(vec![row(1, "alice", 1)]);
    let state = until(&records, |s| !s.loading).await;
    assert_eq!(ids(&state), vec![1]);
    assert!(state.is_ready());
    sleep(QUIET).await;
    assert!(errors.try_recv().is_err());
}

#[tokio::test]
async fn last_completed_fetch_wins() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    let older = mock.expect_select().return_pending();
    let newer = mock.expect_select().return_pending();
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    records.refetch().await.unwrap();
    selects_issued(&mock, 2).await;

    newer.resolve_ok(vec![row(1, "alice", 1), row(2, "alice", 2)]);
    until(&records, |s| s.items.len() == 2).await;
    older.resolve_ok(vec![row(1, "alice", 1)]);

    let state = until(&records, |s| !s.loading).await;
    assert_eq!(ids(&state), vec![1]);
}

#[tokio::test]
async fn insert_notification_triggers_full_refetch() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select().return_ok(vec![]);
    mock.expect_select()
        .return_ok(vec![row(1, "alice", 1), row(2, "alice", 2)]);
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    until(&records, |s| s.live && !s.loading).await;
    assert_eq!(mock.emit_insert(&UserId::from("alice")), 1);
    assert_eq!(mock.emit_insert(&UserId::from("bob")), 0);

    let state = until(&records, |s| s.items.len() == 2 && !s.loading).await;
    assert_eq!(ids(&state), vec![2, 1]);
    assert_eq!(mock.select_count(), 2);
    mock.verify();
}

#[tokio::test]
async fn stale_result_after_identity_change_is_discarded() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    let alice_fetch = mock.expect_select().return_pending();
    mock.expect_select().return_ok(vec![row(7, "bob", 7)]);
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    selects_issued(&mock, 1).await;
    auth.sign_in(User::new("bob"));
    let state = until(&records, |s| ids(s) == vec![7] && !s.loading).await;
    assert_eq!(state.phase, Phase::Ready);

    alice_fetch.resolve_ok(vec![row(1, "alice", 1)]);
    sleep(QUIET).await;

    let state = records.snapshot();
    assert_eq!(ids(&state), vec![7]);
    assert!(!state.loading);
    assert_eq!(mock.queries()[1].owner, UserId::from("bob"));
}

#[tokio::test]
async fn identity_changes_keep_exactly_one_channel() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select().return_ok(vec![row(1, "alice", 1)]);
    mock.expect_select().return_ok(vec![row(2, "bob", 2)]);
    mock.expect_select().return_ok(vec![row(1, "alice", 1)]);
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    until(&records, |s| ids(s) == vec![1] && s.live).await;
    assert_eq!(mock.active_channels(), 1);

    auth.sign_in(User::new("bob"));
    until(&records, |s| ids(s) == vec![2] && s.live).await;
    assert_eq!(mock.active_channels(), 1);
    assert_eq!(mock.active_filters()[0].owner, UserId::from("bob"));

    auth.sign_out();
    let state = until(&records, |s| s.phase == Phase::Init && !s.live).await;
    assert!(state.items.is_empty());
    assert_eq!(mock.active_channels(), 0);

    auth.sign_in(User::new("alice"));
    until(&records, |s| ids(s) == vec![1] && s.live).await;
    assert_eq!(mock.active_channels(), 1);
    assert_eq!(mock.opened_total(), 3);
    assert_eq!(mock.closed_total(), 2);
    mock.verify();
}

#[tokio::test]
async fn token_refresh_is_not_an_identity_change() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select().return_ok(vec![row(1, "alice", 1)]);
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    until(&records, |s| s.live && !s.loading).await;
    let mut state = records.watch();
    state.borrow_and_update();

    auth.refresh_token();
    auth.resolve(Some(User::new("alice")));
    sleep(QUIET).await;

    assert!(!state.has_changed().unwrap());
    assert_eq!(mock.select_count(), 1);
    assert_eq!(mock.opened_total(), 1);
}

#[tokio::test]
async fn subscription_failure_is_reported_but_data_loads() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.fail_next_open(BackendError::Channel("refused".into()));
    mock.expect_select().return_ok(vec![row(1, "alice", 1)]);
    let (records, mut errors) = mount(Mode::Live, &auth, &mock);

    let state = until(&records, |s| !s.loading).await;
    assert_eq!(ids(&state), vec![1]);
    assert!(!state.live);
    assert_eq!(
        next_error(&mut errors).await,
        SyncError::SubscriptionFailed("Channel error: refused".into())
    );
}

#[tokio::test]
async fn channel_closed_by_backend_is_reported() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select().return_ok(vec![]);
    let (records, mut errors) = mount(Mode::Live, &auth, &mock);

    until(&records, |s| s.live).await;
    mock.disconnect_channels();

    until(&records, |s| !s.live).await;
    assert!(!records.is_live());
    assert_eq!(
        next_error(&mut errors).await,
        SyncError::SubscriptionFailed("channel closed by backend".into())
    );
}

#[tokio::test]
async fn detach_releases_channel_and_ignores_late_results() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    let pending = mock.expect_select().return_pending();
    let (records, _errors) = mount(Mode::Live, &auth, &mock);

    until(&records, |s| s.live).await;
    let other = records.clone();
    let state = records.watch();

    records.detach().await.unwrap();
    assert_eq!(mock.active_channels(), 0);
    assert_eq!(mock.closed_total(), 1);

    pending.resolve_ok(vec![row(1, "alice", 1)]);
    sleep(QUIET).await;
    assert!(state.borrow().items.is_empty());
    assert!(state.has_changed().is_err(), "state sender is gone");
    assert_eq!(mock.emit_insert(&UserId::from("alice")), 0);
    assert_eq!(other.load().await, Err(SyncError::Detached));
}

#[tokio::test]
async fn dropping_every_handle_releases_channel() {
    let auth = signed_in("alice");
    let mock = MockBackend::new();
    mock.expect_select().return_ok(vec![]);
    let (actor, records) = collection::new(Arc::new(mock.clone()), Mode::Live, auth.watch());
    let task = tokio::spawn(actor.run());

    until(&records, |s| s.live).await;
    drop(records);

    timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(mock.active_channels(), 0);
}
