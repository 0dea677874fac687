//! # Observability
//!
//! [`setup_tracing`] installs a compact `tracing-subscriber` formatter filtered
//! by `RUST_LOG`. Module paths are hidden (`with_target(false)`); every event
//! in this crate carries a `table` field instead.
//!
//! ```bash
//! # Lifecycle only: attach, subscribe, fetch applied, detach
//! RUST_LOG=info cargo run
//!
//! # Per-request detail: fetch issued, stale results, change notifications
//! RUST_LOG=debug cargo run
//! ```
//!
//! With `RUST_LOG=info` a live session reads roughly like this:
//!
//! ```text
//! INFO Collection attached table="total_tva" mode=live
//! INFO Subscribed channel=total_tva_changes#1 owner=alice
//! INFO Fetch applied table="total_tva" owner=alice rows=0
//! INFO Inserted table="total_tva" id=1 owner=alice size=1
//! INFO Fetch applied table="total_tva" owner=alice rows=1
//! INFO Unsubscribed channel=total_tva_changes#1
//! INFO Collection detached table="total_tva" generation=0
//! ```
//!
//! Failures are logged once, at `error!`, where they happen:
//!
//! ```text
//! ERROR Error loading records table="total_tva" owner=alice error=Query failed: timeout
//! ```

/// Installs the global subscriber. Call once, at the top of `main`.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();
}
