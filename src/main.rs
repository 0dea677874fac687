//! Walkthrough binary.
//!
//! Without backend settings it runs in demo mode and prints the two built-in
//! receipts. With `TVA_BACKEND_URL` and `TVA_BACKEND_KEY` set it runs in live
//! mode against the in-process store: sign-in, a few inserts picked up through
//! the push channel, then a switch of user.

use std::sync::Arc;
use tva_sync::auth::AuthProvider;
use tva_sync::backend::memory::{self, MemoryBackend};
use tva_sync::collection::SyncedCollection;
use tva_sync::config::{Config, Mode};
use tva_sync::lifecycle::{setup_tracing, DataLayer};
use tva_sync::model::{TvaInsert, TvaRecord, User};
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> Result<(), String> {
    setup_tracing();

    let config = Config::from_env();
    let mode = config.mode();
    info!(?config, %mode, "Starting application");

    let auth = AuthProvider::new();
    let (backend, store) = memory::spawn::<TvaRecord>();
    let mut layer = DataLayer::new(mode, auth.watch(), Arc::new(backend.clone()));

    let mut gate = layer.gate();
    info!(decision = ?gate.decision(), "Gate before session lookup");
    auth.resolve(None);
    if let Some(decision) = gate.next_decision().await {
        info!(?decision, "Gate after session lookup");
    }

    let records = layer.mount();
    let mut errors = records.errors();

    match mode {
        Mode::Demo => {
            let state = records.settled().await.map_err(|e| e.to_string())?;
            print_items(&state.items)?;
        }
        Mode::Live => {
            let span = tracing::info_span!("live_session");
            live_session(&auth, &backend, &records)
                .instrument(span)
                .await?;
        }
    }

    while let Ok(e) = errors.try_recv() {
        error!(error = %e, "Reported during session");
    }

    layer.shutdown().await?;
    drop(backend);
    if let Err(e) = store.await {
        return Err(format!("Store task failed: {:?}", e));
    }

    info!("Application completed successfully");
    Ok(())
}

async fn live_session(
    auth: &AuthProvider,
    backend: &MemoryBackend<TvaRecord>,
    records: &SyncedCollection<TvaRecord>,
) -> Result<(), String> {
    auth.sign_in(User::new("alice").with_email("alice@example.com"));
    info!(user = ?auth.current().user_id(), "Session started");
    records
        .wait_until(|s| s.live && !s.loading)
        .await
        .map_err(|e| e.to_string())?;

    let receipts = [
        ("FAC101", "Carrefour", 36.00, 6.0),
        ("FAC102", "Fnac", 120.00, 20.0),
    ];
    for (invoice, vendor, total, vat_20) in receipts {
        let params = TvaInsert::new("alice")
            .invoice(invoice, vendor)
            .amounts(total, vat_20);
        let id = backend.insert(params).await.map_err(|e| e.to_string())?;
        info!(%id, invoice, "Receipt stored");
    }
    // Someone else's receipt never shows up in alice's view.
    backend
        .insert(TvaInsert::new("bob").invoice("BOB001", "Leclerc").amounts(10.0, 1.67))
        .await
        .map_err(|e| e.to_string())?;

    let state = records
        .wait_until(|s| s.items.len() == receipts.len() && !s.loading)
        .await
        .map_err(|e| e.to_string())?;
    print_items(&state.items)?;

    auth.sign_in(User::new("bob"));
    let state = records
        .wait_until(|s| s.live && !s.loading && s.items.len() == 1)
        .await
        .map_err(|e| e.to_string())?;
    info!(rows = state.items.len(), "Switched to bob");
    print_items(&state.items)?;

    let stats = backend.stats().await.map_err(|e| e.to_string())?;
    info!(rows = stats.rows, channels = stats.channels, "Store stats");
    Ok(())
}

fn print_items(items: &[TvaRecord]) -> Result<(), String> {
    let json = serde_json::to_string_pretty(items).map_err(|e| e.to_string())?;
    println!("{json}");
    Ok(())
}
