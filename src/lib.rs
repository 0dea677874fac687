//! # TVA Sync
//!
//! > **Auth-gated, owner-scoped, push-refreshed record collections on Tokio.**
//!
//! This crate is the client-side data core of a VAT receipt tracker. It
//! answers two questions for the view layer:
//!
//! 1. *May this screen render?* The [`gate`] turns the shared auth state and
//!    the demo/live [`Mode`](config::Mode) into a render decision.
//! 2. *What are the user's records right now?* A [`collection`] keeps a local
//!    copy of the user's rows, newest first, and refetches whenever the
//!    backend announces an insert.
//!
//! ## 🏗️ Design Philosophy
//!
//! ### One writer per piece of state
//! Auth state is written by the [`AuthProvider`](auth::AuthProvider) only.
//! Collection state is written by its [`CollectionActor`](collection::CollectionActor)
//! only. Everyone else holds a read-only `watch` receiver and is woken on
//! every publish.
//!
//! ### Actor + client
//! Stateful parts run as Tokio tasks and are driven through cheap, cloneable
//! clients: [`SyncedCollection`](collection::SyncedCollection) for a
//! collection, [`MemoryBackend`](backend::memory::MemoryBackend) for the
//! in-process store. Requests carry a `oneshot` sender for the reply.
//!
//! ### Errors stop at the data layer
//! Backend failures are logged with `tracing` and published on the
//! collection's error-report channel. The items already shown stay put.
//!
//! ## 🗺️ Module Tour
//!
//! ### 1. Inputs ([`model`], [`config`], [`auth`])
//! - **Role**: Records, identities, the demo/live decision and the shared auth state.
//! - **Key items**: [`TvaRecord`](model::TvaRecord), [`SyncRecord`](model::SyncRecord),
//!   [`Config`](config::Config), [`AuthWatch`](auth::AuthWatch).
//!
//! ### 2. The Gate ([`gate`])
//! - **Role**: Pure three-way render decision.
//! - **Key items**: [`decide`](gate::decide), [`AccessGate`](gate::AccessGate).
//!
//! ### 3. The Backend ([`backend`])
//! - **Role**: The collaborator contract (owner-scoped reads, push channels)
//!   plus an in-process store and a scripted test double.
//! - **Key items**: [`Backend`](backend::Backend), [`backend::memory`], [`backend::mock`].
//!
//! ### 4. The Collection ([`collection`])
//! - **Role**: INIT → LOADING → READY state machine with stale-result
//!   protection and a single identity-scoped push channel.
//!
//! ### 5. The Orchestrator ([`lifecycle`])
//! - **Role**: Mounts collections, hands out gates, shuts down in order.
//! - **Key items**: [`DataLayer`](lifecycle::DataLayer), [`setup_tracing`](lifecycle::setup_tracing).
//!
//! ## 🚀 Quick Start
//!
//! ```bash
//! # Demo mode: two built-in receipts, no backend
//! RUST_LOG=info cargo run
//!
//! # Live mode against the in-process store
//! TVA_BACKEND_URL=memory:// TVA_BACKEND_KEY=dev RUST_LOG=info cargo run
//! ```

pub mod auth;
pub mod backend;
pub mod collection;
pub mod config;
pub mod gate;
pub mod lifecycle;
pub mod model;
