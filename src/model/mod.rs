//! Pure data structures shared by the gate, the backend and the synced collection.
//!
//! - [`user`]: identities and the externally owned [`AuthState`].
//! - [`record`]: the [`SyncRecord`] contract and the [`TvaRecord`] row type.

pub mod record;
pub mod user;

pub use record::*;
pub use user::*;
