//! Runtime orchestration.
//!
//! - [`DataLayer`] mounts synced collections against one backend, hands out
//!   access gates and shuts everything down in order.
//! - [`setup_tracing`] installs the log subscriber used by the binary.

pub mod data_layer;
pub mod tracing;

pub use data_layer::*;
pub use tracing::*;
