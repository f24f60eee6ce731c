//! Read-only HTTP status surface.
//!
//! Exposes batch progress from a shared `ProgressStore` for polling, plus
//! the reports saved under the results directory.
//! Routes are nested under `/api/`. The router is composable:
//! `status_router()` returns a `Router` that can be mounted on any axum
//! server, and `server` runs it standalone for the CLI.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use router::status_router;
pub use server::{start_status_server, StatusServer};
pub use types::ApiContext;
