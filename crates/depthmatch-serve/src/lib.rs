#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Registry configuration of the service.
pub mod config;

/// Mapping of model errors to HTTP responses.
pub mod error;

/// Route handlers.
pub mod routes;

/// Shared application state.
pub mod state;

pub use crate::error::ServeError;
pub use crate::routes::router;
pub use crate::state::AppState;
