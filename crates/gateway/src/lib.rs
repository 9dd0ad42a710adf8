//! `sa-gateway`: the HTTP surface, background drivers, and wiring that turn
//! the core crates (`sa-queue`, `sa-streambus`, `sa-callbacks`, `sa-providers`,
//! `sa-sessions`) into one running control plane.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod error;
pub mod runtime;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;
