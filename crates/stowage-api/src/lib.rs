//! Stowage HTTP API
//!
//! axum surface over the upload pipeline: multipart and base64 ingress,
//! post finalize, signed downloads, attachment deletion and quota stats.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use setup::routes::setup_routes;
pub use state::AppState;
