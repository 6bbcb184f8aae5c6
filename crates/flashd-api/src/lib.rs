//! flashd-api - HTTP API for remote flashing
//!
//! Exposes the flash engine over HTTP: upload an ELF image, get the
//! programmer's progress back as a live NDJSON stream.
//!
//! # Usage
//!
//! ```ignore
//! use flashd_api::{create_router, AppState};
//! use flashd_core::{FlashEngine, StagingArea};
//!
//! let state = AppState::new(FlashEngine::default(), StagingArea::default());
//! let router = create_router(state);
//! ```

pub mod error;
pub mod handlers;
pub mod ndjson;
pub mod state;

pub use error::ApiError;
pub use ndjson::Record;
pub use state::AppState;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Create the flash API router with the given application state
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(|| async { "OK" }))
        // Upload and flash
        .route("/api/flash", post(handlers::flash::flash_image))
        // Middleware
        .layer(DefaultBodyLimit::max(state.max_upload_bytes()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
