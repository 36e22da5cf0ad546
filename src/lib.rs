//! Storefront API
//!
//! E-commerce backend: catalog, carts and orders with atomic stock handling,
//! VNPay payments, role based access control, AI recommendations and
//! transactional email.
//!
//! ## Layout
//! - [`domain`]: entities and their lifecycle rules
//! - [`store`]: persistence (PostgreSQL or in-memory)
//! - [`services`]: workflows and outbound integrations
//! - [`routes`]: the HTTP surface
//! - [`auth`]: tokens, passwords and permission checks

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::AppConfig;
pub use error::{AppError, Result};
pub use state::AppState;

/// The full application with tracing and CORS applied.
pub fn app(state: AppState) -> Router {
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
