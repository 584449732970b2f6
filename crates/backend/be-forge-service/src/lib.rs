//! CommandCore Forge Service
//!
//! REST surface for the idea → product → deploy → market pipeline, plus a
//! route that runs the whole pipeline in one go. Every payload is mocked;
//! records live in the [`RecordStore`]s held by [`ForgeState`].

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::debug;

mod catalog;
pub mod error;
pub mod handlers;
pub mod service;
pub mod store;
pub mod types;

pub use error::ForgeError;
pub use service::ForgeState;
pub use store::{MemoryStore, Record, RecordStore};

pub fn create_router(state: Arc<ForgeState>) -> Router {
    Router::new()
        // Ideas
        .route(
            "/api/ideas",
            get(handlers::list_ideas).post(handlers::create_idea),
        )
        .route("/api/ideas/generate", post(handlers::generate_ideas))
        .route(
            "/api/ideas/{id}",
            get(handlers::get_idea).delete(handlers::delete_idea),
        )
        .route("/api/ideas/{id}/validate", post(handlers::validate_idea))
        // Products
        .route(
            "/api/products",
            get(handlers::list_products).post(handlers::create_product),
        )
        .route("/api/products/{id}", get(handlers::get_product))
        // Market
        .route("/api/market/analysis", post(handlers::market_analysis))
        .route("/api/market/seo", post(handlers::seo_content))
        // Deploy
        .route("/api/deploy", post(handlers::create_deployment))
        .route("/api/deploy/{id}", get(handlers::get_deployment))
        // Feedback
        .route(
            "/api/feedback",
            get(handlers::list_feedback).post(handlers::submit_feedback),
        )
        // Product flow
        .route("/api/flow/run", post(handlers::run_product_flow))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the forge router over fresh in-memory stores.
pub fn init_forge_service() -> Router {
    debug!("Initializing forge service");
    create_router(Arc::new(ForgeState::in_memory()))
}
