//! # api-adapters
//!
//! HTTP routing for the trading post. The handlers are thin: they parse the
//! request, call one service operation and map the outcome to JSON.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use prometheus_client::registry::Registry;
use services::{Aggregator, ListingService};

/// State shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub listings: Arc<ListingService>,
    pub registry: Arc<Registry>,
}

/// Builds the full router, mounted under `/api/v1`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/listings",
            get(handlers::list_listings).post(handlers::create_listing),
        )
        .route(
            "/listings/{id}",
            get(handlers::get_listing).delete(handlers::delete_listing),
        )
        .route("/listings/{id}/close", post(handlers::close_listing))
        .route(
            "/listings/{id}/replies",
            get(handlers::list_replies).post(handlers::post_reply),
        )
        .route("/listings/{id}/repliers", get(handlers::list_repliers))
        .route(
            "/listings/{id}/reports",
            get(handlers::user_reports_for).post(handlers::report_listing),
        )
        .route("/listings/{id}/ratings", post(handlers::rate_fulfillment))
        .route("/users/{id}/listings", get(handlers::user_listings))
        .route("/users/{id}/listings/count", get(handlers::user_listing_count));

    Router::new()
        .nest("/api/v1", api)
        .route("/metrics", get(handlers::metrics))
        .route("/healthz", get(handlers::healthz))
        .layer(middleware::cors_policy())
        .layer(middleware::trace_layer())
        .with_state(state)
}
