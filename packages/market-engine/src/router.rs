//! HTTP router setup.

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Router};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::middleware::{count_requests, inject_request_id};
use crate::state::AppState;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the application router.
pub fn create(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/listings",
            get(handlers::list_listings).post(handlers::create_listing),
        )
        .route(
            "/listings/{id}",
            get(handlers::get_listing).delete(handlers::cancel_listing),
        )
        .route("/listings/{id}/purchase", post(handlers::purchase))
        .route("/offers", post(handlers::create_offer))
        .route("/offers/{id}/accept", post(handlers::accept_offer))
        .route("/offers/{id}/reject", post(handlers::reject_offer))
        .route("/offers/{id}/cancel", post(handlers::cancel_offer))
        .route("/trades/{id}", get(handlers::get_trade))
        .route("/accounts/me", get(handlers::my_account))
        .layer(middleware::from_fn_with_state(state.clone(), count_requests))
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(inject_request_id))
                .layer(TraceLayer::new_for_http())
                .layer(timeout_layer(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

/// Requests that outlive `limit` are answered with 408.
fn timeout_layer(limit: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, limit)
}
