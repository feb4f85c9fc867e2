pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{Router, routing::get};

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/events", get(handlers::search_events))
        .route("/api/categories", get(handlers::list_categories))
        .route(
            "/api/refresh",
            get(handlers::refresh_usage).post(handlers::trigger_refresh),
        )
        .with_state(state)
}
