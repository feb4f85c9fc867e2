pub mod api;
mod middleware;

pub use api::ApiState;
pub use middleware::{REQUEST_ID_HEADER, RequestContext, SearchTrace};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware as axum_middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::get;

use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;

use middleware::{log_responses, set_request_context};

/// The full HTTP surface: catalog API plus liveness and database checks.
pub fn build_router(state: ApiState) -> Router {
    let health = Router::new()
        .route("/health/live", get(live_health))
        .route("/health/db", get(db_health))
        .with_state(state.clone());

    api::build_api_router(state)
        .merge(health)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn live_health() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn db_health(State(state): State<ApiState>) -> Response {
    db_health_response(state.health.ping().await)
}

fn db_health_response(result: Result<(), RepoError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}
