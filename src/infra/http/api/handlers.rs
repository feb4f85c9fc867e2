use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use eventscout_api_types::{RefreshRequest, RefreshResponse};
use serde_json::json;
use tracing::{debug, warn};

use crate::application::error::ErrorReport;
use crate::application::refresh::{ManualRefreshError, WatchOutcome};
use crate::infra::http::middleware::SearchTrace;

use super::error::{ApiError, refresh_to_api, search_to_api};
use super::models::{EventsQuery, refresh_command};
use super::state::ApiState;

const TARGET: &str = "eventscout::http::api";

pub async fn search_events(
    State(state): State<ApiState>,
    Query(query): Query<EventsQuery>,
) -> Result<Response, ApiError> {
    let params = query.into_params(&state.limits)?;
    let page = state.search.search(params).await.map_err(search_to_api)?;
    let trace = SearchTrace::from_page(&page);
    let mut response = Json(page.response).into_response();
    response.extensions_mut().insert(trace);
    Ok(response)
}

pub async fn list_categories(State(state): State<ApiState>) -> Result<Response, ApiError> {
    let categories = state.search.categories().await.map_err(search_to_api)?;
    Ok(Json(categories).into_response())
}

pub async fn trigger_refresh(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    // A missing or unreadable body means "refresh everything with defaults".
    let request = if body.is_empty() {
        RefreshRequest::default()
    } else {
        serde_json::from_slice::<RefreshRequest>(&body).unwrap_or_else(|err| {
            debug!(target = TARGET, error = %err, "ignoring malformed refresh body");
            RefreshRequest::default()
        })
    };
    let command = refresh_command(request)?;

    let refresh = match state.search.refresh(command).await {
        Ok(refresh) => refresh,
        Err(ManualRefreshError::TriggerFailed { execution_id }) => {
            warn!(target = TARGET, execution_id, "manual refresh trigger failed");
            let mut response = (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(RefreshResponse::failed("Failed to trigger workflow")),
            )
                .into_response();
            ErrorReport::from_message(
                "infra::http::api::refresh",
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("workflow trigger failed for execution {execution_id}"),
            )
            .attach(&mut response);
            return Ok(response);
        }
        Err(err) => return Err(refresh_to_api(err)),
    };

    let execution_id = refresh.execution_id.to_string();
    let response = match refresh.completion {
        None => {
            let mut body =
                RefreshResponse::ok("Data refresh triggered successfully", execution_id);
            body.note = Some("Refresh is running in background".to_string());
            (StatusCode::OK, Json(body))
        }
        Some(WatchOutcome::Completed(_)) => (
            StatusCode::OK,
            Json(RefreshResponse::ok(
                "Data refresh completed successfully",
                execution_id,
            )),
        ),
        Some(outcome) => {
            let mut body = RefreshResponse::ok(
                "Workflow did not complete in time - check execution status manually",
                execution_id,
            );
            body.success = false;
            body.note = Some(format!("outcome: {}", outcome.label()));
            (StatusCode::ACCEPTED, Json(body))
        }
    };

    Ok(response.into_response())
}

pub async fn refresh_usage() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Data refresh endpoint",
        "usage": {
            "method": "POST",
            "body": {
                "cities": "Array<string> (optional) - cities to refresh, defaults to every city",
                "dateFrom": "string (optional) - start date as YYYY-MM-DD, defaults to today",
                "dateTo": "string (optional) - end date as YYYY-MM-DD, defaults to December 31",
                "wait": "boolean (optional) - wait for completion, defaults to false"
            },
            "examples": {
                "triggerImmediate": "POST /api/refresh",
                "triggerAndWait": "POST /api/refresh with {\"wait\": true}",
                "specificCities": "POST /api/refresh with {\"cities\": [\"Milano\", \"Bergamo\"]}"
            }
        }
    }))
}
