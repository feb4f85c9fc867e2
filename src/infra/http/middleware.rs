use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::application::search::SearchPage;

const TARGET: &str = "eventscout::http::response";

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// How a catalog page was produced, attached to `/api/events` responses.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchTrace {
    pub query_hash: String,
    pub action: &'static str,
    pub cache_hit: bool,
    pub refreshed: bool,
    pub total: u64,
}

impl SearchTrace {
    pub fn from_page(page: &SearchPage) -> Self {
        Self {
            query_hash: page.signature.to_string(),
            action: page
                .action
                .as_ref()
                .map_or("result_cache", |action| action.label()),
            cache_hit: page.response.cache.hit,
            refreshed: page.response.cache.refreshed,
            total: page.response.total,
        }
    }
}

/// Tag every request with an id, echoed back in `x-request-id`.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext {
        request_id: Uuid::new_v4().to_string(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();

    if let Some(trace) = response.extensions_mut().remove::<SearchTrace>() {
        info!(
            target = TARGET,
            status = status.as_u16(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            query_hash = %trace.query_hash,
            action = trace.action,
            cache_hit = trace.cache_hit,
            refreshed = trace.refreshed,
            total = trace.total,
            request_id = %request_id,
            "search served",
        );
    }

    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (source, messages) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .cloned()
        .unwrap_or_else(|| "no diagnostic available".to_string());

    if status.is_server_error() {
        error!(
            target = TARGET,
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            source,
            detail = %detail,
            chain = ?messages,
            request_id = %request_id,
            "request failed",
        );
    } else {
        warn!(
            target = TARGET,
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms,
            source,
            detail = %detail,
            request_id = %request_id,
            "client request error",
        );
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::{Router, middleware, response::IntoResponse, routing::get};
    use eventscout_api_types::{CacheMeta, SearchResponse};
    use tower::ServiceExt;

    use crate::application::refresh::RefreshAction;
    use crate::domain::signature::ScrapeQuery;

    fn page(action: Option<RefreshAction>) -> SearchPage {
        SearchPage {
            response: SearchResponse {
                events: Vec::new(),
                total: 7,
                limit: 50,
                offset: 0,
                cache: CacheMeta {
                    hit: false,
                    age_hours: Some(5.0),
                    refreshed: false,
                },
            },
            signature: ScrapeQuery::default().signature(),
            action,
        }
    }

    #[test]
    fn trace_names_the_refresh_action() {
        let triggered = SearchTrace::from_page(&page(Some(RefreshAction::AsyncTriggered)));
        let cached = SearchTrace::from_page(&page(None));

        assert_eq!(triggered.action, "async_triggered");
        assert_eq!(triggered.total, 7);
        assert_eq!(triggered.query_hash.len(), 64);
        assert_eq!(cached.action, "result_cache");
    }

    #[tokio::test]
    async fn search_trace_is_consumed_by_response_logging() {
        async fn traced() -> Response {
            let mut response = "ok".into_response();
            response
                .extensions_mut()
                .insert(SearchTrace::from_page(&page(Some(RefreshAction::None))));
            response
        }

        let router = Router::new()
            .route("/traced", get(traced))
            .layer(middleware::from_fn(log_responses))
            .layer(middleware::from_fn(set_request_context));

        let response = router
            .oneshot(
                Request::builder()
                    .uri("/traced")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert!(response.extensions().get::<SearchTrace>().is_none());
        assert!(response.extensions().get::<RequestContext>().is_some());
        assert!(response.headers().contains_key(REQUEST_ID_HEADER));
    }
}
