//! HTTP client for the external ingestion workflow webhook.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::application::workflow::WorkflowTrigger;
use crate::config::WorkflowSettings;
use crate::domain::signature::{ScrapeQuery, format_date};
use crate::infra::error::InfraError;

const TARGET: &str = "eventscout::workflow";

#[derive(Debug, Error)]
enum WorkflowError {
    #[error("workflow webhook url is not configured")]
    NotConfigured,
    #[error("workflow request timed out")]
    Timeout,
    #[error("workflow request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("workflow responded with status {status}")]
    Status { status: StatusCode, body: String },
}

impl From<reqwest::Error> for WorkflowError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WorkflowError::Timeout
        } else {
            WorkflowError::Transport(err)
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriggerQuery<'a> {
    cities: &'a [String],
    radius_km: Option<f64>,
    center_lat: Option<f64>,
    center_lng: Option<f64>,
    date_from: Option<String>,
    date_to: Option<String>,
    #[serde(rename = "query_hash")]
    query_hash: String,
}

#[derive(Debug, Serialize)]
struct TriggerPayload<'a> {
    query: TriggerQuery<'a>,
    /// Sent as a string; the workflow echoes it back when updating the record.
    execution_id: String,
}

impl<'a> TriggerPayload<'a> {
    fn new(query: &'a ScrapeQuery, execution_id: i64) -> Self {
        Self {
            query: TriggerQuery {
                cities: &query.cities,
                radius_km: query.radius_km,
                center_lat: query.center_lat,
                center_lng: query.center_lng,
                date_from: query.date_from.map(format_date),
                date_to: query.date_to.map(format_date),
                query_hash: query.signature().to_string(),
            },
            execution_id: execution_id.to_string(),
        }
    }
}

/// Posts scrape queries to the workflow webhook.
#[derive(Clone)]
pub struct WebhookTrigger {
    client: Client,
    url: Option<Url>,
    secret: Option<String>,
}

impl WebhookTrigger {
    pub fn new(settings: &WorkflowSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("eventscout/", env!("CARGO_PKG_VERSION")))
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;

        Ok(Self {
            client,
            url: settings.webhook_url.clone(),
            secret: settings.secret.clone(),
        })
    }

    async fn send(&self, query: &ScrapeQuery, execution_id: i64) -> Result<(), WorkflowError> {
        let url = self.url.as_ref().ok_or(WorkflowError::NotConfigured)?;

        let mut request = self
            .client
            .post(url.clone())
            .json(&TriggerPayload::new(query, execution_id));
        if let Some(secret) = self.secret.as_deref() {
            request = request.header(header::AUTHORIZATION, format!("Bearer {secret}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(WorkflowError::Status { status, body })
    }
}

#[async_trait]
impl WorkflowTrigger for WebhookTrigger {
    async fn trigger(&self, query: &ScrapeQuery, execution_id: i64) -> bool {
        match self.send(query, execution_id).await {
            Ok(()) => {
                debug!(target = TARGET, execution_id, "workflow triggered");
                true
            }
            Err(WorkflowError::Status { status, body }) => {
                warn!(
                    target = TARGET,
                    execution_id,
                    status = status.as_u16(),
                    body = %body,
                    "workflow rejected trigger"
                );
                false
            }
            Err(err) => {
                warn!(target = TARGET, execution_id, error = %err, "workflow trigger failed");
                false
            }
        }
    }
}
