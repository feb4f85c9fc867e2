//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{EventRecord, ExecutionRecord};
use crate::domain::signature::{QuerySignature, ScrapeQuery};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("schema not provisioned: {message}")]
    SchemaMissing { message: String },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Result of a conditional re-arm of an execution record.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// The record was created or reset to `pending` by this caller.
    Claimed(ExecutionRecord),
    /// Another caller already holds the record in `pending` or `running`.
    Contended,
}

#[async_trait]
pub trait ExecutionsRepo: Send + Sync {
    async fn find_by_hash(
        &self,
        signature: &QuerySignature,
    ) -> Result<Option<ExecutionRecord>, RepoError>;

    /// Insert a `pending` record, or reset an existing one to `pending`,
    /// refreshing `last_executed_at` and clearing `error_message`.
    async fn upsert_pending(
        &self,
        signature: &QuerySignature,
        query: &ScrapeQuery,
    ) -> Result<ExecutionRecord, RepoError>;

    /// Like [`ExecutionsRepo::upsert_pending`], but leaves a record that is
    /// already `pending` or `running` untouched and reports contention.
    async fn claim_pending(
        &self,
        signature: &QuerySignature,
        query: &ScrapeQuery,
    ) -> Result<ClaimOutcome, RepoError>;
}

/// Store-side event filter. All string matches are case-insensitive.
#[derive(Debug, Clone, PartialEq)]
pub struct EventQueryFilter {
    /// Substring matched against title, description and location name.
    pub search: Option<String>,
    /// Exact category, compared case-insensitively.
    pub category: Option<String>,
    pub starts_from: OffsetDateTime,
    /// Inclusive upper bound on `date_start`.
    pub starts_until: Option<OffsetDateTime>,
    /// Substrings of which at least one must appear in the location name.
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub limit: u32,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
}

/// Connectivity check for the backing store.
#[async_trait]
pub trait StoreHealth: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;
}

#[async_trait]
pub trait EventsRepo: Send + Sync {
    /// Events matching `filter` in ascending `date_start` order. `None` fetches
    /// every matching row.
    async fn list_events(
        &self,
        filter: &EventQueryFilter,
        window: Option<PageWindow>,
    ) -> Result<Vec<EventRecord>, RepoError>;

    async fn count_events(&self, filter: &EventQueryFilter) -> Result<u64, RepoError>;

    async fn list_categories(&self) -> Result<Vec<CategoryCount>, RepoError>;
}
