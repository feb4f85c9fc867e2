//! Boundary to the external ingestion workflow.

use async_trait::async_trait;

use crate::domain::signature::ScrapeQuery;

/// Starts an ingestion run for a query.
///
/// Implementations must absorb every failure (non-2xx, timeout, transport) and
/// report it as `false`; nothing may propagate to the caller.
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
    async fn trigger(&self, query: &ScrapeQuery, execution_id: i64) -> bool;
}
