//! Freshness contract shared by the execution store and the result cache.

use time::{Duration, OffsetDateTime};

use crate::domain::entities::ExecutionRecord;
use crate::domain::types::ExecutionStatus;

/// Window after which a completed ingestion is considered stale.
pub const EXECUTION_TTL: Duration = Duration::hours(4);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    ttl: Duration,
}

impl FreshnessPolicy {
    pub const fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// The fixed policy applied to workflow executions.
    pub const fn executions() -> Self {
        Self::new(EXECUTION_TTL)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// `stamped_at` lies strictly less than one ttl before `now`.
    pub fn is_within(&self, stamped_at: OffsetDateTime, now: OffsetDateTime) -> bool {
        now - stamped_at < self.ttl
    }

    pub fn is_fresh(&self, record: &ExecutionRecord, now: OffsetDateTime) -> bool {
        record.status == ExecutionStatus::Completed && self.is_within(record.last_executed_at, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn record(status: ExecutionStatus, at: OffsetDateTime) -> ExecutionRecord {
        ExecutionRecord {
            id: 1,
            query_hash: "h".to_string(),
            location: None,
            cities: Vec::new(),
            radius_km: None,
            center_lat: None,
            center_lng: None,
            date_from: None,
            date_to: None,
            status,
            last_executed_at: at,
            event_count: 12,
            error_message: None,
        }
    }

    #[test]
    fn completed_record_is_fresh_just_inside_four_hours() {
        let completed_at = datetime!(2026-03-01 08:00 UTC);
        let policy = FreshnessPolicy::executions();
        let done = record(ExecutionStatus::Completed, completed_at);

        assert!(policy.is_fresh(&done, completed_at + Duration::minutes(239)));
        assert!(!policy.is_fresh(&done, completed_at + Duration::minutes(241)));
    }

    #[test]
    fn ttl_boundary_is_exclusive() {
        let completed_at = datetime!(2026-03-01 08:00 UTC);
        let policy = FreshnessPolicy::executions();

        assert!(!policy.is_within(completed_at, completed_at + EXECUTION_TTL));
    }

    #[test]
    fn only_completed_records_can_be_fresh() {
        let at = datetime!(2026-03-01 08:00 UTC);
        let policy = FreshnessPolicy::executions();

        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Failed,
        ] {
            assert!(!policy.is_fresh(&record(status, at), at));
        }
    }
}
