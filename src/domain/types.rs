//! Shared domain enumerations aligned with persisted values.

use serde::{Deserialize, Serialize};

/// Lifecycle of a workflow execution record.
///
/// Only `Pending` is ever written by this service; the ingestion workflow moves
/// a record through `Running` to `Completed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
        }
    }

    /// The workflow has been asked to run and has not reported an outcome yet.
    pub fn is_in_flight(self) -> bool {
        matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }
}

impl TryFrom<&str> for ExecutionStatus {
    type Error = ();

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_persisted_text() {
        for status in [
            ExecutionStatus::Pending,
            ExecutionStatus::Running,
            ExecutionStatus::Completed,
            ExecutionStatus::Failed,
        ] {
            assert_eq!(ExecutionStatus::try_from(status.as_str()), Ok(status));
        }
        assert!(ExecutionStatus::try_from("Completed").is_err());
    }

    #[test]
    fn only_pending_and_running_are_in_flight() {
        assert!(ExecutionStatus::Pending.is_in_flight());
        assert!(ExecutionStatus::Running.is_in_flight());
        assert!(!ExecutionStatus::Completed.is_in_flight());
        assert!(!ExecutionStatus::Failed.is_in_flight());
    }
}
