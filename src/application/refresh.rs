//! Cache coordination and refresh orchestration for catalog searches.
//!
//! Each search is reduced to a [`QuerySignature`]. The execution record kept
//! for that signature decides whether the catalog is served as-is, whether an
//! ingestion run is already in flight, or whether one must be started. A run is
//! awaited when the caller would otherwise see an empty first page, and
//! detached when stale rows can be served right away.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use eventscout_api_types::CacheMeta;
use metrics::{counter, histogram};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::freshness::FreshnessPolicy;
use crate::application::repos::{ClaimOutcome, ExecutionsRepo, RepoError};
use crate::application::workflow::WorkflowTrigger;
use crate::domain::entities::ExecutionRecord;
use crate::domain::signature::{QuerySignature, ScrapeQuery};
use crate::domain::types::ExecutionStatus;

const TARGET: &str = "eventscout::refresh";

pub const METRIC_TRIGGER_TOTAL: &str = "eventscout_refresh_trigger_total";
pub const METRIC_TRIGGER_FAILED: &str = "eventscout_refresh_trigger_failed_total";
pub const METRIC_WAIT_MS: &str = "eventscout_refresh_wait_ms";
pub const METRIC_DEGRADED: &str = "eventscout_cache_degraded_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTimings {
    pub poll_interval: Duration,
    /// Upper bound for a wait on a run this process triggered.
    pub sync_max_wait: Duration,
    /// Upper bound for a wait on a run another request triggered.
    pub read_max_wait: Duration,
    pub running_grace: Duration,
}

impl Default for RefreshTimings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            sync_max_wait: Duration::from_secs(120),
            read_max_wait: Duration::from_secs(90),
            running_grace: Duration::from_secs(5),
        }
    }
}

/// Classification of a signature's execution record.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheDecision {
    pub is_cached: bool,
    pub is_running: bool,
    pub should_trigger: bool,
    pub execution: Option<ExecutionRecord>,
}

impl CacheDecision {
    pub fn classify(
        record: Option<ExecutionRecord>,
        policy: &FreshnessPolicy,
        now: OffsetDateTime,
    ) -> Self {
        let Some(record) = record else {
            return Self {
                is_cached: false,
                is_running: false,
                should_trigger: true,
                execution: None,
            };
        };

        let is_cached = policy.is_fresh(&record, now);
        let is_running = record.status.is_in_flight();
        Self {
            is_cached,
            is_running,
            should_trigger: !is_cached && !is_running,
            execution: Some(record),
        }
    }
}

/// How a wait on an execution record ended.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Completed(ExecutionRecord),
    Failed { error_message: Option<String> },
    TimedOut,
    /// The record vanished while being watched.
    Missing,
    Cancelled,
    /// The execution store stopped answering.
    Unavailable,
}

impl WatchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            WatchOutcome::Completed(_) => "completed",
            WatchOutcome::Failed { .. } => "failed",
            WatchOutcome::TimedOut => "timed_out",
            WatchOutcome::Missing => "missing",
            WatchOutcome::Cancelled => "cancelled",
            WatchOutcome::Unavailable => "unavailable",
        }
    }
}

/// Polls an execution record at a fixed interval until it settles.
#[derive(Clone)]
pub struct CompletionWatcher {
    executions: Arc<dyn ExecutionsRepo>,
    interval: Duration,
    cancel: CancellationToken,
}

impl CompletionWatcher {
    pub fn new(
        executions: Arc<dyn ExecutionsRepo>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executions,
            interval,
            cancel,
        }
    }

    /// Wait until the record leaves `pending`/`running` or `max_wait` elapses.
    /// The record is always read once more at the deadline.
    pub async fn wait(&self, signature: &QuerySignature, max_wait: Duration) -> WatchOutcome {
        let started = Instant::now();
        let deadline = started + max_wait;

        loop {
            match self.executions.find_by_hash(signature).await {
                Ok(Some(record)) => match record.status {
                    ExecutionStatus::Completed => return WatchOutcome::Completed(record),
                    ExecutionStatus::Failed => {
                        return WatchOutcome::Failed {
                            error_message: record.error_message,
                        };
                    }
                    ExecutionStatus::Pending | ExecutionStatus::Running => {}
                },
                Ok(None) => return WatchOutcome::Missing,
                Err(err) => {
                    warn!(
                        target = TARGET,
                        query_hash = %signature,
                        error = %err,
                        "execution lookup failed while waiting"
                    );
                    return WatchOutcome::Unavailable;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return WatchOutcome::TimedOut;
            }
            let nap = self.interval.min(deadline - now);

            tokio::select! {
                _ = self.cancel.cancelled() => return WatchOutcome::Cancelled,
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}

/// Anything a search can return; only emptiness matters for refresh mode.
pub trait ResultSet {
    fn is_empty(&self) -> bool;
}

impl<T> ResultSet for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAction {
    /// Served from the catalog without touching the workflow.
    None,
    /// Another run was in flight; waited briefly before reading.
    WaitedOnRunning,
    /// Triggered and awaited a run, then re-read the catalog.
    SyncCompleted,
    /// A run was awaited but did not complete in time.
    SyncIncomplete,
    /// A run was started in the background; stale rows were served.
    AsyncTriggered,
    /// The execution store was unreachable; served uncoordinated.
    Degraded,
}

impl RefreshAction {
    /// The signature's catalog contents may have changed.
    pub fn invalidates(&self) -> bool {
        matches!(self, RefreshAction::SyncCompleted | RefreshAction::AsyncTriggered)
    }

    pub fn label(&self) -> &'static str {
        match self {
            RefreshAction::None => "none",
            RefreshAction::WaitedOnRunning => "waited_on_running",
            RefreshAction::SyncCompleted => "sync_completed",
            RefreshAction::SyncIncomplete => "sync_incomplete",
            RefreshAction::AsyncTriggered => "async_triggered",
            RefreshAction::Degraded => "degraded",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Coordinated<T> {
    pub result: T,
    pub cache: CacheMeta,
    pub action: RefreshAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ManualRefresh {
    pub execution_id: i64,
    pub signature: QuerySignature,
    /// `None` when the caller did not ask to wait.
    pub completion: Option<WatchOutcome>,
}

#[derive(Debug, Error)]
pub enum ManualRefreshError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("workflow trigger failed for execution {execution_id}")]
    TriggerFailed { execution_id: i64 },
}

pub struct RefreshOrchestrator {
    executions: Arc<dyn ExecutionsRepo>,
    trigger: Arc<dyn WorkflowTrigger>,
    policy: FreshnessPolicy,
    timings: RefreshTimings,
    watcher: CompletionWatcher,
    cancel: CancellationToken,
}

impl RefreshOrchestrator {
    pub fn new(
        executions: Arc<dyn ExecutionsRepo>,
        trigger: Arc<dyn WorkflowTrigger>,
        timings: RefreshTimings,
        cancel: CancellationToken,
    ) -> Self {
        let watcher = CompletionWatcher::new(
            Arc::clone(&executions),
            timings.poll_interval,
            cancel.clone(),
        );
        Self {
            executions,
            trigger,
            policy: FreshnessPolicy::executions(),
            timings,
            watcher,
            cancel,
        }
    }

    pub fn timings(&self) -> RefreshTimings {
        self.timings
    }

    pub async fn check(&self, signature: &QuerySignature) -> Result<CacheDecision, RepoError> {
        let record = self.executions.find_by_hash(signature).await?;
        Ok(CacheDecision::classify(
            record,
            &self.policy,
            OffsetDateTime::now_utc(),
        ))
    }

    /// Run `run` under cache coordination for `query`.
    ///
    /// Failures of `run` itself propagate; nothing raised by the execution
    /// store or the workflow does.
    pub async fn coordinate<T, E, F, Fut>(
        &self,
        query: &ScrapeQuery,
        offset: u64,
        run: F,
    ) -> Result<Coordinated<T>, E>
    where
        T: ResultSet,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let signature = query.signature();
        let decision = match self.check(&signature).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(
                    target = TARGET,
                    query_hash = %signature,
                    error = %err,
                    "execution store unavailable; serving without cache coordination"
                );
                counter!(METRIC_DEGRADED).increment(1);
                let result = run().await?;
                return Ok(Coordinated {
                    result,
                    cache: uncached(),
                    action: RefreshAction::Degraded,
                });
            }
        };

        debug!(
            target = TARGET,
            query_hash = %signature,
            is_cached = decision.is_cached,
            is_running = decision.is_running,
            should_trigger = decision.should_trigger,
            offset,
            "cache decision"
        );

        let first_page = offset == 0;
        let mut action = RefreshAction::None;
        if first_page && decision.is_running {
            self.pause(self.timings.running_grace).await;
            action = RefreshAction::WaitedOnRunning;
        }

        let mut result = run().await?;
        let mut execution = decision.execution.clone();
        let mut refreshed = false;

        if first_page && decision.should_trigger {
            if result.is_empty() {
                match self.refresh_sync(query, &signature).await {
                    Some(record) => {
                        result = run().await?;
                        execution = Some(record);
                        refreshed = true;
                        action = RefreshAction::SyncCompleted;
                    }
                    None => action = RefreshAction::SyncIncomplete,
                }
            } else if self.refresh_async(query, &signature).await {
                action = RefreshAction::AsyncTriggered;
            }
        }

        let now = OffsetDateTime::now_utc();
        Ok(Coordinated {
            result,
            cache: CacheMeta {
                hit: decision.is_cached,
                age_hours: execution.as_ref().map(|record| record.age_hours(now)),
                refreshed,
            },
            action,
        })
    }

    /// Re-arm and trigger unconditionally, optionally waiting for completion.
    pub async fn force_refresh(
        &self,
        query: &ScrapeQuery,
        wait: bool,
    ) -> Result<ManualRefresh, ManualRefreshError> {
        let signature = query.signature();
        let record = self.executions.upsert_pending(&signature, query).await?;

        counter!(METRIC_TRIGGER_TOTAL, "mode" => "manual").increment(1);
        if !self.trigger.trigger(query, record.id).await {
            counter!(METRIC_TRIGGER_FAILED, "mode" => "manual").increment(1);
            return Err(ManualRefreshError::TriggerFailed {
                execution_id: record.id,
            });
        }
        info!(
            target = TARGET,
            query_hash = %signature,
            execution_id = record.id,
            wait,
            "manual refresh triggered"
        );

        let completion = if wait {
            Some(self.watch(&signature, self.timings.sync_max_wait).await)
        } else {
            None
        };

        Ok(ManualRefresh {
            execution_id: record.id,
            signature,
            completion,
        })
    }

    async fn refresh_sync(
        &self,
        query: &ScrapeQuery,
        signature: &QuerySignature,
    ) -> Option<ExecutionRecord> {
        let max_wait = match self.executions.claim_pending(signature, query).await {
            Ok(ClaimOutcome::Claimed(record)) => {
                counter!(METRIC_TRIGGER_TOTAL, "mode" => "sync").increment(1);
                if !self.trigger.trigger(query, record.id).await {
                    counter!(METRIC_TRIGGER_FAILED, "mode" => "sync").increment(1);
                    warn!(
                        target = TARGET,
                        query_hash = %signature,
                        execution_id = record.id,
                        "workflow trigger failed; serving empty result"
                    );
                    return None;
                }
                self.timings.sync_max_wait
            }
            Ok(ClaimOutcome::Contended) => {
                debug!(
                    target = TARGET,
                    query_hash = %signature,
                    "refresh already claimed elsewhere; waiting on it"
                );
                self.timings.read_max_wait
            }
            Err(err) => {
                warn!(
                    target = TARGET,
                    query_hash = %signature,
                    error = %err,
                    "could not claim execution; skipping refresh"
                );
                counter!(METRIC_DEGRADED).increment(1);
                return None;
            }
        };

        match self.watch(signature, max_wait).await {
            WatchOutcome::Completed(record) => Some(record),
            other => {
                info!(
                    target = TARGET,
                    query_hash = %signature,
                    outcome = other.label(),
                    "refresh did not complete; serving original result"
                );
                None
            }
        }
    }

    /// Claim inline and detach the trigger. Returns whether a trigger was started.
    async fn refresh_async(&self, query: &ScrapeQuery, signature: &QuerySignature) -> bool {
        let record = match self.executions.claim_pending(signature, query).await {
            Ok(ClaimOutcome::Claimed(record)) => record,
            Ok(ClaimOutcome::Contended) => return false,
            Err(err) => {
                warn!(
                    target = TARGET,
                    query_hash = %signature,
                    error = %err,
                    "could not claim execution; skipping background refresh"
                );
                counter!(METRIC_DEGRADED).increment(1);
                return false;
            }
        };

        counter!(METRIC_TRIGGER_TOTAL, "mode" => "async").increment(1);
        let trigger = Arc::clone(&self.trigger);
        let query = query.clone();
        let query_hash = signature.to_string();
        let execution_id = record.id;
        tokio::spawn(async move {
            if trigger.trigger(&query, execution_id).await {
                debug!(
                    target = TARGET,
                    query_hash = %query_hash,
                    execution_id,
                    "background refresh triggered"
                );
            } else {
                counter!(METRIC_TRIGGER_FAILED, "mode" => "async").increment(1);
                warn!(
                    target = TARGET,
                    query_hash = %query_hash,
                    execution_id,
                    "background refresh trigger failed"
                );
            }
        });
        true
    }

    async fn watch(&self, signature: &QuerySignature, max_wait: Duration) -> WatchOutcome {
        let started = Instant::now();
        let outcome = self.watcher.wait(signature, max_wait).await;
        histogram!(METRIC_WAIT_MS, "outcome" => outcome.label())
            .record(started.elapsed().as_secs_f64() * 1000.0);
        outcome
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}

fn uncached() -> CacheMeta {
    CacheMeta {
        hit: false,
        age_hours: None,
        refreshed: false,
    }
}
