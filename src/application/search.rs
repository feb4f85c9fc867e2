//! Catalog search service used by the HTTP surface and the CLI.

use std::sync::Arc;

use eventscout_api_types::{CacheMeta, EventItem, SearchResponse};
use thiserror::Error;
use time::{Date, Month, OffsetDateTime};
use tracing::debug;

use crate::application::catalog::{QueryExecutor, SearchParams};
use crate::application::refresh::{
    ManualRefresh, ManualRefreshError, RefreshAction, RefreshOrchestrator,
};
use crate::application::repos::{CategoryCount, EventsRepo, RepoError};
use crate::cache::{ResultCache, ResultKey};
use crate::domain::signature::{QuerySignature, ScrapeQuery};

const TARGET: &str = "eventscout::search";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Repo(#[from] RepoError),
}

/// Page size bounds applied to client-supplied limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl PageLimits {
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_limit)
            .clamp(1, self.max_limit.max(1))
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 50,
            max_limit: 200,
        }
    }
}

/// Input of a manual refresh; absent fields fall back to the full region and
/// the rest of the current year.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshCommand {
    pub cities: Option<Vec<String>>,
    pub date_from: Option<Date>,
    pub date_to: Option<Date>,
    pub wait: bool,
}

/// A served page plus how it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchPage {
    pub response: SearchResponse,
    pub signature: QuerySignature,
    /// `None` when the page came from the result cache.
    pub action: Option<RefreshAction>,
}

pub struct EventSearchService {
    orchestrator: Arc<RefreshOrchestrator>,
    executor: Arc<QueryExecutor>,
    events: Arc<dyn EventsRepo>,
    results: Option<Arc<ResultCache>>,
    recognized_cities: Vec<String>,
}

impl EventSearchService {
    pub fn new(
        orchestrator: Arc<RefreshOrchestrator>,
        executor: Arc<QueryExecutor>,
        events: Arc<dyn EventsRepo>,
        results: Option<Arc<ResultCache>>,
        recognized_cities: Vec<String>,
    ) -> Self {
        Self {
            orchestrator,
            executor,
            events,
            results,
            recognized_cities,
        }
    }

    /// The workflow query describing `params`.
    pub fn scrape_query(&self, params: &SearchParams, today: Date) -> ScrapeQuery {
        ScrapeQuery {
            cities: params
                .location
                .as_deref()
                .map(|location| self.executor.cities_in(location))
                .unwrap_or_default(),
            radius_km: params.radius_km,
            center_lat: params.lat,
            center_lng: params.lng,
            date_from: Some(params.date_from.unwrap_or(today)),
            date_to: params.date_to.or_else(|| end_of_year(today)),
        }
    }

    pub async fn search(&self, params: SearchParams) -> Result<SearchPage, SearchError> {
        let today = OffsetDateTime::now_utc().date();
        let query = self.scrape_query(&params, today);
        let key = ResultKey::new(query.signature(), &params);

        if let Some(cache) = self.results.as_ref() {
            if let Some(response) = self.cached_page(cache, &key).await {
                debug!(target = TARGET, query_hash = %key.signature, "served from result cache");
                return Ok(SearchPage {
                    response,
                    signature: key.signature,
                    action: None,
                });
            }
        }

        let executor = &self.executor;
        let coordinated = self
            .orchestrator
            .coordinate(&query, params.offset, || executor.execute(&params))
            .await?;

        let response = SearchResponse {
            events: coordinated
                .result
                .events
                .into_iter()
                .map(EventItem::from)
                .collect(),
            total: coordinated.result.total,
            limit: params.limit,
            offset: params.offset,
            cache: coordinated.cache,
        };

        if let Some(cache) = self.results.as_ref() {
            if coordinated.action.invalidates() {
                cache.invalidate_signature(&key.signature);
            }
            let fresh = response.cache.hit || coordinated.action == RefreshAction::SyncCompleted;
            if fresh && !response.events.is_empty() {
                cache.set(key.clone(), response.clone());
            }
        }

        Ok(SearchPage {
            response,
            signature: key.signature,
            action: Some(coordinated.action),
        })
    }

    /// A stored page, served only while the signature's execution record is
    /// still fresh. Cache metadata is recomputed against that record.
    async fn cached_page(&self, cache: &ResultCache, key: &ResultKey) -> Option<SearchResponse> {
        let mut response = cache.get(key)?;
        let decision = match self.orchestrator.check(&key.signature).await {
            Ok(decision) => decision,
            Err(err) => {
                debug!(
                    target = TARGET,
                    query_hash = %key.signature,
                    error = %err,
                    "freshness check failed; bypassing result cache"
                );
                return None;
            }
        };

        if !decision.is_cached {
            cache.invalidate_signature(&key.signature);
            return None;
        }

        let now = OffsetDateTime::now_utc();
        response.cache = CacheMeta {
            hit: true,
            age_hours: decision.execution.as_ref().map(|record| record.age_hours(now)),
            refreshed: false,
        };
        Some(response)
    }

    pub async fn categories(&self) -> Result<Vec<CategoryCount>, SearchError> {
        Ok(self.events.list_categories().await?)
    }

    /// Force an ingestion run regardless of freshness.
    pub async fn refresh(
        &self,
        command: RefreshCommand,
    ) -> Result<ManualRefresh, ManualRefreshError> {
        let today = OffsetDateTime::now_utc().date();
        let cities = command
            .cities
            .filter(|cities| !cities.is_empty())
            .unwrap_or_else(|| self.recognized_cities.clone());
        let query = ScrapeQuery {
            cities,
            radius_km: None,
            center_lat: None,
            center_lng: None,
            date_from: Some(command.date_from.unwrap_or(today)),
            date_to: command.date_to.or_else(|| end_of_year(today)),
        };

        let refresh = self.orchestrator.force_refresh(&query, command.wait).await?;
        if let Some(cache) = self.results.as_ref() {
            cache.invalidate_signature(&refresh.signature);
        }
        Ok(refresh)
    }
}

fn end_of_year(today: Date) -> Option<Date> {
    Date::from_calendar_date(today.year(), Month::December, 31).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::Ordering;
    use std::time::Duration as StdDuration;

    use time::Duration;
    use time::macros::date;
    use tokio_util::sync::CancellationToken;

    use crate::application::catalog::tests::{CITIES, MemoryEvents, event};
    use crate::application::refresh::tests::{
        MemoryExecutions, ScriptedTrigger, fast_timings,
    };
    use crate::cache::ResultCacheConfig;
    use crate::domain::entities::EventRecord;
    use crate::domain::types::ExecutionStatus;

    struct Harness {
        executions: Arc<MemoryExecutions>,
        events: Arc<MemoryEvents>,
        trigger: Arc<ScriptedTrigger>,
        service: EventSearchService,
    }

    fn harness(rows: Vec<EventRecord>, trigger: ScriptedTrigger, cached: bool) -> Harness {
        let executions = Arc::new(MemoryExecutions::default());
        let events = Arc::new(MemoryEvents::with_rows(rows));
        let trigger = Arc::new(trigger);
        let cities: Vec<String> = CITIES.iter().map(|c| c.to_string()).collect();
        let orchestrator = Arc::new(RefreshOrchestrator::new(
            executions.clone(),
            trigger.clone(),
            fast_timings(),
            CancellationToken::new(),
        ));
        let executor = Arc::new(QueryExecutor::new(events.clone(), cities.clone()));
        let results = cached.then(|| Arc::new(ResultCache::new(&ResultCacheConfig::default())));
        let service =
            EventSearchService::new(orchestrator, executor, events.clone(), results, cities);
        Harness {
            executions,
            events,
            trigger,
            service,
        }
    }

    fn params() -> SearchParams {
        SearchParams {
            search: None,
            category: None,
            date_from: None,
            date_to: None,
            location: Some("Milano".to_string()),
            lat: None,
            lng: None,
            radius_km: None,
            limit: 50,
            offset: 0,
        }
    }

    fn upcoming(id: i64) -> EventRecord {
        event(id, OffsetDateTime::now_utc() + Duration::days(id), None)
    }

    #[test]
    fn scrape_query_defaults_dates_and_extracts_cities() {
        let h = harness(Vec::new(), ScriptedTrigger::accepting(), false);
        let mut search = params();
        search.location = Some("Bergamo, Milano".to_string());

        let query = h.service.scrape_query(&search, date!(2026 - 05 - 10));

        assert_eq!(query.cities, vec!["Milano".to_string(), "Bergamo".to_string()]);
        assert_eq!(query.date_from, Some(date!(2026 - 05 - 10)));
        assert_eq!(query.date_to, Some(date!(2026 - 12 - 31)));
    }

    #[test]
    fn page_limits_clamp_requests() {
        let limits = PageLimits::default();
        assert_eq!(limits.clamp(None), 50);
        assert_eq!(limits.clamp(Some(0)), 1);
        assert_eq!(limits.clamp(Some(1_000)), 200);
    }

    #[tokio::test]
    async fn fresh_search_is_served_and_cached() {
        let h = harness(vec![upcoming(1), upcoming(2)], ScriptedTrigger::accepting(), true);
        let signature = h
            .service
            .scrape_query(&params(), OffsetDateTime::now_utc().date())
            .signature();
        h.executions
            .insert(&signature, ExecutionStatus::Completed, Duration::minutes(30));

        let first = h.service.search(params()).await.unwrap();
        h.events.rows.lock().unwrap().clear();
        let second = h.service.search(params()).await.unwrap();

        assert_eq!(first.action, Some(RefreshAction::None));
        assert_eq!(first.response.total, 2);
        assert!(first.response.cache.hit);
        assert_eq!(second.action, None);
        assert_eq!(second.signature, signature);
        assert_eq!(second.response.events, first.response.events);
        assert!(second.response.cache.hit);
        assert_eq!(h.trigger.calls(), 0);
    }

    #[tokio::test]
    async fn cached_page_is_bypassed_once_its_record_goes_stale() {
        let h = harness(vec![upcoming(1)], ScriptedTrigger::accepting(), true);
        let signature = h
            .service
            .scrape_query(&params(), OffsetDateTime::now_utc().date())
            .signature();
        h.executions.insert(
            &signature,
            ExecutionStatus::Completed,
            Duration::hours(4) - Duration::milliseconds(500),
        );

        let first = h.service.search(params()).await.unwrap();
        tokio::time::sleep(StdDuration::from_secs(1)).await;
        let second = h.service.search(params()).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        assert!(first.response.cache.hit);
        assert!(!second.response.cache.hit);
        assert_eq!(second.action, Some(RefreshAction::AsyncTriggered));
        assert!(second.response.cache.age_hours.is_some_and(|age| age >= 4.0));
        assert_eq!(h.trigger.calls(), 1);
        assert!(h.service.results.as_ref().is_some_and(|cache| cache.is_empty()));
    }

    #[tokio::test]
    async fn cached_page_reports_current_age() {
        let h = harness(vec![upcoming(1)], ScriptedTrigger::accepting(), true);
        let signature = h
            .service
            .scrape_query(&params(), OffsetDateTime::now_utc().date())
            .signature();
        h.executions
            .insert(&signature, ExecutionStatus::Completed, Duration::hours(1));

        let first = h.service.search(params()).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        let second = h.service.search(params()).await.unwrap();

        let (before, after) = (
            first.response.cache.age_hours.expect("age"),
            second.response.cache.age_hours.expect("age"),
        );
        assert_eq!(second.action, None);
        assert!(after > before, "{after} <= {before}");
    }

    #[tokio::test]
    async fn stale_results_are_not_cached_after_background_trigger() {
        let h = harness(vec![upcoming(1)], ScriptedTrigger::accepting(), true);

        let first = h.service.search(params()).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(20)).await;

        assert_eq!(first.response.events.len(), 1);
        assert!(!first.response.cache.hit);
        assert_eq!(first.action, Some(RefreshAction::AsyncTriggered));
        assert_eq!(h.trigger.calls.load(Ordering::SeqCst), 1);
        assert!(h.service.results.as_ref().is_some_and(|cache| cache.is_empty()));
    }

    #[tokio::test]
    async fn manual_refresh_defaults_to_all_recognized_cities() {
        let h = harness(Vec::new(), ScriptedTrigger::accepting(), false);

        let refresh = h.service.refresh(RefreshCommand::default()).await.unwrap();

        let today = OffsetDateTime::now_utc().date();
        let expected = ScrapeQuery {
            cities: CITIES.iter().map(|c| c.to_string()).collect(),
            date_from: Some(today),
            date_to: end_of_year(today),
            ..ScrapeQuery::default()
        };
        assert_eq!(refresh.signature, expected.signature());
        assert_eq!(h.executions.status(&refresh.signature), Some(ExecutionStatus::Pending));
    }

    #[tokio::test]
    async fn categories_pass_through() {
        let h = harness(vec![upcoming(1), upcoming(2)], ScriptedTrigger::accepting(), false);

        let categories = h.service.categories().await.unwrap();

        assert_eq!(
            categories,
            vec![CategoryCount {
                name: "music".to_string(),
                count: 2
            }]
        );
    }
}
