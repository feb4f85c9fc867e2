use async_trait::async_trait;
use sqlx::FromRow;
use time::{Date, OffsetDateTime};

use crate::application::repos::{ClaimOutcome, ExecutionsRepo, RepoError};
use crate::domain::entities::ExecutionRecord;
use crate::domain::signature::{QuerySignature, ScrapeQuery};
use crate::domain::types::ExecutionStatus;

use super::{PostgresRepositories, map_sqlx_error};

const EXECUTION_COLUMNS: &str = "id, query_hash, location, cities, radius_km, center_lat, \
    center_lng, date_from, date_to, status, last_executed_at, event_count, error_message";

const UPSERT_PENDING: &str = "INSERT INTO workflow_executions \
    (query_hash, location, cities, radius_km, center_lat, center_lng, date_from, date_to, \
     status, last_executed_at, error_message) \
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending', now(), NULL) \
    ON CONFLICT (query_hash) DO UPDATE SET \
        location = EXCLUDED.location, \
        cities = EXCLUDED.cities, \
        radius_km = EXCLUDED.radius_km, \
        center_lat = EXCLUDED.center_lat, \
        center_lng = EXCLUDED.center_lng, \
        date_from = EXCLUDED.date_from, \
        date_to = EXCLUDED.date_to, \
        status = 'pending', \
        last_executed_at = now(), \
        error_message = NULL";

#[derive(Debug, FromRow)]
struct ExecutionRow {
    id: i64,
    query_hash: String,
    location: Option<String>,
    cities: Vec<String>,
    radius_km: Option<f64>,
    center_lat: Option<f64>,
    center_lng: Option<f64>,
    date_from: Option<Date>,
    date_to: Option<Date>,
    status: String,
    last_executed_at: OffsetDateTime,
    event_count: i32,
    error_message: Option<String>,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = RepoError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        let status =
            ExecutionStatus::try_from(row.status.as_str()).map_err(|_| RepoError::InvalidInput {
                message: format!("unknown execution status `{}`", row.status),
            })?;

        Ok(ExecutionRecord {
            id: row.id,
            query_hash: row.query_hash,
            location: row.location,
            cities: row.cities,
            radius_km: row.radius_km,
            center_lat: row.center_lat,
            center_lng: row.center_lng,
            date_from: row.date_from,
            date_to: row.date_to,
            status,
            last_executed_at: row.last_executed_at,
            event_count: row.event_count,
            error_message: row.error_message,
        })
    }
}

impl PostgresRepositories {
    async fn write_pending(
        &self,
        signature: &QuerySignature,
        query: &ScrapeQuery,
        only_if_settled: bool,
    ) -> Result<Option<ExecutionRecord>, RepoError> {
        let guard = if only_if_settled {
            " WHERE workflow_executions.status NOT IN ('pending', 'running')"
        } else {
            ""
        };
        let sql = format!("{UPSERT_PENDING}{guard} RETURNING {EXECUTION_COLUMNS}");

        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(signature.as_str())
            .bind(query.location_label())
            .bind(&query.cities)
            .bind(query.radius_km)
            .bind(query.center_lat)
            .bind(query.center_lng)
            .bind(query.date_from)
            .bind(query.date_to)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(ExecutionRecord::try_from).transpose()
    }
}

#[async_trait]
impl ExecutionsRepo for PostgresRepositories {
    async fn find_by_hash(
        &self,
        signature: &QuerySignature,
    ) -> Result<Option<ExecutionRecord>, RepoError> {
        let sql =
            format!("SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE query_hash = $1");
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(signature.as_str())
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(ExecutionRecord::try_from).transpose()
    }

    async fn upsert_pending(
        &self,
        signature: &QuerySignature,
        query: &ScrapeQuery,
    ) -> Result<ExecutionRecord, RepoError> {
        self.write_pending(signature, query, false)
            .await?
            .ok_or_else(|| RepoError::from_persistence("upsert returned no row"))
    }

    async fn claim_pending(
        &self,
        signature: &QuerySignature,
        query: &ScrapeQuery,
    ) -> Result<ClaimOutcome, RepoError> {
        Ok(match self.write_pending(signature, query, true).await? {
            Some(record) => ClaimOutcome::Claimed(record),
            None => ClaimOutcome::Contended,
        })
    }
}
