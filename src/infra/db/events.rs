use async_trait::async_trait;
use sqlx::{FromRow, Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::application::repos::{
    CategoryCount, EventQueryFilter, EventsRepo, PageWindow, RepoError,
};
use crate::domain::entities::EventRecord;
use crate::domain::geo::parse_coordinate;

use super::util::{contains_pattern, convert_count};
use super::{PostgresRepositories, map_sqlx_error};

// Coordinates are NUMERIC; read them as text and parse at this boundary.
const EVENT_COLUMNS: &str = "id, title, description, category, date_start, date_end, \
    location_name, address, latitude::text AS latitude, longitude::text AS longitude, \
    image_url, source_url, source_name";

#[derive(Debug, FromRow)]
struct EventRow {
    id: i64,
    title: String,
    description: Option<String>,
    category: Option<String>,
    date_start: OffsetDateTime,
    date_end: Option<OffsetDateTime>,
    location_name: Option<String>,
    address: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    image_url: Option<String>,
    source_url: Option<String>,
    source_name: Option<String>,
}

impl From<EventRow> for EventRecord {
    fn from(row: EventRow) -> Self {
        EventRecord {
            id: row.id,
            title: row.title,
            description: row.description,
            category: row.category,
            date_start: row.date_start,
            date_end: row.date_end,
            location_name: row.location_name,
            address: row.address,
            latitude: parse_coordinate(row.latitude.as_deref()),
            longitude: parse_coordinate(row.longitude.as_deref()),
            image_url: row.image_url,
            source_url: row.source_url,
            source_name: row.source_name,
        }
    }
}

#[derive(Debug, FromRow)]
struct CategoryRow {
    name: String,
    count: i64,
}

impl PostgresRepositories {
    fn apply_event_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &EventQueryFilter) {
        qb.push(" WHERE e.date_start >= ");
        qb.push_bind(filter.starts_from);

        if let Some(until) = filter.starts_until {
            qb.push(" AND e.date_start <= ");
            qb.push_bind(until);
        }

        if let Some(search) = filter.search.as_ref() {
            let pattern = contains_pattern(search);
            qb.push(" AND (e.title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR e.description ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR e.location_name ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }

        if let Some(category) = filter.category.as_ref() {
            qb.push(" AND lower(e.category) = lower(");
            qb.push_bind(category.clone());
            qb.push(")");
        }

        if !filter.locations.is_empty() {
            qb.push(" AND (");
            for (index, location) in filter.locations.iter().enumerate() {
                if index > 0 {
                    qb.push(" OR ");
                }
                qb.push("e.location_name ILIKE ");
                qb.push_bind(contains_pattern(location));
            }
            qb.push(")");
        }
    }
}

#[async_trait]
impl EventsRepo for PostgresRepositories {
    async fn list_events(
        &self,
        filter: &EventQueryFilter,
        window: Option<PageWindow>,
    ) -> Result<Vec<EventRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT {EVENT_COLUMNS} FROM events e"));
        Self::apply_event_filter(&mut qb, filter);
        qb.push(" ORDER BY e.date_start ASC, e.id ASC");

        if let Some(window) = window {
            let offset = i64::try_from(window.offset).map_err(|_| RepoError::InvalidInput {
                message: "offset exceeds supported range".to_string(),
            })?;
            qb.push(" LIMIT ");
            qb.push_bind(i64::from(window.limit));
            qb.push(" OFFSET ");
            qb.push_bind(offset);
        }

        let rows = qb
            .build_query_as::<EventRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(EventRecord::from).collect())
    }

    async fn count_events(&self, filter: &EventQueryFilter) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM events e");
        Self::apply_event_filter(&mut qb, filter);

        let count = qb
            .build_query_scalar::<i64>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        convert_count(count)
    }

    async fn list_categories(&self) -> Result<Vec<CategoryCount>, RepoError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT category AS name, COUNT(*) AS count FROM events \
             WHERE category IS NOT NULL \
             GROUP BY category \
             ORDER BY category ASC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(CategoryCount {
                    name: row.name,
                    count: convert_count(row.count)?,
                })
            })
            .collect()
    }
}
