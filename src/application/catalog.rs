//! Catalog queries: store-side filters plus the in-memory radius pass.

use std::sync::Arc;

use time::{Date, OffsetDateTime, Time};

use crate::application::refresh::ResultSet;
use crate::application::repos::{EventQueryFilter, EventsRepo, PageWindow, RepoError};
use crate::domain::entities::EventRecord;
use crate::domain::geo::{GeoPoint, RadiusFilter};

/// Validated search input for one catalog page.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub search: Option<String>,
    pub category: Option<String>,
    pub date_from: Option<Date>,
    /// Inclusive; events starting any time on this day match.
    pub date_to: Option<Date>,
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub radius_km: Option<f64>,
    pub limit: u32,
    pub offset: u64,
}

impl SearchParams {
    /// The radius filter, when all of centre and radius are supplied.
    pub fn radius_filter(&self) -> Option<RadiusFilter> {
        let center = GeoPoint::new(self.lat?, self.lng?)?;
        let radius_km = self.radius_km.filter(|radius| radius.is_finite())?;
        Some(RadiusFilter::new(center, radius_km))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventPage {
    pub events: Vec<EventRecord>,
    pub total: u64,
}

impl ResultSet for EventPage {
    fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

pub struct QueryExecutor {
    events: Arc<dyn EventsRepo>,
    recognized_cities: Vec<String>,
}

impl QueryExecutor {
    pub fn new(events: Arc<dyn EventsRepo>, recognized_cities: Vec<String>) -> Self {
        Self {
            events,
            recognized_cities,
        }
    }

    /// Recognized cities mentioned in free-text `location`, in configured order.
    pub fn cities_in(&self, location: &str) -> Vec<String> {
        let haystack = location.to_lowercase();
        self.recognized_cities
            .iter()
            .filter(|city| haystack.contains(&city.to_lowercase()))
            .cloned()
            .collect()
    }

    pub fn build_filter(&self, params: &SearchParams, today: Date) -> EventQueryFilter {
        let starts_from = params.date_from.unwrap_or(today);
        let locations = match non_blank(params.location.as_deref()) {
            Some(location) => {
                let cities = self.cities_in(location);
                if cities.is_empty() {
                    vec![location.to_string()]
                } else {
                    cities
                }
            }
            None => Vec::new(),
        };

        EventQueryFilter {
            search: non_blank(params.search.as_deref()).map(str::to_string),
            category: non_blank(params.category.as_deref())
                .filter(|category| !category.eq_ignore_ascii_case("all"))
                .map(str::to_string),
            starts_from: start_of_day(starts_from),
            starts_until: params.date_to.map(start_of_day),
            locations,
        }
    }

    pub async fn execute(&self, params: &SearchParams) -> Result<EventPage, RepoError> {
        let filter = self.build_filter(params, OffsetDateTime::now_utc().date());

        match params.radius_filter() {
            None => {
                let window = PageWindow {
                    limit: params.limit,
                    offset: params.offset,
                };
                let events = self.events.list_events(&filter, Some(window)).await?;
                let total = self.events.count_events(&filter).await?;
                Ok(EventPage { events, total })
            }
            Some(radius) => {
                let rows = self.events.list_events(&filter, None).await?;
                Ok(paginate_within(rows, &radius, params.limit, params.offset))
            }
        }
    }
}

/// Keep rows inside `radius` and slice `[offset, offset + limit)`. `rows` must
/// already be in ascending start order.
pub fn paginate_within(
    rows: Vec<EventRecord>,
    radius: &RadiusFilter,
    limit: u32,
    offset: u64,
) -> EventPage {
    let inside: Vec<EventRecord> = rows
        .into_iter()
        .filter(|event| radius.contains(event.position()))
        .collect();
    let total = inside.len() as u64;
    let events = inside
        .into_iter()
        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
        .take(limit as usize)
        .collect();
    EventPage { events, total }
}

fn start_of_day(date: Date) -> OffsetDateTime {
    date.with_time(Time::MIDNIGHT).assume_utc()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}
