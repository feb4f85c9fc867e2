//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::{Date, OffsetDateTime};

use crate::domain::geo::GeoPoint;
use crate::domain::types::ExecutionStatus;

/// One row of `workflow_executions`; at most one exists per query hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    pub id: i64,
    pub query_hash: String,
    pub location: Option<String>,
    pub cities: Vec<String>,
    pub radius_km: Option<f64>,
    pub center_lat: Option<f64>,
    pub center_lng: Option<f64>,
    pub date_from: Option<Date>,
    pub date_to: Option<Date>,
    pub status: ExecutionStatus,
    pub last_executed_at: OffsetDateTime,
    pub event_count: i32,
    pub error_message: Option<String>,
}

impl ExecutionRecord {
    /// Fractional hours elapsed since `last_executed_at`.
    pub fn age_hours(&self, now: OffsetDateTime) -> f64 {
        (now - self.last_executed_at).as_seconds_f64() / 3600.0
    }
}

/// A catalog event. Coordinates are already converted from their stored
/// arbitrary-precision form; `None` means unknown or unparseable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub date_start: OffsetDateTime,
    pub date_end: Option<OffsetDateTime>,
    pub location_name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub source_name: Option<String>,
}

impl EventRecord {
    /// The event's position, if both coordinates are present and finite.
    pub fn position(&self) -> Option<GeoPoint> {
        GeoPoint::new(self.latitude?, self.longitude?)
    }
}

impl From<EventRecord> for eventscout_api_types::EventItem {
    fn from(record: EventRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            description: record.description,
            category: record.category,
            date_start: record.date_start,
            date_end: record.date_end,
            location_name: record.location_name,
            address: record.address,
            latitude: record.latitude,
            longitude: record.longitude,
            image_url: record.image_url,
            source_url: record.source_url,
            source_name: record.source_name,
        }
    }
}
