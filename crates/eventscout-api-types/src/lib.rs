//! Wire types shared by the eventscout HTTP API and its clients.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A catalog event as returned by `GET /api/events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventItem {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub category: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub date_start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub date_end: Option<OffsetDateTime>,
    pub location_name: Option<String>,
    pub address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
    pub source_name: Option<String>,
}

/// Cache coordination metadata attached to every search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMeta {
    /// The signature had a completed execution inside the freshness window.
    pub hit: bool,
    /// Hours since the signature's last trigger or completion, when known.
    pub age_hours: Option<f64>,
    /// A synchronous refresh completed during this request and the result was re-read.
    pub refreshed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub events: Vec<EventItem>,
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
    pub cache: CacheMeta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
}

/// Body of `POST /api/refresh`. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshRequest {
    pub cities: Option<Vec<String>>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub wait: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RefreshResponse {
    pub fn ok(message: impl Into<String>, execution_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            execution_id: Some(execution_id.into()),
            error: None,
            note: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            execution_id: None,
            error: Some(error.into()),
            note: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn event_item_uses_camel_case_keys() {
        let item = EventItem {
            id: 7,
            title: "Jazz in Brera".to_string(),
            description: None,
            category: Some("music".to_string()),
            date_start: datetime!(2026-05-01 20:30 UTC),
            date_end: None,
            location_name: Some("Milano".to_string()),
            address: None,
            latitude: Some(45.47),
            longitude: Some(9.19),
            image_url: None,
            source_url: None,
            source_name: Some("opendata".to_string()),
        };

        let value = serde_json::to_value(&item).expect("serialize event");
        assert_eq!(value["dateStart"], "2026-05-01T20:30:00Z");
        assert_eq!(value["locationName"], "Milano");
        assert!(value["dateEnd"].is_null());
    }

    #[test]
    fn refresh_request_accepts_empty_body() {
        let request: RefreshRequest = serde_json::from_str("{}").expect("parse empty body");
        assert_eq!(request, RefreshRequest::default());

        let request: RefreshRequest =
            serde_json::from_str(r#"{"cities":["Como"],"dateFrom":"2026-01-09","wait":true}"#)
                .expect("parse body");
        assert_eq!(request.cities.as_deref(), Some(&["Como".to_string()][..]));
        assert_eq!(request.date_from.as_deref(), Some("2026-01-09"));
        assert!(request.wait);
    }
}
