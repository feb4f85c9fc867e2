//! Query signatures: canonical form and stable hash of a scrape query.
//!
//! Two queries that only differ in city order, or in coordinate noise below
//! three decimal places (roughly 100 m), share a signature. Every other field
//! participates in the hash.

use serde::Serialize;
use sha2::{Digest, Sha256};
use time::{Date, format_description::BorrowedFormatItem, macros::format_description};

use crate::domain::error::DomainError;

const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");
const COORDINATE_SCALE: f64 = 1000.0;

/// The semantically relevant inputs of a catalog search, as sent to the
/// ingestion workflow.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScrapeQuery {
    pub cities: Vec<String>,
    pub radius_km: Option<f64>,
    pub center_lat: Option<f64>,
    pub center_lng: Option<f64>,
    pub date_from: Option<Date>,
    pub date_to: Option<Date>,
}

/// Normalized, serializable view of a [`ScrapeQuery`]. Field order is part of
/// the hash contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalQuery {
    pub cities: Vec<String>,
    pub radius_km: Option<f64>,
    pub center_lat: Option<f64>,
    pub center_lng: Option<f64>,
    pub date_from: String,
    pub date_to: String,
}

/// Lowercase hex SHA-256 of a canonical query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuerySignature(String);

impl QuerySignature {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QuerySignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl ScrapeQuery {
    pub fn canonical(&self) -> CanonicalQuery {
        let mut cities = self.cities.clone();
        cities.sort();

        CanonicalQuery {
            cities,
            radius_km: self.radius_km,
            center_lat: self.center_lat.map(round_coordinate),
            center_lng: self.center_lng.map(round_coordinate),
            date_from: self.date_from.map(format_date).unwrap_or_default(),
            date_to: self.date_to.map(format_date).unwrap_or_default(),
        }
    }

    pub fn signature(&self) -> QuerySignature {
        // Serializing a struct of strings, numbers and options cannot fail.
        let serialized = serde_json::to_string(&self.canonical()).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(serialized.as_bytes());
        QuerySignature(hex::encode(hasher.finalize().to_vec()))
    }

    /// Human-readable joined city list stored alongside the execution record.
    pub fn location_label(&self) -> Option<String> {
        (!self.cities.is_empty()).then(|| self.cities.join(", "))
    }
}

fn round_coordinate(value: f64) -> f64 {
    (value * COORDINATE_SCALE).round() / COORDINATE_SCALE
}

/// Format a date as `YYYY-MM-DD`.
pub fn format_date(date: Date) -> String {
    date.format(DATE_FORMAT).unwrap_or_default()
}

/// Parse a `YYYY-MM-DD` date, naming `field` in the error.
pub fn parse_date(field: &'static str, raw: &str) -> Result<Date, DomainError> {
    Date::parse(raw.trim(), DATE_FORMAT).map_err(|_| DomainError::invalid_date(field, raw))
}
