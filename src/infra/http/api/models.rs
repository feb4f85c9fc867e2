use eventscout_api_types::RefreshRequest;
use serde::Deserialize;

use crate::application::catalog::SearchParams;
use crate::application::search::{PageLimits, RefreshCommand};
use crate::domain::error::DomainError;
use crate::domain::signature::parse_date;

/// Raw `GET /api/events` query string. Numbers stay textual so malformed
/// values surface as a JSON `bad_request` instead of a plain-text rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub location: Option<String>,
    pub lat: Option<String>,
    pub lng: Option<String>,
    pub radius: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl EventsQuery {
    pub fn into_params(self, limits: &PageLimits) -> Result<SearchParams, DomainError> {
        let limit = parse_number::<u32>("limit", self.limit.as_deref())?;
        let offset = parse_number::<u64>("offset", self.offset.as_deref())?;

        Ok(SearchParams {
            search: self.search,
            category: self.category,
            date_from: parse_optional_date("dateFrom", self.date_from.as_deref())?,
            date_to: parse_optional_date("dateTo", self.date_to.as_deref())?,
            location: self.location,
            lat: parse_coordinate_param("lat", self.lat.as_deref())?,
            lng: parse_coordinate_param("lng", self.lng.as_deref())?,
            radius_km: parse_coordinate_param("radius", self.radius.as_deref())?,
            limit: limits.clamp(limit),
            offset: offset.unwrap_or(0),
        })
    }
}

pub fn refresh_command(request: RefreshRequest) -> Result<RefreshCommand, DomainError> {
    Ok(RefreshCommand {
        cities: request.cities,
        date_from: parse_optional_date("dateFrom", request.date_from.as_deref())?,
        date_to: parse_optional_date("dateTo", request.date_to.as_deref())?,
        wait: request.wait,
    })
}

fn present(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_optional_date(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<time::Date>, DomainError> {
    present(raw).map(|value| parse_date(field, value)).transpose()
}

fn parse_number<T: std::str::FromStr>(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<T>, DomainError> {
    present(raw)
        .map(|value| {
            value.parse::<T>().map_err(|_| {
                DomainError::validation(format!("`{field}` must be a non-negative integer"))
            })
        })
        .transpose()
}

fn parse_coordinate_param(
    field: &'static str,
    raw: Option<&str>,
) -> Result<Option<f64>, DomainError> {
    match present(raw) {
        None => Ok(None),
        Some(value) => match value.parse::<f64>() {
            Ok(number) if number.is_finite() => Ok(Some(number)),
            _ => Err(DomainError::non_finite(field)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn defaults_apply_when_query_is_empty() {
        let params = EventsQuery::default()
            .into_params(&PageLimits::default())
            .expect("params");

        assert_eq!(params.limit, 50);
        assert_eq!(params.offset, 0);
        assert!(params.radius_filter().is_none());
    }

    #[test]
    fn limit_is_clamped_and_dates_parsed() {
        let query = EventsQuery {
            limit: Some("500".to_string()),
            date_from: Some("2026-03-01".to_string()),
            radius: Some("15".to_string()),
            ..EventsQuery::default()
        };

        let params = query.into_params(&PageLimits::default()).expect("params");

        assert_eq!(params.limit, 200);
        assert_eq!(params.date_from, Some(date!(2026 - 03 - 01)));
        assert_eq!(params.radius_km, Some(15.0));
    }

    #[test]
    fn malformed_values_are_rejected() {
        let bad_limit = EventsQuery {
            limit: Some("ten".to_string()),
            ..EventsQuery::default()
        };
        assert!(bad_limit.into_params(&PageLimits::default()).is_err());

        let bad_lat = EventsQuery {
            lat: Some("NaN".to_string()),
            ..EventsQuery::default()
        };
        assert!(matches!(
            bad_lat.into_params(&PageLimits::default()),
            Err(DomainError::NonFinite { field: "lat" })
        ));

        let bad_date = EventsQuery {
            date_to: Some("31/12/2026".to_string()),
            ..EventsQuery::default()
        };
        assert!(matches!(
            bad_date.into_params(&PageLimits::default()),
            Err(DomainError::InvalidDate { field: "dateTo", .. })
        ));
    }
}
