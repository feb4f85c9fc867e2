//! Great-circle geometry for radius filtering.

const EARTH_RADIUS_KM: f64 = 6371.0;

/// A finite latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    lat: f64,
    lng: f64,
}

impl GeoPoint {
    /// Returns `None` unless both components are finite.
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        (lat.is_finite() && lng.is_finite()).then_some(Self { lat, lng })
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// Haversine distance in kilometres.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();
        let a = (d_lat / 2.0).sin().powi(2)
            + self.lat.to_radians().cos()
                * other.lat.to_radians().cos()
                * (d_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        EARTH_RADIUS_KM * c
    }
}

/// Circle around a centre point; the boundary is inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusFilter {
    pub center: GeoPoint,
    pub radius_km: f64,
}

impl RadiusFilter {
    pub fn new(center: GeoPoint, radius_km: f64) -> Self {
        Self { center, radius_km }
    }

    pub fn contains(&self, point: Option<GeoPoint>) -> bool {
        match point {
            Some(point) => self.center.distance_km(&point) <= self.radius_km,
            None => false,
        }
    }
}

/// Parse a stored decimal coordinate. Blank or malformed text, and values that
/// do not parse to a finite `f64`, are treated as absent rather than zero.
pub fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}
