//! Trajectory sample types for circular range queries.

use chrono::{DateTime, NaiveDateTime, Utc};
use geo::Point;
use serde::{Deserialize, Serialize};

/// Geographic point (lon/lat) in API output
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lon: f64,
    pub lat: f64,
}

impl From<Point<f64>> for GeoPoint {
    fn from(p: Point<f64>) -> Self {
        Self {
            lon: p.x(),
            lat: p.y(),
        }
    }
}

impl From<GeoPoint> for Point<f64> {
    fn from(p: GeoPoint) -> Self {
        Point::new(p.lon, p.lat)
    }
}

/// One recorded position of a moving owner (vehicle, device, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Record id, unique within a source
    pub id: u64,

    /// Owner identifier, e.g. "V0001"
    pub owner_id: String,

    pub position: GeoPoint,

    /// Speed in km/h
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,

    /// Heading in degrees clockwise from north
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f32>,

    pub recorded_at: DateTime<Utc>,
}

impl TrackPoint {
    pub fn point(&self) -> Point<f64> {
        self.position.into()
    }
}

/// A record accepted by a range query with its distance to the query center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeHit {
    pub record: TrackPoint,
    pub distance_m: f64,
}

/// Optional record filters applied together with the bounding box.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackFilter {
    /// Inclusive lower time bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,

    /// Inclusive upper time bound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl TrackFilter {
    pub fn time_range(start_time: Option<DateTime<Utc>>, end_time: Option<DateTime<Utc>>) -> Self {
        Self {
            start_time,
            end_time,
            owner_id: None,
        }
    }

    pub fn matches(&self, record: &TrackPoint) -> bool {
        if let Some(start) = self.start_time {
            if record.recorded_at < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.recorded_at > end {
                return false;
            }
        }
        match &self.owner_id {
            Some(owner) => &record.owner_id == owner,
            None => true,
        }
    }
}

/// Parse an RFC 3339 timestamp or a naive `YYYY-MM-DD HH:MM:SS[.f]` taken as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Aggregate view of a record source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackStats {
    pub owner_count: usize,
    pub point_count: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_recorded_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_recorded_at: Option<DateTime<Utc>>,

    /// `[minLon, minLat, maxLon, maxLat]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,
}
