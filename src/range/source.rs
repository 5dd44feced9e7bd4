//! Point record sources for range queries.

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use geo::{Point, Rect};
use hashbrown::HashSet;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{RecordError, Result};
use crate::models::{parse_timestamp, GeoPoint, TrackFilter, TrackPoint, TrackStats};
use crate::pip::geometry::point_in_bbox;
use crate::source::{open_source, LoadReport};

/// Where range queries get their candidate records from.
///
/// Implementations must be safe for concurrent reads; the engine issues one fetch per
/// query and never mutates the source.
pub trait TrackSource: Send + Sync {
    /// Records inside `bbox` (inclusive) that pass `filter`, at most `cap` of them
    fn fetch_in_bbox(&self, bbox: &Rect<f64>, filter: &TrackFilter, cap: usize) -> Result<Vec<TrackPoint>>;

    /// Number of records inside `bbox` that pass `filter`
    fn count_in_bbox(&self, bbox: &Rect<f64>, filter: &TrackFilter) -> Result<usize>;

    /// One owner's records ordered by time, at most `limit` of them
    fn track_of(&self, owner_id: &str, filter: &TrackFilter, limit: usize) -> Result<Vec<TrackPoint>>;

    fn stats(&self) -> Result<TrackStats>;
}

/// Records held in memory, scanned in insertion order.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTrackSource {
    records: Vec<TrackPoint>,
}

/// CSV row layout: `vehicle_id,lng,lat,speed,direction,recorded_at` with an optional
/// leading `id` column.
#[derive(Debug, Deserialize)]
struct TrackRow {
    #[serde(default)]
    id: Option<u64>,
    #[serde(alias = "owner_id")]
    vehicle_id: String,
    #[serde(alias = "lon")]
    lng: f64,
    lat: f64,
    #[serde(default)]
    speed: Option<f32>,
    #[serde(default, alias = "bearing")]
    direction: Option<f32>,
    recorded_at: String,
}

impl TrackRow {
    fn into_point(self, fallback_id: u64) -> std::result::Result<TrackPoint, RecordError> {
        for (field, value) in [("lng", self.lng), ("lat", self.lat)] {
            if !value.is_finite() {
                return Err(RecordError::BadNumber {
                    field,
                    value: value.to_string(),
                });
            }
        }

        let recorded_at =
            parse_timestamp(&self.recorded_at).ok_or(RecordError::BadTimestamp(self.recorded_at))?;

        Ok(TrackPoint {
            id: self.id.unwrap_or(fallback_id),
            owner_id: self.vehicle_id,
            position: GeoPoint {
                lon: self.lng,
                lat: self.lat,
            },
            speed: self.speed,
            bearing: self.direction,
            recorded_at,
        })
    }
}

impl InMemoryTrackSource {
    pub fn new(records: Vec<TrackPoint>) -> Self {
        Self { records }
    }

    /// Read records from a CSV stream with a header row, skipping malformed rows
    pub fn read_csv<R: Read>(reader: R) -> Result<(Self, LoadReport)> {
        let mut csv_reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut records = Vec::new();
        let mut report = LoadReport::default();

        for (row, result) in csv_reader.deserialize::<TrackRow>().enumerate() {
            let parsed = match result {
                Ok(track_row) => track_row.into_point(row as u64 + 1),
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    debug!("Skipping track row {}: {}", row, e);
                    report.skipped += 1;
                    continue;
                }
            };

            match parsed {
                Ok(point) => {
                    records.push(point);
                    report.loaded += 1;
                }
                Err(e) => {
                    debug!("Skipping track row {}: {}", row, e);
                    report.skipped += 1;
                }
            }
        }

        Ok((Self::new(records), report))
    }

    /// Load records from a track file (`.csv` or `.csv.gz`)
    pub fn load_csv(path: &Path) -> Result<(Self, LoadReport)> {
        info!("Loading track records from {}", path.display());

        let (source, report) = Self::read_csv(open_source(path)?)?;

        info!(
            "Loaded {} track records ({} skipped) from {}",
            report.loaded,
            report.skipped,
            path.display()
        );

        Ok((source, report))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn matching<'a>(
        &'a self,
        bbox: &'a Rect<f64>,
        filter: &'a TrackFilter,
    ) -> impl Iterator<Item = &'a TrackPoint> + 'a {
        self.records
            .iter()
            .filter(move |r| point_in_bbox(r.point(), bbox) && filter.matches(r))
    }
}

impl TrackSource for InMemoryTrackSource {
    fn fetch_in_bbox(&self, bbox: &Rect<f64>, filter: &TrackFilter, cap: usize) -> Result<Vec<TrackPoint>> {
        Ok(self.matching(bbox, filter).take(cap).cloned().collect())
    }

    fn count_in_bbox(&self, bbox: &Rect<f64>, filter: &TrackFilter) -> Result<usize> {
        Ok(self.matching(bbox, filter).count())
    }

    fn track_of(&self, owner_id: &str, filter: &TrackFilter, limit: usize) -> Result<Vec<TrackPoint>> {
        let mut track: Vec<TrackPoint> = self
            .records
            .iter()
            .filter(|r| r.owner_id == owner_id && filter.matches(r))
            .cloned()
            .collect();

        track.sort_by_key(|r| r.recorded_at);
        track.truncate(limit);
        Ok(track)
    }

    fn stats(&self) -> Result<TrackStats> {
        let owners: HashSet<&str> = self.records.iter().map(|r| r.owner_id.as_str()).collect();

        let first: Option<DateTime<Utc>> = self.records.iter().map(|r| r.recorded_at).min();
        let last: Option<DateTime<Utc>> = self.records.iter().map(|r| r.recorded_at).max();

        let bbox = self.records.iter().map(TrackPoint::point).fold(
            None,
            |acc: Option<[f64; 4]>, p: Point<f64>| {
                Some(match acc {
                    None => [p.x(), p.y(), p.x(), p.y()],
                    Some([min_x, min_y, max_x, max_y]) => [
                        min_x.min(p.x()),
                        min_y.min(p.y()),
                        max_x.max(p.x()),
                        max_y.max(p.y()),
                    ],
                })
            },
        );

        Ok(TrackStats {
            owner_count: owners.len(),
            point_count: self.records.len(),
            first_recorded_at: first,
            last_recorded_at: last,
            bbox,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::Coord;

    const TRACKS: &str = "\
vehicle_id,lng,lat,speed,direction,recorded_at
V0001,116.400,39.900,35.5,90,2024-01-15 08:00:00
V0001,116.401,39.901,,,2024-01-15 08:00:30
V0002,116.500,39.950,20,180,2024-01-15T08:01:00Z
V0002,not-a-number,39.950,20,180,2024-01-15 08:01:30
V0003,116.402,39.902,10,0,sometime
";

    fn bbox(min: (f64, f64), max: (f64, f64)) -> Rect<f64> {
        Rect::new(Coord { x: min.0, y: min.1 }, Coord { x: max.0, y: max.1 })
    }

    #[test]
    fn test_read_csv_skips_bad_rows() {
        let (source, report) = InMemoryTrackSource::read_csv(TRACKS.as_bytes()).unwrap();
        assert_eq!(report, LoadReport { loaded: 3, skipped: 2 });
        assert_eq!(source.len(), 3);

        let second = &source.records[1];
        assert_eq!(second.id, 2);
        assert_eq!(second.speed, None);
        assert_eq!(second.bearing, None);
        assert_eq!(source.records[0].speed, Some(35.5));
    }

    #[test]
    fn test_fetch_respects_bbox_filter_and_cap() {
        let (source, _) = InMemoryTrackSource::read_csv(TRACKS.as_bytes()).unwrap();
        let area = bbox((116.39, 39.89), (116.41, 39.91));

        let all = source.fetch_in_bbox(&area, &TrackFilter::default(), 10).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.owner_id == "V0001"));

        let capped = source.fetch_in_bbox(&area, &TrackFilter::default(), 1).unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].id, 1);

        let late = TrackFilter::time_range(Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 10).single(), None);
        assert_eq!(source.count_in_bbox(&area, &late).unwrap(), 1);
    }

    #[test]
    fn test_track_of_orders_by_time() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap();
        let make = |id: u64, secs: i64| TrackPoint {
            id,
            owner_id: "V0009".to_string(),
            position: GeoPoint { lon: 0.0, lat: 0.0 },
            speed: None,
            bearing: None,
            recorded_at: t0 + chrono::Duration::seconds(secs),
        };
        let source = InMemoryTrackSource::new(vec![make(1, 60), make(2, 0), make(3, 30)]);

        let ids: Vec<u64> = source
            .track_of("V0009", &TrackFilter::default(), 10)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert_eq!(source.track_of("V0009", &TrackFilter::default(), 2).unwrap().len(), 2);
        assert!(source.track_of("nobody", &TrackFilter::default(), 10).unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let (source, _) = InMemoryTrackSource::read_csv(TRACKS.as_bytes()).unwrap();
        let stats = source.stats().unwrap();

        assert_eq!(stats.owner_count, 2);
        assert_eq!(stats.point_count, 3);
        assert_eq!(stats.bbox, Some([116.400, 39.900, 116.500, 39.950]));
        assert_eq!(
            stats.last_recorded_at,
            Utc.with_ymd_and_hms(2024, 1, 15, 8, 1, 0).single()
        );

        assert_eq!(InMemoryTrackSource::default().stats().unwrap(), TrackStats::default());
    }
}
