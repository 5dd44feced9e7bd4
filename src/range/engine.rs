//! Circular range queries over point records.

use chrono::{DateTime, Utc};
use geo::Point;
use tracing::debug;

use super::source::TrackSource;
use crate::error::{Error, Result};
use crate::geodesy::{haversine_distance, radius_bboxes};
use crate::models::{RangeHit, TrackFilter, TrackPoint, TrackStats};

/// Raw candidates fetched per requested result
pub const DEFAULT_CANDIDATE_FACTOR: usize = 2;

pub const DEFAULT_LIMIT: usize = 1000;

/// Filters and result cap for [`RangeEngine::range_query`]
#[derive(Debug, Clone)]
pub struct RangeOptions {
    pub filter: TrackFilter,
    pub limit: usize,
}

impl Default for RangeOptions {
    fn default() -> Self {
        Self {
            filter: TrackFilter::default(),
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Two-phase circle search: degree-space box from the source, then haversine.
///
/// A box crossing the antimeridian is queried as two boxes sharing one candidate cap.
///
/// Only `candidate_factor × limit` raw rows are requested from the source. With
/// clustered data an in-circle record beyond that cut can be missed even though
/// fewer than `limit` results were returned.
pub struct RangeEngine<S> {
    source: S,
    candidate_factor: usize,
}

impl<S: TrackSource> RangeEngine<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            candidate_factor: DEFAULT_CANDIDATE_FACTOR,
        }
    }

    pub fn with_candidate_factor(mut self, factor: usize) -> Self {
        self.candidate_factor = factor.max(1);
        self
    }

    pub fn candidate_factor(&self) -> usize {
        self.candidate_factor
    }

    /// Records within `radius_m` meters of `center`, nearest first, at most `limit`.
    pub fn range_query(&self, center: Point<f64>, radius_m: f64, options: &RangeOptions) -> Result<Vec<RangeHit>> {
        validate(center, radius_m)?;

        let cap = options.limit.saturating_mul(self.candidate_factor);
        let mut candidates = Vec::new();
        for bbox in radius_bboxes(center, radius_m) {
            let remaining = cap - candidates.len();
            if remaining == 0 {
                break;
            }
            candidates.extend(self.source.fetch_in_bbox(&bbox, &options.filter, remaining)?);
        }
        let candidate_count = candidates.len();

        let mut hits = Vec::new();
        for record in candidates {
            let distance_m = haversine_distance(center, record.point());
            if distance_m <= radius_m {
                hits.push(RangeHit { record, distance_m });
                if hits.len() >= options.limit {
                    break;
                }
            }
        }

        hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));

        debug!(
            "Range query at ({}, {}) r={}m: {} candidates, {} hits",
            center.x(),
            center.y(),
            radius_m,
            candidate_count,
            hits.len()
        );

        Ok(hits)
    }

    /// Records in the circle's bounding box, an upper bound on the circle count.
    pub fn count_in_range(
        &self,
        center: Point<f64>,
        radius_m: f64,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
    ) -> Result<usize> {
        validate(center, radius_m)?;

        let filter = TrackFilter::time_range(start_time, end_time);
        radius_bboxes(center, radius_m)
            .iter()
            .map(|bbox| self.source.count_in_bbox(bbox, &filter))
            .sum()
    }

    /// One owner's trajectory ordered by time
    pub fn track_of(
        &self,
        owner_id: &str,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<TrackPoint>> {
        self.source
            .track_of(owner_id, &TrackFilter::time_range(start_time, end_time), limit)
    }

    pub fn stats(&self) -> Result<TrackStats> {
        self.source.stats()
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

fn validate(center: Point<f64>, radius_m: f64) -> Result<()> {
    if !radius_m.is_finite() || radius_m < 0.0 {
        return Err(Error::InvalidQuery(format!("radius must be a non-negative number, got {radius_m}")));
    }
    if !(-180.0..=180.0).contains(&center.x()) || !(-90.0..=90.0).contains(&center.y()) {
        return Err(Error::InvalidQuery(format!(
            "center out of range: ({}, {})",
            center.x(),
            center.y()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;
    use crate::range::InMemoryTrackSource;
    use chrono::TimeZone;

    fn record(id: u64, owner: &str, lon: f64, lat: f64, minute: u32) -> TrackPoint {
        TrackPoint {
            id,
            owner_id: owner.to_string(),
            position: GeoPoint { lon, lat },
            speed: Some(30.0),
            bearing: Some(90.0),
            recorded_at: Utc.with_ymd_and_hms(2024, 1, 15, 8, minute, 0).unwrap(),
        }
    }

    /// Points spread around Tiananmen at growing distances.
    fn beijing() -> RangeEngine<InMemoryTrackSource> {
        let center = (116.407, 39.904);
        let mut records = Vec::new();
        for i in 0..20u64 {
            let offset = 0.001 * i as f64;
            let owner = if i % 2 == 0 { "V0001" } else { "V0002" };
            records.push(record(i, owner, center.0 + offset, center.1 - offset / 2.0, i as u32));
        }
        // Inside the bounding box corner but outside the circle
        records.push(record(100, "V0003", center.0 + 0.0115, center.1 + 0.0088, 30));
        RangeEngine::new(InMemoryTrackSource::new(records))
    }

    fn center() -> Point<f64> {
        Point::new(116.407, 39.904)
    }

    #[test]
    fn test_hits_are_within_radius_and_sorted() {
        let engine = beijing();
        let hits = engine.range_query(center(), 1000.0, &RangeOptions::default()).unwrap();

        assert!(!hits.is_empty());
        for hit in &hits {
            assert!(hit.distance_m <= 1000.0);
            assert!((haversine_distance(center(), hit.record.point()) - hit.distance_m).abs() < 1e-9);
        }
        assert!(hits.windows(2).all(|w| w[0].distance_m <= w[1].distance_m));
        assert!(hits.iter().all(|h| h.record.id != 100));
    }

    #[test]
    fn test_count_is_a_superset_of_hits() {
        let engine = beijing();
        let hits = engine.range_query(center(), 1000.0, &RangeOptions::default()).unwrap();
        let count = engine.count_in_range(center(), 1000.0, None, None).unwrap();
        assert!(count >= hits.len());
        // Two records just past the radius plus the corner record sit in the box only
        assert_eq!(hits.len(), 10);
        assert_eq!(count, 13);
    }

    #[test]
    fn test_limit_caps_results() {
        let engine = beijing();
        let options = RangeOptions {
            limit: 3,
            ..Default::default()
        };
        let hits = engine.range_query(center(), 5000.0, &options).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_owner_and_time_filters() {
        let engine = beijing();
        let options = RangeOptions {
            filter: TrackFilter {
                owner_id: Some("V0002".to_string()),
                start_time: Utc.with_ymd_and_hms(2024, 1, 15, 8, 5, 0).single(),
                end_time: None,
            },
            limit: 100,
        };
        let hits = engine.range_query(center(), 5000.0, &options).unwrap();
        assert!(!hits.is_empty());
        assert!(hits
            .iter()
            .all(|h| h.record.owner_id == "V0002" && h.record.id >= 5));
    }

    #[test]
    fn test_empty_neighbourhood() {
        let engine = beijing();
        let shanghai = Point::new(121.474, 31.230);
        assert!(engine
            .range_query(shanghai, 1000.0, &RangeOptions::default())
            .unwrap()
            .is_empty());
        assert_eq!(engine.count_in_range(shanghai, 1000.0, None, None).unwrap(), 0);
    }

    #[test]
    fn test_candidate_cap_can_miss_in_circle_records() {
        // Ten far-but-in-box records come first in source order, one true hit last
        let mut records: Vec<TrackPoint> = (0..10)
            .map(|i| record(i, "far", 116.407 + 0.0115, 39.904 + 0.0088, 0))
            .collect();
        records.push(record(99, "near", 116.407, 39.904, 0));

        let engine = RangeEngine::new(InMemoryTrackSource::new(records));
        let options = RangeOptions {
            limit: 2,
            ..Default::default()
        };
        assert!(engine.range_query(center(), 1000.0, &options).unwrap().is_empty());

        let wide = RangeEngine::new(engine.source().clone()).with_candidate_factor(10);
        assert_eq!(engine.candidate_factor(), DEFAULT_CANDIDATE_FACTOR);
        assert_eq!(wide.candidate_factor(), 10);
        assert_eq!(RangeEngine::new(InMemoryTrackSource::default()).with_candidate_factor(0).candidate_factor(), 1);
        let hits = wide.range_query(center(), 1000.0, &options).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.id, 99);
    }

    #[test]
    fn test_invalid_queries_are_rejected() {
        let engine = beijing();
        assert!(matches!(
            engine.range_query(center(), -1.0, &RangeOptions::default()),
            Err(Error::InvalidQuery(_))
        ));
        assert!(engine
            .count_in_range(Point::new(200.0, 0.0), 10.0, None, None)
            .is_err());
        assert!(engine
            .range_query(center(), f64::NAN, &RangeOptions::default())
            .is_err());
    }

    #[test]
    fn test_track_and_stats_pass_through() {
        let engine = beijing();
        let track = engine.track_of("V0001", None, None, 100).unwrap();
        assert_eq!(track.len(), 10);
        assert!(track.windows(2).all(|w| w[0].recorded_at <= w[1].recorded_at));
        assert_eq!(engine.stats().unwrap().owner_count, 3);
    }

    #[test]
    fn test_circle_across_antimeridian() {
        let engine = RangeEngine::new(InMemoryTrackSource::new(vec![
            record(1, "east", 179.9995, 0.0, 0),
            record(2, "west", -179.999, 0.0, 1),
            record(3, "far", -179.9, 0.0, 2),
        ]));
        let center = Point::new(179.999, 0.0);

        let hits = engine.range_query(center, 1000.0, &RangeOptions::default()).unwrap();
        let ids: Vec<u64> = hits.iter().map(|h| h.record.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(hits[1].distance_m < 250.0);
        assert_eq!(engine.count_in_range(center, 1000.0, None, None).unwrap(), 2);
    }
}
