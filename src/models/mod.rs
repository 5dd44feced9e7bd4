//! Core data models for region resolution and range queries.

pub mod admin;
pub mod track;

pub use admin::{Location, Region, RegionLevel, RegionSummary};
pub use track::{parse_timestamp, GeoPoint, RangeHit, TrackFilter, TrackPoint, TrackStats};
