//! Quyu - administrative region lookup and circular range queries.
//!
//! This library provides the boundary store, the region resolver and the range
//! engine shared by the server and locate binaries.

pub mod config;
pub mod error;
pub mod geodesy;
pub mod models;
pub mod pip;
pub mod range;
pub mod source;

pub use error::{Error, RecordError, Result};
pub use geodesy::{degrees_from_dms, haversine_distance, parse_dms};
pub use models::{Location, Region, RegionLevel, TrackPoint};
pub use pip::{BoundaryLoader, BoundaryStore, RegionResolver};
pub use range::{InMemoryTrackSource, RangeEngine, RangeOptions};
pub use source::LoadReport;
