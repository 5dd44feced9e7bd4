//! Circular spatial range queries over point records.
//!
//! A degree-space bounding box pulls candidates from a [`TrackSource`]; an exact
//! haversine check then keeps the records inside the circle.

mod engine;
mod source;

pub use engine::{RangeEngine, RangeOptions, DEFAULT_CANDIDATE_FACTOR, DEFAULT_LIMIT};
pub use source::{InMemoryTrackSource, TrackSource};
