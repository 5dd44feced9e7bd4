//! Point-in-Polygon (PIP) admin lookup service.
//!
//! Loads province / city / district boundaries and resolves a coordinate to the
//! finest region containing it, using a bounding box pre-filter and ray casting.

pub mod boundary;
pub mod geometry;
mod index;
mod service;
mod store;

pub use boundary::{load_boundaries, read_boundaries};
pub use index::{LinearScanIndex, RegionIndex};
pub use service::{NearbyRegion, RegionResolver};
pub use store::{BoundaryLoader, BoundaryStore, StoreStats};
