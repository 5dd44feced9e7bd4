//! Region lookup index.
//!
//! The resolver only talks to [`RegionIndex`]; the shipped [`LinearScanIndex`] walks
//! each level in insertion order with a bounding box pre-filter. A grid or R-tree keyed
//! by bounding box can replace it as long as it keeps first-match-in-insertion-order.

use std::sync::Arc;

use geo::Point;

use super::geometry::point_in_region;
use super::store::BoundaryStore;
use crate::models::{Region, RegionLevel};

/// Point lookup over a loaded boundary set.
pub trait RegionIndex: Send + Sync {
    /// First region of `level` (in insertion order) containing the point
    fn lookup(&self, level: RegionLevel, point: Point<f64>) -> Option<&Region>;

    /// Every region at every level containing the point, province first
    fn containing(&self, point: Point<f64>) -> Vec<&Region>;

    /// The underlying store
    fn store(&self) -> &BoundaryStore;
}

/// Linear scan over the store, one level at a time.
///
/// Cost is O(regions at level × vertices per ring) in the worst case; the per-region
/// bounding box rejects most candidates cheaply.
#[derive(Clone)]
pub struct LinearScanIndex {
    store: Arc<BoundaryStore>,
}

impl LinearScanIndex {
    pub fn new(store: Arc<BoundaryStore>) -> Self {
        Self { store }
    }
}

impl RegionIndex for LinearScanIndex {
    fn lookup(&self, level: RegionLevel, point: Point<f64>) -> Option<&Region> {
        self.store
            .regions_at_level(level)
            .find(|region| point_in_region(point, region))
    }

    fn containing(&self, point: Point<f64>) -> Vec<&Region> {
        RegionLevel::all()
            .iter()
            .flat_map(move |&level| {
                self.store
                    .regions_at_level(level)
                    .filter(move |region| point_in_region(point, region))
            })
            .collect()
    }

    fn store(&self) -> &BoundaryStore {
        &self.store
    }
}
