//! Region resolver: maps a coordinate to its province / city / district.

use std::sync::Arc;

use geo::Point;
use rayon::prelude::*;
use tracing::debug;

use super::index::{LinearScanIndex, RegionIndex};
use super::store::BoundaryStore;
use crate::geodesy::haversine_distance;
use crate::models::{Location, Region, RegionLevel};

/// A region close to a query point, measured from the region's center.
#[derive(Debug, Clone)]
pub struct NearbyRegion<'a> {
    pub region: &'a Region,
    pub distance_m: f64,
}

/// Hierarchical point-in-region lookup service.
///
/// Construct once per loaded dataset and share by reference; it holds no mutable
/// state and is safe to query from any number of threads.
pub struct RegionResolver<I = LinearScanIndex> {
    index: I,
}

impl RegionResolver<LinearScanIndex> {
    /// Resolver over a store using the linear scan index
    pub fn from_store(store: Arc<BoundaryStore>) -> Self {
        Self::new(LinearScanIndex::new(store))
    }
}

impl<I: RegionIndex> RegionResolver<I> {
    pub fn new(index: I) -> Self {
        Self { index }
    }

    /// Resolve a coordinate, finest level first.
    ///
    /// Districts are tried first, then cities, then provinces; the first region that
    /// contains the point ends the search. A point outside every boundary yields an
    /// empty [`Location`].
    pub fn resolve(&self, lon: f64, lat: f64) -> Location {
        let point = Point::new(lon, lat);

        for &level in RegionLevel::search_order() {
            if let Some(region) = self.index.lookup(level, point) {
                debug!(
                    "Resolved ({}, {}) at {} level: {}",
                    lon, lat, level, region.full_path
                );
                return Location::from_region(region);
            }
        }

        debug!("No region contains ({}, {})", lon, lat);
        Location::default()
    }

    /// District name only
    pub fn resolve_district_name(&self, lon: f64, lat: f64) -> Option<String> {
        self.resolve(lon, lat).district
    }

    /// Full path of the finest matching region
    pub fn resolve_full_path(&self, lon: f64, lat: f64) -> Option<String> {
        self.resolve(lon, lat).full_path
    }

    /// Resolve many coordinates in parallel; output order matches input order
    pub fn resolve_batch(&self, coords: &[(f64, f64)]) -> Vec<Location> {
        coords
            .par_iter()
            .map(|&(lon, lat)| self.resolve(lon, lat))
            .collect()
    }

    /// Every region at every level containing the point, province first
    pub fn containing(&self, lon: f64, lat: f64) -> Vec<&Region> {
        self.index.containing(Point::new(lon, lat))
    }

    /// Regions of `level` ordered by great-circle distance from their center.
    ///
    /// Regions without a center are not ranked.
    pub fn nearby(&self, lon: f64, lat: f64, level: RegionLevel, limit: usize) -> Vec<NearbyRegion<'_>> {
        let origin = Point::new(lon, lat);

        let mut ranked: Vec<NearbyRegion<'_>> = self
            .store()
            .regions_at_level(level)
            .filter_map(|region| {
                region.center.map(|center| NearbyRegion {
                    region,
                    distance_m: haversine_distance(origin, center),
                })
            })
            .collect();

        ranked.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        ranked.truncate(limit);
        ranked
    }

    pub fn children_of(&self, parent_id: i64) -> Vec<&Region> {
        self.store().children_of(parent_id)
    }

    pub fn find_by_name(&self, fragment: &str) -> Vec<&Region> {
        self.store().find_by_name(fragment)
    }

    /// Get the underlying store (for stats/debugging)
    pub fn store(&self) -> &BoundaryStore {
        self.index.store()
    }
}
