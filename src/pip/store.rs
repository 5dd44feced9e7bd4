//! In-memory boundary store.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use hashbrown::HashMap;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::info;

use super::boundary::load_boundaries;
use crate::error::Result;
use crate::models::{Region, RegionLevel};
use crate::source::LoadReport;

/// Region counts per level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub provinces: usize,
    pub cities: usize,
    pub districts: usize,
}

/// All regions, grouped by level and indexed by id. Immutable once built.
///
/// Per-level insertion order is preserved; it is the match priority used by the
/// resolver when boundaries overlap.
#[derive(Debug, Default)]
pub struct BoundaryStore {
    regions: Vec<Region>,
    by_level: [Vec<usize>; 3],
    by_id: HashMap<i64, usize>,
    children: HashMap<i64, Vec<usize>>,
}

impl BoundaryStore {
    /// Build the store from parsed regions
    pub fn build(regions: Vec<Region>) -> Self {
        let mut by_level: [Vec<usize>; 3] = Default::default();
        let mut by_id = HashMap::with_capacity(regions.len());
        let mut children: HashMap<i64, Vec<usize>> = HashMap::new();

        for (idx, region) in regions.iter().enumerate() {
            by_level[region.level.depth() as usize].push(idx);
            // A repeated id points at the last row carrying it
            by_id.insert(region.id, idx);
            children.entry(region.parent_id).or_default().push(idx);
        }

        let store = Self {
            regions,
            by_level,
            by_id,
            children,
        };

        let stats = store.stats();
        info!(
            "Boundary store built: {} provinces, {} cities, {} districts",
            stats.provinces, stats.cities, stats.districts
        );

        store
    }

    /// Load and build the store from a boundary file
    pub fn load(path: &Path) -> Result<(Self, LoadReport)> {
        let (regions, report) = load_boundaries(path)?;
        Ok((Self::build(regions), report))
    }

    /// Regions of one level in insertion order
    pub fn regions_at_level(&self, level: RegionLevel) -> impl Iterator<Item = &Region> + '_ {
        self.by_level[level.depth() as usize]
            .iter()
            .map(|&idx| &self.regions[idx])
    }

    pub fn region_by_id(&self, id: i64) -> Option<&Region> {
        self.by_id.get(&id).map(|&idx| &self.regions[idx])
    }

    /// Direct children of a region, in insertion order
    pub fn children_of(&self, parent_id: i64) -> Vec<&Region> {
        self.children
            .get(&parent_id)
            .map(|ids| ids.iter().map(|&idx| &self.regions[idx]).collect())
            .unwrap_or_default()
    }

    /// Regions whose name or full path contains `fragment`, coarsest level first
    pub fn find_by_name(&self, fragment: &str) -> Vec<&Region> {
        let mut found: Vec<&Region> = self
            .regions
            .iter()
            .filter(|r| r.name.contains(fragment) || r.full_path.contains(fragment))
            .collect();
        found.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.name.cmp(&b.name)));
        found
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            provinces: self.by_level[0].len(),
            cities: self.by_level[1].len(),
            districts: self.by_level[2].len(),
        }
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Lazily loads a [`BoundaryStore`] from disk exactly once.
///
/// Concurrent first callers block on the same initialization; only one of them
/// parses the file. A failed load leaves the loader empty so a later call can retry.
pub struct BoundaryLoader {
    path: PathBuf,
    store: OnceCell<(Arc<BoundaryStore>, LoadReport)>,
}

impl BoundaryLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            store: OnceCell::new(),
        }
    }

    /// Load on first use; later calls return the same store without touching the file
    pub fn load(&self) -> Result<Arc<BoundaryStore>> {
        self.store
            .get_or_try_init(|| {
                let (store, report) = BoundaryStore::load(&self.path)?;
                Ok((Arc::new(store), report))
            })
            .map(|(store, _)| Arc::clone(store))
    }

    /// Report of the completed load, if any
    pub fn report(&self) -> Option<LoadReport> {
        self.store.get().map(|(_, report)| *report)
    }

    pub fn is_loaded(&self) -> bool {
        self.store.get().is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
