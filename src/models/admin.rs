//! Administrative region types for point-in-region lookup.

use std::fmt;
use std::str::FromStr;

use geo::{LineString, Point, Rect};
use serde::{Deserialize, Serialize};

/// The three administrative levels present in the boundary source.
///
/// The numeric depth (0, 1, 2) is the value stored in the source's `level` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RegionLevel {
    /// Province / municipality / autonomous region (depth 0)
    Province,
    /// Prefecture-level city (depth 1)
    City,
    /// District / county (depth 2)
    District,
}

impl RegionLevel {
    /// Convert a source depth value to a level
    pub fn from_depth(depth: i64) -> Option<Self> {
        match depth {
            0 => Some(RegionLevel::Province),
            1 => Some(RegionLevel::City),
            2 => Some(RegionLevel::District),
            _ => None,
        }
    }

    pub fn depth(&self) -> u8 {
        match self {
            RegionLevel::Province => 0,
            RegionLevel::City => 1,
            RegionLevel::District => 2,
        }
    }

    /// All levels in hierarchical order (province first)
    pub fn all() -> &'static [RegionLevel] {
        &[RegionLevel::Province, RegionLevel::City, RegionLevel::District]
    }

    /// Levels in resolution order (finest first)
    pub fn search_order() -> &'static [RegionLevel] {
        &[RegionLevel::District, RegionLevel::City, RegionLevel::Province]
    }

    pub fn field_name(&self) -> &'static str {
        match self {
            RegionLevel::Province => "province",
            RegionLevel::City => "city",
            RegionLevel::District => "district",
        }
    }
}

impl fmt::Display for RegionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

impl FromStr for RegionLevel {
    type Err = String;

    /// Accepts either the level name or its numeric depth.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "province" | "0" => Ok(RegionLevel::Province),
            "city" | "1" => Ok(RegionLevel::City),
            "district" | "2" => Ok(RegionLevel::District),
            other => Err(format!("unknown region level: {other}")),
        }
    }
}

/// A single administrative region with its boundary rings.
///
/// Each ring is one outer boundary; several rings describe disjoint land masses
/// (islands, exclaves). Holes are never stored.
#[derive(Debug, Clone)]
pub struct Region {
    pub id: i64,

    /// Parent region id, 0 for top-level regions
    pub parent_id: i64,

    pub level: RegionLevel,

    /// Short display name, e.g. "浦东新区"
    pub name: String,

    /// Space-joined ancestor names down to this region, e.g. "上海市 上海市 浦东新区"
    pub full_path: String,

    pub center: Option<Point<f64>>,

    /// Envelope of every ring point; `None` iff `rings` is empty
    pub bbox: Option<Rect<f64>>,

    pub rings: Vec<LineString<f64>>,
}

impl Region {
    /// Whitespace-separated tokens of `full_path`, province first
    pub fn path_tokens(&self) -> impl Iterator<Item = &str> {
        self.full_path.split_whitespace()
    }

    pub fn summary(&self) -> RegionSummary {
        RegionSummary {
            id: self.id,
            parent_id: self.parent_id,
            level: self.level,
            name: self.name.clone(),
            full_path: self.full_path.clone(),
            center: self.center.map(|p| [p.x(), p.y()]),
            bbox: self
                .bbox
                .map(|r| [r.min().x, r.min().y, r.max().x, r.max().y]),
            ring_count: self.rings.len(),
        }
    }
}

/// Serializable view of a [`Region`] without its geometry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionSummary {
    pub id: i64,
    pub parent_id: i64,
    pub level: RegionLevel,
    pub name: String,
    pub full_path: String,

    /// `[lon, lat]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<[f64; 2]>,

    /// `[minLon, minLat, maxLon, maxLat]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[f64; 4]>,

    pub ring_count: usize,
}

/// Result of resolving a coordinate.
///
/// All fields absent means the point lies outside every known boundary. That is a
/// normal outcome, not a failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,

    /// Level of the region that matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<RegionLevel>,

    /// Id of the region that matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_id: Option<i64>,
}

impl Location {
    /// Build a location from the region that matched.
    ///
    /// Coarser levels are taken from `full_path`: token 0 is the province and token 1
    /// (when present) the city. A province match carries only its own name.
    pub fn from_region(region: &Region) -> Self {
        let mut location = Location {
            full_path: Some(region.full_path.clone()),
            level: Some(region.level),
            region_id: Some(region.id),
            ..Default::default()
        };

        let mut tokens = region.path_tokens();
        match region.level {
            RegionLevel::District => {
                location.province = tokens.next().map(str::to_string);
                location.city = tokens.next().map(str::to_string);
                location.district = Some(region.name.clone());
            }
            RegionLevel::City => {
                location.province = tokens.next().map(str::to_string);
                location.city = Some(region.name.clone());
            }
            RegionLevel::Province => {
                location.province = Some(region.name.clone());
            }
        }

        location
    }

    pub fn is_found(&self) -> bool {
        self.province.is_some() || self.city.is_some() || self.district.is_some()
    }

    pub fn get(&self, level: RegionLevel) -> Option<&str> {
        match level {
            RegionLevel::Province => self.province.as_deref(),
            RegionLevel::City => self.city.as_deref(),
            RegionLevel::District => self.district.as_deref(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = RegionLevel::all()
            .iter()
            .filter_map(|level| self.get(*level))
            .collect();

        if parts.is_empty() {
            f.write_str("<not found>")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(level: RegionLevel, name: &str, full_path: &str) -> Region {
        Region {
            id: 1,
            parent_id: 0,
            level,
            name: name.to_string(),
            full_path: full_path.to_string(),
            center: None,
            bbox: None,
            rings: Vec::new(),
        }
    }

    #[test]
    fn test_district_location_takes_ancestors_from_path() {
        let r = region(RegionLevel::District, "浦东新区", "上海市 上海市 浦东新区");
        let loc = Location::from_region(&r);
        assert_eq!(loc.province.as_deref(), Some("上海市"));
        assert_eq!(loc.city.as_deref(), Some("上海市"));
        assert_eq!(loc.district.as_deref(), Some("浦东新区"));
        assert_eq!(loc.level, Some(RegionLevel::District));
        assert_eq!(loc.to_string(), "上海市 上海市 浦东新区");
    }

    #[test]
    fn test_city_location_has_no_district() {
        let r = region(RegionLevel::City, "梧州市", "广西壮族自治区 梧州市");
        let loc = Location::from_region(&r);
        assert_eq!(loc.province.as_deref(), Some("广西壮族自治区"));
        assert_eq!(loc.city.as_deref(), Some("梧州市"));
        assert!(loc.district.is_none());
    }

    #[test]
    fn test_short_path_leaves_city_absent() {
        let r = region(RegionLevel::District, "某区", "某省");
        let loc = Location::from_region(&r);
        assert_eq!(loc.province.as_deref(), Some("某省"));
        assert!(loc.city.is_none());
        assert_eq!(loc.district.as_deref(), Some("某区"));
    }

    #[test]
    fn test_default_location_is_not_found() {
        let loc = Location::default();
        assert!(!loc.is_found());
        assert_eq!(loc.to_string(), "<not found>");
        assert_eq!(serde_json::to_string(&loc).unwrap(), "{}");
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!("district".parse::<RegionLevel>(), Ok(RegionLevel::District));
        assert_eq!("0".parse::<RegionLevel>(), Ok(RegionLevel::Province));
        assert!("county".parse::<RegionLevel>().is_err());
        assert_eq!(RegionLevel::from_depth(1), Some(RegionLevel::City));
        assert_eq!(RegionLevel::from_depth(3), None);
    }
}
