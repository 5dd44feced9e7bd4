//! Boundary source parsing.
//!
//! Each source row is `id,parentId,level,name,fullPath,center,rings`. The center is
//! `"lon lat"` and the rings field is `"lon lat,lon lat,...;lon lat,..."` where `;`
//! separates land masses and `~` starts a hole. Either may be `EMPTY`.

use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use geo::{Coord, LineString, Point};
use tracing::{debug, info};

use crate::error::{RecordError, Result};
use crate::models::{Region, RegionLevel};
use crate::pip::geometry::rings_envelope;
use crate::source::{open_source, LoadReport};

/// Rows with fewer fields than this are rejected
pub const MIN_FIELDS: usize = 5;

const EMPTY_MARKER: &str = "EMPTY";
const LAND_SEPARATOR: char = ';';
const HOLE_MARKER: char = '~';

fn is_empty_field(field: &str) -> bool {
    let field = field.trim();
    field.is_empty() || field == EMPTY_MARKER
}

fn parse_int(field: &'static str, value: &str) -> std::result::Result<i64, RecordError> {
    value
        .trim()
        .trim_start_matches('\u{feff}')
        .parse()
        .map_err(|_| RecordError::BadNumber {
            field,
            value: value.to_string(),
        })
}

fn parse_coord(value: &str) -> std::result::Result<Coord<f64>, RecordError> {
    let mut parts = value.split_whitespace();
    let lon = parts.next().unwrap_or_default();
    let lat = parts.next().unwrap_or_default();

    let parse = |s: &str| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| RecordError::BadNumber {
                field: "rings",
                value: value.to_string(),
            })
    };

    Ok(Coord {
        x: parse(lon)?,
        y: parse(lat)?,
    })
}

/// Parse a `"lon lat"` center. Absent or malformed centers yield `None`.
pub fn parse_center(field: &str) -> Option<Point<f64>> {
    if is_empty_field(field) {
        return None;
    }

    let parts: Vec<&str> = field.split_whitespace().collect();
    if parts.len() != 2 {
        return None;
    }

    let lon = parts[0].parse::<f64>().ok()?;
    let lat = parts[1].parse::<f64>().ok()?;
    Some(Point::new(lon, lat))
}

/// Parse the rings field.
///
/// Only the outer ring of each land mass is kept; anything after a hole marker is
/// dropped. Coordinates that are not exactly two tokens are ignored, rings left with
/// fewer than three points are dropped, and a token that is not a number rejects the
/// whole field.
pub fn parse_rings(field: &str) -> std::result::Result<Vec<LineString<f64>>, RecordError> {
    if is_empty_field(field) {
        return Ok(Vec::new());
    }

    let mut rings = Vec::new();

    for part in field.split(LAND_SEPARATOR) {
        let outer = part.split(HOLE_MARKER).next().unwrap_or_default();
        if outer.trim().is_empty() {
            continue;
        }

        let mut coords = Vec::new();
        for coord in outer.split(',') {
            let coord = coord.trim();
            if coord.is_empty() || coord.split_whitespace().count() != 2 {
                continue;
            }
            coords.push(parse_coord(coord)?);
        }

        if coords.len() >= 3 {
            rings.push(LineString::new(coords));
        }
    }

    Ok(rings)
}

/// Parse one source row into a region.
pub fn parse_record(record: &StringRecord) -> std::result::Result<Region, RecordError> {
    if record.len() < MIN_FIELDS {
        return Err(RecordError::TooFewFields {
            expected: MIN_FIELDS,
            found: record.len(),
        });
    }

    let id = parse_int("id", &record[0])?;
    let parent_id = parse_int("parent_id", &record[1])?;
    let depth = parse_int("level", &record[2])?;
    let level = RegionLevel::from_depth(depth).ok_or(RecordError::UnknownLevel(depth))?;

    let center = record.get(5).and_then(parse_center);
    let rings = match record.get(6) {
        Some(field) => parse_rings(field)?,
        None => Vec::new(),
    };

    Ok(Region {
        id,
        parent_id,
        level,
        name: record[3].trim().to_string(),
        full_path: record[4].trim().to_string(),
        center,
        bbox: rings_envelope(&rings),
        rings,
    })
}

/// Read every region from a CSV stream, skipping malformed rows.
pub fn read_boundaries<R: Read>(reader: R) -> Result<(Vec<Region>, LoadReport)> {
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut regions = Vec::new();
    let mut report = LoadReport::default();

    for (row, result) in csv_reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            // Broken UTF-8 and similar row-level damage only costs that row
            Err(e) if !e.is_io_error() => {
                debug!("Skipping unreadable boundary row {}: {}", row, e);
                report.skipped += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        match parse_record(&record) {
            Ok(region) => {
                regions.push(region);
                report.loaded += 1;
            }
            Err(e) => {
                debug!("Skipping boundary row {}: {}", row, e);
                report.skipped += 1;
            }
        }
    }

    Ok((regions, report))
}

/// Load regions from a boundary file (`.csv` or `.csv.gz`).
pub fn load_boundaries(path: &Path) -> Result<(Vec<Region>, LoadReport)> {
    info!("Loading boundaries from {}", path.display());

    let reader = open_source(path)?;
    let (regions, report) = read_boundaries(reader)?;

    info!(
        "Parsed {} regions ({} skipped) from {}",
        report.loaded,
        report.skipped,
        path.display()
    );

    Ok((regions, report))
}
