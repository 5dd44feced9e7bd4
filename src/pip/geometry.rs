//! Containment primitives: the bounding box pre-filter and the ray casting test.
//!
//! Everything here is a pure function. A point lying exactly on a ring edge or vertex
//! gets whatever answer the floating point arithmetic produces; callers must not rely
//! on either outcome.

use geo::{Coord, LineString, Point, Rect};

use crate::models::Region;

/// Inclusive range check on both axes
pub fn point_in_bbox(p: Point<f64>, bbox: &Rect<f64>) -> bool {
    let (min, max) = (bbox.min(), bbox.max());
    min.x <= p.x() && p.x() <= max.x && min.y <= p.y() && p.y() <= max.y
}

/// Ray casting test against a single ring.
///
/// A horizontal ray is cast from the point towards increasing longitude. An edge is a
/// crossing candidate when exactly one of its endpoints lies strictly above the query
/// latitude; the ray crosses it when the query longitude is left of the edge's
/// interpolated longitude. An odd number of crossings means inside.
pub fn point_in_ring(p: Point<f64>, ring: &LineString<f64>) -> bool {
    let coords = &ring.0;
    if coords.len() < 3 {
        return false;
    }

    let (lon, lat) = (p.x(), p.y());
    let mut inside = false;

    // Start with the closing edge (last -> first)
    let mut prev = coords[coords.len() - 1];
    for &cur in coords {
        let Coord { x: xi, y: yi } = cur;
        let Coord { x: xj, y: yj } = prev;

        if (yi > lat) != (yj > lat) && lon < (xj - xi) * (lat - yi) / (yj - yi) + xi {
            inside = !inside;
        }

        prev = cur;
    }

    inside
}

/// Bounding box pre-filter followed by the ring test.
///
/// A region without a bounding box has no valid rings and never contains anything.
/// With several rings the region is their union.
pub fn point_in_region(p: Point<f64>, region: &Region) -> bool {
    let Some(bbox) = region.bbox.as_ref() else {
        return false;
    };

    if !point_in_bbox(p, bbox) {
        return false;
    }

    region.rings.iter().any(|ring| point_in_ring(p, ring))
}

/// Min/max envelope of every point of every ring
pub fn rings_envelope(rings: &[LineString<f64>]) -> Option<Rect<f64>> {
    let mut coords = rings.iter().flat_map(|ring| ring.0.iter());
    let first = *coords.next()?;

    let (min, max) = coords.fold((first, first), |(min, max), c| {
        (
            Coord {
                x: min.x.min(c.x),
                y: min.y.min(c.y),
            },
            Coord {
                x: max.x.max(c.x),
                y: max.y.max(c.y),
            },
        )
    });

    Some(Rect::new(min, max))
}
