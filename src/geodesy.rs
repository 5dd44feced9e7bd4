//! Spherical distance, degree-space search boxes and DMS conversion.

use geo::{Coord, Point, Rect};
use once_cell::sync::Lazy;
use regex::Regex;

/// Mean Earth radius used for every distance in this crate
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Approximate length of one degree of latitude
pub const METERS_PER_DEGREE: f64 = 111_000.0;

/// Great-circle distance in meters between two lon/lat points.
pub fn haversine_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    let lat1 = a.y().to_radians();
    let lat2 = b.y().to_radians();
    let dlat = (b.y() - a.y()).to_radians();
    let dlon = (b.x() - a.x()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Degree-space rectangle enclosing the circle of `radius_m` around `center`.
///
/// Uses the equirectangular approximation: one degree of latitude is 111 km and a
/// degree of longitude shrinks with cos(latitude). The rectangle is a superset of
/// the circle, so it can be used as a pre-filter before an exact distance check.
pub fn radius_bbox(center: Point<f64>, radius_m: f64) -> Rect<f64> {
    let lat_delta = radius_m / METERS_PER_DEGREE;
    let lon_delta = radius_m / (METERS_PER_DEGREE * center.y().to_radians().cos());

    Rect::new(
        Coord {
            x: center.x() - lon_delta,
            y: center.y() - lat_delta,
        },
        Coord {
            x: center.x() + lon_delta,
            y: center.y() + lat_delta,
        },
    )
}

/// [`radius_bbox`] folded back into [-180, 180] longitude.
///
/// A box crossing the antimeridian is split into two; a box spanning every longitude
/// (near the poles) becomes a single full-width band.
pub fn radius_bboxes(center: Point<f64>, radius_m: f64) -> Vec<Rect<f64>> {
    let bbox = radius_bbox(center, radius_m);
    let (min, max) = (bbox.min(), bbox.max());

    let band = |min_x: f64, max_x: f64| {
        Rect::new(Coord { x: min_x, y: min.y }, Coord { x: max_x, y: max.y })
    };

    if !(max.x - min.x < 360.0) {
        vec![band(-180.0, 180.0)]
    } else if min.x < -180.0 {
        vec![band(min.x + 360.0, 180.0), band(-180.0, max.x)]
    } else if max.x > 180.0 {
        vec![band(min.x, 180.0), band(-180.0, max.x - 360.0)]
    } else {
        vec![bbox]
    }
}

/// Degrees, minutes, seconds to decimal degrees
pub fn degrees_from_dms(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}

static NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid"));

/// Parse a textual DMS value such as `110°3′`, `23°13'30"N`, `110 3 0` or `-23.5`.
///
/// Up to three numbers are read as degrees, minutes and seconds. A trailing `S` or `W`
/// (or a leading minus sign) makes the result negative.
pub fn parse_dms(input: &str) -> Option<f64> {
    let numbers: Vec<f64> = NUMBER
        .find_iter(input)
        .map(|m| m.as_str().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;

    if numbers.is_empty() || numbers.len() > 3 {
        return None;
    }

    let negative = numbers[0].is_sign_negative()
        || input
            .trim_end()
            .ends_with(|c: char| matches!(c, 'S' | 's' | 'W' | 'w'));

    let degrees = numbers[0].abs();
    let minutes = numbers.get(1).copied().unwrap_or(0.0);
    let seconds = numbers.get(2).copied().unwrap_or(0.0);

    let value = degrees_from_dms(degrees, minutes, seconds);
    Some(if negative { -value } else { value })
}
