//! Pure-Rust WGS84 ↔ Web Mercator reprojection.
//!
//! Covers EPSG:4326 and EPSG:3857 (spherical Mercator on the WGS84 semi-major
//! axis), the only pair the DEM services need: ground control points are
//! surveyed in 4326 and the merged DEM is resampled to 3857.

use std::f64::consts::FRAC_PI_4;
use std::fmt;

pub const EPSG_WGS84: u32 = 4326;
pub const EPSG_WEB_MERCATOR: u32 = 3857;

// ── Constants ────────────────────────────────────────────────────────────

const EARTH_RADIUS: f64 = 6_378_137.0; // WGS84 semi-major axis (m)
const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59; // atan(sinh(pi)) in degrees

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionError {
    Unsupported { from: u32, to: u32 },
    OutOfDomain { x: f64, y: f64 },
}

impl fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectionError::Unsupported { from, to } => {
                write!(f, "unsupported reprojection EPSG:{} -> EPSG:{}", from, to)
            }
            ProjectionError::OutOfDomain { x, y } => {
                write!(f, "coordinate ({}, {}) is outside the projection domain", x, y)
            }
        }
    }
}

impl std::error::Error for ProjectionError {}

/// Web Mercator and the historical codes that alias it.
pub fn is_web_mercator(epsg: u32) -> bool {
    matches!(epsg, EPSG_WEB_MERCATOR | 900913 | 3785 | 102100)
}

// ── Public API ───────────────────────────────────────────────────────────

/// Transform an `(x, y)` pair between two supported CRSs, axis order x/lon first.
pub fn transform(x: f64, y: f64, from: u32, to: u32) -> Result<(f64, f64), ProjectionError> {
    let from_mercator = is_web_mercator(from);
    let to_mercator = is_web_mercator(to);

    match (from, to) {
        _ if from == to || (from_mercator && to_mercator) => Ok((x, y)),
        (EPSG_WGS84, _) if to_mercator => wgs84_to_web_mercator(x, y),
        (_, EPSG_WGS84) if from_mercator => web_mercator_to_wgs84(x, y),
        _ => Err(ProjectionError::Unsupported { from, to }),
    }
}

/// Longitude/latitude in degrees to Web Mercator metres.
pub fn wgs84_to_web_mercator(lon: f64, lat: f64) -> Result<(f64, f64), ProjectionError> {
    if !(-180.0..=180.0).contains(&lon) || !(-MAX_MERCATOR_LAT..=MAX_MERCATOR_LAT).contains(&lat)
    {
        return Err(ProjectionError::OutOfDomain { x: lon, y: lat });
    }

    let x = EARTH_RADIUS * lon.to_radians();
    let y = EARTH_RADIUS * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
    Ok((x, y))
}

/// Web Mercator metres to longitude/latitude in degrees.
pub fn web_mercator_to_wgs84(x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
    if !x.is_finite() || !y.is_finite() {
        return Err(ProjectionError::OutOfDomain { x, y });
    }

    let lon = (x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - 2.0 * FRAC_PI_4).to_degrees();
    Ok((lon, lat))
}
