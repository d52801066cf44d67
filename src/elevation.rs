//! Calibration of a DEM against ground control points (GCPs).
//!
//! Each GCP is an EPSG:4326 `(lon, lat, elevation)` triple. Its horizontal
//! position is reprojected into the raster CRS, the covering cell is sampled,
//! and the DEM offset is the median of `gcp elevation - cell value` over all
//! points. The same computation runs remotely in the `adjust_dem` UDF; this
//! module is the local counterpart used by the `adjust` subcommand.

use log::debug;
use serde_json::Value;
use std::fmt;

use crate::geojson::{self, GeoJsonError};
use crate::projection::{self, EPSG_WEB_MERCATOR, EPSG_WGS84, ProjectionError};
use crate::readers::Raster;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroundControlPoint {
    pub lon: f64,
    pub lat: f64,
    pub elevation: f64,
}

#[derive(Debug)]
pub enum OffsetError {
    NoCoverage { x: f64, y: f64 },
    Projection(ProjectionError),
    InvalidGcp(String),
    NoGcps,
    NoValidDifferences,
}

impl fmt::Display for OffsetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OffsetError::NoCoverage { x, y } => {
                write!(f, "Point: ({},{}) has no value in the DEM", x, y)
            }
            OffsetError::Projection(e) => write!(f, "{}", e),
            OffsetError::InvalidGcp(msg) => write!(f, "Invalid GCP: {}", msg),
            OffsetError::NoGcps => write!(f, "no ground control points given"),
            OffsetError::NoValidDifferences => {
                write!(f, "every ground control point falls on a nodata cell")
            }
        }
    }
}

impl std::error::Error for OffsetError {}

impl From<ProjectionError> for OffsetError {
    fn from(err: ProjectionError) -> Self {
        OffsetError::Projection(err)
    }
}

impl From<GeoJsonError> for OffsetError {
    fn from(err: GeoJsonError) -> Self {
        OffsetError::InvalidGcp(err.to_string())
    }
}

fn point_gcp(geometry: &Value) -> Result<GroundControlPoint, OffsetError> {
    match (geojson::type_of(geometry), geometry.get("coordinates")) {
        (Some("Point"), Some(position)) => position_gcp(position),
        _ => Err(OffsetError::InvalidGcp(format!(
            "expected a Point geometry, got {}",
            geometry
        ))),
    }
}

fn position_gcp(position: &Value) -> Result<GroundControlPoint, OffsetError> {
    let values = geojson::position_values(position)?;
    if values.len() < 3 {
        return Err(OffsetError::InvalidGcp(format!(
            "position {} has no elevation",
            position
        )));
    }

    Ok(GroundControlPoint {
        lon: values[0],
        lat: values[1],
        elevation: values[values.len() - 1],
    })
}

/// Reads GCPs from a GeometryCollection of points, a FeatureCollection of
/// point features, a MultiPoint or a single Point.
pub fn parse_gcps(value: &Value) -> Result<Vec<GroundControlPoint>, OffsetError> {
    match geojson::type_of(value) {
        Some("GeometryCollection") => value
            .get("geometries")
            .and_then(Value::as_array)
            .ok_or_else(|| OffsetError::InvalidGcp("collection has no geometries".to_string()))?
            .iter()
            .map(point_gcp)
            .collect(),
        Some("FeatureCollection") | Some("Feature") => geojson::features(value)
            .into_iter()
            .map(|feature| match feature.get("geometry") {
                Some(geometry) => point_gcp(geometry),
                None => Err(OffsetError::InvalidGcp("feature has no geometry".to_string())),
            })
            .collect(),
        Some("MultiPoint") => value
            .get("coordinates")
            .and_then(Value::as_array)
            .ok_or_else(|| OffsetError::InvalidGcp("MultiPoint has no coordinates".to_string()))?
            .iter()
            .map(position_gcp)
            .collect(),
        Some("Point") => Ok(vec![point_gcp(value)?]),
        other => Err(OffsetError::InvalidGcp(format!(
            "unsupported GCP document type {:?}",
            other
        ))),
    }
}

/// `gcp.elevation - dem value` at the GCP, NaN when the cell is nodata.
pub fn diff_with_gcp(raster: &Raster, gcp: &GroundControlPoint) -> Result<f64, OffsetError> {
    let target = raster.epsg.unwrap_or(EPSG_WEB_MERCATOR);
    let (x, y) = projection::transform(gcp.lon, gcp.lat, EPSG_WGS84, target)?;

    let value = raster
        .sample_nearest(x, y)
        .ok_or(OffsetError::NoCoverage { x, y })?;

    debug!(
        "GCP ({}, {}) -> ({:.3}, {:.3}): reference {} DEM {}",
        gcp.lon, gcp.lat, x, y, gcp.elevation, value
    );

    Ok(gcp.elevation - value as f64)
}

/// Median of the non-NaN values; the mean of the two middle values for even counts.
pub fn nan_median(values: &[f64]) -> Option<f64> {
    let mut valid: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if valid.is_empty() {
        return None;
    }

    valid.sort_by(f64::total_cmp);
    let mid = valid.len() / 2;
    if valid.len() % 2 == 0 {
        Some((valid[mid - 1] + valid[mid]) / 2.0)
    } else {
        Some(valid[mid])
    }
}

/// Robust offset between the DEM and the reference elevations of `gcps`.
pub fn median_offset(raster: &Raster, gcps: &[GroundControlPoint]) -> Result<f64, OffsetError> {
    if gcps.is_empty() {
        return Err(OffsetError::NoGcps);
    }

    let diffs = gcps
        .iter()
        .map(|gcp| diff_with_gcp(raster, gcp))
        .collect::<Result<Vec<f64>, _>>()?;

    nan_median(&diffs).ok_or(OffsetError::NoValidDifferences)
}

/// Shifts every valid cell by `offset`; nodata cells are left alone.
pub fn adjust_raster(raster: &mut Raster, offset: f64) {
    let nodata = raster.nodata;
    for value in raster.buffer.iter_mut() {
        if !value.is_nan() && nodata != Some(*value) {
            *value = (*value as f64 + offset) as f32;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::GeoTransform;
    use serde_json::json;

    const LON: f64 = 5.1;
    const LAT: f64 = 51.2;

    /// 5x5 Web Mercator DEM of 1 m cells centred on (LON, LAT); every cell holds
    /// `base + col`, the centre cell holds `center`.
    fn dem(base: f32, center: f32) -> Raster {
        let (x, y) = projection::wgs84_to_web_mercator(LON, LAT).unwrap();
        let transform = GeoTransform::new(x.floor() - 2.0, y.floor() + 3.0, 1.0, -1.0);
        let mut buffer: Vec<f32> = (0..25).map(|i| base + (i % 5) as f32).collect();
        buffer[12] = center;
        Raster::new(5, 5, buffer, transform).unwrap().with_epsg(3857)
    }

    fn gcp(lon: f64, lat: f64, elevation: f64) -> GroundControlPoint {
        GroundControlPoint {
            lon,
            lat,
            elevation,
        }
    }

    #[test]
    fn test_single_gcp_offset_is_exact() {
        let raster = dem(10.0, 12.25);
        let offset = median_offset(&raster, &[gcp(LON, LAT, 15.75)]).unwrap();
        assert_eq!(offset, 15.75 - 12.25);
    }

    #[test]
    fn test_gcp_outside_coverage_fails() {
        let raster = dem(10.0, 12.25);
        let err = median_offset(&raster, &[gcp(LON, LAT, 15.0), gcp(LON + 0.01, LAT, 15.0)])
            .unwrap_err();

        let OffsetError::NoCoverage { x, y } = err else {
            panic!("expected NoCoverage, got {:?}", err);
        };
        assert!(err.to_string().contains(&format!("({},{})", x, y)));
    }

    #[test]
    fn test_median_ignores_single_outlier() {
        let values = [1.0, 1.2, 0.9, 1.1, 1.0];
        let baseline = nan_median(&values).unwrap();

        let mut with_outlier = values.to_vec();
        with_outlier.push(5_000.0);
        let robust = nan_median(&with_outlier).unwrap();

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        // One extra value moves the median by at most half a gap between order statistics.
        assert!(robust >= sorted[2] && robust <= sorted[3]);
        assert!((robust - baseline).abs() <= 0.05 + 1e-12);
    }

    #[test]
    fn test_median_of_gcps_with_outlier() {
        let raster = dem(100.0, 100.0);
        let gcps = [
            gcp(LON, LAT, 101.0),
            gcp(LON, LAT, 102.0),
            gcp(LON, LAT, 103.0),
            gcp(LON, LAT, 9_999.0),
        ];
        let offset = median_offset(&raster, &gcps).unwrap();
        assert_eq!(offset, 2.5);
    }

    #[test]
    fn test_nan_median() {
        assert_eq!(nan_median(&[3.0, f64::NAN, 1.0, 2.0]), Some(2.0));
        assert_eq!(nan_median(&[4.0, 1.0]), Some(2.5));
        assert_eq!(nan_median(&[f64::NAN]), None);
        assert_eq!(nan_median(&[]), None);
    }

    #[test]
    fn test_nodata_cells_are_ignored() {
        let mut raster = dem(10.0, 12.0);
        raster.nodata = Some(12.0);
        assert!(matches!(
            median_offset(&raster, &[gcp(LON, LAT, 15.0)]),
            Err(OffsetError::NoValidDifferences)
        ));
        assert!(matches!(median_offset(&raster, &[]), Err(OffsetError::NoGcps)));
    }

    #[test]
    fn test_adjust_raster_skips_nodata() {
        let mut raster = Raster::new(3, 1, vec![1.0, -9999.0, f32::NAN], GeoTransform::default())
            .unwrap()
            .with_nodata(-9999.0);
        adjust_raster(&mut raster, 2.5);
        assert_eq!(raster.buffer[0], 3.5);
        assert_eq!(raster.buffer[1], -9999.0);
        assert!(raster.buffer[2].is_nan());
    }

    #[test]
    fn test_parse_gcp_documents() {
        let collection = json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [5.1, 51.2, 25.3]},
                {"type": "Point", "coordinates": [5.2, 51.3, 26.0]}
            ]
        });
        assert_eq!(
            parse_gcps(&collection).unwrap(),
            vec![gcp(5.1, 51.2, 25.3), gcp(5.2, 51.3, 26.0)]
        );

        let features = json!({
            "type": "FeatureCollection",
            "features": [{"type": "Feature", "properties": {}, "geometry": {"type": "Point", "coordinates": [5.1, 51.2, 25.3]}}]
        });
        assert_eq!(parse_gcps(&features).unwrap(), vec![gcp(5.1, 51.2, 25.3)]);

        let multi = json!({"type": "MultiPoint", "coordinates": [[1.0, 2.0, 3.0]]});
        assert_eq!(parse_gcps(&multi).unwrap(), vec![gcp(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn test_gcp_without_elevation_is_rejected() {
        let point = json!({"type": "Point", "coordinates": [5.1, 51.2]});
        assert!(matches!(parse_gcps(&point), Err(OffsetError::InvalidGcp(_))));

        let polygon = json!({"type": "GeometryCollection", "geometries": [
            {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}
        ]});
        assert!(parse_gcps(&polygon).is_err());
    }
}
