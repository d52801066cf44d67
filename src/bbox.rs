use geo::{BoundingRect, Geometry, Polygon, Rect, coord};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geojson::{self, GeoJsonError};

/// Outward buffer, in degrees, applied around a field before it is used as a mask.
pub const BBOX_BUFFER: f64 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Bbox {
    pub xmin: f64,
    pub xmax: f64,
    pub ymin: f64,
    pub ymax: f64,
}

impl Bbox {
    pub fn new(xmin: f64, xmax: f64, ymin: f64, ymax: f64) -> Result<Self, String> {
        if ![xmin, xmax, ymin, ymax].iter().all(|v| v.is_finite()) {
            return Err("Bounds must be finite numbers".to_string());
        }

        if xmin > xmax || ymin > ymax {
            return Err("Min values must be <= max values".to_string());
        }

        Ok(Bbox {
            xmin,
            xmax,
            ymin,
            ymax,
        })
    }

    /// Axis-aligned bounds of a geometry, `None` when it has no finite coordinates.
    pub fn from_geometry(geometry: &Geometry<f64>) -> Option<Self> {
        let rect = geometry.bounding_rect()?;
        Bbox::new(rect.min().x, rect.max().x, rect.min().y, rect.max().y).ok()
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Rectangle grown by `distance` on every side with mitred corners.
    ///
    /// A mitre join keeps the right angles of the box, so the result is again
    /// axis-aligned and each bound moves by exactly `distance`. A negative
    /// distance shrinks the box but never past its centre line.
    pub fn buffered(&self, distance: f64) -> Bbox {
        let dx = distance.max(-self.width() / 2.0);
        let dy = distance.max(-self.height() / 2.0);

        Bbox {
            xmin: self.xmin - dx,
            xmax: self.xmax + dx,
            ymin: self.ymin - dy,
            ymax: self.ymax + dy,
        }
    }

    pub fn to_polygon(&self) -> Polygon<f64> {
        Rect::new(
            coord! { x: self.xmin, y: self.ymin },
            coord! { x: self.xmax, y: self.ymax },
        )
        .to_polygon()
    }
}

/// Bounding box of `geometry` buffered by `distance`, [`BBOX_BUFFER`] for fields.
pub fn create_bbox(geometry: &Geometry<f64>, distance: f64) -> Option<Polygon<f64>> {
    Bbox::from_geometry(geometry).map(|bbox| bbox.buffered(distance).to_polygon())
}

/// Replaces the geometry of every feature with its buffered bounding box.
///
/// Accepts a FeatureCollection, a single Feature or a bare geometry; the
/// properties of each feature are kept.
pub fn buffer_features(value: &Value, distance: f64) -> Result<Value, GeoJsonError> {
    let buffered = |geometry: &Value| -> Result<Value, GeoJsonError> {
        let geometry = geojson::to_geometry(geometry)?;
        let polygon = create_bbox(&geometry, distance).ok_or_else(|| {
            GeoJsonError::InvalidGeometry("geometry has no finite coordinates".to_string())
        })?;
        Ok(geojson::from_polygon(&polygon))
    };

    let mut result = value.clone();
    match geojson::type_of(value) {
        Some("FeatureCollection") => {
            if let Some(features) = result.get_mut("features").and_then(Value::as_array_mut) {
                for feature in features {
                    let polygon = buffered(feature)?;
                    feature["geometry"] = polygon;
                }
            }
        }
        Some("Feature") => {
            result["geometry"] = buffered(value)?;
        }
        _ => result = buffered(value)?,
    }

    Ok(result)
}

#[cfg(test)]
mod test {
    use crate::bbox::{BBOX_BUFFER, Bbox, buffer_features, create_bbox};
    use geo::{Contains, Geometry, LineString, Point, Polygon};
    use serde_json::json;

    fn convex_field() -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (5.00, 51.00),
                (5.04, 50.98),
                (5.08, 51.01),
                (5.06, 51.05),
                (5.01, 51.04),
                (5.00, 51.00),
            ]),
            vec![],
        )
    }

    fn encloses(outer: &Bbox, inner: &Bbox) -> bool {
        outer.xmin <= inner.xmin
            && outer.xmax >= inner.xmax
            && outer.ymin <= inner.ymin
            && outer.ymax >= inner.ymax
    }

    #[test]
    fn test_bbox_bounds_are_validated() {
        assert!(Bbox::new(-67.2, -58.7, 70.9, 73.3).is_ok());
        assert!(Bbox::new(557_000.0, 558_000.0, 6_625_000.0, 6_626_000.0).is_ok());

        // Test min > max
        assert!(Bbox::new(10.0, 0.0, 0.0, 10.0).is_err());
        assert!(Bbox::new(0.0, 10.0, 10.0, 0.0).is_err());
        assert!(Bbox::new(f64::NAN, 10.0, 0.0, 10.0).is_err());
        assert!(Bbox::new(0.0, f64::INFINITY, 0.0, 10.0).is_err());
    }

    #[test]
    fn test_non_finite_geometry_has_no_bbox() {
        let geometry = Geometry::Point(Point::new(f64::NAN, 50.0));
        assert_eq!(Bbox::from_geometry(&geometry), None);
        assert_eq!(create_bbox(&geometry, BBOX_BUFFER), None);
    }

    #[test]
    fn test_buffered_bbox_contains_convex_polygon() {
        let field = convex_field();
        let original = Bbox::from_geometry(&Geometry::Polygon(field.clone())).unwrap();
        let buffered = original.buffered(BBOX_BUFFER);

        assert!(buffered.to_polygon().contains(&field));
        assert!(original.xmin - buffered.xmin >= BBOX_BUFFER - 1e-12);
        assert!(buffered.xmax - original.xmax >= BBOX_BUFFER - 1e-12);
        assert!(original.ymin - buffered.ymin >= BBOX_BUFFER - 1e-12);
        assert!(buffered.ymax - original.ymax >= BBOX_BUFFER - 1e-12);
    }

    #[test]
    fn test_buffer_is_monotonic() {
        let bbox = Bbox::from_geometry(&Geometry::Polygon(convex_field())).unwrap();
        let distances = [-0.5, -0.01, 0.0, 0.0005, 0.001, 0.01, 1.0];

        for pair in distances.windows(2) {
            let smaller = bbox.buffered(pair[0]);
            let larger = bbox.buffered(pair[1]);
            assert!(encloses(&larger, &smaller), "{:?} vs {:?}", pair, (smaller, larger));
        }
    }

    #[test]
    fn test_negative_buffer_never_inverts() {
        let bbox = Bbox::new(0.0, 2.0, 0.0, 1.0).unwrap();
        let shrunk = bbox.buffered(-5.0);
        assert!(shrunk.xmin <= shrunk.xmax);
        assert!(shrunk.ymin <= shrunk.ymax);
        assert_eq!(shrunk.xmin, 1.0);
        assert_eq!(shrunk.ymin, 0.5);
    }

    #[test]
    fn test_create_bbox_of_point() {
        let polygon = create_bbox(&Geometry::Point(Point::new(4.0, 50.0)), BBOX_BUFFER).unwrap();
        let bbox = Bbox::from_geometry(&Geometry::Polygon(polygon)).unwrap();
        assert!((bbox.width() - 2.0 * BBOX_BUFFER).abs() < 1e-12);
        assert!((bbox.height() - 2.0 * BBOX_BUFFER).abs() < 1e-12);
    }

    #[test]
    fn test_buffer_features_keeps_properties() {
        let collection = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"id": 7},
                "geometry": {"type": "Point", "coordinates": [3.0, 51.0]}
            }]
        });

        let result = buffer_features(&collection, 0.5).unwrap();
        let feature = &result["features"][0];
        assert_eq!(feature["properties"]["id"], 7);
        assert_eq!(feature["geometry"]["type"], "Polygon");
        assert_eq!(feature["geometry"]["coordinates"][0][0], json!([3.5, 50.5]));
    }
}
