//! GeoJSON loading and conversion to `geo` types.
//!
//! Documents are kept as `serde_json::Value` so they can be forwarded to the
//! back-end untouched. Conversion to `geo::Geometry` only happens where a
//! local computation needs it.

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};
use serde_json::{Value, json};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug)]
pub enum GeoJsonError {
    Io(std::io::Error),
    Json(serde_json::Error),
    InvalidGeometry(String),
}

impl fmt::Display for GeoJsonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeoJsonError::Io(e) => write!(f, "I/O error: {}", e),
            GeoJsonError::Json(e) => write!(f, "Failed to parse JSON: {}", e),
            GeoJsonError::InvalidGeometry(msg) => write!(f, "Invalid GeoJSON geometry: {}", msg),
        }
    }
}

impl std::error::Error for GeoJsonError {}

impl From<std::io::Error> for GeoJsonError {
    fn from(err: std::io::Error) -> Self {
        GeoJsonError::Io(err)
    }
}

impl From<serde_json::Error> for GeoJsonError {
    fn from(err: serde_json::Error) -> Self {
        GeoJsonError::Json(err)
    }
}

fn invalid<T>(msg: impl Into<String>) -> Result<T, GeoJsonError> {
    Err(GeoJsonError::InvalidGeometry(msg.into()))
}

/// Reads a GeoJSON document verbatim.
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<Value, GeoJsonError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

pub fn type_of(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

/// Features of a FeatureCollection, or the document itself when it is a single Feature.
pub fn features(value: &Value) -> Vec<&Value> {
    match type_of(value) {
        Some("FeatureCollection") => value
            .get("features")
            .and_then(Value::as_array)
            .map(|features| features.iter().collect())
            .unwrap_or_default(),
        Some("Feature") => vec![value],
        _ => Vec::new(),
    }
}

/// Raw coordinate array of a GeoJSON position, including any elevation.
pub fn position_values(value: &Value) -> Result<Vec<f64>, GeoJsonError> {
    let Some(items) = value.as_array() else {
        return invalid("position is not an array");
    };
    let values = items
        .iter()
        .map(|v| v.as_f64())
        .collect::<Option<Vec<f64>>>();

    match values {
        Some(values) if values.len() >= 2 => Ok(values),
        _ => invalid(format!("position {} needs at least two numbers", value)),
    }
}

fn coord(value: &Value) -> Result<Coord<f64>, GeoJsonError> {
    let values = position_values(value)?;
    Ok(Coord {
        x: values[0],
        y: values[1],
    })
}

fn coord_list(value: &Value) -> Result<Vec<Coord<f64>>, GeoJsonError> {
    value
        .as_array()
        .ok_or_else(|| GeoJsonError::InvalidGeometry("expected an array of positions".into()))?
        .iter()
        .map(coord)
        .collect()
}

fn line_string(value: &Value) -> Result<LineString<f64>, GeoJsonError> {
    Ok(LineString::new(coord_list(value)?))
}

fn polygon(value: &Value) -> Result<Polygon<f64>, GeoJsonError> {
    let Some(rings) = value.as_array() else {
        return invalid("polygon is not an array of rings");
    };
    let mut rings = rings.iter().map(line_string);
    let exterior = match rings.next() {
        Some(ring) => ring?,
        None => return invalid("polygon has no exterior ring"),
    };
    let interiors = rings.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn array_of<'a>(value: &'a Value, what: &str) -> Result<&'a Vec<Value>, GeoJsonError> {
    value
        .as_array()
        .ok_or_else(|| GeoJsonError::InvalidGeometry(format!("{} is not an array", what)))
}

/// Converts a GeoJSON geometry (or the geometry of a Feature) to a `geo::Geometry`.
pub fn to_geometry(value: &Value) -> Result<Geometry<f64>, GeoJsonError> {
    let kind = type_of(value).unwrap_or_default();
    if kind == "Feature" {
        return match value.get("geometry") {
            Some(geometry) if !geometry.is_null() => to_geometry(geometry),
            _ => invalid("feature has no geometry"),
        };
    }

    if kind == "GeometryCollection" {
        let geometries = value
            .get("geometries")
            .map(|g| array_of(g, "geometries"))
            .transpose()?
            .map(|g| g.iter().map(to_geometry).collect::<Result<Vec<_>, _>>())
            .transpose()?
            .unwrap_or_default();
        return Ok(Geometry::GeometryCollection(GeometryCollection(geometries)));
    }

    let Some(coordinates) = value.get("coordinates") else {
        return invalid(format!("'{}' geometry has no coordinates", kind));
    };

    let geometry = match kind {
        "Point" => Geometry::Point(Point::from(coord(coordinates)?)),
        "MultiPoint" => Geometry::MultiPoint(MultiPoint::new(
            coord_list(coordinates)?
                .into_iter()
                .map(Point::from)
                .collect(),
        )),
        "LineString" => Geometry::LineString(line_string(coordinates)?),
        "MultiLineString" => Geometry::MultiLineString(MultiLineString::new(
            array_of(coordinates, "MultiLineString")?
                .iter()
                .map(line_string)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        "Polygon" => Geometry::Polygon(polygon(coordinates)?),
        "MultiPolygon" => Geometry::MultiPolygon(MultiPolygon::new(
            array_of(coordinates, "MultiPolygon")?
                .iter()
                .map(polygon)
                .collect::<Result<Vec<_>, _>>()?,
        )),
        other => return invalid(format!("unsupported geometry type '{}'", other)),
    };

    Ok(geometry)
}

/// GeoJSON Polygon for a `geo::Polygon`.
pub fn from_polygon(polygon: &Polygon<f64>) -> Value {
    let ring = |line: &LineString<f64>| -> Vec<[f64; 2]> {
        line.coords().map(|c| [c.x, c.y]).collect()
    };

    let mut rings = vec![ring(polygon.exterior())];
    rings.extend(polygon.interiors().iter().map(ring));

    json!({
        "type": "Polygon",
        "coordinates": rings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn field() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"name": "field-1"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[5.0, 51.0], [5.1, 51.0], [5.1, 51.1], [5.0, 51.1], [5.0, 51.0]]]
                }
            }]
        })
    }

    #[test]
    fn test_read_geojson_is_verbatim() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("field.geojson");
        let mut file = File::create(&path).unwrap();
        file.write_all(field().to_string().as_bytes()).unwrap();

        assert_eq!(read_geojson(&path).unwrap(), field());
    }

    #[test]
    fn test_read_invalid_json_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.geojson");
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(read_geojson(&path), Err(GeoJsonError::Json(_))));
    }

    #[test]
    fn test_features_of_collection_and_single_feature() {
        let collection = field();
        assert_eq!(features(&collection).len(), 1);

        let single = collection["features"][0].clone();
        assert_eq!(features(&single).len(), 1);

        assert!(features(&json!({"type": "Point", "coordinates": [0, 0]})).is_empty());
    }

    #[test]
    fn test_feature_to_polygon() {
        let collection = field();
        let geometry = to_geometry(features(&collection)[0]).unwrap();
        let Geometry::Polygon(polygon) = geometry else {
            panic!("expected a polygon");
        };
        assert_eq!(polygon.exterior().0.len(), 5);
        assert_eq!(polygon.exterior().0[1], Coord { x: 5.1, y: 51.0 });
    }

    #[test]
    fn test_point_keeps_only_horizontal_coordinates() {
        let geometry = to_geometry(&json!({"type": "Point", "coordinates": [4.5, 50.8, 12.3]})).unwrap();
        assert_eq!(geometry, Geometry::Point(Point::new(4.5, 50.8)));
    }

    #[test]
    fn test_geometry_collection() {
        let geometry = to_geometry(&json!({
            "type": "GeometryCollection",
            "geometries": [
                {"type": "Point", "coordinates": [1.0, 2.0]},
                {"type": "LineString", "coordinates": [[0.0, 0.0], [1.0, 1.0]]}
            ]
        }))
        .unwrap();
        let Geometry::GeometryCollection(collection) = geometry else {
            panic!("expected a collection");
        };
        assert_eq!(collection.0.len(), 2);
    }

    #[test]
    fn test_invalid_geometries() {
        assert!(to_geometry(&json!({"type": "Point", "coordinates": [1.0]})).is_err());
        assert!(to_geometry(&json!({"type": "Polygon", "coordinates": []})).is_err());
        assert!(to_geometry(&json!({"type": "Circle", "coordinates": [0, 0]})).is_err());
        assert!(to_geometry(&json!({"type": "Feature", "geometry": null})).is_err());
    }

    #[test]
    fn test_from_polygon_closes_ring() {
        let polygon = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            vec![],
        );
        let value = from_polygon(&polygon);
        assert_eq!(value["type"], "Polygon");
        assert_eq!(value["coordinates"][0].as_array().unwrap().len(), 4);
        assert_eq!(to_geometry(&value).unwrap(), Geometry::Polygon(polygon));
    }
}
