//! Workspace of named layers.
//!
//! Source layers are read from shapefiles (or GeoJSON) in the data directory;
//! every generated layer is written to the workspace as a GeoJSON
//! FeatureCollection named `<layer>.geojson`. Workspace layers shadow data
//! layers of the same name.

use geo::{Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};
use geojson::GeoJson;
use shapefile::dbase::{FieldValue, Record as DbfRecord};
use shapefile::{PolygonRing, Shape};
use std::path::{Path, PathBuf};

use crate::domain::model::{Feature, Layer};
use crate::utils::error::{Result, WnvError};
use crate::utils::validation::validate_layer_name;

#[derive(Debug, Clone)]
pub struct LayerStore {
    data_dir: PathBuf,
    workspace: PathBuf,
    overwrite: bool,
}

impl LayerStore {
    pub fn new(data_dir: impl Into<PathBuf>, workspace: impl Into<PathBuf>, overwrite: bool) -> Self {
        Self {
            data_dir: data_dir.into(),
            workspace: workspace.into(),
            overwrite,
        }
    }

    pub fn workspace_path(&self, name: &str) -> PathBuf {
        self.workspace.join(format!("{}.geojson", name))
    }

    fn source_candidates(&self, name: &str) -> [PathBuf; 3] {
        [
            self.workspace_path(name),
            self.data_dir.join(format!("{}.shp", name)),
            self.data_dir.join(format!("{}.geojson", name)),
        ]
    }

    pub fn exists(&self, name: &str) -> bool {
        self.source_candidates(name).iter().any(|p| p.exists())
    }

    /// Reads a layer from the workspace, falling back to the data directory.
    pub fn resolve(&self, name: &str) -> Result<Layer> {
        let path = self
            .source_candidates(name)
            .into_iter()
            .find(|p| p.exists())
            .ok_or_else(|| WnvError::LayerNotFound {
                name: name.to_string(),
            })?;

        tracing::debug!("Reading layer '{}' from {}", name, path.display());
        let layer = match path.extension().and_then(|e| e.to_str()) {
            Some("shp") => read_shapefile(name, &path)?,
            _ => read_geojson(name, &path)?,
        };
        ensure_geographic(&layer, &path)?;
        tracing::debug!("Layer '{}' has {} features", name, layer.len());
        Ok(layer)
    }

    /// Writes a generated layer, replacing an existing one when overwriting is allowed.
    pub fn save(&self, layer: &Layer) -> Result<PathBuf> {
        validate_layer_name(&layer.name)?;
        std::fs::create_dir_all(&self.workspace)?;

        let path = self.workspace_path(&layer.name);
        if path.exists() {
            if !self.overwrite {
                return Err(WnvError::LayerExists {
                    name: layer.name.clone(),
                });
            }
            tracing::warn!("'{}' already exists - deleting existing layer", layer.name);
            self.delete(&layer.name)?;
        } else {
            tracing::debug!("'{}' does not exist yet", layer.name);
        }

        let collection = to_feature_collection(layer);
        std::fs::write(&path, serde_json::to_vec(&collection)?)?;
        tracing::info!("💾 Layer '{}' saved ({} features)", layer.name, layer.len());
        Ok(path)
    }

    /// Removes a generated layer; returns whether one was present.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let path = self.workspace_path(name);
        if path.exists() {
            std::fs::remove_file(&path)?;
            tracing::debug!("Deleted workspace layer '{}'", name);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Buffers and areas assume WGS84 lon/lat input. Projected layers (a `.prj`
/// with `PROJCS`, or coordinates outside the degree ranges) are refused.
fn ensure_geographic(layer: &Layer, path: &Path) -> Result<()> {
    let prj = path.with_extension("prj");
    if prj.exists() {
        let wkt = std::fs::read_to_string(&prj)?;
        if wkt.trim_start().to_ascii_uppercase().starts_with("PROJCS") {
            return Err(WnvError::GeometryError {
                operation: format!("reading '{}'", layer.name),
                message: format!(
                    "{} declares a projected coordinate system; reproject the layer to WGS84 lon/lat",
                    prj.display()
                ),
            });
        }
    }

    if let Some(rect) = layer.bounding_rect() {
        let (min, max) = (rect.min(), rect.max());
        let in_range = min.x >= -180.0 && max.x <= 180.0 && min.y >= -90.0 && max.y <= 90.0;
        if !in_range {
            return Err(WnvError::GeometryError {
                operation: format!("reading '{}'", layer.name),
                message: format!(
                    "coordinates span ({:.1}, {:.1})..({:.1}, {:.1}), which is not lon/lat; reproject the layer to WGS84",
                    min.x, min.y, max.x, max.y
                ),
            });
        }
    }
    Ok(())
}

fn to_feature_collection(layer: &Layer) -> geojson::FeatureCollection {
    let features = layer
        .features
        .iter()
        .map(|f| geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&f.geometry))),
            id: None,
            properties: Some(f.properties.clone()),
            foreign_members: None,
        })
        .collect();

    geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn geojson_feature(feature: geojson::Feature) -> Result<Option<Feature>> {
    let Some(geometry) = feature.geometry else {
        return Ok(None);
    };
    Ok(Some(Feature {
        geometry: Geometry::<f64>::try_from(geometry)?,
        properties: feature.properties.unwrap_or_default(),
    }))
}

pub fn read_geojson(name: &str, path: &Path) -> Result<Layer> {
    let text = std::fs::read_to_string(path)?;
    let features = match text.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .filter_map(|f| geojson_feature(f).transpose())
            .collect::<Result<Vec<_>>>()?,
        GeoJson::Feature(f) => geojson_feature(f)?.into_iter().collect(),
        GeoJson::Geometry(g) => vec![Feature::new(Geometry::<f64>::try_from(g)?)],
    };
    Ok(Layer::new(name, features))
}

pub fn read_shapefile(name: &str, path: &Path) -> Result<Layer> {
    let mut reader = shapefile::Reader::from_path(path)?;
    let mut features = Vec::new();
    let mut null_shapes = 0usize;

    for shape_record in reader.iter_shapes_and_records() {
        let (shape, record) = shape_record?;
        match shape_to_geometry(shape) {
            Some(geometry) => features.push(Feature {
                geometry,
                properties: record_to_properties(record),
            }),
            None => null_shapes += 1,
        }
    }

    if null_shapes > 0 {
        tracing::warn!(
            "⚠️ Skipped {} null or unsupported shapes in '{}'",
            null_shapes,
            name
        );
    }
    Ok(Layer::new(name, features))
}

fn record_to_properties(record: DbfRecord) -> serde_json::Map<String, serde_json::Value> {
    use serde_json::Value;

    record
        .into_iter()
        .map(|(field, value)| {
            let json = match value {
                FieldValue::Character(Some(s)) => Value::String(s.trim_end().to_string()),
                FieldValue::Numeric(Some(n)) | FieldValue::Double(n) | FieldValue::Currency(n) => {
                    serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
                }
                FieldValue::Float(Some(f)) => serde_json::Number::from_f64(f as f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                FieldValue::Integer(i) => Value::from(i),
                FieldValue::Logical(Some(b)) => Value::Bool(b),
                FieldValue::Memo(s) => Value::String(s),
                FieldValue::Character(None)
                | FieldValue::Numeric(None)
                | FieldValue::Float(None)
                | FieldValue::Logical(None) => Value::Null,
                other => Value::String(format!("{:?}", other)),
            };
            (field, json)
        })
        .collect()
}

/// Outer rings open a new polygon; inner rings attach to the last outer ring.
fn rings_to_multipolygon<P>(rings: &[PolygonRing<P>], xy: impl Fn(&P) -> Coord<f64>) -> MultiPolygon<f64> {
    let mut polygons: Vec<(LineString<f64>, Vec<LineString<f64>>)> = Vec::new();

    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => {
                polygons.push((points.iter().map(&xy).collect(), Vec::new()));
            }
            PolygonRing::Inner(points) => match polygons.last_mut() {
                Some((_, holes)) => holes.push(points.iter().map(&xy).collect()),
                None => polygons.push((points.iter().map(&xy).collect(), Vec::new())),
            },
        }
    }

    polygons
        .into_iter()
        .map(|(exterior, holes)| Polygon::new(exterior, holes))
        .collect()
}

fn parts_to_lines<P>(parts: &[Vec<P>], xy: impl Fn(&P) -> Coord<f64>) -> MultiLineString<f64> {
    parts
        .iter()
        .map(|part| part.iter().map(&xy).collect::<LineString<f64>>())
        .collect()
}

macro_rules! xy {
    () => {
        |p| Coord { x: p.x, y: p.y }
    };
}

fn shape_to_geometry(shape: Shape) -> Option<Geometry<f64>> {
    let geometry = match shape {
        Shape::Point(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointM(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::PointZ(p) => Geometry::Point(Point::new(p.x, p.y)),
        Shape::Multipoint(mp) => Geometry::MultiPoint(MultiPoint::new(
            mp.points().iter().map(|p| Point::new(p.x, p.y)).collect(),
        )),
        Shape::MultipointM(mp) => Geometry::MultiPoint(MultiPoint::new(
            mp.points().iter().map(|p| Point::new(p.x, p.y)).collect(),
        )),
        Shape::MultipointZ(mp) => Geometry::MultiPoint(MultiPoint::new(
            mp.points().iter().map(|p| Point::new(p.x, p.y)).collect(),
        )),
        Shape::Polyline(pl) => Geometry::MultiLineString(parts_to_lines(pl.parts(), xy!())),
        Shape::PolylineM(pl) => Geometry::MultiLineString(parts_to_lines(pl.parts(), xy!())),
        Shape::PolylineZ(pl) => Geometry::MultiLineString(parts_to_lines(pl.parts(), xy!())),
        Shape::Polygon(poly) => Geometry::MultiPolygon(rings_to_multipolygon(poly.rings(), xy!())),
        Shape::PolygonM(poly) => Geometry::MultiPolygon(rings_to_multipolygon(poly.rings(), xy!())),
        Shape::PolygonZ(poly) => Geometry::MultiPolygon(rings_to_multipolygon(poly.rings(), xy!())),
        Shape::NullShape | Shape::Multipatch(_) => return None,
    };
    Some(geometry)
}
