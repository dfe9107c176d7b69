//! Buffer, overlay, join, erase and selection over layers.
//!
//! Geometry work is delegated to `geo`: `Buffer` for offsetting,
//! `BooleanOps` / `unary_union` for dissolve, overlay and erase. Buffering
//! happens in the local metric plane; everything returned is lon/lat.

use geo::{Area, BooleanOps, Buffer, Geometry, MultiPolygon};
use std::fmt;
use std::str::FromStr;

use crate::core::projection::LocalProjection;
use crate::core::spatial_index::ZoneIndex;
use crate::domain::model::{BufferDistance, Feature, Layer};
use crate::utils::error::{Result, WnvError};

pub const JOIN_COUNT_FIELD: &str = "join_count";
pub const TARGET_FID_FIELD: &str = "target_fid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode {
    /// Any buffered breeding ground qualifies.
    Union,
    /// Only areas covered by every buffer qualify.
    Intersect,
}

impl FromStr for OverlayMode {
    type Err = WnvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "union" => Ok(OverlayMode::Union),
            "intersect" | "intersection" => Ok(OverlayMode::Intersect),
            _ => Err(WnvError::InvalidConfigValueError {
                field: "analysis.overlay".to_string(),
                value: s.to_string(),
                reason: "Expected one of: union, intersect".to_string(),
            }),
        }
    }
}

impl fmt::Display for OverlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverlayMode::Union => f.write_str("union"),
            OverlayMode::Intersect => f.write_str("intersect"),
        }
    }
}

/// Merges overlapping polygons into one multipolygon (dissolve = ALL).
pub fn dissolve(parts: &[MultiPolygon<f64>]) -> MultiPolygon<f64> {
    geo::unary_union(parts.iter())
}

/// Buffers every feature of `layer` by `distance` and dissolves the result.
pub fn buffer_layer(
    layer: &Layer,
    distance: &BufferDistance,
    projection: &LocalProjection,
) -> Result<MultiPolygon<f64>> {
    let meters = distance.to_meters();
    if !meters.is_finite() || meters <= 0.0 {
        return Err(WnvError::GeometryError {
            operation: format!("buffer of '{}'", layer.name),
            message: format!("buffer distance must be positive, got {}", distance),
        });
    }

    if layer.is_empty() {
        tracing::warn!("⚠️ Layer '{}' has no features; buffer is empty", layer.name);
        return Ok(MultiPolygon::new(vec![]));
    }

    let buffered: Vec<MultiPolygon<f64>> = layer
        .features
        .iter()
        .map(|feature| projection.project(&feature.geometry).buffer(meters))
        .filter(|mp| !mp.0.is_empty())
        .collect();

    tracing::debug!(
        "Buffered {} of {} features of '{}' by {} ({:.1} m)",
        buffered.len(),
        layer.len(),
        layer.name,
        distance,
        meters
    );

    Ok(projection.unproject(&dissolve(&buffered)))
}

pub fn overlay(zones: &[MultiPolygon<f64>], mode: OverlayMode) -> MultiPolygon<f64> {
    match mode {
        OverlayMode::Union => dissolve(zones),
        OverlayMode::Intersect => {
            let mut iter = zones.iter();
            let Some(first) = iter.next() else {
                return MultiPolygon::new(vec![]);
            };
            iter.fold(first.clone(), |acc, zone| acc.intersection(zone))
        }
    }
}

/// Areal difference `zone - erase`.
pub fn erase_zone(zone: &MultiPolygon<f64>, erase: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    if erase.0.is_empty() {
        return zone.clone();
    }
    zone.difference(erase)
}

/// One-to-one, keep-common spatial join with match option "within".
///
/// Point features of `target` lying inside `zone` are kept, tagged with
/// `join_count = 1` and the index of the source feature.
pub fn spatial_join_within(target: &Layer, zone: &MultiPolygon<f64>, out_name: &str) -> Layer {
    let index = ZoneIndex::build(zone);
    let mut skipped = 0usize;

    let features = target
        .features
        .iter()
        .enumerate()
        .filter_map(|(fid, feature)| {
            let Some(point) = feature.point() else {
                skipped += 1;
                return None;
            };
            index.contains(&point).then(|| {
                feature
                    .clone()
                    .with_property(JOIN_COUNT_FIELD, 1)
                    .with_property(TARGET_FID_FIELD, fid)
            })
        })
        .collect();

    if skipped > 0 {
        tracing::warn!(
            "⚠️ {} non-point features in '{}' were ignored by the spatial join",
            skipped,
            target.name
        );
    }

    Layer::new(out_name, features)
}

/// Query by attribute: number of features whose `field` equals `value`.
pub fn count_where(layer: &Layer, field: &str, value: &serde_json::Value) -> usize {
    layer
        .features
        .iter()
        .filter(|f| match (f.properties.get(field), value) {
            (Some(found), serde_json::Value::Number(n)) => found.as_f64() == n.as_f64(),
            (Some(found), expected) => found == expected,
            (None, _) => false,
        })
        .count()
}

/// Removes the point features lying within `erase`.
pub fn erase_points(points: &Layer, erase: &MultiPolygon<f64>, out_name: &str) -> Layer {
    let index = ZoneIndex::build(erase);
    let features = points
        .features
        .iter()
        .filter(|f| f.point().map(|p| !index.contains(&p)).unwrap_or(true))
        .cloned()
        .collect();
    Layer::new(out_name, features)
}

/// Select by location, new selection, overlap type "within".
pub fn select_by_location<'a>(points: &'a Layer, zone: &MultiPolygon<f64>) -> Vec<&'a Feature> {
    let index = ZoneIndex::build(zone);
    points
        .features
        .iter()
        .filter(|f| f.point().map(|p| index.contains(&p)).unwrap_or(false))
        .collect()
}

/// Wraps a zone as a one-feature layer for the workspace.
pub fn zone_layer(name: &str, zone: &MultiPolygon<f64>) -> Layer {
    if zone.0.is_empty() {
        return Layer::new(name, vec![]);
    }
    Layer::new(name, vec![Feature::new(Geometry::MultiPolygon(zone.clone()))])
}

pub fn zone_area_sq_meters(zone: &MultiPolygon<f64>, projection: &LocalProjection) -> f64 {
    projection.project(zone).unsigned_area()
}
