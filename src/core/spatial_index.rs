//! R-tree over zone polygons for point-in-polygon tests.

use geo::{BoundingRect, Contains, MultiPolygon, Point, Polygon};
use rstar::{RTree, RTreeObject, AABB};

#[derive(Clone)]
struct IndexedPolygon {
    polygon: Polygon<f64>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedPolygon {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl IndexedPolygon {
    fn new(polygon: Polygon<f64>) -> Option<Self> {
        let rect = polygon.bounding_rect()?;
        Some(Self {
            envelope: AABB::from_corners(
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            ),
            polygon,
        })
    }
}

pub struct ZoneIndex {
    tree: RTree<IndexedPolygon>,
}

impl ZoneIndex {
    pub fn build(zone: &MultiPolygon<f64>) -> Self {
        let indexed: Vec<IndexedPolygon> = zone
            .0
            .iter()
            .cloned()
            .filter_map(IndexedPolygon::new)
            .collect();

        let tree = RTree::bulk_load(indexed);
        tracing::debug!("Zone index built with {} polygons", tree.size());
        Self { tree }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// True when the point lies strictly inside one of the zone polygons.
    pub fn contains(&self, point: &Point<f64>) -> bool {
        let query_envelope = AABB::from_point([point.x(), point.y()]);

        // Candidates via envelope intersection, then exact containment
        self.tree
            .locate_in_envelope_intersecting(&query_envelope)
            .any(|ip| ip.polygon.contains(point))
    }
}
