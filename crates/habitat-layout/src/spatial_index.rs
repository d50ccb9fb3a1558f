//! Nearest-neighbour prefilter over module centres.
//!
//! `SpatialIndex` keeps an id → box map plus an R*-tree over box centres.
//! The tree is rebuilt lazily on the first query after any insert/remove.
//! Radius queries test centres only, so they are a prefilter: callers pad the
//! radius with both boxes' extents. Range queries are exact against each
//! box's axis-aligned bounds.

use std::collections::BTreeMap;

use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::geometry::{OrientedBoundingBox, Vec3};
use crate::modules::ModuleId;

type CenterPoint = GeomWithData<[f64; 3], ModuleId>;

#[derive(Default)]
pub struct SpatialIndex {
    boxes: BTreeMap<ModuleId, OrientedBoundingBox>,
    tree: RTree<CenterPoint>,
    dirty: bool,
    max_radius: f64,
}

impl std::fmt::Debug for SpatialIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndex")
            .field("boxes", &self.boxes.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl SpatialIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_boxes(boxes: impl IntoIterator<Item = (ModuleId, OrientedBoundingBox)>) -> Self {
        let mut index = Self::new();
        for (id, obb) in boxes {
            index.insert(id, obb);
        }
        index
    }

    /// Insert or replace the box for `id`.
    pub fn insert(&mut self, id: ModuleId, obb: OrientedBoundingBox) {
        self.max_radius = self.max_radius.max(obb.bounding_radius());
        self.boxes.insert(id, obb);
        self.dirty = true;
    }

    pub fn remove(&mut self, id: ModuleId) -> Option<OrientedBoundingBox> {
        let removed = self.boxes.remove(&id);
        if removed.is_some() {
            self.max_radius = self
                .boxes
                .values()
                .map(|b| b.bounding_radius())
                .fold(0.0, f64::max);
            self.dirty = true;
        }
        removed
    }

    pub fn get(&self, id: ModuleId) -> Option<&OrientedBoundingBox> {
        self.boxes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    /// Largest bounding radius of any indexed box.
    pub fn max_bounding_radius(&self) -> f64 {
        self.max_radius
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &OrientedBoundingBox)> {
        self.boxes.iter().map(|(id, b)| (*id, b))
    }

    fn rebuild_if_dirty(&mut self) {
        if !self.dirty {
            return;
        }
        let points: Vec<CenterPoint> = self
            .boxes
            .iter()
            .map(|(id, b)| GeomWithData::new([b.center.x, b.center.y, b.center.z], *id))
            .collect();
        self.tree = RTree::bulk_load(points);
        self.dirty = false;
    }

    /// Ids whose centre lies within `radius` of `center`, sorted by id.
    pub fn query_radius(&mut self, center: &Vec3, radius: f64) -> Vec<ModuleId> {
        self.rebuild_if_dirty();
        if radius < 0.0 {
            return Vec::new();
        }
        let mut ids: Vec<ModuleId> = self
            .tree
            .locate_within_distance([center.x, center.y, center.z], radius * radius)
            .map(|p| p.data)
            .collect();
        ids.sort();
        ids
    }

    /// Ids whose axis-aligned bounds overlap the closed range, sorted by id.
    pub fn query_range(&self, min: &Vec3, max: &Vec3) -> Vec<ModuleId> {
        self.boxes
            .iter()
            .filter(|(_, b)| {
                (0..3).all(|axis| b.aabb_min[axis] <= max[axis] && b.aabb_max[axis] >= min[axis])
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn needs_rebuild(&self) -> bool {
        self.dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleType;

    fn id(n: u16) -> ModuleId {
        ModuleId::new(ModuleType::Storage, n)
    }

    fn cube(x: f64, y: f64, z: f64) -> OrientedBoundingBox {
        OrientedBoundingBox::new(Vec3::new(x, y, z), Vec3::new(0.5, 0.5, 0.5), 0.0)
    }

    fn line_index() -> SpatialIndex {
        SpatialIndex::from_boxes((0..5).map(|i| (id(i + 1), cube(i as f64 * 2.0, 0.0, 0.0))))
    }

    #[test]
    fn test_radius_query() {
        let mut index = line_index();
        let near = index.query_radius(&Vec3::new(0.0, 0.0, 0.0), 2.5);
        assert_eq!(near, vec![id(1), id(2)]);
        let all = index.query_radius(&Vec3::new(4.0, 0.0, 0.0), 10.0);
        assert_eq!(all.len(), 5);
    }

    #[test]
    fn test_lazy_rebuild() {
        let mut index = SpatialIndex::new();
        index.insert(id(1), cube(0.0, 0.0, 0.0));
        assert!(index.needs_rebuild());
        assert_eq!(index.query_radius(&Vec3::zeros(), 1.0), vec![id(1)]);
        assert!(!index.needs_rebuild());
        index.insert(id(2), cube(0.5, 0.0, 0.0));
        assert!(index.needs_rebuild());
        assert_eq!(index.query_radius(&Vec3::zeros(), 1.0).len(), 2);
    }

    #[test]
    fn test_remove_updates_queries() {
        let mut index = line_index();
        assert!(index.remove(id(2)).is_some());
        assert!(index.remove(id(2)).is_none());
        let near = index.query_radius(&Vec3::new(0.0, 0.0, 0.0), 2.5);
        assert_eq!(near, vec![id(1)]);
        assert_eq!(index.len(), 4);
    }

    #[test]
    fn test_range_query_exact_bounds() {
        let index = line_index();
        // box 2 spans x ∈ [1.5, 2.5]
        let hits = index.query_range(&Vec3::new(2.4, -1.0, -1.0), &Vec3::new(2.45, 1.0, 1.0));
        assert_eq!(hits, vec![id(2)]);
        let miss = index.query_range(&Vec3::new(0.6, -1.0, -1.0), &Vec3::new(1.4, 1.0, 1.0));
        assert!(miss.is_empty());
    }

    #[test]
    fn test_max_radius_tracks_contents() {
        let mut index = SpatialIndex::new();
        index.insert(
            id(1),
            OrientedBoundingBox::new(Vec3::zeros(), Vec3::new(3.0, 4.0, 0.0), 0.0),
        );
        index.insert(id(2), cube(5.0, 0.0, 0.0));
        assert!((index.max_bounding_radius() - 5.0).abs() < 1e-12);
        index.remove(id(1));
        assert!((index.max_bounding_radius() - 0.75_f64.sqrt()).abs() < 1e-12);
    }
}
