//! Clearance and collision queries over module placements.
//!
//! Every query runs a [`SpatialIndex`] radius prefilter first, padded by the
//! candidate's extent, the largest indexed extent and the clearance, so only
//! plausible neighbours reach the exact box test.

use serde::{Deserialize, Serialize};

use crate::constants::geometry::{MIN_SHORTFALL, QUERY_MARGIN};
use crate::geometry::{OrientedBoundingBox, Vec3};
use crate::modules::{ModuleId, Placement};
use crate::spatial_index::SpatialIndex;

/// Outcome of testing one placement against a set of existing ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionResult {
    pub has_collision: bool,
    /// Largest clearance shortfall against any neighbour, m.
    pub penetration_depth: f64,
    /// Translation that would clear the worst neighbour, m.
    pub resolution_vector: Vec3,
    pub colliding_with: Vec<ModuleId>,
}

impl CollisionResult {
    fn clear() -> Self {
        Self {
            has_collision: false,
            penetration_depth: 0.0,
            resolution_vector: Vec3::zeros(),
            colliding_with: Vec::new(),
        }
    }
}

/// One unordered pair that breaks the clearance rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearanceViolation {
    pub a: ModuleId,
    pub b: ModuleId,
    /// Approximate surface distance, m.
    pub distance: f64,
    pub required: f64,
    pub shortfall: f64,
}

#[derive(Debug, Clone)]
pub struct CollisionDetector {
    margin: f64,
}

impl Default for CollisionDetector {
    fn default() -> Self {
        Self {
            margin: QUERY_MARGIN,
        }
    }
}

impl CollisionDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_margin(margin: f64) -> Self {
        Self {
            margin: margin.max(0.0),
        }
    }

    fn query_radius(&self, obb: &OrientedBoundingBox, index: &SpatialIndex, clearance: f64) -> f64 {
        obb.bounding_radius() + index.max_bounding_radius() + clearance + self.margin
    }

    /// Test `placement` against `existing`. Entries sharing the placement's id
    /// are ignored.
    pub fn check_collision(
        &self,
        placement: &Placement,
        existing: &[Placement],
        min_clearance: f64,
    ) -> CollisionResult {
        if existing.is_empty() {
            return CollisionResult::clear();
        }
        let clearance = min_clearance.max(0.0);
        let candidate = placement.bounding_box();
        let mut index = SpatialIndex::from_boxes(
            existing
                .iter()
                .filter(|p| p.id != placement.id)
                .map(|p| (p.id, p.bounding_box())),
        );
        if index.is_empty() {
            return CollisionResult::clear();
        }

        let radius = self.query_radius(&candidate, &index, clearance);
        let mut result = CollisionResult::clear();
        let mut worst: Option<(f64, Vec3)> = None;

        for id in index.query_radius(&candidate.center, radius) {
            let Some(other) = index.get(id) else {
                continue;
            };
            if !candidate.intersects(other, clearance) {
                continue;
            }
            let depth = shortfall(&candidate, other, clearance);
            result.colliding_with.push(id);
            if worst.map_or(true, |(d, _)| depth > d) {
                worst = Some((depth, other.center));
            }
        }

        if let Some((depth, other_center)) = worst {
            result.has_collision = true;
            result.penetration_depth = depth;
            result.resolution_vector = push_direction(&candidate.center, &other_center) * depth;
        }
        result
    }

    /// Every violating unordered pair, reported once, in placement order.
    pub fn find_all_violations(
        &self,
        placements: &[Placement],
        min_clearance: f64,
    ) -> Vec<ClearanceViolation> {
        if placements.len() < 2 {
            return Vec::new();
        }
        let clearance = min_clearance.max(0.0);
        let boxes: Vec<OrientedBoundingBox> =
            placements.iter().map(|p| p.bounding_box()).collect();
        let mut index =
            SpatialIndex::from_boxes(placements.iter().map(|p| p.id).zip(boxes.iter().cloned()));
        let position_of = |id: ModuleId| placements.iter().position(|p| p.id == id);

        let mut violations = Vec::new();
        for (i, a) in boxes.iter().enumerate() {
            let radius = self.query_radius(a, &index, clearance);
            for id in index.query_radius(&a.center, radius) {
                let Some(j) = position_of(id) else {
                    continue;
                };
                if j <= i {
                    continue;
                }
                let b = &boxes[j];
                if !a.intersects(b, clearance) {
                    continue;
                }
                let distance = a.distance_to(b);
                violations.push(ClearanceViolation {
                    a: placements[i].id,
                    b: placements[j].id,
                    distance,
                    required: clearance,
                    shortfall: shortfall(a, b, clearance),
                });
            }
        }
        violations.sort_by_key(|v| {
            (
                position_of(v.a).unwrap_or(usize::MAX),
                position_of(v.b).unwrap_or(usize::MAX),
            )
        });
        violations
    }

    /// Sum of clearance shortfalls over all violating pairs, m.
    pub fn total_shortfall(&self, placements: &[Placement], min_clearance: f64) -> f64 {
        self.find_all_violations(placements, min_clearance)
            .iter()
            .map(|v| v.shortfall)
            .sum()
    }
}

/// Clearance shortfall for a pair already known to intersect. Pairs the
/// conservative test flags while their surface distance meets clearance get
/// a token shortfall so the violation is never free.
fn shortfall(a: &OrientedBoundingBox, b: &OrientedBoundingBox, clearance: f64) -> f64 {
    (clearance - a.distance_to(b)).max(MIN_SHORTFALL)
}

fn push_direction(from_other_to: &Vec3, other: &Vec3) -> Vec3 {
    let delta = from_other_to - other;
    let norm = delta.norm();
    if norm < 1e-9 {
        Vec3::x()
    } else {
        delta / norm
    }
}
