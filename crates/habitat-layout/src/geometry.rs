//! Occupied-volume geometry for placed modules.
//!
//! [`OrientedBoundingBox`] is a box rotated about Z only (modules stand
//! upright in the habitat frame). Corners and axis-aligned bounds are cached
//! at construction so pairwise tests stay cheap inside the search loop.
//!
//! Box-box overlap for rotated boxes is approximated: both boxes are inflated
//! by the clearance and their corner bounds are tested as axis-aligned boxes.
//! The test never misses a real overlap but reports false positives near
//! corners of rotated boxes.

use nalgebra::{Rotation3, Vector3};

/// Envelope-local vector, metres.
pub type Vec3 = Vector3<f64>;

/// Rotations within this many degrees of zero count as unrotated.
const ZERO_ROTATION_EPS: f64 = 1e-9;

/// Box with centre, half-extents and a rotation about Z.
#[derive(Debug, Clone, PartialEq)]
pub struct OrientedBoundingBox {
    pub center: Vec3,
    pub half_extents: Vec3,
    /// Degrees in [0, 360).
    pub rotation_deg: f64,
    pub corners: [Vec3; 8],
    pub aabb_min: Vec3,
    pub aabb_max: Vec3,
}

impl OrientedBoundingBox {
    pub fn new(center: Vec3, half_extents: Vec3, rotation_deg: f64) -> Self {
        let rotation_deg = crate::modules::normalize_rotation(rotation_deg);
        let rot = z_rotation(rotation_deg);
        let h = half_extents;

        let mut corners = [Vec3::zeros(); 8];
        for (i, corner) in corners.iter_mut().enumerate() {
            let local = Vec3::new(
                if i & 1 == 0 { -h.x } else { h.x },
                if i & 2 == 0 { -h.y } else { h.y },
                if i & 4 == 0 { -h.z } else { h.z },
            );
            *corner = center + rot * local;
        }

        let mut aabb_min = corners[0];
        let mut aabb_max = corners[0];
        for c in &corners[1..] {
            aabb_min = aabb_min.inf(c);
            aabb_max = aabb_max.sup(c);
        }

        Self {
            center,
            half_extents,
            rotation_deg,
            corners,
            aabb_min,
            aabb_max,
        }
    }

    /// Axis-aligned box from min/max corners.
    pub fn from_bounds(min: Vec3, max: Vec3) -> Self {
        Self::new((min + max) * 0.5, (max - min) * 0.5, 0.0)
    }

    pub fn is_axis_aligned(&self) -> bool {
        self.rotation_deg < ZERO_ROTATION_EPS || 360.0 - self.rotation_deg < ZERO_ROTATION_EPS
    }

    pub fn volume(&self) -> f64 {
        8.0 * self.half_extents.x * self.half_extents.y * self.half_extents.z
    }

    /// Radius of the sphere through the corners.
    pub fn bounding_radius(&self) -> f64 {
        self.half_extents.norm()
    }

    /// Overlap test with a required clearance between surfaces.
    ///
    /// Unrotated pairs are tested exactly: they intersect when the gap along
    /// every axis is strictly below `clearance`. Any rotated pair falls back
    /// to the inflated corner-bounds approximation.
    pub fn intersects(&self, other: &OrientedBoundingBox, clearance: f64) -> bool {
        let c = clearance.max(0.0);
        if self.is_axis_aligned() && other.is_axis_aligned() {
            (0..3).all(|axis| {
                self.aabb_min[axis] - c < other.aabb_max[axis]
                    && self.aabb_max[axis] + c > other.aabb_min[axis]
            })
        } else {
            (0..3).all(|axis| {
                self.aabb_min[axis] - c < other.aabb_max[axis] + c
                    && self.aabb_max[axis] + c > other.aabb_min[axis] - c
            })
        }
    }

    /// Closest point of this box to a world point (the point itself if inside).
    pub fn closest_point_to(&self, point: &Vec3) -> Vec3 {
        let rot = z_rotation(self.rotation_deg);
        let local = rot.inverse() * (point - self.center);
        let clamped = Vec3::new(
            local.x.clamp(-self.half_extents.x, self.half_extents.x),
            local.y.clamp(-self.half_extents.y, self.half_extents.y),
            local.z.clamp(-self.half_extents.z, self.half_extents.z),
        );
        self.center + rot * clamped
    }

    pub fn contains_point(&self, point: &Vec3) -> bool {
        (self.closest_point_to(point) - point).norm() <= 1e-12
    }

    /// Approximate surface-to-surface distance; 0 when the boxes touch or
    /// overlap. Exact for unrotated pairs.
    pub fn distance_to(&self, other: &OrientedBoundingBox) -> f64 {
        if self.intersects(other, 0.0) {
            return 0.0;
        }
        let on_other = other.closest_point_to(&self.center);
        let on_self = self.closest_point_to(&on_other);
        let on_other = other.closest_point_to(&on_self);
        (on_other - on_self).norm()
    }
}

fn z_rotation(degrees: f64) -> Rotation3<f64> {
    Rotation3::from_axis_angle(&Vector3::z_axis(), degrees.to_radians())
}
