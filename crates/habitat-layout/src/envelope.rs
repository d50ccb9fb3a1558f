//! Habitat envelope shapes that bound where modules may be placed.
//!
//! All shapes are expressed in envelope-local coordinates centred on the
//! origin. Cylinders and tori have their axis along Z.
//!
//! ```
//! use habitat_layout::envelope::Envelope;
//!
//! let hab = Envelope::Cylinder { radius: 5.0, length: 20.0 };
//! assert!(hab.validate().is_empty());
//! assert!((hab.volume() - std::f64::consts::PI * 25.0 * 20.0).abs() < 1e-9);
//! ```

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::geometry::{OrientedBoundingBox, Vec3};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Cylinder {
        radius: f64,
        length: f64,
    },
    Box {
        width: f64,
        depth: f64,
        height: f64,
    },
    Torus {
        major_radius: f64,
        minor_radius: f64,
    },
    /// Arbitrary hull approximated by its bounding box; `volume` is the
    /// usable pressurized volume and may be below the box volume.
    Freeform {
        min: Vec3,
        max: Vec3,
        volume: f64,
    },
}

/// Per-axis lower/upper bounds for module centres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecisionBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl DecisionBounds {
    pub fn span(&self, axis: usize) -> f64 {
        self.max[axis] - self.min[axis]
    }
}

impl Envelope {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Cylinder { .. } => "cylinder",
            Self::Box { .. } => "box",
            Self::Torus { .. } => "torus",
            Self::Freeform { .. } => "freeform",
        }
    }

    /// Internal volume, m³.
    pub fn volume(&self) -> f64 {
        match *self {
            Self::Cylinder { radius, length } => PI * radius * radius * length,
            Self::Box {
                width,
                depth,
                height,
            } => width * depth * height,
            Self::Torus {
                major_radius,
                minor_radius,
            } => 2.0 * PI * PI * major_radius * minor_radius * minor_radius,
            Self::Freeform { volume, .. } => volume,
        }
    }

    /// Check shape parameters, returning every problem found.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut positive = |name: &'static str, v: f64| {
            if !(v.is_finite() && v > 0.0) {
                errors.push(ConfigError::InvalidEnvelope(format!(
                    "{} {} must be positive, got {}",
                    self.kind_name(),
                    name,
                    v
                )));
            }
        };
        match *self {
            Self::Cylinder { radius, length } => {
                positive("radius", radius);
                positive("length", length);
            }
            Self::Box {
                width,
                depth,
                height,
            } => {
                positive("width", width);
                positive("depth", depth);
                positive("height", height);
            }
            Self::Torus {
                major_radius,
                minor_radius,
            } => {
                positive("major_radius", major_radius);
                positive("minor_radius", minor_radius);
                if minor_radius >= major_radius {
                    errors.push(ConfigError::InvalidEnvelope(format!(
                        "torus minor_radius {} must be below major_radius {}",
                        minor_radius, major_radius
                    )));
                }
            }
            Self::Freeform { min, max, volume } => {
                positive("volume", volume);
                if (0..3).any(|axis| !(max[axis] > min[axis])) {
                    errors.push(ConfigError::InvalidEnvelope(
                        "freeform max must exceed min on every axis".to_string(),
                    ));
                } else {
                    let box_volume = (max - min).iter().product::<f64>();
                    if volume > box_volume + 1e-9 {
                        errors.push(ConfigError::InvalidEnvelope(format!(
                            "freeform volume {} exceeds its bounding box {}",
                            volume, box_volume
                        )));
                    }
                }
            }
        }
        errors
    }

    /// Whether a point lies inside the shape (within `tolerance`).
    pub fn contains_point(&self, p: &Vec3, tolerance: f64) -> bool {
        self.clearance_to_boundary(p) >= -tolerance
    }

    /// Signed distance from a point to the wall: positive inside, negative
    /// outside.
    pub fn clearance_to_boundary(&self, p: &Vec3) -> f64 {
        match *self {
            Self::Cylinder { radius, length } => {
                let radial = radius - (p.x * p.x + p.y * p.y).sqrt();
                let axial = length / 2.0 - p.z.abs();
                radial.min(axial)
            }
            Self::Box {
                width,
                depth,
                height,
            } => (width / 2.0 - p.x.abs())
                .min(depth / 2.0 - p.y.abs())
                .min(height / 2.0 - p.z.abs()),
            Self::Torus {
                major_radius,
                minor_radius,
            } => {
                let ring = (p.x * p.x + p.y * p.y).sqrt() - major_radius;
                minor_radius - (ring * ring + p.z * p.z).sqrt()
            }
            Self::Freeform { min, max, .. } => (0..3)
                .map(|axis| (p[axis] - min[axis]).min(max[axis] - p[axis]))
                .fold(f64::INFINITY, f64::min),
        }
    }

    /// Whether every corner of a box lies inside the shape.
    pub fn contains_box(&self, obb: &OrientedBoundingBox, tolerance: f64) -> bool {
        obb.corners.iter().all(|c| self.contains_point(c, tolerance))
    }

    /// Safe interior for module centres, shrunk from the wall by `margin`.
    ///
    /// Cylinders use the square inscribed in the shrunk cross-section so
    /// every decoded centre is inside the shape. Tori use the bounding box of
    /// the shrunk tube (the central hole stays reachable and is penalized as
    /// out-of-envelope). Degenerate axes collapse to the centre.
    pub fn decision_bounds(&self, margin: f64) -> DecisionBounds {
        let (min, max) = match *self {
            Self::Cylinder { radius, length } => {
                let half_side = ((radius - margin).max(0.0)) / 2.0_f64.sqrt();
                let half_len = (length / 2.0 - margin).max(0.0);
                (
                    Vec3::new(-half_side, -half_side, -half_len),
                    Vec3::new(half_side, half_side, half_len),
                )
            }
            Self::Box {
                width,
                depth,
                height,
            } => {
                let h = Vec3::new(
                    (width / 2.0 - margin).max(0.0),
                    (depth / 2.0 - margin).max(0.0),
                    (height / 2.0 - margin).max(0.0),
                );
                (-h, h)
            }
            Self::Torus {
                major_radius,
                minor_radius,
            } => {
                let outer = (major_radius + minor_radius - margin).max(0.0);
                let tube = (minor_radius - margin).max(0.0);
                (Vec3::new(-outer, -outer, -tube), Vec3::new(outer, outer, tube))
            }
            Self::Freeform { min, max, .. } => {
                let mut lo = min.add_scalar(margin);
                let mut hi = max.add_scalar(-margin);
                for axis in 0..3 {
                    if lo[axis] > hi[axis] {
                        let mid = (min[axis] + max[axis]) / 2.0;
                        lo[axis] = mid;
                        hi[axis] = mid;
                    }
                }
                (lo, hi)
            }
        };
        DecisionBounds { min, max }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volumes() {
        let b = Envelope::Box {
            width: 2.0,
            depth: 3.0,
            height: 4.0,
        };
        assert!((b.volume() - 24.0).abs() < 1e-12);
        let t = Envelope::Torus {
            major_radius: 10.0,
            minor_radius: 2.0,
        };
        assert!((t.volume() - 2.0 * PI * PI * 10.0 * 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_invalid_params_reported() {
        let e = Envelope::Cylinder {
            radius: -1.0,
            length: 0.0,
        };
        assert_eq!(e.validate().len(), 2);
        let t = Envelope::Torus {
            major_radius: 2.0,
            minor_radius: 3.0,
        };
        assert_eq!(t.validate().len(), 1);
        let f = Envelope::Freeform {
            min: Vec3::new(0.0, 0.0, 0.0),
            max: Vec3::new(1.0, 1.0, 1.0),
            volume: 2.0,
        };
        assert_eq!(f.validate().len(), 1);
    }

    #[test]
    fn test_cylinder_containment() {
        let e = Envelope::Cylinder {
            radius: 5.0,
            length: 20.0,
        };
        assert!(e.contains_point(&Vec3::new(3.0, 3.0, 9.0), 0.0));
        assert!(!e.contains_point(&Vec3::new(4.0, 4.0, 0.0), 0.0));
        assert!(!e.contains_point(&Vec3::new(0.0, 0.0, 10.5), 0.0));
        assert!((e.clearance_to_boundary(&Vec3::zeros()) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_torus_hole_is_outside() {
        let e = Envelope::Torus {
            major_radius: 10.0,
            minor_radius: 2.0,
        };
        assert!(!e.contains_point(&Vec3::zeros(), 0.0));
        assert!(e.contains_point(&Vec3::new(10.0, 0.0, 0.0), 0.0));
    }

    #[test]
    fn test_cylinder_bounds_stay_inside() {
        let e = Envelope::Cylinder {
            radius: 5.0,
            length: 20.0,
        };
        let bounds = e.decision_bounds(1.5);
        let corner = Vec3::new(bounds.max.x, bounds.max.y, bounds.max.z);
        assert!(e.clearance_to_boundary(&corner) >= 1.5 - 1e-9);
        assert!((bounds.max.z - 8.5).abs() < 1e-12);
    }

    #[test]
    fn test_freeform_bounds_collapse_when_too_small() {
        let e = Envelope::Freeform {
            min: Vec3::new(0.0, 0.0, 0.0),
            max: Vec3::new(2.0, 10.0, 10.0),
            volume: 150.0,
        };
        let bounds = e.decision_bounds(1.5);
        assert_eq!(bounds.span(0), 0.0);
        assert!((bounds.min.x - 1.0).abs() < 1e-12);
        assert!((bounds.span(1) - 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_serde_tagged() {
        let json = r#"{"type":"cylinder","radius":5.0,"length":20.0}"#;
        let e: Envelope = serde_json::from_str(json).unwrap();
        assert_eq!(
            e,
            Envelope::Cylinder {
                radius: 5.0,
                length: 20.0
            }
        );
    }
}
