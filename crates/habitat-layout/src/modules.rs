//! Functional module catalog with instance ids and placements.
//!
//! A required-module list is turned into a [`ModuleCatalog`] once per run.
//! Every instance gets a structured [`ModuleId`] (type + ordinal) so callers
//! can look a requirement back up without parsing strings.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::geometry::{OrientedBoundingBox, Vec3};

/// Functional module type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    SleepQuarters,
    Galley,
    Wardroom,
    Laboratory,
    Airlock,
    Hygiene,
    Exercise,
    Medical,
    Storage,
    Workshop,
    CommandControl,
    LifeSupport,
    PowerSystems,
}

impl ModuleType {
    pub const ALL: [ModuleType; 13] = [
        ModuleType::SleepQuarters,
        ModuleType::Galley,
        ModuleType::Wardroom,
        ModuleType::Laboratory,
        ModuleType::Airlock,
        ModuleType::Hygiene,
        ModuleType::Exercise,
        ModuleType::Medical,
        ModuleType::Storage,
        ModuleType::Workshop,
        ModuleType::CommandControl,
        ModuleType::LifeSupport,
        ModuleType::PowerSystems,
    ];

    /// Short lowercase slug used in instance ids and reports.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::SleepQuarters => "sleep",
            Self::Galley => "galley",
            Self::Wardroom => "wardroom",
            Self::Laboratory => "lab",
            Self::Airlock => "airlock",
            Self::Hygiene => "hygiene",
            Self::Exercise => "exercise",
            Self::Medical => "medical",
            Self::Storage => "storage",
            Self::Workshop => "workshop",
            Self::CommandControl => "command",
            Self::LifeSupport => "life_support",
            Self::PowerSystems => "power",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SleepQuarters => "Sleep Quarters",
            Self::Galley => "Galley",
            Self::Wardroom => "Wardroom",
            Self::Laboratory => "Laboratory",
            Self::Airlock => "Airlock",
            Self::Hygiene => "Hygiene",
            Self::Exercise => "Exercise",
            Self::Medical => "Medical Bay",
            Self::Storage => "Storage",
            Self::Workshop => "Workshop",
            Self::CommandControl => "Command & Control",
            Self::LifeSupport => "Life Support",
            Self::PowerSystems => "Power Systems",
        }
    }

    /// Modules that run equipment crews service in place (ECLSS racks, power
    /// conditioning, tools).
    pub fn is_service(&self) -> bool {
        matches!(
            self,
            Self::LifeSupport | Self::PowerSystems | Self::Storage | Self::Workshop
        )
    }

    /// Modules that anchor emergency response.
    pub fn is_emergency(&self) -> bool {
        matches!(self, Self::Medical | Self::CommandControl)
    }

    /// Catalog entry with typical dimensions and budgets for this type.
    pub fn standard_requirement(&self) -> ModuleRequirement {
        use ModuleType as T;
        match self {
            T::SleepQuarters => requirement(
                *self,
                [2.0, 2.0, 2.2],
                500.0,
                100.0,
                1.0,
                &[T::Hygiene],
                &[T::Exercise, T::Workshop],
                2,
            ),
            T::Galley => requirement(
                *self,
                [2.5, 2.0, 2.2],
                800.0,
                1_500.0,
                3.0,
                &[T::Wardroom, T::Storage],
                &[T::Hygiene, T::Laboratory],
                2,
            ),
            T::Wardroom => requirement(
                *self,
                [3.0, 2.5, 2.2],
                600.0,
                300.0,
                0.5,
                &[T::Galley],
                &[],
                3,
            ),
            T::Laboratory => requirement(
                *self,
                [3.0, 2.5, 2.2],
                1_200.0,
                2_000.0,
                2.0,
                &[T::Workshop],
                &[T::Galley, T::SleepQuarters],
                2,
            ),
            T::Airlock => requirement(
                *self,
                [2.0, 2.0, 2.4],
                1_500.0,
                500.0,
                0.5,
                &[T::Storage],
                &[T::SleepQuarters],
                2,
            ),
            T::Hygiene => requirement(
                *self,
                [1.5, 1.5, 2.2],
                400.0,
                800.0,
                0.5,
                &[T::SleepQuarters],
                &[T::Galley],
                1,
            ),
            T::Exercise => requirement(
                *self,
                [3.0, 2.5, 2.2],
                600.0,
                400.0,
                0.5,
                &[T::Hygiene],
                &[T::SleepQuarters],
                2,
            ),
            T::Medical => requirement(
                *self,
                [2.5, 2.5, 2.2],
                900.0,
                1_200.0,
                1.5,
                &[T::SleepQuarters, T::Airlock],
                &[T::Galley],
                2,
            ),
            T::Storage => requirement(*self, [2.0, 2.0, 2.2], 300.0, 50.0, 8.0, &[], &[], 2),
            T::Workshop => requirement(
                *self,
                [2.5, 2.0, 2.2],
                700.0,
                1_500.0,
                2.0,
                &[T::Storage, T::Laboratory],
                &[T::SleepQuarters],
                2,
            ),
            T::CommandControl => requirement(
                *self,
                [2.5, 2.0, 2.2],
                800.0,
                1_800.0,
                1.0,
                &[T::Airlock],
                &[],
                3,
            ),
            T::LifeSupport => requirement(
                *self,
                [2.0, 2.0, 2.2],
                1_800.0,
                3_000.0,
                1.0,
                &[T::PowerSystems],
                &[T::SleepQuarters],
                2,
            ),
            T::PowerSystems => requirement(
                *self,
                [2.0, 2.0, 2.2],
                2_000.0,
                200.0,
                0.5,
                &[T::LifeSupport],
                &[T::SleepQuarters, T::Medical],
                2,
            ),
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn requirement(
    kind: ModuleType,
    dimensions: [f64; 3],
    mass: f64,
    power: f64,
    stowage: f64,
    preferences: &[ModuleType],
    restrictions: &[ModuleType],
    port_count: u8,
) -> ModuleRequirement {
    ModuleRequirement {
        kind,
        name: kind.display_name().to_string(),
        dimensions: Vec3::new(dimensions[0], dimensions[1], dimensions[2]),
        mass,
        power,
        stowage,
        preferences: preferences.to_vec(),
        restrictions: restrictions.to_vec(),
        port_count,
    }
}

/// Immutable catalog entry for one required module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleRequirement {
    pub kind: ModuleType,
    pub name: String,
    /// Bounding box (x, y, z) in metres.
    pub dimensions: Vec3,
    /// kg
    pub mass: f64,
    /// W
    pub power: f64,
    /// m³
    pub stowage: f64,
    #[serde(default)]
    pub preferences: Vec<ModuleType>,
    #[serde(default)]
    pub restrictions: Vec<ModuleType>,
    #[serde(default = "default_ports")]
    pub port_count: u8,
}

fn default_ports() -> u8 {
    2
}

impl ModuleRequirement {
    pub fn half_extents(&self) -> Vec3 {
        self.dimensions * 0.5
    }

    pub fn volume(&self) -> f64 {
        self.dimensions.x * self.dimensions.y * self.dimensions.z
    }

    pub fn prefers(&self, other: ModuleType) -> bool {
        self.preferences.contains(&other)
    }

    pub fn restricts(&self, other: ModuleType) -> bool {
        self.restrictions.contains(&other)
    }
}

/// Structured instance key: module type plus 1-based ordinal among
/// instances of that type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ModuleId {
    pub kind: ModuleType,
    pub ordinal: u16,
}

impl ModuleId {
    pub fn new(kind: ModuleType, ordinal: u16) -> Self {
        Self { kind, ordinal }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.kind.slug(), self.ordinal)
    }
}

/// Ordered required-module list with instance ids assigned.
#[derive(Debug, Clone, Default)]
pub struct ModuleCatalog {
    entries: Vec<(ModuleId, Arc<ModuleRequirement>)>,
}

impl ModuleCatalog {
    /// Assign ids in list order; ordinals count per module type.
    pub fn new(modules: &[ModuleRequirement]) -> Self {
        let mut counts: Vec<(ModuleType, u16)> = Vec::new();
        let entries = modules
            .iter()
            .map(|m| {
                let ordinal = match counts.iter_mut().find(|(k, _)| *k == m.kind) {
                    Some((_, n)) => {
                        *n += 1;
                        *n
                    }
                    None => {
                        counts.push((m.kind, 1));
                        1
                    }
                };
                (ModuleId::new(m.kind, ordinal), Arc::new(m.clone()))
            })
            .collect();
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &Arc<ModuleRequirement>)> {
        self.entries.iter().map(|(id, m)| (*id, m))
    }

    pub fn ids(&self) -> Vec<ModuleId> {
        self.entries.iter().map(|(id, _)| *id).collect()
    }

    /// Requirement for an instance id, if it belongs to this catalog.
    pub fn lookup(&self, id: ModuleId) -> Option<&ModuleRequirement> {
        self.entries
            .iter()
            .find(|(entry_id, _)| *entry_id == id)
            .map(|(_, m)| m.as_ref())
    }

    pub fn count_of(&self, kind: ModuleType) -> usize {
        self.entries.iter().filter(|(id, _)| id.kind == kind).count()
    }

    pub fn total_volume(&self) -> f64 {
        self.entries.iter().map(|(_, m)| m.volume()).sum()
    }

    /// Largest bounding-sphere radius of any module (half the box diagonal).
    pub fn max_bounding_radius(&self) -> f64 {
        self.entries
            .iter()
            .map(|(_, m)| m.half_extents().norm())
            .fold(0.0, f64::max)
    }

    pub(crate) fn entry(&self, index: usize) -> (ModuleId, &Arc<ModuleRequirement>) {
        let (id, m) = &self.entries[index];
        (*id, m)
    }
}

/// A module instance's position and rotation inside the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub id: ModuleId,
    pub module: Arc<ModuleRequirement>,
    /// Envelope-local centre, m.
    pub position: Vec3,
    /// Rotation about Z in degrees, normalized to [0, 360).
    pub rotation_deg: f64,
    /// Instances this placement declares a hatch to regardless of distance.
    #[serde(default)]
    pub explicit_links: Vec<ModuleId>,
}

impl Placement {
    pub fn new(
        id: ModuleId,
        module: Arc<ModuleRequirement>,
        position: Vec3,
        rotation_deg: f64,
    ) -> Self {
        Self {
            id,
            module,
            position,
            rotation_deg: normalize_rotation(rotation_deg),
            explicit_links: Vec::new(),
        }
    }

    pub fn with_link(mut self, other: ModuleId) -> Self {
        if !self.explicit_links.contains(&other) {
            self.explicit_links.push(other);
        }
        self
    }

    pub fn kind(&self) -> ModuleType {
        self.id.kind
    }

    pub fn bounding_box(&self) -> OrientedBoundingBox {
        OrientedBoundingBox::new(self.position, self.module.half_extents(), self.rotation_deg)
    }

    pub fn distance_to(&self, other: &Placement) -> f64 {
        (self.position - other.position).norm()
    }

    pub fn links_to(&self, other: ModuleId) -> bool {
        self.explicit_links.contains(&other)
    }
}

/// Wrap any angle into [0, 360).
pub fn normalize_rotation(degrees: f64) -> f64 {
    if !degrees.is_finite() {
        return 0.0;
    }
    let r = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if r >= 360.0 {
        0.0
    } else {
        r
    }
}
