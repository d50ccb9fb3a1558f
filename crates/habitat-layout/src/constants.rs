//! Tuning constants: movement speeds, penalty costs and scorer budgets.
//!
//! Plain `f64` constants with no runtime dependency. Anything a caller may
//! want to change per run is mirrored in [`crate::config`] with these values
//! as defaults.

/// Crew movement through the habitat.
pub mod movement {
    /// Normal walking (floating) speed inside pressurized volume, m/s.
    pub const WALKING_SPEED: f64 = 1.0;
    /// Emergency translation speed, m/s.
    pub const EMERGENCY_SPEED: f64 = 1.5;
    /// Time lost passing through each intermediate module (hatch, turn), s.
    pub const PER_MODULE_TRAVERSAL: f64 = 3.0;
    /// Maximum allowed time to reach an airlock in an emergency, s.
    pub const MAX_EGRESS_TIME: f64 = 120.0;
}

/// Connection graph construction.
pub mod connections {
    /// Centre distance below which two modules are not considered hatch-linked.
    pub const MIN_CONNECTION_DISTANCE: f64 = 0.5;
    /// Centre distance above which two modules need a declared link.
    pub const MAX_CONNECTION_DISTANCE: f64 = 8.0;
    /// Minimum airlocks for redundant egress.
    pub const MIN_AIRLOCK_COUNT: usize = 2;
    /// Minimum separation between airlocks, m.
    pub const MIN_AIRLOCK_SEPARATION: f64 = 5.0;
    /// Normalized betweenness at or above which a module is a bottleneck.
    pub const BOTTLENECK_THRESHOLD: f64 = 0.5;
}

/// Geometry and decision bounds.
pub mod geometry {
    /// Default minimum clearance between module volumes, m.
    pub const MIN_CLEARANCE: f64 = 0.6;
    /// Fixed margin between the decision bounds and the envelope wall, m.
    pub const BOUNDS_MARGIN: f64 = 1.5;
    /// Extra radius added to spatial-index prefilter queries, m.
    pub const QUERY_MARGIN: f64 = 0.25;
    /// Shortfall reported for pairs the approximate test flags but whose
    /// surface distance already meets clearance, m.
    pub const MIN_SHORTFALL: f64 = 0.01;
    /// Containment tolerance for envelope checks, m.
    pub const CONTAINMENT_TOLERANCE: f64 = 1e-6;
    /// Added to the clearance between neighbours in a spaced layout, m.
    pub const SPACING_SLACK: f64 = 0.05;
    /// Spaced layouts keep neighbour pitch within this share of the
    /// maximum connection distance.
    pub const SPACED_REACH: f64 = 0.75;
}

/// Search setup.
pub mod search {
    /// Every this-many-th initial candidate is a spaced layout; the rest are
    /// uniform samples.
    pub const SPACED_EVERY: usize = 4;
}

/// Constraint penalty costs.
pub mod penalties {
    pub const COLLISION_PER_METER: f64 = 1_000.0;
    pub const DISCONNECTED: f64 = 500.0;
    pub const OUT_OF_BOUNDS_PER_MODULE: f64 = 200.0;
    /// Cost per severity point of a soft rule violation.
    pub const GRAMMAR_WEIGHT: f64 = 10.0;
    pub const CRITICAL_EXTRA: f64 = 100.0;
    pub const CATASTROPHIC_THRESHOLD: f64 = 10_000.0;
    pub const CATASTROPHIC_VALUE: f64 = 1.0e6;
}

/// Layout grammar thresholds.
pub mod grammar {
    /// Restricted module pairs must keep centres at least this far apart, m.
    pub const RESTRICTED_SEPARATION: f64 = 4.0;
    /// Preferred partners should sit within this centre distance, m.
    pub const PREFERRED_DISTANCE: f64 = 6.0;
    /// Airlock centres must be within this distance of the envelope wall, m.
    pub const AIRLOCK_PERIPHERY: f64 = 3.0;
}

/// Reference scorer budgets.
pub mod budgets {
    /// Pressurized tunnel / secondary structure mass per metre of spanning tree, kg.
    pub const STRUCTURE_MASS_PER_METER: f64 = 40.0;
    /// Power distribution loss per metre from the nearest power module, W.
    pub const DISTRIBUTION_LOSS_PER_METER: f64 = 5.0;
    /// Baseline heat rejection capacity of the habitat shell, W.
    pub const BASE_HEAT_REJECTION: f64 = 8_000.0;
    /// Heat rejection added by each power systems module (radiator loop), W.
    pub const HEAT_REJECTION_PER_POWER_MODULE: f64 = 6_000.0;
    /// Modules drawing more than this are treated as heat sources, W.
    pub const HIGH_HEAT_POWER: f64 = 1_000.0;
    /// Heat sources closer than this lose thermal margin, m.
    pub const HEAT_CLUSTER_DISTANCE: f64 = 4.0;
    pub const HEAT_CLUSTER_LOSS: f64 = 0.05;
    /// Crew supported by the habitat's built-in environmental control.
    pub const BASELINE_LSS_CREW: f64 = 2.0;
    /// Crew supported by each life support module.
    pub const LSS_CREW_PER_MODULE: f64 = 4.0;
    /// Stowage demand per crew member per day, m³.
    pub const STOWAGE_PER_CREW_DAY: f64 = 0.005;
    /// Egress time reported when no airlock is reachable, s.
    pub const UNREACHABLE_EGRESS_TIME: f64 = 600.0;
    /// Detour factor applied to straight-line distance for unreachable pairs.
    pub const UNREACHABLE_DETOUR: f64 = 3.0;
}

/// Pareto analysis defaults.
pub mod pareto {
    pub const HYPERVOLUME_SAMPLES: usize = 10_000;
    pub const DEFAULT_SEED: u64 = 0x5EED_1A70;
}
