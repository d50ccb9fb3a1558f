//! Scoring contract, objective mapping and the reference habitat scorer.
//!
//! The optimizer only sees [`PerformanceMetrics`]. Which fields it minimizes
//! is decided by the run's [`Objective`] list; each objective knows how to
//! turn its field into a value where lower is better.

use serde::{Deserialize, Serialize};

use crate::config::ConnectivityConfig;
use crate::connectivity::ConnectivityGraph;
use crate::constants::budgets;
use crate::envelope::Envelope;
use crate::error::ScoringError;
use crate::grammar::LayoutGrammar;
use crate::mission::MissionParameters;
use crate::modules::{ModuleType, Placement};
use crate::validator::ConnectivityValidator;

/// Physical performance of one layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Traffic-weighted mean crew transit time, s.
    pub mean_transit_time: f64,
    /// Slowest emergency egress time, s.
    pub egress_time: f64,
    /// kg
    pub mass_total: f64,
    /// W
    pub power_budget: f64,
    /// Spare heat rejection fraction, [-1, 1].
    pub thermal_margin: f64,
    /// Spare life support fraction, [-1, 1].
    pub lss_margin: f64,
    /// Stowage demand over capacity.
    pub stowage_utilization: f64,
    pub connectivity_score: Option<f64>,
    pub safety_score: Option<f64>,
    pub efficiency_score: Option<f64>,
    pub volume_utilization: Option<f64>,
}

impl PerformanceMetrics {
    /// Check every field against its documented range.
    pub fn validate(&self) -> Result<(), String> {
        let checks: [(&str, f64, f64, f64); 7] = [
            ("mean_transit_time", self.mean_transit_time, 0.0, f64::MAX),
            ("egress_time", self.egress_time, 0.0, f64::MAX),
            ("mass_total", self.mass_total, f64::MIN_POSITIVE, f64::MAX),
            ("power_budget", self.power_budget, 0.0, f64::MAX),
            ("thermal_margin", self.thermal_margin, -1.0, 1.0),
            ("lss_margin", self.lss_margin, -1.0, 1.0),
            ("stowage_utilization", self.stowage_utilization, 0.0, f64::MAX),
        ];
        for (name, value, lo, hi) in checks {
            if !value.is_finite() || value < lo || value > hi {
                return Err(format!("{} = {} is out of range", name, value));
            }
        }
        let scores = [
            ("connectivity_score", self.connectivity_score),
            ("safety_score", self.safety_score),
            ("efficiency_score", self.efficiency_score),
            ("volume_utilization", self.volume_utilization),
        ];
        for (name, value) in scores {
            if let Some(v) = value {
                if !(0.0..=1.0).contains(&v) {
                    return Err(format!("{} = {} is outside [0, 1]", name, v));
                }
            }
        }
        Ok(())
    }
}

/// Turns a layout into performance metrics. Must be a pure function of its
/// inputs so runs stay reproducible.
pub trait Scoring: Send + Sync {
    fn score(
        &self,
        placements: &[Placement],
        envelope: &Envelope,
        mission: &MissionParameters,
    ) -> Result<PerformanceMetrics, ScoringError>;
}

impl<F> Scoring for F
where
    F: Fn(&[Placement], &Envelope, &MissionParameters) -> Result<PerformanceMetrics, ScoringError>
        + Send
        + Sync,
{
    fn score(
        &self,
        placements: &[Placement],
        envelope: &Envelope,
        mission: &MissionParameters,
    ) -> Result<PerformanceMetrics, ScoringError> {
        self(placements, envelope, mission)
    }
}

/// An optimization objective. All values are minimized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    TransitTime,
    EgressTime,
    Mass,
    Power,
    ThermalMargin,
    LssMargin,
    StowageUtilization,
    Safety,
    Connectivity,
    Efficiency,
    VolumeUtilization,
}

impl Objective {
    pub const DEFAULT: [Objective; 5] = [
        Objective::TransitTime,
        Objective::Mass,
        Objective::Power,
        Objective::Safety,
        Objective::ThermalMargin,
    ];

    pub const ALL: [Objective; 11] = [
        Objective::TransitTime,
        Objective::EgressTime,
        Objective::Mass,
        Objective::Power,
        Objective::ThermalMargin,
        Objective::LssMargin,
        Objective::StowageUtilization,
        Objective::Safety,
        Objective::Connectivity,
        Objective::Efficiency,
        Objective::VolumeUtilization,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::TransitTime => "transit_time",
            Self::EgressTime => "egress_time",
            Self::Mass => "mass",
            Self::Power => "power",
            Self::ThermalMargin => "thermal_margin",
            Self::LssMargin => "lss_margin",
            Self::StowageUtilization => "stowage_utilization",
            Self::Safety => "safety",
            Self::Connectivity => "connectivity",
            Self::Efficiency => "efficiency",
            Self::VolumeUtilization => "volume_utilization",
        }
    }

    pub fn from_name(name: &str) -> Option<Objective> {
        Self::ALL.iter().copied().find(|o| o.name() == name)
    }

    /// Minimization value. Scores in [0, 1] become `1 - score`, margins in
    /// [-1, 1] become `1 - margin`; a missing score counts as the worst.
    pub fn value(&self, m: &PerformanceMetrics) -> f64 {
        let inverted = |score: Option<f64>| 1.0 - score.unwrap_or(0.0).clamp(0.0, 1.0);
        match self {
            Self::TransitTime => m.mean_transit_time,
            Self::EgressTime => m.egress_time,
            Self::Mass => m.mass_total,
            Self::Power => m.power_budget,
            Self::ThermalMargin => 1.0 - m.thermal_margin,
            Self::LssMargin => 1.0 - m.lss_margin,
            Self::StowageUtilization => m.stowage_utilization,
            Self::Safety => inverted(m.safety_score),
            Self::Connectivity => inverted(m.connectivity_score),
            Self::Efficiency => inverted(m.efficiency_score),
            Self::VolumeUtilization => inverted(m.volume_utilization),
        }
    }
}

/// Map metrics onto an objective list.
pub fn objective_vector(objectives: &[Objective], metrics: &PerformanceMetrics) -> Vec<f64> {
    objectives.iter().map(|o| o.value(metrics)).collect()
}

/// Reference scorer built from simple, transparent budgets. Pure and
/// deterministic.
#[derive(Debug, Clone, Default)]
pub struct HabitatScorer {
    connectivity: ConnectivityConfig,
    grammar: LayoutGrammar,
}

impl HabitatScorer {
    pub fn new(connectivity: ConnectivityConfig) -> Self {
        Self {
            connectivity,
            grammar: LayoutGrammar::default(),
        }
    }

    pub fn with_grammar(mut self, grammar: LayoutGrammar) -> Self {
        self.grammar = grammar;
        self
    }
}

impl Scoring for HabitatScorer {
    fn score(
        &self,
        placements: &[Placement],
        envelope: &Envelope,
        mission: &MissionParameters,
    ) -> Result<PerformanceMetrics, ScoringError> {
        if placements.is_empty() {
            return Err(ScoringError::new("layout has no placements"));
        }
        let graph = ConnectivityGraph::build(placements, &self.connectivity);
        let validator = ConnectivityValidator::new(&graph, &self.connectivity);
        let airlocks = validator.airlocks();
        let egress =
            validator.validate_emergency_egress(&airlocks, self.connectivity.max_egress_time);
        let redundancy = validator.validate_airlock_redundancy(
            self.connectivity.min_airlock_count,
            self.connectivity.min_airlock_separation,
        );

        let mean_transit_time = self.transit_time(placements, &graph);
        let egress_time = egress
            .worst_time()
            .min(budgets::UNREACHABLE_EGRESS_TIME);

        let module_mass: f64 = placements.iter().map(|p| p.module.mass).sum();
        let mass_total =
            module_mass + graph.spanning_length() * budgets::STRUCTURE_MASS_PER_METER;

        let power_budget = power_budget(placements);
        let thermal_margin = thermal_margin(placements, power_budget);
        let lss_margin = lss_margin(placements, mission);
        let stowage_utilization = stowage_utilization(placements, mission);

        // ── scores ──
        let safety_score = if airlocks.is_empty() {
            0.0
        } else {
            let egress_part = if egress_time.is_finite() {
                (1.0 - egress_time / self.connectivity.max_egress_time).clamp(0.0, 1.0)
            } else {
                0.0
            };
            let redundancy_part = (1.0 - 0.25 * redundancy.violations.len() as f64).max(0.0);
            let hazards = self.grammar.check_restricted_adjacency(placements).len();
            let hazard_part = (1.0 - 0.25 * hazards as f64).max(0.0);
            (0.5 * egress_part + 0.3 * redundancy_part + 0.2 * hazard_part).clamp(0.0, 1.0)
        };

        let n = placements.len();
        let connectivity_score = if n <= 1 {
            1.0
        } else {
            let largest = graph
                .connected_components()
                .iter()
                .map(Vec::len)
                .max()
                .unwrap_or(0);
            let closeness = graph.centrality_metrics().mean_closeness();
            (0.7 * largest as f64 / n as f64 + 0.3 * closeness).clamp(0.0, 1.0)
        };

        let efficiency_score = self.preference_satisfaction(placements);
        let envelope_volume = envelope.volume();
        let volume_utilization = if envelope_volume > 0.0 {
            (placements.iter().map(|p| p.module.volume()).sum::<f64>() / envelope_volume)
                .clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(PerformanceMetrics {
            mean_transit_time,
            egress_time,
            mass_total,
            power_budget,
            thermal_margin,
            lss_margin,
            stowage_utilization,
            connectivity_score: Some(connectivity_score),
            safety_score: Some(safety_score),
            efficiency_score: Some(efficiency_score),
            volume_utilization: Some(volume_utilization),
        })
    }
}

impl HabitatScorer {
    /// Mean walking time over all module pairs, pairs with a declared
    /// preference weighted double. Cut-off pairs walk a detour.
    fn transit_time(&self, placements: &[Placement], graph: &ConnectivityGraph) -> f64 {
        let mut weighted = 0.0;
        let mut total_weight = 0.0;
        for (i, a) in placements.iter().enumerate() {
            let distances = graph.distances_from(a.id);
            for b in &placements[i + 1..] {
                let routed = distances
                    .iter()
                    .find(|(id, _)| *id == b.id)
                    .map_or(f64::INFINITY, |(_, d)| *d);
                let distance = if routed.is_finite() {
                    routed
                } else {
                    a.distance_to(b) * budgets::UNREACHABLE_DETOUR
                };
                let weight = if a.module.prefers(b.kind()) || b.module.prefers(a.kind()) {
                    2.0
                } else {
                    1.0
                };
                weighted += weight * distance / self.connectivity.walking_speed;
                total_weight += weight;
            }
        }
        if total_weight > 0.0 {
            weighted / total_weight
        } else {
            0.0
        }
    }

    /// Share of (module, preferred type) pairs met within the preferred
    /// distance. Pairs whose partner type is absent are ignored.
    fn preference_satisfaction(&self, placements: &[Placement]) -> f64 {
        let applicable: usize = placements
            .iter()
            .map(|a| {
                a.module
                    .preferences
                    .iter()
                    .filter(|k| placements.iter().any(|b| b.kind() == **k && b.id != a.id))
                    .count()
            })
            .sum();
        if applicable == 0 {
            return 1.0;
        }
        let unmet = self.grammar.check_preferences(placements).len();
        (1.0 - unmet as f64 / applicable as f64).clamp(0.0, 1.0)
    }
}

/// Module draw plus distribution loss from the nearest power module (or the
/// envelope origin without one).
fn power_budget(placements: &[Placement]) -> f64 {
    let sources: Vec<&Placement> = placements
        .iter()
        .filter(|p| p.kind() == ModuleType::PowerSystems)
        .collect();
    placements
        .iter()
        .map(|p| {
            let run = if sources.is_empty() {
                p.position.norm()
            } else {
                sources
                    .iter()
                    .map(|s| p.distance_to(s))
                    .fold(f64::INFINITY, f64::min)
            };
            p.module.power + run * budgets::DISTRIBUTION_LOSS_PER_METER
        })
        .sum()
}

fn thermal_margin(placements: &[Placement], load: f64) -> f64 {
    let radiators = placements
        .iter()
        .filter(|p| p.kind() == ModuleType::PowerSystems)
        .count();
    let capacity = budgets::BASE_HEAT_REJECTION
        + budgets::HEAT_REJECTION_PER_POWER_MODULE * radiators as f64;
    let hot: Vec<&Placement> = placements
        .iter()
        .filter(|p| p.module.power > budgets::HIGH_HEAT_POWER)
        .collect();
    let mut clustered = 0usize;
    for (i, a) in hot.iter().enumerate() {
        for b in &hot[i + 1..] {
            if a.distance_to(b) < budgets::HEAT_CLUSTER_DISTANCE {
                clustered += 1;
            }
        }
    }
    ((capacity - load) / capacity - budgets::HEAT_CLUSTER_LOSS * clustered as f64).clamp(-1.0, 1.0)
}

fn lss_margin(placements: &[Placement], mission: &MissionParameters) -> f64 {
    let units = placements
        .iter()
        .filter(|p| p.kind() == ModuleType::LifeSupport)
        .count();
    let supported = budgets::BASELINE_LSS_CREW + budgets::LSS_CREW_PER_MODULE * units as f64;
    let crew = f64::from(mission.crew_size);
    let scale = supported.max(crew).max(1.0);
    ((supported - crew) / scale).clamp(-1.0, 1.0)
}

fn stowage_utilization(placements: &[Placement], mission: &MissionParameters) -> f64 {
    let capacity: f64 = placements.iter().map(|p| p.module.stowage).sum();
    let demand =
        f64::from(mission.crew_size) * mission.duration_days * budgets::STOWAGE_PER_CREW_DAY;
    if capacity <= 0.0 {
        return if demand > 0.0 { 10.0 } else { 0.0 };
    }
    (demand / capacity).min(10.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec3;
    use crate::modules::ModuleId;
    use std::sync::Arc;

    fn place(kind: ModuleType, n: u16, x: f64, y: f64) -> Placement {
        Placement::new(
            ModuleId::new(kind, n),
            Arc::new(kind.standard_requirement()),
            Vec3::new(x, y, 0.0),
            0.0,
        )
    }

    fn hull() -> Envelope {
        Envelope::Cylinder {
            radius: 5.0,
            length: 20.0,
        }
    }

    fn small_layout() -> Vec<Placement> {
        vec![
            place(ModuleType::Airlock, 1, -6.0, 0.0),
            place(ModuleType::Galley, 1, 0.0, 0.0),
            place(ModuleType::Wardroom, 1, 4.0, 0.0),
            place(ModuleType::Airlock, 2, 9.0, 0.0),
        ]
    }

    #[test]
    fn test_reference_scorer_produces_valid_metrics() {
        let scorer = HabitatScorer::default();
        let metrics = scorer
            .score(&small_layout(), &hull(), &MissionParameters::default())
            .unwrap();
        assert!(metrics.validate().is_ok(), "{:?}", metrics);
        assert!(metrics.mass_total > 0.0);
        assert!(metrics.safety_score.unwrap() > 0.0);
    }

    #[test]
    fn test_scorer_is_deterministic() {
        let scorer = HabitatScorer::default();
        let mission = MissionParameters::default();
        let a = scorer.score(&small_layout(), &hull(), &mission).unwrap();
        let b = scorer.score(&small_layout(), &hull(), &mission).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_airlock_safety_is_worst() {
        let scorer = HabitatScorer::default();
        let layout = vec![
            place(ModuleType::Galley, 1, 0.0, 0.0),
            place(ModuleType::Wardroom, 1, 4.0, 0.0),
        ];
        let metrics = scorer
            .score(&layout, &hull(), &MissionParameters::default())
            .unwrap();
        assert_eq!(metrics.safety_score, Some(0.0));
        assert_eq!(Objective::Safety.value(&metrics), 1.0);
        assert!((metrics.egress_time - budgets::UNREACHABLE_EGRESS_TIME).abs() < 1e-9);
    }

    #[test]
    fn test_empty_layout_is_an_error() {
        let scorer = HabitatScorer::default();
        assert!(scorer
            .score(&[], &hull(), &MissionParameters::default())
            .is_err());
    }

    #[test]
    fn test_closer_modules_transit_faster() {
        let scorer = HabitatScorer::default();
        let mission = MissionParameters::default();
        let tight = vec![
            place(ModuleType::Galley, 1, 0.0, 0.0),
            place(ModuleType::Wardroom, 1, 3.0, 0.0),
        ];
        let loose = vec![
            place(ModuleType::Galley, 1, 0.0, 0.0),
            place(ModuleType::Wardroom, 1, 7.0, 0.0),
        ];
        let t = scorer.score(&tight, &hull(), &mission).unwrap();
        let l = scorer.score(&loose, &hull(), &mission).unwrap();
        assert!(t.mean_transit_time < l.mean_transit_time);
    }

    #[test]
    fn test_metrics_validation_rejects_out_of_range() {
        let scorer = HabitatScorer::default();
        let mut metrics = scorer
            .score(&small_layout(), &hull(), &MissionParameters::default())
            .unwrap();
        metrics.thermal_margin = 1.5;
        assert!(metrics.validate().is_err());
        metrics.thermal_margin = 0.0;
        metrics.safety_score = Some(f64::NAN);
        assert!(metrics.validate().is_err());
    }

    #[test]
    fn test_objective_names_round_trip() {
        for o in Objective::ALL {
            assert_eq!(Objective::from_name(o.name()), Some(o));
        }
        assert_eq!(Objective::from_name("comfort"), None);
    }

    #[test]
    fn test_closure_implements_scoring() {
        let failing = |_: &[Placement], _: &Envelope, _: &MissionParameters| {
            Err::<PerformanceMetrics, _>(ScoringError::new("offline"))
        };
        let err = failing
            .score(&small_layout(), &hull(), &MissionParameters::default())
            .unwrap_err();
        assert!(err.to_string().contains("offline"));
    }
}
