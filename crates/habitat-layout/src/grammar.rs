//! Layout grammar: soft placement rules scored as penalties.
//!
//! Each `check_*` function inspects one concern and returns the violations it
//! finds. [`LayoutGrammar::evaluate`] runs the geometric checks; connectivity
//! results are folded in with [`LayoutGrammar::from_connectivity`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::grammar::{AIRLOCK_PERIPHERY, PREFERRED_DISTANCE, RESTRICTED_SEPARATION};
use crate::envelope::Envelope;
use crate::modules::{ModuleId, ModuleType, Placement};
use crate::validator::{EgressReport, RedundancyReport, RedundancyViolation};

/// Rule severity. The weight is the number of penalty points per violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSeverity {
    Minor,
    Major,
    Critical,
}

impl RuleSeverity {
    pub fn weight(&self) -> f64 {
        match self {
            Self::Minor => 1.0,
            Self::Major => 5.0,
            Self::Critical => 20.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Minor => "MINOR",
            Self::Major => "MAJOR",
            Self::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    RestrictedAdjacency,
    UnmetPreference,
    AirlockPlacement,
    MissingAirlock,
    EgressTime,
    AirlockRedundancy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    pub kind: RuleKind,
    pub severity: RuleSeverity,
    pub modules: Vec<ModuleId>,
    pub message: String,
}

impl fmt::Display for RuleViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity.label(), self.message)
    }
}

/// Sum of severity weights.
pub fn severity_points(violations: &[RuleViolation]) -> f64 {
    violations.iter().map(|v| v.severity.weight()).sum()
}

pub fn critical_count(violations: &[RuleViolation]) -> usize {
    violations
        .iter()
        .filter(|v| v.severity == RuleSeverity::Critical)
        .count()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutGrammar {
    /// Restricted pairs closer than this (centre distance, m) violate.
    pub restricted_separation: f64,
    /// Preferred partners should be within this centre distance, m.
    pub preferred_distance: f64,
    /// Airlock centres deeper than this from the wall violate, m.
    pub airlock_periphery: f64,
    /// Restricted pairs that are a contamination or fire hazard.
    pub hazardous_pairs: Vec<(ModuleType, ModuleType)>,
}

impl Default for LayoutGrammar {
    fn default() -> Self {
        Self {
            restricted_separation: RESTRICTED_SEPARATION,
            preferred_distance: PREFERRED_DISTANCE,
            airlock_periphery: AIRLOCK_PERIPHERY,
            hazardous_pairs: vec![
                (ModuleType::Galley, ModuleType::Hygiene),
                (ModuleType::Galley, ModuleType::Laboratory),
            ],
        }
    }
}

impl LayoutGrammar {
    pub fn is_hazardous(&self, a: ModuleType, b: ModuleType) -> bool {
        self.hazardous_pairs
            .iter()
            .any(|&(x, y)| (x == a && y == b) || (x == b && y == a))
    }

    /// All geometric rule checks.
    pub fn evaluate(&self, placements: &[Placement], envelope: &Envelope) -> Vec<RuleViolation> {
        let mut violations = Vec::new();
        violations.extend(self.check_restricted_adjacency(placements));
        violations.extend(self.check_preferences(placements));
        violations.extend(check_airlock_presence(placements));
        violations.extend(self.check_airlock_placement(placements, envelope));
        violations
    }

    /// Egress and redundancy results as rule violations.
    pub fn from_connectivity(
        &self,
        egress: &EgressReport,
        redundancy: &RedundancyReport,
    ) -> Vec<RuleViolation> {
        let mut violations: Vec<RuleViolation> = egress
            .violations
            .iter()
            .map(|v| RuleViolation {
                kind: RuleKind::EgressTime,
                severity: RuleSeverity::Major,
                modules: vec![v.module],
                message: v.to_string(),
            })
            .collect();
        for v in &redundancy.violations {
            let (severity, modules) = match v {
                RedundancyViolation::InsufficientAirlocks { .. } => {
                    (RuleSeverity::Major, Vec::new())
                }
                RedundancyViolation::AirlocksTooClose { a, b, .. } => {
                    (RuleSeverity::Minor, vec![*a, *b])
                }
                RedundancyViolation::SingleAirlockAccess { module, .. } => {
                    (RuleSeverity::Minor, vec![*module])
                }
            };
            violations.push(RuleViolation {
                kind: RuleKind::AirlockRedundancy,
                severity,
                modules,
                message: v.to_string(),
            });
        }
        violations
    }

    // ── A. Pairwise adjacency ───────────────────────────────────────────

    /// Restricted pairs placed closer than the separation threshold.
    pub fn check_restricted_adjacency(&self, placements: &[Placement]) -> Vec<RuleViolation> {
        let mut violations = Vec::new();
        for (i, a) in placements.iter().enumerate() {
            for b in &placements[i + 1..] {
                if !(a.module.restricts(b.kind()) || b.module.restricts(a.kind())) {
                    continue;
                }
                let distance = a.distance_to(b);
                if distance >= self.restricted_separation {
                    continue;
                }
                let severity = if self.is_hazardous(a.kind(), b.kind()) {
                    RuleSeverity::Critical
                } else {
                    RuleSeverity::Major
                };
                violations.push(RuleViolation {
                    kind: RuleKind::RestrictedAdjacency,
                    severity,
                    modules: vec![a.id, b.id],
                    message: format!(
                        "{} and {} are {:.1} m apart (keep at least {:.1} m)",
                        a.id, b.id, distance, self.restricted_separation
                    ),
                });
            }
        }
        violations
    }

    /// Preferred partner types that exist in the layout but none within
    /// reach. One violation per (module, preferred type).
    pub fn check_preferences(&self, placements: &[Placement]) -> Vec<RuleViolation> {
        let mut violations = Vec::new();
        for a in placements {
            for &kind in &a.module.preferences {
                let mut partners = placements
                    .iter()
                    .filter(|b| b.kind() == kind && b.id != a.id)
                    .peekable();
                if partners.peek().is_none() {
                    continue;
                }
                let nearest = partners
                    .map(|b| a.distance_to(b))
                    .fold(f64::INFINITY, f64::min);
                if nearest <= self.preferred_distance {
                    continue;
                }
                violations.push(RuleViolation {
                    kind: RuleKind::UnmetPreference,
                    severity: RuleSeverity::Minor,
                    modules: vec![a.id],
                    message: format!(
                        "{} has no {} within {:.1} m (nearest {:.1} m)",
                        a.id,
                        kind.display_name(),
                        self.preferred_distance,
                        nearest
                    ),
                });
            }
        }
        violations
    }

    // ── B. Airlocks ─────────────────────────────────────────────────────

    /// Airlocks should sit near the pressure hull.
    pub fn check_airlock_placement(
        &self,
        placements: &[Placement],
        envelope: &Envelope,
    ) -> Vec<RuleViolation> {
        placements
            .iter()
            .filter(|p| p.kind() == ModuleType::Airlock)
            .filter_map(|p| {
                let depth = envelope.clearance_to_boundary(&p.position);
                if depth <= self.airlock_periphery {
                    return None;
                }
                Some(RuleViolation {
                    kind: RuleKind::AirlockPlacement,
                    severity: RuleSeverity::Minor,
                    modules: vec![p.id],
                    message: format!(
                        "{} sits {:.1} m inside the hull (periphery is {:.1} m)",
                        p.id, depth, self.airlock_periphery
                    ),
                })
            })
            .collect()
    }
}

/// A layout without any airlock has no egress at all.
pub fn check_airlock_presence(placements: &[Placement]) -> Vec<RuleViolation> {
    if placements.is_empty() || placements.iter().any(|p| p.kind() == ModuleType::Airlock) {
        return Vec::new();
    }
    vec![RuleViolation {
        kind: RuleKind::MissingAirlock,
        severity: RuleSeverity::Major,
        modules: Vec::new(),
        message: "layout has no airlock".to_string(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectivityConfig;
    use crate::connectivity::ConnectivityGraph;
    use crate::geometry::Vec3;
    use crate::validator::ConnectivityValidator;
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

    #[test]
    fn test_galley_next_to_hygiene_is_critical() {
        let grammar = LayoutGrammar::default();
        let placements = vec![
            place(ModuleType::Galley, 1, 0.0, 0.0),
            place(ModuleType::Hygiene, 1, 2.0, 0.0),
        ];
        let violations = grammar.check_restricted_adjacency(&placements);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, RuleSeverity::Critical);
        assert_eq!(critical_count(&violations), 1);
        assert!(violations[0].to_string().starts_with("[CRITICAL]"));
    }

    #[test]
    fn test_non_hazardous_restriction_is_major() {
        let grammar = LayoutGrammar::default();
        let placements = vec![
            place(ModuleType::SleepQuarters, 1, 0.0, 0.0),
            place(ModuleType::Exercise, 1, 3.0, 0.0),
        ];
        let violations = grammar.check_restricted_adjacency(&placements);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, RuleSeverity::Major);
        // far enough apart
        let spaced = vec![
            place(ModuleType::SleepQuarters, 1, 0.0, 0.0),
            place(ModuleType::Exercise, 1, 5.0, 0.0),
        ];
        assert!(grammar.check_restricted_adjacency(&spaced).is_empty());
    }

    #[test]
    fn test_preference_only_when_partner_present() {
        let grammar = LayoutGrammar::default();
        // galley prefers wardroom and storage; only the wardroom exists
        let placements = vec![
            place(ModuleType::Galley, 1, -8.0, 0.0),
            place(ModuleType::Wardroom, 1, 8.0, 0.0),
        ];
        let violations = grammar.check_preferences(&placements);
        // galley → wardroom and wardroom → galley, both 16 m apart
        assert_eq!(violations.len(), 2);
        assert!(violations.iter().all(|v| v.severity == RuleSeverity::Minor));

        let close = vec![
            place(ModuleType::Galley, 1, 0.0, 0.0),
            place(ModuleType::Wardroom, 1, 4.0, 0.0),
        ];
        assert!(grammar.check_preferences(&close).is_empty());
    }

    #[test]
    fn test_missing_airlock_is_major() {
        let placements = vec![place(ModuleType::Galley, 1, 0.0, 0.0)];
        let violations = check_airlock_presence(&placements);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, RuleSeverity::Major);
        assert!(check_airlock_presence(&[]).is_empty());
    }

    #[test]
    fn test_airlock_in_the_middle_flagged() {
        let grammar = LayoutGrammar::default();
        let centre = vec![place(ModuleType::Airlock, 1, 0.0, 0.0)];
        assert_eq!(grammar.check_airlock_placement(&centre, &hull()).len(), 1);
        let wall = vec![place(ModuleType::Airlock, 1, 3.0, 0.0)];
        assert!(grammar.check_airlock_placement(&wall, &hull()).is_empty());
    }

    #[test]
    fn test_connectivity_violations_converted() {
        let config = ConnectivityConfig::default();
        let placements = vec![
            place(ModuleType::Galley, 1, 0.0, 0.0),
            place(ModuleType::Storage, 1, 4.0, 0.0),
        ];
        let graph = ConnectivityGraph::build(&placements, &config);
        let report = ConnectivityValidator::new(&graph, &config).report();
        let violations =
            LayoutGrammar::default().from_connectivity(&report.egress, &report.redundancy);
        // two unreachable modules plus the airlock shortfall
        assert_eq!(violations.len(), 3);
        assert!((severity_points(&violations) - 15.0).abs() < 1e-12);
        assert_eq!(critical_count(&violations), 0);
    }
}
