//! What a finished optimization run hands back to the caller.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::grammar::{RuleSeverity, RuleViolation};
use crate::modules::Placement;
use crate::pareto::{ObjectiveVector, ParetoSummary};
use crate::problem::{Evaluation, PenaltyBreakdown};
use crate::scoring::{Objective, PerformanceMetrics};

/// One member of the search population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub genes: Vec<f64>,
    pub evaluation: Evaluation,
    /// Front index, 0 = non-dominated.
    pub rank: usize,
    /// Crowding distance within its front; infinite at the front's extremes.
    pub crowding: f64,
}

impl Candidate {
    pub fn new(genes: Vec<f64>, evaluation: Evaluation) -> Self {
        Self {
            genes,
            evaluation,
            rank: 0,
            crowding: 0.0,
        }
    }
}

impl ObjectiveVector for Candidate {
    fn objectives(&self) -> &[f64] {
        &self.evaluation.objectives
    }

    fn constraint_violation(&self) -> f64 {
        self.evaluation.constraint_violation()
    }
}

/// Why the generational loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    Cancelled,
    TimeLimit,
}

/// A feasible layout from the final Pareto set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutCandidate {
    pub placements: Vec<Placement>,
    /// Ranked objective values, soft penalties included.
    pub objective_vector: Vec<f64>,
    /// Objective values straight from the scorer.
    pub raw_objectives: Vec<f64>,
    pub metrics: PerformanceMetrics,
    pub penalty: PenaltyBreakdown,
    /// Soft rule violations still present.
    pub violations: Vec<RuleViolation>,
    pub explainability_text: String,
}

impl ObjectiveVector for LayoutCandidate {
    fn objectives(&self) -> &[f64] {
        &self.objective_vector
    }
}

impl LayoutCandidate {
    /// `None` unless the evaluation was scored.
    pub(crate) fn from_evaluation(placements: Vec<Placement>, evaluation: &Evaluation) -> Option<Self> {
        let metrics = evaluation.metrics.clone()?;
        let raw_objectives = evaluation.raw_objectives.clone()?;
        Some(Self {
            placements,
            objective_vector: evaluation.objectives.clone(),
            raw_objectives,
            metrics,
            penalty: evaluation.penalty.clone(),
            violations: evaluation.violations.clone(),
            explainability_text: String::new(),
        })
    }

    pub fn module_count(&self) -> usize {
        self.placements.len()
    }
}

/// Output of [`crate::optimizer::LayoutOptimizer::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Non-dominated feasible layouts.
    pub pareto_layouts: Vec<LayoutCandidate>,
    /// Weighted best compromise among `pareto_layouts`.
    pub best_layout: LayoutCandidate,
    /// Mean of front 0's first objective after each generation.
    pub convergence_history: Vec<f64>,
    pub generation_count: u32,
    pub evaluation_count: usize,
    pub wall_clock_seconds: f64,
    pub objectives: Vec<Objective>,
    pub final_population: Vec<Candidate>,
    pub stop_reason: StopReason,
    /// Evaluations that failed and were replaced by the catastrophic case.
    pub failed_evaluations: usize,
    pub summary: ParetoSummary,
}

impl OptimizationResult {
    /// Objective value of the best layout by name.
    pub fn best_objective(&self, objective: Objective) -> Option<f64> {
        let i = self.objectives.iter().position(|o| *o == objective)?;
        self.best_layout.raw_objectives.get(i).copied()
    }
}

/// Plain-language summary of one layout relative to the Pareto set it
/// belongs to. `ideal` and `nadir` bound the set's raw objectives.
pub fn explain(
    candidate: &LayoutCandidate,
    objectives: &[Objective],
    ideal: &[f64],
    nadir: &[f64],
    min_clearance: f64,
) -> String {
    let normalized: Vec<(Objective, f64)> = objectives
        .iter()
        .zip(&candidate.raw_objectives)
        .enumerate()
        .map(|(m, (o, v))| {
            let lo = ideal.get(m).copied().unwrap_or(*v);
            let hi = nadir.get(m).copied().unwrap_or(*v);
            let range = hi - lo;
            let n = if range > f64::EPSILON { (v - lo) / range } else { 0.0 };
            (*o, n)
        })
        .collect();

    let mut text = String::new();
    let strongest = normalized
        .iter()
        .min_by(|a, b| a.1.total_cmp(&b.1));
    let weakest = normalized
        .iter()
        .max_by(|a, b| a.1.total_cmp(&b.1));
    if let (Some(best), Some(worst)) = (strongest, weakest) {
        let _ = write!(
            text,
            "Strongest objective: {} ({:.2} of the Pareto range). Weakest objective: {} ({:.2}). ",
            best.0.name(),
            best.1,
            worst.0.name(),
            worst.1
        );
    }

    let penalty = &candidate.penalty;
    if penalty.violating_pairs == 0 {
        let _ = write!(text, "All module pairs keep {:.2} m clearance. ", min_clearance);
    } else {
        let _ = write!(
            text,
            "{} module pairs violate {:.2} m clearance. ",
            penalty.violating_pairs, min_clearance
        );
    }

    if penalty.egress_violations == 0 {
        let _ = write!(
            text,
            "Emergency egress within limits (worst {:.1} s). ",
            candidate.metrics.egress_time
        );
    } else {
        let _ = write!(
            text,
            "{} modules exceed the egress limit (worst {:.1} s). ",
            penalty.egress_violations, candidate.metrics.egress_time
        );
    }

    if candidate.violations.is_empty() {
        text.push_str("No layout rule violations.");
    } else {
        let count = |s: RuleSeverity| candidate.violations.iter().filter(|v| v.severity == s).count();
        let _ = write!(
            text,
            "Layout rule violations: {} critical, {} major, {} minor.",
            count(RuleSeverity::Critical),
            count(RuleSeverity::Major),
            count(RuleSeverity::Minor)
        );
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::RuleKind;

    fn metrics() -> PerformanceMetrics {
        PerformanceMetrics {
            mean_transit_time: 5.0,
            egress_time: 12.5,
            mass_total: 5_000.0,
            power_budget: 3_000.0,
            thermal_margin: 0.2,
            lss_margin: 0.3,
            stowage_utilization: 0.5,
            connectivity_score: Some(1.0),
            safety_score: Some(0.8),
            efficiency_score: None,
            volume_utilization: None,
        }
    }

    fn candidate(raw: Vec<f64>) -> LayoutCandidate {
        LayoutCandidate {
            placements: Vec::new(),
            objective_vector: raw.clone(),
            raw_objectives: raw,
            metrics: metrics(),
            penalty: PenaltyBreakdown::default(),
            violations: Vec::new(),
            explainability_text: String::new(),
        }
    }

    #[test]
    fn test_explain_names_extremes() {
        let objectives = [Objective::TransitTime, Objective::Mass];
        let c = candidate(vec![2.0, 9_000.0]);
        let text = explain(&c, &objectives, &[2.0, 5_000.0], &[10.0, 9_000.0], 0.6);
        assert!(text.starts_with("Strongest objective: transit_time (0.00"));
        assert!(text.contains("Weakest objective: mass (1.00)"));
        assert!(text.contains("keep 0.60 m clearance"));
        assert!(text.contains("worst 12.5 s"));
        assert!(text.ends_with("No layout rule violations."));
    }

    #[test]
    fn test_explain_counts_violations() {
        let objectives = [Objective::Mass];
        let mut c = candidate(vec![1.0]);
        c.penalty.egress_violations = 2;
        c.violations.push(RuleViolation {
            kind: RuleKind::MissingAirlock,
            severity: RuleSeverity::Major,
            modules: Vec::new(),
            message: "no airlock".to_string(),
        });
        let text = explain(&c, &objectives, &[1.0], &[1.0], 0.6);
        assert!(text.contains("2 modules exceed the egress limit"));
        assert!(text.contains("0 critical, 1 major, 0 minor"));
    }

    #[test]
    fn test_explain_is_deterministic() {
        let objectives = Objective::DEFAULT;
        let c = candidate(vec![1.0, 2.0, 3.0, 0.4, 0.8]);
        let ideal = [0.0; 5];
        let nadir = [2.0, 4.0, 6.0, 1.0, 1.0];
        assert_eq!(
            explain(&c, &objectives, &ideal, &nadir, 0.6),
            explain(&c, &objectives, &ideal, &nadir, 0.6)
        );
    }
}
