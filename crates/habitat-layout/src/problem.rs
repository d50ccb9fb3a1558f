//! Decision encoding and constrained evaluation of one layout candidate.
//!
//! A decision vector carries four genes per required module, in catalog
//! order: `x, y, z` inside the envelope's decision bounds and a rotation in
//! `[0, 360)` degrees about Z.
//!
//! Evaluation runs collision, envelope, connectivity and grammar checks,
//! folds their costs into a single penalty, and only calls the scorer when
//! that penalty is below the catastrophic threshold. It never panics or
//! returns an error: every failure becomes a catastrophic [`Evaluation`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::collision::CollisionDetector;
use crate::config::OptimizerConfig;
use crate::connectivity::ConnectivityGraph;
use crate::constants::geometry::{CONTAINMENT_TOLERANCE, SPACED_REACH, SPACING_SLACK};
use crate::envelope::{DecisionBounds, Envelope};
use crate::error::EvaluationFailure;
use crate::grammar::{critical_count, severity_points, LayoutGrammar, RuleViolation};
use crate::mission::MissionParameters;
use crate::modules::{normalize_rotation, ModuleCatalog, ModuleRequirement, Placement};
use crate::policy::{ConstraintPolicy, UniformPenalty};
use crate::scoring::{objective_vector, PerformanceMetrics, Scoring};
use crate::validator::ConnectivityValidator;

/// Genes per module: x, y, z, rotation.
pub const GENES_PER_MODULE: usize = 4;

/// Cost of each constraint class, plus the raw measurements behind it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PenaltyBreakdown {
    pub collision: f64,
    pub connectivity: f64,
    pub bounds: f64,
    pub grammar: f64,
    /// Summed clearance shortfall, m.
    pub clearance_shortfall: f64,
    pub violating_pairs: usize,
    pub out_of_bounds: usize,
    pub components: usize,
    pub critical_violations: usize,
    pub egress_violations: usize,
    pub redundancy_violations: usize,
}

impl PenaltyBreakdown {
    pub fn total(&self) -> f64 {
        self.collision + self.connectivity + self.bounds + self.grammar
    }

    /// No hard constraint is broken.
    pub fn hard_constraints_met(&self) -> bool {
        self.violating_pairs == 0 && self.out_of_bounds == 0 && self.components <= 1
    }
}

/// Outcome of evaluating one decision vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Penalized objective vector used for ranking.
    pub objectives: Vec<f64>,
    /// Objective values before the penalty was folded in. `None` when the
    /// scorer was not called.
    pub raw_objectives: Option<Vec<f64>>,
    pub metrics: Option<PerformanceMetrics>,
    pub penalty: PenaltyBreakdown,
    pub violations: Vec<RuleViolation>,
    pub catastrophic: bool,
    /// Set when evaluation failed and was replaced by the catastrophic case.
    pub failure: Option<String>,
}

impl Evaluation {
    /// Usable as a final layout: scored, and every hard constraint met.
    pub fn is_feasible(&self) -> bool {
        !self.catastrophic && self.failure.is_none() && self.penalty.hard_constraints_met()
    }

    /// Hard-constraint cost used to order infeasible candidates. Zero exactly
    /// when [`Self::is_feasible`] holds; failed evaluations are infinite.
    pub fn constraint_violation(&self) -> f64 {
        if self.failure.is_some() {
            return f64::INFINITY;
        }
        let p = &self.penalty;
        let hard = p.collision + p.connectivity + p.bounds;
        if self.catastrophic {
            hard.max(p.total()).max(f64::MIN_POSITIVE)
        } else if p.hard_constraints_met() {
            0.0
        } else {
            hard.max(f64::MIN_POSITIVE)
        }
    }
}

/// The optimization problem for one envelope, mission and module list.
///
/// Shared read-only across evaluation threads.
pub struct LayoutProblem {
    envelope: Envelope,
    mission: MissionParameters,
    catalog: ModuleCatalog,
    config: OptimizerConfig,
    bounds: DecisionBounds,
    scorer: Arc<dyn Scoring>,
    policy: Arc<dyn ConstraintPolicy>,
    grammar: LayoutGrammar,
    detector: CollisionDetector,
}

impl std::fmt::Debug for LayoutProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayoutProblem")
            .field("envelope", &self.envelope)
            .field("modules", &self.catalog.len())
            .field("bounds", &self.bounds)
            .finish()
    }
}

impl LayoutProblem {
    /// Inputs are assumed valid; see [`crate::config::validate_problem`].
    pub fn new(
        envelope: Envelope,
        mission: MissionParameters,
        modules: &[ModuleRequirement],
        config: OptimizerConfig,
        scorer: Arc<dyn Scoring>,
    ) -> Self {
        let bounds = envelope.decision_bounds(config.bounds_margin);
        let policy = Arc::new(UniformPenalty::from_config(&config.penalties));
        Self {
            catalog: ModuleCatalog::new(modules),
            envelope,
            mission,
            config,
            bounds,
            scorer,
            policy,
            grammar: LayoutGrammar::default(),
            detector: CollisionDetector::new(),
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn ConstraintPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_grammar(mut self, grammar: LayoutGrammar) -> Self {
        self.grammar = grammar;
        self
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn mission(&self) -> &MissionParameters {
        &self.mission
    }

    pub fn catalog(&self) -> &ModuleCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    pub fn decision_bounds(&self) -> &DecisionBounds {
        &self.bounds
    }

    pub fn num_genes(&self) -> usize {
        self.catalog.len() * GENES_PER_MODULE
    }

    pub fn num_objectives(&self) -> usize {
        self.config.objectives.len()
    }

    /// Lower/upper bound for every gene.
    pub fn gene_bounds(&self) -> Vec<(f64, f64)> {
        let mut out = Vec::with_capacity(self.num_genes());
        for _ in 0..self.catalog.len() {
            for axis in 0..3 {
                out.push((self.bounds.min[axis], self.bounds.max[axis]));
            }
            out.push((0.0, 360.0));
        }
        out
    }

    /// Uniform random decision vector within the gene bounds.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        self.gene_bounds()
            .into_iter()
            .map(|(lo, hi)| if hi > lo { rng.gen_range(lo..hi) } else { lo })
            .collect()
    }

    /// Unrotated modules in shuffled order, packed in rows along the longest
    /// decision axis with clearance between neighbours. Rows that run out of
    /// room wrap along the second longest axis. Neighbour pitch stays within
    /// connection range, so roomy envelopes get a connected, collision-free
    /// start.
    pub fn spaced_sample<R: Rng>(&self, rng: &mut R) -> Vec<f64> {
        let n = self.catalog.len();
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(rng);

        let (min, max) = (self.bounds.min, self.bounds.max);
        let span = max - min;
        let mut axes = [0usize, 1, 2];
        axes.sort_by(|&a, &b| span[b].total_cmp(&span[a]));
        let [along, across, _] = axes;

        let gap = self.config.min_clearance.max(0.0) + SPACING_SLACK;
        let reach = self.config.connectivity.max_connection_distance * SPACED_REACH;
        let extent = |i: usize, axis: usize| self.catalog.entry(i).1.dimensions[axis];
        let pitch =
            |a: usize, b: usize, axis: usize| (extent(a, axis) + extent(b, axis)) / 2.0 + gap;

        let mut rows: Vec<Vec<usize>> = Vec::new();
        let mut row: Vec<usize> = Vec::new();
        let mut length = 0.0;
        for i in order {
            if let Some(&last) = row.last() {
                let step = pitch(last, i, along);
                if length + step > span[along] {
                    rows.push(std::mem::take(&mut row));
                    length = 0.0;
                } else {
                    length += step;
                }
            }
            row.push(i);
        }
        rows.push(row);

        let thickness: Vec<f64> = rows
            .iter()
            .map(|r| r.iter().map(|&i| extent(i, across)).fold(0.0, f64::max))
            .collect();
        let row_pitches: Vec<f64> = thickness
            .windows(2)
            .map(|t| (t[0] + t[1]) / 2.0 + gap)
            .collect();
        let row_offsets = spread(&row_pitches, span[across], reach);

        let center = (min + max) * 0.5;
        let mut genes = vec![0.0; self.num_genes()];
        for (r, members) in rows.iter().enumerate() {
            let pitches: Vec<f64> = members
                .windows(2)
                .map(|w| pitch(w[0], w[1], along))
                .collect();
            for (&i, offset) in members.iter().zip(spread(&pitches, span[along], reach)) {
                let mut position = center;
                position[along] += offset;
                position[across] += row_offsets[r];
                let base = i * GENES_PER_MODULE;
                for axis in 0..3 {
                    genes[base + axis] = position[axis].clamp(min[axis], max[axis]);
                }
            }
        }
        genes
    }

    /// One placement per required module, in catalog order. Out-of-range
    /// or missing genes are clamped into bounds.
    pub fn decode(&self, genes: &[f64]) -> Vec<Placement> {
        let bounds = self.gene_bounds();
        let gene = |k: usize| {
            let (lo, hi) = bounds[k];
            match genes.get(k) {
                Some(v) if v.is_finite() => v.clamp(lo, hi),
                _ => (lo + hi) / 2.0,
            }
        };
        (0..self.catalog.len())
            .map(|i| {
                let (id, module) = self.catalog.entry(i);
                let base = i * GENES_PER_MODULE;
                let position = [gene(base), gene(base + 1), gene(base + 2)].into();
                Placement::new(
                    id,
                    Arc::clone(module),
                    position,
                    normalize_rotation(gene(base + 3)),
                )
            })
            .collect()
    }

    /// Evaluate a decision vector. Never panics.
    pub fn evaluate(&self, genes: &[f64]) -> Evaluation {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_evaluate(genes, started)));
        let failure = match outcome {
            Ok(Ok(evaluation)) => return evaluation,
            Ok(Err(failure)) => failure,
            Err(payload) => EvaluationFailure::Panicked(panic_message(payload.as_ref())),
        };
        log::warn!("candidate evaluation failed: {}", failure);
        Evaluation {
            objectives: self.policy.catastrophic_objectives(self.num_objectives()),
            raw_objectives: None,
            metrics: None,
            penalty: PenaltyBreakdown::default(),
            violations: Vec::new(),
            catastrophic: true,
            failure: Some(failure.to_string()),
        }
    }

    /// Penalty terms for a decoded layout, without scoring.
    pub fn assess(&self, placements: &[Placement]) -> (PenaltyBreakdown, Vec<RuleViolation>) {
        let penalties = &self.config.penalties;
        let mut breakdown = PenaltyBreakdown::default();

        let clashes = self
            .detector
            .find_all_violations(placements, self.config.min_clearance);
        breakdown.violating_pairs = clashes.len();
        breakdown.clearance_shortfall = clashes.iter().map(|c| c.shortfall).sum();
        breakdown.collision = breakdown.clearance_shortfall * penalties.collision_per_meter;

        breakdown.out_of_bounds = placements
            .iter()
            .filter(|p| {
                !self
                    .envelope
                    .contains_box(&p.bounding_box(), CONTAINMENT_TOLERANCE)
            })
            .count();
        breakdown.bounds = breakdown.out_of_bounds as f64 * penalties.out_of_bounds_per_module;

        let graph = ConnectivityGraph::build(placements, &self.config.connectivity);
        breakdown.components = graph.connected_components().len();
        if breakdown.components > 1 {
            breakdown.connectivity = penalties.disconnected;
        }

        let connectivity = &self.config.connectivity;
        let validator = ConnectivityValidator::new(&graph, connectivity);
        let egress =
            validator.validate_emergency_egress(&validator.airlocks(), connectivity.max_egress_time);
        let redundancy = validator.validate_airlock_redundancy(
            connectivity.min_airlock_count,
            connectivity.min_airlock_separation,
        );
        breakdown.egress_violations = egress.violations.len();
        breakdown.redundancy_violations = redundancy.violations.len();

        let mut violations = self.grammar.evaluate(placements, &self.envelope);
        violations.extend(self.grammar.from_connectivity(&egress, &redundancy));
        breakdown.critical_violations = critical_count(&violations);
        breakdown.grammar = severity_points(&violations) * penalties.grammar_weight
            + breakdown.critical_violations as f64 * penalties.critical_extra;

        (breakdown, violations)
    }

    fn try_evaluate(&self, genes: &[f64], started: Instant) -> Result<Evaluation, EvaluationFailure> {
        let placements = self.decode(genes);
        let (penalty, violations) = self.assess(&placements);
        self.check_deadline(started)?;

        let total = penalty.total();
        if self.policy.is_catastrophic(total) {
            return Ok(Evaluation {
                objectives: self.policy.catastrophic_objectives(self.num_objectives()),
                raw_objectives: None,
                metrics: None,
                penalty,
                violations,
                catastrophic: true,
                failure: None,
            });
        }

        let metrics = self
            .scorer
            .score(&placements, &self.envelope, &self.mission)?;
        self.check_deadline(started)?;
        metrics
            .validate()
            .map_err(EvaluationFailure::InvalidMetrics)?;

        let raw = objective_vector(&self.config.objectives, &metrics);
        let objectives = self.policy.fold(&raw, total);
        if objectives.iter().any(|v| !v.is_finite()) {
            return Err(EvaluationFailure::InvalidMetrics(
                "objective vector is not finite".to_string(),
            ));
        }

        Ok(Evaluation {
            objectives,
            raw_objectives: Some(raw),
            metrics: Some(metrics),
            penalty,
            violations,
            catastrophic: false,
            failure: None,
        })
    }

    fn check_deadline(&self, started: Instant) -> Result<(), EvaluationFailure> {
        if let Some(limit) = self.config.evaluation_timeout() {
            if started.elapsed() > limit {
                return Err(EvaluationFailure::TimedOut);
            }
        }
        Ok(())
    }
}

/// Offsets from the middle of `span` for items whose minimum centre
/// distances are `pitches`. Spare room is shared evenly between the items
/// and both ends, with no pitch stretched past `reach`.
fn spread(pitches: &[f64], span: f64, reach: f64) -> Vec<f64> {
    let base: f64 = pitches.iter().sum();
    let mut extra = ((span - base) / (pitches.len() + 2) as f64).max(0.0);
    for p in pitches {
        extra = extra.min((reach - p).max(0.0));
    }
    let total = base + extra * pitches.len() as f64;
    let mut at = -total / 2.0;
    let mut offsets = Vec::with_capacity(pitches.len() + 1);
    offsets.push(at);
    for p in pitches {
        at += p + extra;
        offsets.push(at);
    }
    offsets
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
