//! NSGA-II generational search over [`LayoutProblem`].
//!
//! ```text
//! initialize ─► evaluate ─► rank/crowd ─┬─► select ─► vary ─► evaluate ─► merge + truncate ─┐
//!                                        └──────────────────────◄──────────────────────────────┘
//! ```
//!
//! Ranking uses constraint-domination, so every feasible candidate outranks
//! every infeasible one and infeasible candidates compete on the size of
//! their hard-constraint breach. Part of the initial population is spaced
//! out along the envelope instead of sampled uniformly.
//!
//! Evaluation of a generation runs on rayon and is collected in input order,
//! so a fixed seed reproduces the same run regardless of thread count.
//! Cancellation and the run time limit are checked at generation boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::config::{validate_problem, OptimizerConfig};
use crate::constants::search::SPACED_EVERY;
use crate::envelope::Envelope;
use crate::error::{InfeasibilityClass, LayoutError, Result};
use crate::grammar::LayoutGrammar;
use crate::mission::MissionParameters;
use crate::modules::ModuleRequirement;
use crate::operators::{
    binary_tournament, environmental_selection, rank_population, PolynomialMutation, Ranked,
    SbxCrossover,
};
use crate::pareto::ParetoAnalyzer;
use crate::policy::ConstraintPolicy;
use crate::problem::{Evaluation, LayoutProblem};
use crate::result::{explain, Candidate, LayoutCandidate, OptimizationResult, StopReason};
use crate::scoring::Scoring;

/// Snapshot handed to the progress callback after each generation.
#[derive(Debug, Clone)]
pub struct GenerationProgress {
    /// Generations completed so far.
    pub generation: u32,
    pub max_generations: u32,
    pub evaluations: usize,
    /// Size of front 0 in the current population.
    pub front_size: usize,
    /// Feasible members of the current population.
    pub feasible: usize,
    /// Mean of front 0's first objective; `None` for an empty population.
    pub convergence: Option<f64>,
    pub elapsed: Duration,
}

/// Multi-objective layout search.
///
/// ```no_run
/// use std::sync::Arc;
/// use habitat_layout::{
///     Envelope, HabitatScorer, LayoutOptimizer, MissionParameters, ModuleType, OptimizerConfig,
/// };
///
/// let modules: Vec<_> = [ModuleType::Airlock, ModuleType::Galley, ModuleType::SleepQuarters]
///     .iter()
///     .map(|t| t.standard_requirement())
///     .collect();
/// let optimizer = LayoutOptimizer::new(
///     Envelope::Cylinder { radius: 5.0, length: 20.0 },
///     MissionParameters::new(4, 180.0),
///     &modules,
///     OptimizerConfig::default().with_seed(1),
///     Arc::new(HabitatScorer::default()),
/// )?;
/// let result = optimizer.run()?;
/// println!("{}", result.best_layout.explainability_text);
/// # Ok::<(), habitat_layout::LayoutError>(())
/// ```
#[derive(Debug)]
pub struct LayoutOptimizer {
    problem: LayoutProblem,
    cancelled: Arc<AtomicBool>,
}

impl LayoutOptimizer {
    /// Validate the problem definition and set up the search. Every
    /// configuration error found is returned at once.
    pub fn new(
        envelope: Envelope,
        mission: MissionParameters,
        modules: &[ModuleRequirement],
        config: OptimizerConfig,
        scorer: Arc<dyn Scoring>,
    ) -> Result<Self> {
        let errors = validate_problem(&envelope, &mission, modules, &config);
        if !errors.is_empty() {
            for e in &errors {
                log::error!("rejected layout problem: {}", e);
            }
            return Err(LayoutError::Configuration(errors));
        }
        Ok(Self {
            problem: LayoutProblem::new(envelope, mission, modules, config, scorer),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn with_policy(mut self, policy: Arc<dyn ConstraintPolicy>) -> Self {
        self.problem = self.problem.with_policy(policy);
        self
    }

    pub fn with_grammar(mut self, grammar: LayoutGrammar) -> Self {
        self.problem = self.problem.with_grammar(grammar);
        self
    }

    pub fn problem(&self) -> &LayoutProblem {
        &self.problem
    }

    /// Set the returned flag to stop the run at the next generation boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub fn run(&self) -> Result<OptimizationResult> {
        self.run_with_progress(|_| {})
    }

    pub fn run_with_progress<F>(&self, mut on_generation: F) -> Result<OptimizationResult>
    where
        F: FnMut(&GenerationProgress),
    {
        let start = Instant::now();
        let config = self.problem.config();
        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = StdRng::seed_from_u64(seed);
        let analyzer = ParetoAnalyzer::new().with_seed(seed);

        let size = config.population_size;
        let bounds = self.problem.gene_bounds();
        let crossover = SbxCrossover::new(config.crossover_eta, config.crossover_probability);
        let mutation = PolynomialMutation::new(
            config.mutation_eta,
            config.effective_mutation_probability(bounds.len()),
        );

        log::info!(
            "layout search: {} modules, population {}, {} generations, seed {}",
            self.problem.catalog().len(),
            size,
            config.generations,
            seed
        );

        let initial: Vec<Vec<f64>> = (0..size)
            .map(|i| {
                if i % SPACED_EVERY == 0 {
                    self.problem.spaced_sample(&mut rng)
                } else {
                    self.problem.sample(&mut rng)
                }
            })
            .collect();
        let mut population = self.evaluate_all(initial);
        let mut evaluation_count = population.len();
        let mut failed_evaluations = count_failures(&population);
        for r in rank_population(&analyzer, &population) {
            population[r.index].rank = r.rank;
            population[r.index].crowding = r.crowding;
        }

        let mut archive = Vec::new();
        update_archive(&analyzer, &mut archive, &population, size);

        let mut history = Vec::with_capacity(config.generations as usize);
        let mut generation = 0u32;
        let mut stop_reason = StopReason::Completed;

        while generation < config.generations {
            if self.cancelled.load(Ordering::Relaxed) {
                stop_reason = StopReason::Cancelled;
                break;
            }
            if let Some(limit) = config.time_limit() {
                if start.elapsed() > limit {
                    stop_reason = StopReason::TimeLimit;
                    break;
                }
            }

            let ranked: Vec<Ranked> = population
                .iter()
                .enumerate()
                .map(|(index, c)| Ranked {
                    index,
                    rank: c.rank,
                    crowding: c.crowding,
                })
                .collect();

            let mut offspring = Vec::with_capacity(size);
            while offspring.len() < size {
                let a = &population[binary_tournament(&ranked, &mut rng)];
                let b = &population[binary_tournament(&ranked, &mut rng)];
                let (mut c1, mut c2) = crossover.apply(&a.genes, &b.genes, &bounds, &mut rng);
                mutation.apply(&mut c1, &bounds, &mut rng);
                mutation.apply(&mut c2, &bounds, &mut rng);
                offspring.push(c1);
                if offspring.len() < size {
                    offspring.push(c2);
                }
            }

            let children = self.evaluate_all(offspring);
            evaluation_count += children.len();
            failed_evaluations += count_failures(&children);

            let mut pool = population;
            pool.extend(children);
            population = truncate(&analyzer, pool, size);
            update_archive(&analyzer, &mut archive, &population, size);

            generation += 1;
            let convergence = front_mean(&population);
            history.extend(convergence);

            let progress = GenerationProgress {
                generation,
                max_generations: config.generations,
                evaluations: evaluation_count,
                front_size: population.iter().filter(|c| c.rank == 0).count(),
                feasible: population.iter().filter(|c| c.evaluation.is_feasible()).count(),
                convergence,
                elapsed: start.elapsed(),
            };
            log::debug!(
                "generation {}/{}: front {} feasible {} convergence {:?}",
                progress.generation,
                progress.max_generations,
                progress.front_size,
                progress.feasible,
                progress.convergence
            );
            on_generation(&progress);
        }

        let wall_clock_seconds = start.elapsed().as_secs_f64();
        if archive.is_empty() {
            let class = dominant_infeasibility(&population);
            log::warn!("layout search found no feasible layout: {}", class);
            return Err(LayoutError::Infeasible(class));
        }

        let mut pareto_layouts: Vec<LayoutCandidate> = archive
            .iter()
            .filter_map(|c| {
                LayoutCandidate::from_evaluation(self.problem.decode(&c.genes), &c.evaluation)
            })
            .collect();
        let summary = analyzer.analyze(&pareto_layouts);
        let raw: Vec<&[f64]> = pareto_layouts
            .iter()
            .map(|l| l.raw_objectives.as_slice())
            .collect();
        let ideal = analyzer.ideal_point(&raw);
        let nadir = analyzer.nadir_point(&raw);
        for layout in &mut pareto_layouts {
            layout.explainability_text = explain(
                layout,
                &config.objectives,
                &ideal,
                &nadir,
                config.min_clearance,
            );
        }

        let weights = self
            .problem
            .mission()
            .normalized_weights(&config.objectives);
        let best = analyzer
            .best_compromise(&pareto_layouts, &weights)
            .unwrap_or(0);
        let best_layout = pareto_layouts[best].clone();

        log::info!(
            "layout search finished: {} generations, {} evaluations ({} failed), {} Pareto layouts in {:.2}s",
            generation,
            evaluation_count,
            failed_evaluations,
            pareto_layouts.len(),
            wall_clock_seconds
        );

        Ok(OptimizationResult {
            pareto_layouts,
            best_layout,
            convergence_history: history,
            generation_count: generation,
            evaluation_count,
            wall_clock_seconds,
            objectives: config.objectives.clone(),
            final_population: population,
            stop_reason,
            failed_evaluations,
            summary,
        })
    }

    /// Evaluate decision vectors in input order.
    fn evaluate_all(&self, genes: Vec<Vec<f64>>) -> Vec<Candidate> {
        let problem = &self.problem;
        let evaluations: Vec<Evaluation> = if problem.config().parallel {
            genes.par_iter().map(|g| problem.evaluate(g)).collect()
        } else {
            genes.iter().map(|g| problem.evaluate(g)).collect()
        };
        genes
            .into_iter()
            .zip(evaluations)
            .map(|(g, e)| Candidate::new(g, e))
            .collect()
    }
}

fn count_failures(candidates: &[Candidate]) -> usize {
    candidates
        .iter()
        .filter(|c| c.evaluation.failure.is_some())
        .count()
}

/// Best `size` of a merged pool, carrying over the rank and crowding the
/// selection computed.
fn truncate(analyzer: &ParetoAnalyzer, pool: Vec<Candidate>, size: usize) -> Vec<Candidate> {
    let survivors = environmental_selection(analyzer, &pool, size);
    let mut slots: Vec<Option<Candidate>> = pool.into_iter().map(Some).collect();
    survivors
        .into_iter()
        .filter_map(|r| {
            let mut c = slots[r.index].take()?;
            c.rank = r.rank;
            c.crowding = r.crowding;
            Some(c)
        })
        .collect()
}

/// Fold the population's feasible members into the non-dominated archive,
/// keeping at most `capacity` of the least crowded.
fn update_archive(
    analyzer: &ParetoAnalyzer,
    archive: &mut Vec<Candidate>,
    population: &[Candidate],
    capacity: usize,
) {
    let mut pool = std::mem::take(archive);
    for c in population.iter().filter(|c| c.evaluation.is_feasible()) {
        if !pool
            .iter()
            .any(|a| a.evaluation.objectives == c.evaluation.objectives)
        {
            pool.push(c.clone());
        }
    }
    let Some(first) = analyzer.non_dominated_sort(&pool).into_iter().next() else {
        return;
    };
    let front: Vec<Candidate> = first.into_iter().map(|i| pool[i].clone()).collect();
    *archive = truncate(analyzer, front, capacity.max(1));
}

/// Mean first objective over front 0, if it has any members.
fn front_mean(population: &[Candidate]) -> Option<f64> {
    let values: Vec<f64> = population
        .iter()
        .filter(|c| c.rank == 0)
        .filter_map(|c| c.evaluation.objectives.first().copied())
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// The constraint class that ruled out most of the population.
fn dominant_infeasibility(population: &[Candidate]) -> InfeasibilityClass {
    let assessed: Vec<_> = population
        .iter()
        .filter(|c| c.evaluation.failure.is_none())
        .map(|c| &c.evaluation.penalty)
        .collect();
    let counts = [
        (
            InfeasibilityClass::NoCollisionFreeCandidate,
            assessed.iter().filter(|p| p.violating_pairs > 0).count(),
        ),
        (
            InfeasibilityClass::NoCandidateWithinEnvelope,
            assessed.iter().filter(|p| p.out_of_bounds > 0).count(),
        ),
        (
            InfeasibilityClass::NoConnectedLayout,
            assessed.iter().filter(|p| p.components > 1).count(),
        ),
    ];
    let mut dominant = InfeasibilityClass::AllCatastrophic;
    let mut most = 0;
    for (class, count) in counts {
        if count > most {
            dominant = class;
            most = count;
        }
    }
    dominant
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoringError;
    use crate::modules::{ModuleType, Placement};
    use crate::problem::PenaltyBreakdown;
    use crate::scoring::{HabitatScorer, PerformanceMetrics};

    fn modules() -> Vec<ModuleRequirement> {
        [ModuleType::Airlock, ModuleType::Galley, ModuleType::Storage]
            .iter()
            .map(|t| t.standard_requirement())
            .collect()
    }

    fn optimizer(config: OptimizerConfig) -> Result<LayoutOptimizer> {
        LayoutOptimizer::new(
            Envelope::Cylinder {
                radius: 5.0,
                length: 20.0,
            },
            MissionParameters::default(),
            &modules(),
            config,
            Arc::new(HabitatScorer::default()),
        )
    }

    fn small() -> OptimizerConfig {
        OptimizerConfig::default()
            .with_population_size(12)
            .with_generations(4)
            .with_seed(42)
    }

    #[test]
    fn test_invalid_config_rejected_before_run() {
        let err = optimizer(small().with_population_size(0).with_generations(0)).unwrap_err();
        match err {
            LayoutError::Configuration(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_population_size_constant() {
        let opt = optimizer(small()).unwrap();
        let mut sizes = Vec::new();
        let result = opt.run_with_progress(|p| sizes.push(p.generation)).unwrap();
        assert_eq!(result.final_population.len(), 12);
        assert_eq!(result.generation_count, 4);
        assert_eq!(result.convergence_history.len(), 4);
        assert_eq!(result.evaluation_count, 12 * 5);
        assert_eq!(sizes, vec![1, 2, 3, 4]);
        assert_eq!(result.stop_reason, StopReason::Completed);
        assert!(result.convergence_history.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_feasible_members_outrank_infeasible() {
        let result = optimizer(small()).unwrap().run().unwrap();
        let population = &result.final_population;
        let worst_feasible = population
            .iter()
            .filter(|c| c.evaluation.is_feasible())
            .map(|c| c.rank)
            .max();
        let best_infeasible = population
            .iter()
            .filter(|c| !c.evaluation.is_feasible())
            .map(|c| c.rank)
            .min();
        assert!(worst_feasible.is_some());
        if let (Some(f), Some(i)) = (worst_feasible, best_infeasible) {
            assert!(f < i, "feasible rank {} vs infeasible rank {}", f, i);
        }
    }

    #[test]
    fn test_front_mean_skips_empty_front() {
        assert_eq!(front_mean(&[]), None);

        let evaluation = |first: f64| Evaluation {
            objectives: vec![first, 0.0],
            raw_objectives: None,
            metrics: None,
            penalty: PenaltyBreakdown::default(),
            violations: Vec::new(),
            catastrophic: false,
            failure: None,
        };
        let mut behind = Candidate::new(Vec::new(), evaluation(3.0));
        behind.rank = 1;
        assert_eq!(front_mean(&[behind.clone()]), None);

        let leaders = vec![
            Candidate::new(Vec::new(), evaluation(1.0)),
            Candidate::new(Vec::new(), evaluation(2.0)),
            behind,
        ];
        assert_eq!(front_mean(&leaders), Some(1.5));
    }

    #[test]
    fn test_pareto_layouts_non_dominated() {
        let result = optimizer(small()).unwrap().run().unwrap();
        let analyzer = ParetoAnalyzer::new();
        let fronts = analyzer.non_dominated_sort(&result.pareto_layouts);
        assert_eq!(fronts.len(), 1);
        assert!(result
            .pareto_layouts
            .iter()
            .all(|l| l.penalty.hard_constraints_met() && !l.explainability_text.is_empty()));
        assert!(result.pareto_layouts.contains(&result.best_layout));
    }

    #[test]
    fn test_cancelled_before_first_generation() {
        let opt = optimizer(small()).unwrap();
        opt.cancel_handle().store(true, Ordering::Relaxed);
        let result = opt.run().unwrap();
        assert_eq!(result.stop_reason, StopReason::Cancelled);
        assert_eq!(result.generation_count, 0);
        assert!(result.convergence_history.is_empty());
        assert!(!result.pareto_layouts.is_empty());
    }

    #[test]
    fn test_failing_scorer_reports_all_catastrophic() {
        let scorer = |_: &[Placement], _: &Envelope, _: &MissionParameters| {
            Err::<PerformanceMetrics, _>(ScoringError::new("offline"))
        };
        let opt = LayoutOptimizer::new(
            Envelope::Cylinder {
                radius: 5.0,
                length: 20.0,
            },
            MissionParameters::default(),
            &modules(),
            small().with_generations(2),
            Arc::new(scorer),
        )
        .unwrap();
        match opt.run() {
            Err(LayoutError::Infeasible(class)) => {
                assert_eq!(class, InfeasibilityClass::AllCatastrophic)
            }
            other => panic!("unexpected {:?}", other.map(|r| r.pareto_layouts.len())),
        }
    }

    #[test]
    fn test_dominant_infeasibility_picks_most_common() {
        let candidate = |pairs: usize, out: usize, components: usize| {
            let mut penalty = PenaltyBreakdown::default();
            penalty.violating_pairs = pairs;
            penalty.out_of_bounds = out;
            penalty.components = components;
            Candidate::new(
                Vec::new(),
                Evaluation {
                    objectives: vec![1.0],
                    raw_objectives: None,
                    metrics: None,
                    penalty,
                    violations: Vec::new(),
                    catastrophic: true,
                    failure: None,
                },
            )
        };
        let population = vec![candidate(1, 0, 1), candidate(0, 2, 1), candidate(0, 1, 3)];
        assert_eq!(
            dominant_infeasibility(&population),
            InfeasibilityClass::NoCandidateWithinEnvelope
        );
        assert_eq!(
            dominant_infeasibility(&population[..1]),
            InfeasibilityClass::NoCollisionFreeCandidate
        );
        assert_eq!(dominant_infeasibility(&[]), InfeasibilityClass::AllCatastrophic);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let parallel = optimizer(small()).unwrap().run().unwrap();
        let sequential = optimizer(small().with_parallel(false)).unwrap().run().unwrap();
        assert_eq!(parallel.convergence_history, sequential.convergence_history);
    }
}
