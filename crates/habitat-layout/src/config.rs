//! Optimizer configuration and problem validation.
//!
//! Defaults come from [`crate::constants`]. Every struct is serde-friendly so
//! scenario files can override any subset of fields.
//!
//! ```
//! use habitat_layout::config::OptimizerConfig;
//!
//! let config = OptimizerConfig::default()
//!     .with_population_size(20)
//!     .with_generations(10)
//!     .with_seed(7);
//! assert!(config.validate().is_empty());
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{connections, geometry, movement, penalties};
use crate::envelope::Envelope;
use crate::mission::MissionParameters;
use crate::modules::ModuleRequirement;
use crate::scoring::Objective;

/// A rejected problem definition. Collected, never raised one at a time.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
    #[error("required module list is empty")]
    EmptyModuleList,
    #[error("invalid module {0}")]
    InvalidModule(String),
    #[error("population size must be positive, got {0}")]
    NonPositivePopulation(usize),
    #[error("generation count must be positive, got {0}")]
    NonPositiveGenerations(u32),
    #[error("{0} must lie in [0, 1], got {1}")]
    InvalidProbability(&'static str, f64),
    #[error("{0} must be positive, got {1}")]
    InvalidDistributionIndex(&'static str, f64),
    #[error("objective list is empty")]
    EmptyObjectives,
    #[error("objective {0} listed more than once")]
    DuplicateObjective(&'static str),
    #[error("minimum clearance must be non-negative, got {0}")]
    NegativeClearance(f64),
    #[error("connection range [{0}, {1}] is invalid")]
    InvalidConnectionRange(f64, f64),
    #[error("{0} must be positive, got {1}")]
    NonPositiveParameter(&'static str, f64),
    #[error("crew size must be positive")]
    NonPositiveCrew,
    #[error("mission duration must be positive, got {0}")]
    NonPositiveDuration(f64),
    #[error("priority weight for {0} must be non-negative, got {1}")]
    InvalidPriorityWeight(String, f64),
}

/// Connection graph and egress rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub min_connection_distance: f64,
    pub max_connection_distance: f64,
    pub walking_speed: f64,
    pub emergency_speed: f64,
    pub per_module_traversal: f64,
    pub max_egress_time: f64,
    pub min_airlock_count: usize,
    pub min_airlock_separation: f64,
    pub bottleneck_threshold: f64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            min_connection_distance: connections::MIN_CONNECTION_DISTANCE,
            max_connection_distance: connections::MAX_CONNECTION_DISTANCE,
            walking_speed: movement::WALKING_SPEED,
            emergency_speed: movement::EMERGENCY_SPEED,
            per_module_traversal: movement::PER_MODULE_TRAVERSAL,
            max_egress_time: movement::MAX_EGRESS_TIME,
            min_airlock_count: connections::MIN_AIRLOCK_COUNT,
            min_airlock_separation: connections::MIN_AIRLOCK_SEPARATION,
            bottleneck_threshold: connections::BOTTLENECK_THRESHOLD,
        }
    }
}

impl ConnectivityConfig {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if !(self.min_connection_distance >= 0.0
            && self.max_connection_distance.is_finite()
            && self.max_connection_distance > self.min_connection_distance)
        {
            errors.push(ConfigError::InvalidConnectionRange(
                self.min_connection_distance,
                self.max_connection_distance,
            ));
        }
        for (name, value) in [
            ("walking_speed", self.walking_speed),
            ("emergency_speed", self.emergency_speed),
            ("max_egress_time", self.max_egress_time),
        ] {
            if !(value.is_finite() && value > 0.0) {
                errors.push(ConfigError::NonPositiveParameter(name, value));
            }
        }
        if !(self.per_module_traversal >= 0.0) {
            errors.push(ConfigError::NonPositiveParameter(
                "per_module_traversal",
                self.per_module_traversal,
            ));
        }
        errors
    }
}

/// Constraint penalty costs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyConfig {
    pub collision_per_meter: f64,
    pub disconnected: f64,
    pub out_of_bounds_per_module: f64,
    pub grammar_weight: f64,
    pub critical_extra: f64,
    pub catastrophic_threshold: f64,
    pub catastrophic_value: f64,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            collision_per_meter: penalties::COLLISION_PER_METER,
            disconnected: penalties::DISCONNECTED,
            out_of_bounds_per_module: penalties::OUT_OF_BOUNDS_PER_MODULE,
            grammar_weight: penalties::GRAMMAR_WEIGHT,
            critical_extra: penalties::CRITICAL_EXTRA,
            catastrophic_threshold: penalties::CATASTROPHIC_THRESHOLD,
            catastrophic_value: penalties::CATASTROPHIC_VALUE,
        }
    }
}

impl PenaltyConfig {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        for (name, value) in [
            ("collision_per_meter", self.collision_per_meter),
            ("disconnected", self.disconnected),
            ("out_of_bounds_per_module", self.out_of_bounds_per_module),
            ("catastrophic_threshold", self.catastrophic_threshold),
            ("catastrophic_value", self.catastrophic_value),
        ] {
            if !(value.is_finite() && value > 0.0) {
                errors.push(ConfigError::NonPositiveParameter(name, value));
            }
        }
        errors
    }
}

/// Evolutionary search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub generations: u32,
    pub crossover_probability: f64,
    /// SBX distribution index η_c.
    pub crossover_eta: f64,
    /// Per-gene mutation probability; `None` means 1 / gene count.
    pub mutation_probability: Option<f64>,
    /// Polynomial mutation distribution index η_m.
    pub mutation_eta: f64,
    /// `None` seeds from OS entropy.
    pub seed: Option<u64>,
    pub min_clearance: f64,
    pub bounds_margin: f64,
    pub objectives: Vec<Objective>,
    /// Whole-run wall clock budget, seconds.
    pub time_limit_secs: Option<f64>,
    /// Per-candidate evaluation budget, seconds.
    pub evaluation_timeout_secs: Option<f64>,
    pub parallel: bool,
    pub connectivity: ConnectivityConfig,
    pub penalties: PenaltyConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 40,
            generations: 50,
            crossover_probability: 0.9,
            crossover_eta: 15.0,
            mutation_probability: None,
            mutation_eta: 20.0,
            seed: None,
            min_clearance: geometry::MIN_CLEARANCE,
            bounds_margin: geometry::BOUNDS_MARGIN,
            objectives: Objective::DEFAULT.to_vec(),
            time_limit_secs: None,
            evaluation_timeout_secs: None,
            parallel: true,
            connectivity: ConnectivityConfig::default(),
            penalties: PenaltyConfig::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_population_size(mut self, size: usize) -> Self {
        self.population_size = size;
        self
    }

    pub fn with_generations(mut self, generations: u32) -> Self {
        self.generations = generations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_min_clearance(mut self, clearance: f64) -> Self {
        self.min_clearance = clearance;
        self
    }

    pub fn with_objectives(mut self, objectives: Vec<Objective>) -> Self {
        self.objectives = objectives;
        self
    }

    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit_secs = Some(limit.as_secs_f64());
        self
    }

    pub fn with_evaluation_timeout(mut self, limit: Duration) -> Self {
        self.evaluation_timeout_secs = Some(limit.as_secs_f64());
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.and_then(secs_to_duration)
    }

    pub fn evaluation_timeout(&self) -> Option<Duration> {
        self.evaluation_timeout_secs.and_then(secs_to_duration)
    }

    /// Per-gene mutation probability for a decision vector of `genes` length.
    pub fn effective_mutation_probability(&self, genes: usize) -> f64 {
        self.mutation_probability
            .unwrap_or(1.0 / genes.max(1) as f64)
    }

    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.population_size == 0 {
            errors.push(ConfigError::NonPositivePopulation(self.population_size));
        }
        if self.generations == 0 {
            errors.push(ConfigError::NonPositiveGenerations(self.generations));
        }
        let mut probabilities = vec![("crossover_probability", self.crossover_probability)];
        if let Some(p) = self.mutation_probability {
            probabilities.push(("mutation_probability", p));
        }
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                errors.push(ConfigError::InvalidProbability(name, p));
            }
        }
        for (name, eta) in [
            ("crossover_eta", self.crossover_eta),
            ("mutation_eta", self.mutation_eta),
        ] {
            if !(eta.is_finite() && eta > 0.0) {
                errors.push(ConfigError::InvalidDistributionIndex(name, eta));
            }
        }
        if self.objectives.is_empty() {
            errors.push(ConfigError::EmptyObjectives);
        }
        for (i, o) in self.objectives.iter().enumerate() {
            if self.objectives[..i].contains(o) {
                errors.push(ConfigError::DuplicateObjective(o.name()));
            }
        }
        if !(self.min_clearance >= 0.0 && self.min_clearance.is_finite()) {
            errors.push(ConfigError::NegativeClearance(self.min_clearance));
        }
        if !(self.bounds_margin >= 0.0 && self.bounds_margin.is_finite()) {
            errors.push(ConfigError::NonPositiveParameter(
                "bounds_margin",
                self.bounds_margin,
            ));
        }
        for (name, secs) in [
            ("time_limit_secs", self.time_limit_secs),
            ("evaluation_timeout_secs", self.evaluation_timeout_secs),
        ] {
            if let Some(s) = secs {
                if !(s.is_finite() && s > 0.0) {
                    errors.push(ConfigError::NonPositiveParameter(name, s));
                }
            }
        }
        errors.extend(self.connectivity.validate());
        errors.extend(self.penalties.validate());
        errors
    }
}

fn secs_to_duration(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs > 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Check a module requirement's physical parameters.
pub fn validate_module(module: &ModuleRequirement) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    let dims_ok = module
        .dimensions
        .iter()
        .all(|d| d.is_finite() && *d > 0.0);
    if !dims_ok {
        errors.push(ConfigError::InvalidModule(format!(
            "{}: bounding box must be positive, got {:?}",
            module.name,
            module.dimensions.as_slice()
        )));
    }
    if !(module.mass.is_finite() && module.mass > 0.0) {
        errors.push(ConfigError::InvalidModule(format!(
            "{}: mass must be positive, got {}",
            module.name, module.mass
        )));
    }
    for (field, value) in [("power", module.power), ("stowage", module.stowage)] {
        if !(value.is_finite() && value >= 0.0) {
            errors.push(ConfigError::InvalidModule(format!(
                "{}: {} must be non-negative, got {}",
                module.name, field, value
            )));
        }
    }
    errors
}

/// Validate a complete problem definition, returning all errors found.
pub fn validate_problem(
    envelope: &Envelope,
    mission: &MissionParameters,
    modules: &[ModuleRequirement],
    config: &OptimizerConfig,
) -> Vec<ConfigError> {
    let mut errors = Vec::new();
    errors.extend(envelope.validate());
    errors.extend(mission.validate());
    if modules.is_empty() {
        errors.push(ConfigError::EmptyModuleList);
    }
    for m in modules {
        errors.extend(validate_module(m));
    }
    errors.extend(config.validate());
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::ModuleType;

    #[test]
    fn test_default_config_valid() {
        assert!(OptimizerConfig::default().validate().is_empty());
    }

    #[test]
    fn test_invalid_counts_and_rates() {
        let mut config = OptimizerConfig::default()
            .with_population_size(0)
            .with_generations(0);
        config.crossover_probability = 1.5;
        config.mutation_eta = 0.0;
        let errors = config.validate();
        assert!(errors.contains(&ConfigError::NonPositivePopulation(0)));
        assert!(errors.contains(&ConfigError::NonPositiveGenerations(0)));
        assert!(errors.contains(&ConfigError::InvalidProbability(
            "crossover_probability",
            1.5
        )));
        assert!(errors.contains(&ConfigError::InvalidDistributionIndex(
            "mutation_eta",
            0.0
        )));
    }

    #[test]
    fn test_duplicate_objectives_rejected() {
        let config = OptimizerConfig::default()
            .with_objectives(vec![Objective::Mass, Objective::Mass]);
        assert_eq!(
            config.validate(),
            vec![ConfigError::DuplicateObjective("mass")]
        );
    }

    #[test]
    fn test_empty_module_list_rejected() {
        let envelope = Envelope::Cylinder {
            radius: 5.0,
            length: 20.0,
        };
        let errors = validate_problem(
            &envelope,
            &MissionParameters::default(),
            &[],
            &OptimizerConfig::default(),
        );
        assert_eq!(errors, vec![ConfigError::EmptyModuleList]);
    }

    #[test]
    fn test_invalid_module_dimensions() {
        let mut module = ModuleType::Galley.standard_requirement();
        module.dimensions.y = 0.0;
        module.mass = -5.0;
        assert_eq!(validate_module(&module).len(), 2);
    }

    #[test]
    fn test_mutation_probability_default() {
        let config = OptimizerConfig::default();
        assert!((config.effective_mutation_probability(20) - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: OptimizerConfig =
            serde_json::from_str(r#"{"population_size": 12, "seed": 3}"#).unwrap();
        assert_eq!(config.population_size, 12);
        assert_eq!(config.seed, Some(3));
        assert_eq!(config.generations, 50);
        assert_eq!(config.connectivity, ConnectivityConfig::default());
    }
}
