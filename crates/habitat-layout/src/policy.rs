//! How constraint penalties combine with objective values.

use crate::config::PenaltyConfig;

/// Decides when a candidate is written off and how its penalty enters the
/// objective vector.
pub trait ConstraintPolicy: Send + Sync {
    /// Skip scoring and use [`ConstraintPolicy::catastrophic_objectives`].
    fn is_catastrophic(&self, penalty: f64) -> bool;

    /// Objective vector of `count` entries for a written-off candidate.
    fn catastrophic_objectives(&self, count: usize) -> Vec<f64>;

    /// Combine scored objectives with the candidate's total penalty.
    fn fold(&self, objectives: &[f64], penalty: f64) -> Vec<f64>;
}

/// Adds the full penalty to every objective. Any violation therefore
/// dominates objective trade-offs, at the cost of exact dominance between
/// penalized candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformPenalty {
    pub threshold: f64,
    pub value: f64,
}

impl UniformPenalty {
    pub fn new(threshold: f64, value: f64) -> Self {
        Self { threshold, value }
    }

    pub fn from_config(config: &PenaltyConfig) -> Self {
        Self::new(config.catastrophic_threshold, config.catastrophic_value)
    }
}

impl Default for UniformPenalty {
    fn default() -> Self {
        Self::from_config(&PenaltyConfig::default())
    }
}

impl ConstraintPolicy for UniformPenalty {
    fn is_catastrophic(&self, penalty: f64) -> bool {
        !penalty.is_finite() || penalty > self.threshold
    }

    fn catastrophic_objectives(&self, count: usize) -> Vec<f64> {
        vec![self.value; count]
    }

    fn fold(&self, objectives: &[f64], penalty: f64) -> Vec<f64> {
        objectives.iter().map(|v| v + penalty).collect()
    }
}
