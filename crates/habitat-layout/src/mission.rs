//! Mission parameters: crew, duration and objective priorities.
//!
//! Priority weights are keyed by objective name and do not need to sum to
//! one; [`MissionParameters::normalized_weights`] rescales them for the
//! objective list of a run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::scoring::Objective;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionParameters {
    pub crew_size: u32,
    pub duration_days: f64,
    /// Objective name → relative importance.
    #[serde(default)]
    pub priority_weights: BTreeMap<String, f64>,
}

impl Default for MissionParameters {
    fn default() -> Self {
        Self {
            crew_size: 4,
            duration_days: 180.0,
            priority_weights: BTreeMap::new(),
        }
    }
}

impl MissionParameters {
    pub fn new(crew_size: u32, duration_days: f64) -> Self {
        Self {
            crew_size,
            duration_days,
            priority_weights: BTreeMap::new(),
        }
    }

    pub fn with_priority(mut self, objective: Objective, weight: f64) -> Self {
        self.priority_weights
            .insert(objective.name().to_string(), weight);
        self
    }

    /// Weights aligned with `objectives`, summing to 1. Objectives without an
    /// entry weigh 1.0; an all-zero assignment falls back to equal weights.
    pub fn normalized_weights(&self, objectives: &[Objective]) -> Vec<f64> {
        if objectives.is_empty() {
            return Vec::new();
        }
        let raw: Vec<f64> = objectives
            .iter()
            .map(|o| {
                self.priority_weights
                    .get(o.name())
                    .copied()
                    .filter(|w| w.is_finite())
                    .unwrap_or(1.0)
                    .max(0.0)
            })
            .collect();
        let total: f64 = raw.iter().sum();
        if total <= 0.0 {
            return vec![1.0 / objectives.len() as f64; objectives.len()];
        }
        raw.iter().map(|w| w / total).collect()
    }

    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.crew_size == 0 {
            errors.push(ConfigError::NonPositiveCrew);
        }
        if !(self.duration_days.is_finite() && self.duration_days > 0.0) {
            errors.push(ConfigError::NonPositiveDuration(self.duration_days));
        }
        for (name, weight) in &self.priority_weights {
            if !(weight.is_finite() && *weight >= 0.0) {
                errors.push(ConfigError::InvalidPriorityWeight(name.clone(), *weight));
            }
        }
        errors
    }
}
