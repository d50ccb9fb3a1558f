//! Error types for layout optimization.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias for layout optimization operations.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// Errors returned to callers of the optimizer.
#[derive(Debug, Clone, Error)]
pub enum LayoutError {
    /// The problem definition was rejected before the search started.
    #[error("invalid configuration: {}", join_errors(.0))]
    Configuration(Vec<ConfigError>),

    /// The search finished without a usable layout.
    #[error("infeasible problem: {0}")]
    Infeasible(InfeasibilityClass),
}

fn join_errors(errors: &[ConfigError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// The dominant reason no feasible layout was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum InfeasibilityClass {
    #[error("no collision-free candidate found")]
    NoCollisionFreeCandidate,
    #[error("no candidate fits inside the envelope")]
    NoCandidateWithinEnvelope,
    #[error("no connected layout found")]
    NoConnectedLayout,
    #[error("every candidate hit the catastrophic penalty")]
    AllCatastrophic,
}

/// Failure reported by a scoring collaborator.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("scoring failed: {message}")]
pub struct ScoringError {
    pub message: String,
}

impl ScoringError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Why a single candidate evaluation failed. Recovered locally, never
/// returned to callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationFailure {
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error("evaluation panicked: {0}")]
    Panicked(String),
    #[error("evaluation exceeded its time budget")]
    TimedOut,
    #[error("scorer returned invalid metrics: {0}")]
    InvalidMetrics(String),
}
