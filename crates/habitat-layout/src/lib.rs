//! Multi-objective layout optimization for habitat modules.
//!
//! This crate places functional modules (quarters, galley, laboratory,
//! airlocks, ...) inside a habitat envelope. Candidate layouts must be
//! collision-free, stay inside the envelope and form one connected graph;
//! among those, an NSGA-II search trades off transit time, mass, power,
//! safety and thermal margin. Everything is pure in-memory computation:
//! callers pass plain data and a scoring function and get a Pareto set back.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`collision`] | Clearance checks, penetration depth, pairwise violations |
//! | [`config`] | Optimizer, connectivity and penalty settings; problem validation |
//! | [`connectivity`] | Hatch graph, shortest paths, centrality, bottlenecks |
//! | [`constants`] | Movement speeds, penalty costs, scorer budgets |
//! | [`envelope`] | Cylinder / box / torus / freeform hulls and decision bounds |
//! | [`error`] | Error types returned to callers and recovered internally |
//! | [`geometry`] | Oriented bounding boxes and distance primitives |
//! | [`grammar`] | Soft layout rules: adjacency, preferences, airlock placement |
//! | [`mission`] | Crew size, duration and objective priorities |
//! | [`modules`] | Module types, catalog entries and placements |
//! | [`operators`] | SBX crossover, polynomial mutation, tournament, truncation |
//! | [`optimizer`] | The generational search loop |
//! | [`pareto`] | Dominance, fronts, crowding, hypervolume, best compromise |
//! | [`policy`] | How constraint penalties enter the objective vector |
//! | [`problem`] | Decision encoding and never-failing candidate evaluation |
//! | [`result`] | Pareto layouts, convergence trace, explanations |
//! | [`scoring`] | Scoring contract, objectives and the reference scorer |
//! | [`spatial_index`] | R*-tree prefilter over module centres |
//! | [`validator`] | Emergency egress and airlock redundancy checks |

pub mod collision;
pub mod config;
pub mod connectivity;
pub mod constants;
pub mod envelope;
pub mod error;
pub mod geometry;
pub mod grammar;
pub mod mission;
pub mod modules;
pub mod operators;
pub mod optimizer;
pub mod pareto;
pub mod policy;
pub mod problem;
pub mod result;
pub mod scoring;
pub mod spatial_index;
pub mod validator;

pub use config::{ConfigError, ConnectivityConfig, OptimizerConfig, PenaltyConfig};
pub use envelope::Envelope;
pub use error::{InfeasibilityClass, LayoutError, ScoringError};
pub use mission::MissionParameters;
pub use modules::{ModuleId, ModuleRequirement, ModuleType, Placement};
pub use optimizer::{GenerationProgress, LayoutOptimizer};
pub use pareto::{ParetoAnalyzer, ParetoSummary};
pub use problem::{Evaluation, LayoutProblem};
pub use result::{LayoutCandidate, OptimizationResult, StopReason};
pub use scoring::{HabitatScorer, Objective, PerformanceMetrics, Scoring};
