//! Emergency egress and airlock redundancy checks over a [`ConnectivityGraph`].
//!
//! Egress time for a module is the emergency travel time along its shortest
//! route to the nearest airlock: `distance / emergency_speed` plus a fixed
//! traversal cost per hatch crossed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConnectivityConfig;
use crate::connectivity::{Bottleneck, ConnectivityGraph};
use crate::modules::{ModuleId, ModuleType};

/// Egress time from one module to its nearest reachable airlock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgressTime {
    pub module: ModuleId,
    pub airlock: Option<ModuleId>,
    /// Seconds; infinite when no airlock is reachable.
    pub seconds: f64,
    pub hops: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgressViolation {
    pub module: ModuleId,
    /// Seconds; infinite when no airlock is reachable.
    pub seconds: f64,
    pub limit: f64,
}

impl EgressViolation {
    pub fn is_unreachable(&self) -> bool {
        self.seconds.is_infinite()
    }
}

impl fmt::Display for EgressViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unreachable() {
            write!(f, "{} has no route to an airlock", self.module)
        } else {
            write!(
                f,
                "{} needs {:.1} s to reach an airlock (limit {:.1} s)",
                self.module, self.seconds, self.limit
            )
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EgressReport {
    /// One entry per non-airlock module, in id order.
    pub times: Vec<EgressTime>,
    pub violations: Vec<EgressViolation>,
}

impl EgressReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Slowest egress time, seconds. Infinite if any module is cut off.
    pub fn worst_time(&self) -> f64 {
        self.times.iter().map(|t| t.seconds).fold(0.0, f64::max)
    }

    pub fn unreachable_count(&self) -> usize {
        self.times.iter().filter(|t| t.seconds.is_infinite()).count()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RedundancyViolation {
    InsufficientAirlocks {
        found: usize,
        required: usize,
    },
    AirlocksTooClose {
        a: ModuleId,
        b: ModuleId,
        distance: f64,
        required: f64,
    },
    /// A module that fewer than two airlocks can reach.
    SingleAirlockAccess {
        module: ModuleId,
        reachable_airlocks: usize,
    },
}

impl fmt::Display for RedundancyViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientAirlocks { found, required } => {
                write!(f, "{} airlock(s) present, {} required", found, required)
            }
            Self::AirlocksTooClose {
                a,
                b,
                distance,
                required,
            } => write!(
                f,
                "airlocks {} and {} are {:.1} m apart (minimum {:.1} m)",
                a, b, distance, required
            ),
            Self::SingleAirlockAccess {
                module,
                reachable_airlocks,
            } => write!(
                f,
                "{} can reach only {} airlock(s)",
                module, reachable_airlocks
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedundancyReport {
    pub airlock_count: usize,
    pub violations: Vec<RedundancyViolation>,
}

impl RedundancyReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Everything the validator knows about one layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    pub connected: bool,
    pub components: Vec<Vec<ModuleId>>,
    pub egress: EgressReport,
    pub redundancy: RedundancyReport,
    pub bottlenecks: Vec<Bottleneck>,
}

impl ConnectivityReport {
    pub fn passed(&self) -> bool {
        self.connected && self.egress.passed() && self.redundancy.passed()
    }
}

pub struct ConnectivityValidator<'a> {
    graph: &'a ConnectivityGraph,
    config: &'a ConnectivityConfig,
}

impl<'a> ConnectivityValidator<'a> {
    pub fn new(graph: &'a ConnectivityGraph, config: &'a ConnectivityConfig) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &ConnectivityGraph {
        self.graph
    }

    /// Airlock modules present in the graph, sorted.
    pub fn airlocks(&self) -> Vec<ModuleId> {
        self.graph.ids_of_kind(ModuleType::Airlock)
    }

    /// Check every module that is not in `airlock_ids` against `max_time`.
    pub fn validate_emergency_egress(
        &self,
        airlock_ids: &[ModuleId],
        max_time: f64,
    ) -> EgressReport {
        let mut report = EgressReport::default();
        for module in self.graph.ids() {
            if airlock_ids.contains(&module) {
                continue;
            }
            let mut best = EgressTime {
                module,
                airlock: None,
                seconds: f64::INFINITY,
                hops: 0,
            };
            for &airlock in airlock_ids {
                let Some(route) = self.graph.shortest_route(module, airlock) else {
                    continue;
                };
                let hops = route.hops();
                let seconds = route.distance / self.config.emergency_speed
                    + self.config.per_module_traversal * hops as f64;
                if seconds < best.seconds {
                    best = EgressTime {
                        module,
                        airlock: Some(airlock),
                        seconds,
                        hops,
                    };
                }
            }
            if best.seconds > max_time {
                report.violations.push(EgressViolation {
                    module,
                    seconds: best.seconds,
                    limit: max_time,
                });
            }
            report.times.push(best);
        }
        report
    }

    /// Airlock count, pairwise separation, and (with two or more airlocks)
    /// two-airlock reachability for every other module.
    pub fn validate_airlock_redundancy(
        &self,
        min_count: usize,
        min_separation: f64,
    ) -> RedundancyReport {
        let airlocks = self.airlocks();
        let mut violations = Vec::new();

        if airlocks.len() < min_count {
            violations.push(RedundancyViolation::InsufficientAirlocks {
                found: airlocks.len(),
                required: min_count,
            });
        }

        for (i, &a) in airlocks.iter().enumerate() {
            for &b in &airlocks[i + 1..] {
                let (Some(pa), Some(pb)) = (self.graph.position(a), self.graph.position(b)) else {
                    continue;
                };
                let distance = (pa - pb).norm();
                if distance < min_separation {
                    violations.push(RedundancyViolation::AirlocksTooClose {
                        a,
                        b,
                        distance,
                        required: min_separation,
                    });
                }
            }
        }

        if airlocks.len() >= 2 {
            let components = self.graph.connected_components();
            for component in &components {
                let reachable = component
                    .iter()
                    .filter(|id| id.kind == ModuleType::Airlock)
                    .count();
                if reachable >= 2 {
                    continue;
                }
                for &module in component.iter().filter(|id| id.kind != ModuleType::Airlock) {
                    violations.push(RedundancyViolation::SingleAirlockAccess {
                        module,
                        reachable_airlocks: reachable,
                    });
                }
            }
        }

        RedundancyReport {
            airlock_count: airlocks.len(),
            violations,
        }
    }

    /// Full connectivity picture with the configured limits.
    pub fn report(&self) -> ConnectivityReport {
        let airlocks = self.airlocks();
        ConnectivityReport {
            connected: self.graph.is_connected(),
            components: self.graph.connected_components(),
            egress: self.validate_emergency_egress(&airlocks, self.config.max_egress_time),
            redundancy: self.validate_airlock_redundancy(
                self.config.min_airlock_count,
                self.config.min_airlock_separation,
            ),
            bottlenecks: self
                .graph
                .detect_bottlenecks(self.config.bottleneck_threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec3;
    use crate::modules::Placement;
    use std::sync::Arc;

    fn place(kind: ModuleType, n: u16, x: f64) -> Placement {
        Placement::new(
            ModuleId::new(kind, n),
            Arc::new(kind.standard_requirement()),
            Vec3::new(x, 0.0, 0.0),
            0.0,
        )
    }

    #[test]
    fn test_egress_time_formula() {
        let config = ConnectivityConfig::default();
        let placements = vec![
            place(ModuleType::Airlock, 1, 0.0),
            place(ModuleType::Storage, 1, 6.0),
            place(ModuleType::Galley, 1, 12.0),
        ];
        let graph = ConnectivityGraph::build(&placements, &config);
        let validator = ConnectivityValidator::new(&graph, &config);
        let report = validator.validate_emergency_egress(&validator.airlocks(), 120.0);
        assert!(report.passed());
        let galley = report
            .times
            .iter()
            .find(|t| t.module.kind == ModuleType::Galley)
            .unwrap();
        // 12 m at 1.5 m/s plus two hatches at 3 s
        assert!((galley.seconds - 14.0).abs() < 1e-9);
        assert_eq!(galley.hops, 2);
        assert!((report.worst_time() - 14.0).abs() < 1e-9);
    }

    #[test]
    fn test_egress_limit_reports_module() {
        let config = ConnectivityConfig::default();
        let placements = vec![
            place(ModuleType::Airlock, 1, 0.0),
            place(ModuleType::Storage, 1, 6.0),
        ];
        let graph = ConnectivityGraph::build(&placements, &config);
        let validator = ConnectivityValidator::new(&graph, &config);
        let report = validator.validate_emergency_egress(&validator.airlocks(), 5.0);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].module.kind, ModuleType::Storage);
        assert!(report.violations[0].to_string().contains("storage-1"));
    }

    #[test]
    fn test_no_airlocks_every_module_unreachable() {
        let config = ConnectivityConfig::default();
        let placements = vec![
            place(ModuleType::Galley, 1, 0.0),
            place(ModuleType::Storage, 1, 4.0),
        ];
        let graph = ConnectivityGraph::build(&placements, &config);
        let validator = ConnectivityValidator::new(&graph, &config);
        let report = validator.report();
        assert_eq!(report.egress.violations.len(), 2);
        assert!(report.egress.violations.iter().all(|v| v.is_unreachable()));
        assert_eq!(report.egress.unreachable_count(), 2);
        assert_eq!(
            report.redundancy.violations,
            vec![RedundancyViolation::InsufficientAirlocks {
                found: 0,
                required: 2
            }]
        );
        assert!(!report.passed());
    }

    #[test]
    fn test_airlocks_too_close() {
        let config = ConnectivityConfig::default();
        let placements = vec![
            place(ModuleType::Airlock, 1, 0.0),
            place(ModuleType::Airlock, 2, 3.0),
            place(ModuleType::Storage, 1, 6.0),
        ];
        let graph = ConnectivityGraph::build(&placements, &config);
        let validator = ConnectivityValidator::new(&graph, &config);
        let report = validator.validate_airlock_redundancy(2, 5.0);
        assert_eq!(report.airlock_count, 2);
        assert_eq!(report.violations.len(), 1);
        assert!(matches!(
            report.violations[0],
            RedundancyViolation::AirlocksTooClose { .. }
        ));
    }

    #[test]
    fn test_isolated_module_reaches_one_airlock() {
        let config = ConnectivityConfig::default();
        let placements = vec![
            place(ModuleType::Airlock, 1, 0.0),
            place(ModuleType::Storage, 1, 6.0),
            place(ModuleType::Airlock, 2, 12.0),
            // separate island with one airlock
            place(ModuleType::Airlock, 3, 40.0),
            place(ModuleType::Galley, 1, 45.0),
        ];
        let graph = ConnectivityGraph::build(&placements, &config);
        let validator = ConnectivityValidator::new(&graph, &config);
        let report = validator.validate_airlock_redundancy(2, 5.0);
        assert_eq!(
            report.violations,
            vec![RedundancyViolation::SingleAirlockAccess {
                module: ModuleId::new(ModuleType::Galley, 1),
                reachable_airlocks: 1,
            }]
        );
    }

    #[test]
    fn test_redundant_layout_passes() {
        let config = ConnectivityConfig::default();
        let placements = vec![
            place(ModuleType::Airlock, 1, 0.0),
            place(ModuleType::Storage, 1, 6.0),
            place(ModuleType::Airlock, 2, 12.0),
        ];
        let graph = ConnectivityGraph::build(&placements, &config);
        let report = ConnectivityValidator::new(&graph, &config).report();
        assert!(report.passed(), "{:?}", report);
        assert_eq!(report.bottlenecks.len(), 1);
        assert!(report.bottlenecks[0].articulation);
    }
}
