//! Habitat Layout Headless Harness
//!
//! Checks the geometric, graph and Pareto primitives, then runs every
//! scenario in `data/scenarios.json` through the optimizer and checks the
//! outcome against the scenario's expectation. Runs entirely in-process.
//!
//! Usage:
//!   cargo run -p habitat-simtest
//!   cargo run -p habitat-simtest -- --verbose

use std::sync::Arc;

use habitat_layout::collision::CollisionDetector;
use habitat_layout::connectivity::ConnectivityGraph;
use habitat_layout::geometry::{OrientedBoundingBox, Vec3};
use habitat_layout::{
    ConnectivityConfig, Envelope, HabitatScorer, InfeasibilityClass, LayoutError,
    LayoutOptimizer, MissionParameters, ModuleId, ModuleType, Objective, OptimizerConfig,
    ParetoAnalyzer, Placement,
};
use serde::Deserialize;
use tracing_subscriber::filter::LevelFilter;

// ── Scenario fixtures ───────────────────────────────────────────────────
const SCENARIOS_JSON: &str = include_str!("../../../data/scenarios.json");

#[derive(Debug, Deserialize)]
struct Scenario {
    name: String,
    #[serde(default)]
    description: String,
    envelope: Envelope,
    #[serde(default)]
    mission: MissionParameters,
    modules: Vec<ModuleType>,
    #[serde(default)]
    optimizer: OptimizerConfig,
    expect: Expectation,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
enum Expectation {
    Feasible {
        #[serde(default)]
        min_pareto: usize,
        #[serde(default)]
        safety_capped: bool,
    },
    Infeasible {
        class: InfeasibilityClass,
    },
    /// Either outcome is acceptable as long as it is typed.
    Either,
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

impl TestResult {
    fn check(name: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed,
            detail: detail.into(),
        }
    }
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    let log_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    tracing_subscriber::fmt().with_max_level(log_level).init();
    println!("=== Habitat Layout Harness ===\n");

    let mut results = Vec::new();

    // 1. Geometry & collision primitives
    results.extend(validate_geometry(verbose));

    // 2. Connectivity graph properties
    results.extend(validate_connectivity(verbose));

    // 3. Pareto ranking properties
    results.extend(validate_pareto(verbose));

    // 4. Scenario runs
    results.extend(run_scenarios(verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn placement(kind: ModuleType, ordinal: u16, x: f64, y: f64, z: f64) -> Placement {
    Placement::new(
        ModuleId::new(kind, ordinal),
        Arc::new(kind.standard_requirement()),
        Vec3::new(x, y, z),
        0.0,
    )
}

// ── 1. Geometry ─────────────────────────────────────────────────────────

fn validate_geometry(verbose: bool) -> Vec<TestResult> {
    println!("--- Geometry & Collision ---");
    let mut results = Vec::new();
    let half = Vec3::new(1.0, 1.0, 1.0);
    let clearance = 0.6;

    // Boxes exactly `clearance` apart
    let a = OrientedBoundingBox::new(Vec3::zeros(), half, 0.0);
    let b = OrientedBoundingBox::new(Vec3::new(2.0 + clearance, 0.0, 0.0), half, 0.0);
    results.push(TestResult::check(
        "clearance_boundary_exclusive",
        !a.intersects(&b, clearance) && a.intersects(&b, clearance + 1e-6),
        format!("gap {:.2} m vs clearance {:.2} m", a.distance_to(&b), clearance),
    ));

    let rotated = OrientedBoundingBox::new(Vec3::zeros(), Vec3::new(2.0, 1.0, 1.0), 90.0);
    let extent = rotated.aabb_max - rotated.aabb_min;
    results.push(TestResult::check(
        "rotation_swaps_extents",
        (extent.x - 2.0).abs() < 1e-9 && (extent.y - 4.0).abs() < 1e-9,
        format!("aabb extent {:.3} x {:.3}", extent.x, extent.y),
    ));

    let detector = CollisionDetector::new();
    let stacked = vec![
        placement(ModuleType::Galley, 1, 0.0, 0.0, 0.0),
        placement(ModuleType::Storage, 1, 0.0, 0.0, 0.0),
    ];
    let hit = detector.check_collision(&stacked[0], &stacked[1..], clearance);
    results.push(TestResult::check(
        "identical_positions_full_penetration",
        hit.has_collision && (hit.penetration_depth - clearance).abs() < 1e-9,
        format!("depth {:.3}", hit.penetration_depth),
    ));

    let single = detector.find_all_violations(&stacked[..1], clearance);
    results.push(TestResult::check(
        "single_placement_never_collides",
        single.is_empty(),
        format!("{} violations", single.len()),
    ));

    if verbose {
        println!("  {} geometry checks", results.len());
    }
    results
}

// ── 2. Connectivity ─────────────────────────────────────────────────────

fn validate_connectivity(verbose: bool) -> Vec<TestResult> {
    println!("--- Connectivity ---");
    let mut results = Vec::new();
    let config = ConnectivityConfig::default();

    let lone = vec![placement(ModuleType::Airlock, 1, 0.0, 0.0, 0.0)];
    let graph = ConnectivityGraph::build(&lone, &config);
    let id = lone[0].id;
    results.push(TestResult::check(
        "single_node_connected",
        graph.is_connected(),
        format!("{} components", graph.connected_components().len()),
    ));
    results.push(TestResult::check(
        "self_path_trivial",
        graph.shortest_path(id, id) == vec![id] && graph.shortest_path_length(id, id) == 0.0,
        format!("{:?}", graph.shortest_path(id, id)),
    ));

    let far = vec![
        placement(ModuleType::Airlock, 1, 0.0, 0.0, -9.0),
        placement(ModuleType::Galley, 1, 0.0, 0.0, 9.0),
    ];
    let split = ConnectivityGraph::build(&far, &config);
    results.push(TestResult::check(
        "far_pair_disconnected",
        !split.is_connected() && split.shortest_path_length(far[0].id, far[1].id).is_infinite(),
        format!("{} components", split.connected_components().len()),
    ));

    let linked = vec![
        far[0].clone().with_link(far[1].id),
        far[1].clone(),
    ];
    results.push(TestResult::check(
        "explicit_link_connects",
        ConnectivityGraph::build(&linked, &config).is_connected(),
        "declared hatch bridges 18 m",
    ));

    if verbose {
        println!("  {} connectivity checks", results.len());
    }
    results
}

// ── 3. Pareto ───────────────────────────────────────────────────────────

fn validate_pareto(verbose: bool) -> Vec<TestResult> {
    println!("--- Pareto Analysis ---");
    let mut results = Vec::new();
    let analyzer = ParetoAnalyzer::new();
    let solutions: Vec<Vec<f64>> = vec![
        vec![1.0, 5.0],
        vec![2.0, 3.0],
        vec![3.0, 2.0],
        vec![5.0, 1.0],
        vec![4.0, 4.0],
        vec![6.0, 6.0],
    ];

    let first = analyzer.non_dominated_sort(&solutions);
    let second = analyzer.non_dominated_sort(&solutions);
    results.push(TestResult::check(
        "sort_idempotent",
        first == second,
        format!("{} fronts", first.len()),
    ));

    let front = &first[0];
    let crowding = analyzer.crowding_distance(&solutions, front);
    let infinite = crowding.iter().filter(|d| d.is_infinite()).count();
    results.push(TestResult::check(
        "crowding_extremes_infinite",
        front.len() == 4 && infinite == 2,
        format!("{} of {} infinite", infinite, front.len()),
    ));

    let hv = analyzer.hypervolume(&solutions[..4], &[6.0, 6.0]);
    results.push(TestResult::check(
        "hypervolume_2d_exact",
        (hv - 17.0).abs() < 1e-9,
        format!("hv = {:.3}", hv),
    ));

    if verbose {
        println!("  {} pareto checks", results.len());
    }
    results
}

// ── 4. Scenarios ────────────────────────────────────────────────────────

fn run_scenarios(verbose: bool) -> Vec<TestResult> {
    println!("--- Scenarios ---");
    let mut results = Vec::new();

    let scenarios: Vec<Scenario> = match serde_json::from_str(SCENARIOS_JSON) {
        Ok(s) => s,
        Err(e) => {
            results.push(TestResult::check(
                "scenarios_parse",
                false,
                format!("JSON parse error: {}", e),
            ));
            return results;
        }
    };
    results.push(TestResult::check(
        "scenarios_parse",
        !scenarios.is_empty(),
        format!("{} scenarios", scenarios.len()),
    ));

    for scenario in scenarios {
        if verbose {
            println!("  {}: {}", scenario.name, scenario.description);
        }
        results.extend(run_scenario(scenario));
    }
    results
}

fn run_scenario(scenario: Scenario) -> Vec<TestResult> {
    let mut results = Vec::new();
    let name = scenario.name;
    let modules: Vec<_> = scenario
        .modules
        .iter()
        .map(|t| t.standard_requirement())
        .collect();
    let min_clearance = scenario.optimizer.min_clearance;

    let optimizer = match LayoutOptimizer::new(
        scenario.envelope,
        scenario.mission,
        &modules,
        scenario.optimizer,
        Arc::new(HabitatScorer::default()),
    ) {
        Ok(o) => o,
        Err(e) => {
            results.push(TestResult::check(format!("{}_setup", name), false, e.to_string()));
            return results;
        }
    };

    let outcome = optimizer.run();
    match (&scenario.expect, outcome) {
        (
            Expectation::Feasible {
                min_pareto,
                safety_capped,
            },
            Ok(result),
        ) => {
            results.push(TestResult::check(
                format!("{}_pareto", name),
                result.pareto_layouts.len() >= (*min_pareto).max(1),
                format!(
                    "{} layouts, hypervolume {:.3}, {} evaluations in {:.2}s",
                    result.pareto_layouts.len(),
                    result.summary.hypervolume,
                    result.evaluation_count,
                    result.wall_clock_seconds
                ),
            ));
            results.push(TestResult::check(
                format!("{}_module_count", name),
                result.best_layout.placements.len() == modules.len(),
                format!("{} placements", result.best_layout.placements.len()),
            ));
            let clashes = CollisionDetector::new()
                .find_all_violations(&result.best_layout.placements, min_clearance);
            results.push(TestResult::check(
                format!("{}_clearance", name),
                clashes.is_empty(),
                format!("{} pairs below {:.2} m", clashes.len(), min_clearance),
            ));
            if *safety_capped {
                let safety = result.best_objective(Objective::Safety);
                results.push(TestResult::check(
                    format!("{}_safety_capped", name),
                    safety == Some(1.0),
                    format!("safety objective {:?}", safety),
                ));
            }
            results.push(TestResult::check(
                format!("{}_explained", name),
                !result.best_layout.explainability_text.is_empty(),
                result.best_layout.explainability_text.clone(),
            ));
        }
        (Expectation::Infeasible { class }, Err(LayoutError::Infeasible(found))) => {
            results.push(TestResult::check(
                format!("{}_infeasible", name),
                *class == found,
                format!("expected {:?}, got {}", class, found),
            ));
        }
        (Expectation::Either, Ok(result)) => {
            results.push(TestResult::check(
                format!("{}_outcome", name),
                !result.pareto_layouts.is_empty(),
                format!("{} Pareto layouts", result.pareto_layouts.len()),
            ));
        }
        (Expectation::Either, Err(LayoutError::Infeasible(found))) => {
            results.push(TestResult::check(
                format!("{}_outcome", name),
                true,
                format!("typed infeasibility: {}", found),
            ));
        }
        (expect, Ok(result)) => {
            results.push(TestResult::check(
                format!("{}_outcome", name),
                false,
                format!(
                    "expected {:?}, got {} Pareto layouts",
                    expect,
                    result.pareto_layouts.len()
                ),
            ));
        }
        (expect, Err(e)) => {
            results.push(TestResult::check(
                format!("{}_outcome", name),
                false,
                format!("expected {:?}, got error: {}", expect, e),
            ));
        }
    }
    results
}
