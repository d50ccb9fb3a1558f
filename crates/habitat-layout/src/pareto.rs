//! Pareto dominance, front ranking and front quality measures.
//!
//! All objectives are minimized. Functions take anything that exposes an
//! objective vector through [`ObjectiveVector`], so the same code ranks the
//! optimizer's population and arbitrary solution sets after a run.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::constants::pareto::{DEFAULT_SEED, HYPERVOLUME_SAMPLES};

/// Access to a solution's minimization objectives.
pub trait ObjectiveVector {
    fn objectives(&self) -> &[f64];

    /// Hard-constraint breach; zero for a feasible solution.
    fn constraint_violation(&self) -> f64 {
        0.0
    }
}

impl ObjectiveVector for Vec<f64> {
    fn objectives(&self) -> &[f64] {
        self
    }
}

impl ObjectiveVector for [f64] {
    fn objectives(&self) -> &[f64] {
        self
    }
}

impl<T: ObjectiveVector + ?Sized> ObjectiveVector for &T {
    fn objectives(&self) -> &[f64] {
        (**self).objectives()
    }

    fn constraint_violation(&self) -> f64 {
        (**self).constraint_violation()
    }
}

/// `a` is no worse than `b` everywhere and strictly better somewhere.
pub fn dominates(a: &[f64], b: &[f64]) -> bool {
    if a.len() != b.len() || a.is_empty() {
        return false;
    }
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x > y {
            return false;
        }
        if x < y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Constraint-domination: a feasible solution beats any infeasible one, the
/// smaller breach wins between two infeasible ones, and plain Pareto
/// dominance decides between two feasible ones.
pub fn constrained_dominates<T: ObjectiveVector + ?Sized>(a: &T, b: &T) -> bool {
    let (va, vb) = (a.constraint_violation(), b.constraint_violation());
    match (va > 0.0, vb > 0.0) {
        (false, true) => true,
        (true, false) => false,
        (true, true) => va < vb,
        (false, false) => dominates(a.objectives(), b.objectives()),
    }
}

/// One rank of a sorted solution set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoFront {
    pub rank: usize,
    /// Indices into the sorted set, ascending.
    pub members: Vec<usize>,
}

/// Front statistics for a solution set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParetoSummary {
    pub front_sizes: Vec<usize>,
    pub ideal: Vec<f64>,
    pub nadir: Vec<f64>,
    pub reference_point: Vec<f64>,
    /// Hypervolume of front 0 against `reference_point`.
    pub hypervolume: f64,
    /// Spread of front 0.
    pub spread: f64,
}

#[derive(Debug, Clone)]
pub struct ParetoAnalyzer {
    samples: usize,
    seed: u64,
}

impl Default for ParetoAnalyzer {
    fn default() -> Self {
        Self {
            samples: HYPERVOLUME_SAMPLES,
            seed: DEFAULT_SEED,
        }
    }
}

impl ParetoAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monte Carlo sample count for hypervolume in three or more objectives.
    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples.max(1);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fast non-dominated sort under [`constrained_dominates`]. Returns fronts
    /// in rank order; members of each front are ascending indices. Solutions
    /// without a constraint breach sort by Pareto dominance alone.
    pub fn non_dominated_sort<T: ObjectiveVector>(&self, solutions: &[T]) -> Vec<Vec<usize>> {
        let n = solutions.len();
        if n == 0 {
            return Vec::new();
        }
        let mut dominated: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut domination_count = vec![0usize; n];

        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (&solutions[i], &solutions[j]);
                if constrained_dominates(a, b) {
                    dominated[i].push(j);
                    domination_count[j] += 1;
                } else if constrained_dominates(b, a) {
                    dominated[j].push(i);
                    domination_count[i] += 1;
                }
            }
        }

        let mut fronts = Vec::new();
        let mut current: Vec<usize> = (0..n).filter(|&i| domination_count[i] == 0).collect();
        while !current.is_empty() {
            let mut next = Vec::new();
            for &i in &current {
                for &j in &dominated[i] {
                    domination_count[j] -= 1;
                    if domination_count[j] == 0 {
                        next.push(j);
                    }
                }
            }
            next.sort_unstable();
            fronts.push(current);
            current = next;
        }
        fronts
    }

    /// Fronts with their ranks attached.
    pub fn fronts<T: ObjectiveVector>(&self, solutions: &[T]) -> Vec<ParetoFront> {
        self.non_dominated_sort(solutions)
            .into_iter()
            .enumerate()
            .map(|(rank, members)| ParetoFront { rank, members })
            .collect()
    }

    /// Crowding distance per member of `front`, aligned with it. Extreme
    /// members on any objective get `f64::INFINITY`, as does every member of
    /// a front of two or fewer.
    pub fn crowding_distance<T: ObjectiveVector>(&self, solutions: &[T], front: &[usize]) -> Vec<f64> {
        let n = front.len();
        if n <= 2 {
            return vec![f64::INFINITY; n];
        }
        let mut distance = vec![0.0; n];
        let num_objectives = solutions[front[0]].objectives().len();
        let value = |pos: usize, m: usize| solutions[front[pos]].objectives()[m];

        for m in 0..num_objectives {
            let mut order: Vec<usize> = (0..n).collect();
            order.sort_by(|&a, &b| value(a, m).total_cmp(&value(b, m)));
            let (first, last) = (order[0], order[n - 1]);
            distance[first] = f64::INFINITY;
            distance[last] = f64::INFINITY;
            let range = value(last, m) - value(first, m);
            if range <= f64::EPSILON {
                continue;
            }
            for k in 1..n - 1 {
                let gap = value(order[k + 1], m) - value(order[k - 1], m);
                distance[order[k]] += gap / range;
            }
        }
        distance
    }

    /// Per-objective minimum.
    pub fn ideal_point<T: ObjectiveVector>(&self, solutions: &[T]) -> Vec<f64> {
        extreme(solutions, f64::INFINITY, f64::min)
    }

    /// Per-objective maximum.
    pub fn nadir_point<T: ObjectiveVector>(&self, solutions: &[T]) -> Vec<f64> {
        extreme(solutions, f64::NEG_INFINITY, f64::max)
    }

    /// Volume dominated by `solutions` and bounded by `reference`. Exact for
    /// one or two objectives, a seeded Monte Carlo estimate above that.
    /// Points not strictly better than the reference on every objective
    /// contribute nothing.
    pub fn hypervolume<T: ObjectiveVector>(&self, solutions: &[T], reference: &[f64]) -> f64 {
        let points: Vec<&[f64]> = solutions
            .iter()
            .map(|s| s.objectives())
            .filter(|p| p.len() == reference.len() && p.iter().zip(reference).all(|(v, r)| v < r))
            .collect();
        if points.is_empty() {
            return 0.0;
        }
        match reference.len() {
            0 => 0.0,
            1 => points
                .iter()
                .map(|p| reference[0] - p[0])
                .fold(0.0, f64::max),
            2 => hypervolume_2d(&points, reference),
            _ => self.hypervolume_monte_carlo(&points, reference),
        }
    }

    fn hypervolume_monte_carlo(&self, points: &[&[f64]], reference: &[f64]) -> f64 {
        let dims = reference.len();
        let lower: Vec<f64> = (0..dims)
            .map(|i| points.iter().map(|p| p[i]).fold(f64::INFINITY, f64::min))
            .collect();
        let box_volume: f64 = lower.iter().zip(reference).map(|(l, r)| r - l).product();
        if box_volume <= 0.0 {
            return 0.0;
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut sample = vec![0.0; dims];
        let mut hits = 0usize;
        for _ in 0..self.samples {
            for (i, s) in sample.iter_mut().enumerate() {
                *s = lower[i] + rng.gen::<f64>() * (reference[i] - lower[i]);
            }
            if points
                .iter()
                .any(|p| p.iter().zip(&sample).all(|(pi, si)| pi <= si))
            {
                hits += 1;
            }
        }
        box_volume * hits as f64 / self.samples as f64
    }

    /// Population standard deviation of all pairwise objective-space
    /// distances. Zero for fewer than two solutions.
    pub fn spread<T: ObjectiveVector>(&self, solutions: &[T]) -> f64 {
        let mut distances = Vec::new();
        for (i, a) in solutions.iter().enumerate() {
            for b in &solutions[i + 1..] {
                let d = a
                    .objectives()
                    .iter()
                    .zip(b.objectives())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f64>()
                    .sqrt();
                distances.push(d);
            }
        }
        if distances.is_empty() {
            return 0.0;
        }
        let mean = distances.iter().sum::<f64>() / distances.len() as f64;
        let variance =
            distances.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / distances.len() as f64;
        variance.sqrt()
    }

    /// Index (into `solutions`) of the front-0 member with the lowest
    /// weighted sum after ideal/nadir normalization. Ties go to the lowest
    /// index. Missing weights count as 1.
    pub fn best_compromise<T: ObjectiveVector>(&self, solutions: &[T], weights: &[f64]) -> Option<usize> {
        let fronts = self.non_dominated_sort(solutions);
        let front = fronts.first()?;
        let members: Vec<&T> = front.iter().map(|&i| &solutions[i]).collect();
        let ideal = self.ideal_point(&members);
        let nadir = self.nadir_point(&members);

        let score = |s: &T| -> f64 {
            s.objectives()
                .iter()
                .enumerate()
                .map(|(m, v)| {
                    let range = nadir[m] - ideal[m];
                    let normalized = if range > f64::EPSILON {
                        (v - ideal[m]) / range
                    } else {
                        0.0
                    };
                    weights.get(m).copied().unwrap_or(1.0) * normalized
                })
                .sum()
        };

        let mut best: Option<(usize, f64)> = None;
        for &i in front {
            let s = score(&solutions[i]);
            if best.map_or(true, |(_, b)| s < b) {
                best = Some((i, s));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Reference point a little beyond the nadir of `solutions`.
    pub fn reference_point<T: ObjectiveVector>(&self, solutions: &[T]) -> Vec<f64> {
        let ideal = self.ideal_point(solutions);
        let nadir = self.nadir_point(solutions);
        ideal
            .iter()
            .zip(&nadir)
            .map(|(lo, hi)| hi + (0.1 * (hi - lo)).max(1e-6))
            .collect()
    }

    /// Front sizes plus hypervolume and spread of front 0.
    pub fn analyze<T: ObjectiveVector>(&self, solutions: &[T]) -> ParetoSummary {
        let fronts = self.non_dominated_sort(solutions);
        let Some(first) = fronts.first() else {
            return ParetoSummary::default();
        };
        let front: Vec<&T> = first.iter().map(|&i| &solutions[i]).collect();
        let reference_point = self.reference_point(&front);
        ParetoSummary {
            front_sizes: fronts.iter().map(Vec::len).collect(),
            ideal: self.ideal_point(&front),
            nadir: self.nadir_point(&front),
            hypervolume: self.hypervolume(&front, &reference_point),
            spread: self.spread(&front),
            reference_point,
        }
    }
}

fn extreme<T: ObjectiveVector>(solutions: &[T], init: f64, pick: fn(f64, f64) -> f64) -> Vec<f64> {
    let Some(first) = solutions.first() else {
        return Vec::new();
    };
    let mut out = vec![init; first.objectives().len()];
    for s in solutions {
        for (o, v) in out.iter_mut().zip(s.objectives()) {
            *o = pick(*o, *v);
        }
    }
    out
}

/// Sweep along the first objective, tracking the best second objective.
fn hypervolume_2d(points: &[&[f64]], reference: &[f64]) -> f64 {
    let mut sorted: Vec<&[f64]> = points.to_vec();
    sorted.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    let mut volume = 0.0;
    let mut best_y = reference[1];
    for (k, p) in sorted.iter().enumerate() {
        best_y = best_y.min(p[1]);
        let next_x = sorted.get(k + 1).map_or(reference[0], |q| q[0]);
        volume += (next_x - p[0]) * (reference[1] - best_y);
    }
    volume
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(points: &[[f64; 2]]) -> Vec<Vec<f64>> {
        points.iter().map(|p| p.to_vec()).collect()
    }

    #[test]
    fn test_dominance() {
        assert!(dominates(&[1.0, 2.0], &[2.0, 2.0]));
        assert!(!dominates(&[1.0, 2.0], &[1.0, 2.0]));
        assert!(!dominates(&[1.0, 3.0], &[2.0, 2.0]));
        assert!(!dominates(&[1.0], &[2.0, 2.0]));
    }

    #[test]
    fn test_sort_ranks_layers() {
        let analyzer = ParetoAnalyzer::new();
        let solutions = set(&[[1.0, 4.0], [2.0, 2.0], [4.0, 1.0], [3.0, 3.0], [5.0, 5.0]]);
        let fronts = analyzer.non_dominated_sort(&solutions);
        assert_eq!(fronts, vec![vec![0, 1, 2], vec![3], vec![4]]);
        for &a in &fronts[0] {
            for &b in &fronts[0] {
                assert!(!dominates(&solutions[a], &solutions[b]));
            }
        }
    }

    struct Constrained(Vec<f64>, f64);

    impl ObjectiveVector for Constrained {
        fn objectives(&self) -> &[f64] {
            &self.0
        }

        fn constraint_violation(&self) -> f64 {
            self.1
        }
    }

    #[test]
    fn test_feasible_ranks_ahead_of_infeasible() {
        let analyzer = ParetoAnalyzer::new();
        let solutions = vec![
            Constrained(vec![1.0, 1.0], 3.0),
            Constrained(vec![9.0, 1.0], 0.0),
            Constrained(vec![5.0, 5.0], 0.5),
            Constrained(vec![2.0, 8.0], 0.0),
            Constrained(vec![0.0, 0.0], 0.5),
        ];
        let fronts = analyzer.non_dominated_sort(&solutions);
        assert_eq!(fronts, vec![vec![1, 3], vec![2, 4], vec![0]]);
        // better objectives do not rescue a larger breach
        assert!(constrained_dominates(&solutions[1], &solutions[4]));
        assert!(constrained_dominates(&solutions[2], &solutions[0]));
        assert!(!constrained_dominates(&solutions[4], &solutions[2]));
    }

    #[test]
    fn test_sort_is_idempotent() {
        let analyzer = ParetoAnalyzer::new();
        let solutions = set(&[[3.0, 1.0], [1.0, 3.0], [2.0, 2.0], [2.5, 2.5], [4.0, 4.0]]);
        let first = analyzer.non_dominated_sort(&solutions);
        let second = analyzer.non_dominated_sort(&solutions);
        assert_eq!(first, second);
        let fronts = analyzer.fronts(&solutions);
        assert_eq!(fronts[0].rank, 0);
        assert_eq!(fronts.len(), first.len());
    }

    #[test]
    fn test_crowding_boundaries_infinite() {
        let analyzer = ParetoAnalyzer::new();
        let solutions = set(&[[0.0, 4.0], [1.0, 3.0], [2.0, 1.0], [4.0, 0.0]]);
        let front = vec![0, 1, 2, 3];
        let d = analyzer.crowding_distance(&solutions, &front);
        assert!(d[0].is_infinite() && d[3].is_infinite());
        assert!(d[1].is_finite() && d[2].is_finite());
        // member 1: (2-0)/4 + (4-1)/4
        assert!((d[1] - 1.25).abs() < 1e-12);
    }

    #[test]
    fn test_small_fronts_all_infinite() {
        let analyzer = ParetoAnalyzer::new();
        let solutions = set(&[[0.0, 1.0], [1.0, 0.0]]);
        let d = analyzer.crowding_distance(&solutions, &[0, 1]);
        assert!(d.iter().all(|v| v.is_infinite()));
        assert!(analyzer.crowding_distance(&solutions, &[]).is_empty());
    }

    #[test]
    fn test_hypervolume_2d_exact() {
        let analyzer = ParetoAnalyzer::new();
        let solutions = set(&[[1.0, 3.0], [2.0, 2.0], [3.0, 1.0]]);
        let hv = analyzer.hypervolume(&solutions, &[4.0, 4.0]);
        assert!((hv - 6.0).abs() < 1e-12);
        // points outside the reference are ignored
        let with_outlier = set(&[[1.0, 3.0], [2.0, 2.0], [3.0, 1.0], [5.0, 0.5]]);
        assert!((analyzer.hypervolume(&with_outlier, &[4.0, 4.0]) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_hypervolume_monte_carlo_seeded() {
        let analyzer = ParetoAnalyzer::new().with_samples(2_000).with_seed(11);
        let corner = vec![vec![0.0, 0.0, 0.0]];
        assert!((analyzer.hypervolume(&corner, &[1.0, 1.0, 1.0]) - 1.0).abs() < 1e-12);

        let solutions = vec![vec![0.2, 0.6, 0.5], vec![0.6, 0.2, 0.5], vec![0.5, 0.5, 0.1]];
        let a = analyzer.hypervolume(&solutions, &[1.0, 1.0, 1.0]);
        let b = analyzer.hypervolume(&solutions, &[1.0, 1.0, 1.0]);
        assert_eq!(a, b);
        assert!(a > 0.0 && a < 1.0);
    }

    #[test]
    fn test_spread() {
        let analyzer = ParetoAnalyzer::new();
        assert_eq!(analyzer.spread(&set(&[[0.0, 0.0]])), 0.0);
        assert_eq!(analyzer.spread(&set(&[[0.0, 0.0], [3.0, 4.0]])), 0.0);
        let line = set(&[[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);
        assert!((analyzer.spread(&line) - (2.0_f64 / 9.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_best_compromise() {
        let analyzer = ParetoAnalyzer::new();
        let solutions = set(&[[0.0, 10.0], [4.0, 4.0], [10.0, 0.0], [9.0, 9.0]]);
        assert_eq!(analyzer.best_compromise(&solutions, &[0.5, 0.5]), Some(1));
        assert_eq!(analyzer.best_compromise(&solutions, &[0.9, 0.1]), Some(0));
        let empty: Vec<Vec<f64>> = Vec::new();
        assert_eq!(analyzer.best_compromise(&empty, &[]), None);
    }

    #[test]
    fn test_analyze_summary() {
        let analyzer = ParetoAnalyzer::new();
        let solutions = set(&[[1.0, 3.0], [2.0, 2.0], [3.0, 1.0], [4.0, 4.0]]);
        let summary = analyzer.analyze(&solutions);
        assert_eq!(summary.front_sizes, vec![3, 1]);
        assert_eq!(summary.ideal, vec![1.0, 1.0]);
        assert_eq!(summary.nadir, vec![3.0, 3.0]);
        assert!((summary.reference_point[0] - 3.2).abs() < 1e-12);
        assert!(summary.hypervolume > 0.0);
    }
}
