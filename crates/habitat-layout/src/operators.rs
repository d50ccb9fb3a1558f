//! Variation and selection operators for real-coded decision vectors.
//!
//! | Operator | Role |
//! |----------|------|
//! | [`SbxCrossover`] | Simulated binary crossover, bounded form |
//! | [`PolynomialMutation`] | Bounded polynomial mutation |
//! | [`binary_tournament`] | Crowded-comparison tournament of two |
//! | [`environmental_selection`] | Rank + crowding truncation of a merged pool |

use std::cmp::Ordering;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::pareto::{ObjectiveVector, ParetoAnalyzer};

/// Genes closer than this are treated as identical by crossover.
const GENE_EPSILON: f64 = 1.0e-14;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SbxCrossover {
    /// Distribution index η_c. Larger keeps children closer to parents.
    pub eta: f64,
    /// Chance a parent pair is recombined at all.
    pub probability: f64,
}

impl SbxCrossover {
    pub fn new(eta: f64, probability: f64) -> Self {
        Self { eta, probability }
    }

    /// Two children from two parents, every gene kept within `bounds`.
    pub fn apply<R: Rng>(
        &self,
        a: &[f64],
        b: &[f64],
        bounds: &[(f64, f64)],
        rng: &mut R,
    ) -> (Vec<f64>, Vec<f64>) {
        let mut c1 = a.to_vec();
        let mut c2 = b.to_vec();
        if rng.gen::<f64>() > self.probability {
            return (c1, c2);
        }

        for (i, &(lo, hi)) in bounds.iter().enumerate().take(a.len().min(b.len())) {
            if rng.gen::<f64>() > 0.5 {
                continue;
            }
            let (x1, x2) = (a[i], b[i]);
            if (x1 - x2).abs() <= GENE_EPSILON || hi <= lo {
                continue;
            }
            let (y1, y2) = if x1 < x2 { (x1, x2) } else { (x2, x1) };
            let u = rng.gen::<f64>();

            let beta_low = 1.0 + 2.0 * (y1 - lo) / (y2 - y1);
            let low = 0.5 * ((y1 + y2) - self.spread_factor(beta_low, u) * (y2 - y1));
            let beta_high = 1.0 + 2.0 * (hi - y2) / (y2 - y1);
            let high = 0.5 * ((y1 + y2) + self.spread_factor(beta_high, u) * (y2 - y1));

            let (low, high) = (low.clamp(lo, hi), high.clamp(lo, hi));
            if rng.gen::<bool>() {
                c1[i] = high;
                c2[i] = low;
            } else {
                c1[i] = low;
                c2[i] = high;
            }
        }
        (c1, c2)
    }

    fn spread_factor(&self, beta: f64, u: f64) -> f64 {
        let exponent = 1.0 / (self.eta + 1.0);
        let alpha = 2.0 - beta.powf(-(self.eta + 1.0));
        if u <= 1.0 / alpha {
            (u * alpha).powf(exponent)
        } else {
            (1.0 / (2.0 - u * alpha)).powf(exponent)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolynomialMutation {
    /// Distribution index η_m.
    pub eta: f64,
    /// Per-gene mutation chance.
    pub probability: f64,
}

impl PolynomialMutation {
    pub fn new(eta: f64, probability: f64) -> Self {
        Self { eta, probability }
    }

    pub fn apply<R: Rng>(&self, genes: &mut [f64], bounds: &[(f64, f64)], rng: &mut R) {
        let exponent = 1.0 / (self.eta + 1.0);
        for (gene, &(lo, hi)) in genes.iter_mut().zip(bounds) {
            if rng.gen::<f64>() >= self.probability || hi <= lo {
                continue;
            }
            let y = gene.clamp(lo, hi);
            let span = hi - lo;
            let r = rng.gen::<f64>();
            let delta = if r < 0.5 {
                let xy = 1.0 - (y - lo) / span;
                let val = 2.0 * r + (1.0 - 2.0 * r) * xy.powf(self.eta + 1.0);
                val.powf(exponent) - 1.0
            } else {
                let xy = 1.0 - (hi - y) / span;
                let val = 2.0 * (1.0 - r) + 2.0 * (r - 0.5) * xy.powf(self.eta + 1.0);
                1.0 - val.powf(exponent)
            };
            *gene = (y + delta * span).clamp(lo, hi);
        }
    }
}

/// Rank and crowding of one population member.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ranked {
    pub index: usize,
    pub rank: usize,
    pub crowding: f64,
}

/// Lower rank wins; within a rank, the less crowded member wins.
pub fn crowded_compare(a: &Ranked, b: &Ranked) -> Ordering {
    a.rank
        .cmp(&b.rank)
        .then_with(|| b.crowding.total_cmp(&a.crowding))
}

/// Draw two members and return the winner's position in `ranked`. Ties go
/// to the first draw.
pub fn binary_tournament<R: Rng>(ranked: &[Ranked], rng: &mut R) -> usize {
    let a = rng.gen_range(0..ranked.len());
    let b = rng.gen_range(0..ranked.len());
    match crowded_compare(&ranked[a], &ranked[b]) {
        Ordering::Greater => b,
        _ => a,
    }
}

/// Rank and crowding for every solution, in input order. Ranks follow the
/// constrained sort, so a feasible solution always ranks ahead of an
/// infeasible one.
pub fn rank_population<T: ObjectiveVector>(analyzer: &ParetoAnalyzer, solutions: &[T]) -> Vec<Ranked> {
    let mut ranked: Vec<Ranked> = (0..solutions.len())
        .map(|index| Ranked {
            index,
            rank: 0,
            crowding: 0.0,
        })
        .collect();
    for (rank, front) in analyzer.non_dominated_sort(solutions).iter().enumerate() {
        let crowding = analyzer.crowding_distance(solutions, front);
        for (&i, d) in front.iter().zip(crowding) {
            ranked[i].rank = rank;
            ranked[i].crowding = d;
        }
    }
    ranked
}

/// Keep `size` members of a merged parent + offspring pool: whole fronts in
/// rank order, then the least crowded members of the front that overflows.
/// The result is in crowded-comparison order.
pub fn environmental_selection<T: ObjectiveVector>(
    analyzer: &ParetoAnalyzer,
    pool: &[T],
    size: usize,
) -> Vec<Ranked> {
    let mut ranked = rank_population(analyzer, pool);
    ranked.sort_by(|a, b| crowded_compare(a, b).then(a.index.cmp(&b.index)));
    ranked.truncate(size);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const BOUNDS: [(f64, f64); 4] = [(-1.0, 1.0), (-1.0, 1.0), (0.0, 10.0), (0.0, 360.0)];

    #[test]
    fn test_sbx_children_within_bounds() {
        let sbx = SbxCrossover::new(15.0, 1.0);
        let mut rng = StdRng::seed_from_u64(3);
        let a = [-0.99, 0.5, 0.1, 359.0];
        let b = [0.99, -0.5, 9.9, 1.0];
        for _ in 0..200 {
            let (c1, c2) = sbx.apply(&a, &b, &BOUNDS, &mut rng);
            for (g, (lo, hi)) in c1.iter().chain(&c2).zip(BOUNDS.iter().cycle()) {
                assert!(g >= lo && g <= hi, "{} not in [{}, {}]", g, lo, hi);
            }
        }
    }

    #[test]
    fn test_sbx_identical_parents_unchanged() {
        let sbx = SbxCrossover::new(15.0, 1.0);
        let mut rng = StdRng::seed_from_u64(9);
        let a = [0.25, 0.25, 5.0, 90.0];
        let (c1, c2) = sbx.apply(&a, &a, &BOUNDS, &mut rng);
        assert_eq!(c1, a.to_vec());
        assert_eq!(c2, a.to_vec());
    }

    #[test]
    fn test_sbx_zero_probability_copies() {
        let sbx = SbxCrossover::new(15.0, 0.0);
        let mut rng = StdRng::seed_from_u64(1);
        let a = [0.1, 0.2, 0.3, 0.4];
        let b = [0.5, 0.6, 0.7, 0.8];
        let (c1, c2) = sbx.apply(&a, &b, &BOUNDS, &mut rng);
        assert_eq!((c1, c2), (a.to_vec(), b.to_vec()));
    }

    #[test]
    fn test_mutation_respects_probability_and_bounds() {
        let mut rng = StdRng::seed_from_u64(5);
        let original = vec![0.0, 0.9, 9.5, 180.0];

        let mut unchanged = original.clone();
        PolynomialMutation::new(20.0, 0.0).apply(&mut unchanged, &BOUNDS, &mut rng);
        assert_eq!(unchanged, original);

        let always = PolynomialMutation::new(20.0, 1.0);
        let mut moved = 0;
        for _ in 0..100 {
            let mut genes = original.clone();
            always.apply(&mut genes, &BOUNDS, &mut rng);
            for (g, (lo, hi)) in genes.iter().zip(BOUNDS) {
                assert!(*g >= lo && *g <= hi);
            }
            if genes != original {
                moved += 1;
            }
        }
        assert!(moved > 90);
    }

    #[test]
    fn test_tournament_prefers_lower_rank() {
        let ranked = vec![
            Ranked { index: 0, rank: 0, crowding: 0.1 },
            Ranked { index: 1, rank: 3, crowding: f64::INFINITY },
        ];
        let mut rng = StdRng::seed_from_u64(2);
        let wins = (0..200)
            .filter(|_| binary_tournament(&ranked, &mut rng) == 0)
            .count();
        // member 1 only wins when drawn twice
        assert!(wins > 120, "{} wins", wins);
        assert_eq!(crowded_compare(&ranked[0], &ranked[1]), Ordering::Less);
    }

    #[test]
    fn test_crowding_breaks_rank_ties() {
        let a = Ranked { index: 0, rank: 1, crowding: 2.0 };
        let b = Ranked { index: 1, rank: 1, crowding: 0.5 };
        assert_eq!(crowded_compare(&a, &b), Ordering::Less);
        assert_eq!(crowded_compare(&b, &a), Ordering::Greater);
    }

    struct Penalized(Vec<f64>, f64);

    impl ObjectiveVector for Penalized {
        fn objectives(&self) -> &[f64] {
            &self.0
        }

        fn constraint_violation(&self) -> f64 {
            self.1
        }
    }

    #[test]
    fn test_selection_prefers_feasible_over_better_objectives() {
        let analyzer = ParetoAnalyzer::new();
        let pool = vec![
            Penalized(vec![0.1, 0.1], 0.02),
            Penalized(vec![7.0, 9.0], 0.0),
            Penalized(vec![0.0, 0.0], 40.0),
            Penalized(vec![9.0, 6.0], 0.0),
        ];
        let survivors = environmental_selection(&analyzer, &pool, 3);
        let kept: Vec<usize> = survivors.iter().map(|r| r.index).collect();
        assert_eq!(kept, vec![1, 3, 0]);

        let ranked = rank_population(&analyzer, &pool);
        assert_eq!(crowded_compare(&ranked[1], &ranked[0]), Ordering::Less);
        assert_eq!(crowded_compare(&ranked[0], &ranked[2]), Ordering::Less);
    }

    #[test]
    fn test_environmental_selection_keeps_best_fronts() {
        let analyzer = ParetoAnalyzer::new();
        let pool: Vec<Vec<f64>> = vec![
            vec![5.0, 5.0],
            vec![0.0, 4.0],
            vec![1.0, 2.0],
            vec![2.0, 1.5],
            vec![4.0, 0.0],
            vec![6.0, 6.0],
        ];
        let survivors = environmental_selection(&analyzer, &pool, 3);
        assert_eq!(survivors.len(), 3);
        assert!(survivors.iter().all(|r| r.rank == 0));
        let kept: Vec<usize> = survivors.iter().map(|r| r.index).collect();
        // boundaries are infinitely uncrowded and always survive
        assert!(kept.contains(&1) && kept.contains(&4));
        assert!(!kept.contains(&0) && !kept.contains(&5));
    }
}
