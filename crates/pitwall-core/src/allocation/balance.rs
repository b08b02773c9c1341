//! Balanced-rating optimizer.
//!
//! Greedy seeding by descending rating, then a bounded pairwise-swap hill
//! climb that narrows the gap between the best and worst team averages.
//! Deterministic for a given input order; no optimality guarantee.

use pitwall_state::{RegistrationId, TeamId};
use serde::Serialize;

/// Upper bound on refinement rounds.
pub const MAX_REFINEMENT_ROUNDS: usize = 50;

/// A swap must narrow the gap by strictly more than this many rating points.
pub const MIN_IMPROVEMENT: f64 = 1.0;

/// A driver with its resolved rating, in signup order
#[derive(Debug, Clone, PartialEq)]
pub struct RatedDriver {
    pub registration_id: RegistrationId,
    pub rating: f64,
}

impl RatedDriver {
    pub fn new(registration_id: RegistrationId, rating: f64) -> Self {
        RatedDriver {
            registration_id,
            rating,
        }
    }
}

/// One team's members during optimization
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub team_id: TeamId,
    pub members: Vec<RatedDriver>,
    total: f64,
}

impl Bucket {
    fn new(team_id: TeamId) -> Self {
        Bucket {
            team_id,
            members: Vec::new(),
            total: 0.0,
        }
    }

    fn push(&mut self, driver: RatedDriver) {
        self.total += driver.rating;
        self.members.push(driver);
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Average rating; an empty bucket averages 0.
    pub fn average(&self) -> f64 {
        average(self.total, self.members.len())
    }
}

fn average(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

/// Result of one optimization run
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceOutcome {
    pub buckets: Vec<Bucket>,
    /// Gap right after greedy seeding
    pub seed_gap: f64,
    /// Gap after refinement
    pub final_gap: f64,
    /// Refinement rounds executed, including the final one that found nothing
    pub rounds: usize,
    pub swaps: usize,
}

/// Compact report of an optimization run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalanceStats {
    pub seed_gap: f64,
    pub final_gap: f64,
    pub rounds: usize,
    pub swaps: usize,
}

impl BalanceOutcome {
    pub fn stats(&self) -> BalanceStats {
        BalanceStats {
            seed_gap: self.seed_gap,
            final_gap: self.final_gap,
            rounds: self.rounds,
            swaps: self.swaps,
        }
    }
}

/// Spread between the highest and lowest team average.
pub fn gap(buckets: &[Bucket]) -> f64 {
    gap_of(buckets.iter().map(Bucket::average))
}

fn gap_of(averages: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = averages.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), avg| {
        (lo.min(avg), hi.max(avg))
    });
    if min.is_finite() {
        max - min
    } else {
        0.0
    }
}

/// Greedy seed: strongest driver first into the lowest-total team with room.
pub fn seed(drivers: &[RatedDriver], teams: &[TeamId], capacity: usize) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = teams.iter().cloned().map(Bucket::new).collect();
    if buckets.is_empty() {
        return buckets;
    }

    // Stable sort keeps signup order among equal ratings
    let mut sorted = drivers.to_vec();
    sorted.sort_by(|a, b| b.rating.total_cmp(&a.rating));

    for driver in sorted {
        let with_room = buckets.iter().any(|b| b.len() < capacity);
        let mut target: Option<usize> = None;
        for (idx, bucket) in buckets.iter().enumerate() {
            if with_room && bucket.len() >= capacity {
                continue;
            }
            match target {
                Some(best) if buckets[best].total() <= bucket.total() => {}
                _ => target = Some(idx),
            }
        }
        if let Some(idx) = target {
            buckets[idx].push(driver);
        }
    }
    buckets
}

/// Best single swap found in a scan
struct Swap {
    reduction: f64,
    left: (usize, usize),
    right: (usize, usize),
}

fn best_swap(buckets: &[Bucket]) -> Option<Swap> {
    let current = gap(buckets);
    let averages: Vec<f64> = buckets.iter().map(Bucket::average).collect();
    let mut best: Option<Swap> = None;

    for i in 0..buckets.len() {
        for j in (i + 1)..buckets.len() {
            for (a, left) in buckets[i].members.iter().enumerate() {
                for (b, right) in buckets[j].members.iter().enumerate() {
                    let delta = right.rating - left.rating;
                    let avg_i = average(buckets[i].total + delta, buckets[i].len());
                    let avg_j = average(buckets[j].total - delta, buckets[j].len());
                    let swapped = averages.iter().enumerate().map(|(k, avg)| match k {
                        k if k == i => avg_i,
                        k if k == j => avg_j,
                        _ => *avg,
                    });
                    let reduction = current - gap_of(swapped);
                    if reduction <= MIN_IMPROVEMENT {
                        continue;
                    }
                    if best.as_ref().map_or(true, |s| reduction > s.reduction) {
                        best = Some(Swap {
                            reduction,
                            left: (i, a),
                            right: (j, b),
                        });
                    }
                }
            }
        }
    }
    best
}

fn apply_swap(buckets: &mut [Bucket], swap: &Swap) {
    let (i, a) = swap.left;
    let (j, b) = swap.right;
    let left = buckets[i].members[a].clone();
    let right = buckets[j].members[b].clone();
    buckets[i].total += right.rating - left.rating;
    buckets[j].total += left.rating - right.rating;
    buckets[i].members[a] = right;
    buckets[j].members[b] = left;
}

/// Hill-climb: apply the single best swap per round until none helps or the
/// round cap is hit. Returns `(rounds, swaps)`.
pub fn refine(buckets: &mut [Bucket]) -> (usize, usize) {
    let mut rounds = 0;
    let mut swaps = 0;
    while rounds < MAX_REFINEMENT_ROUNDS {
        rounds += 1;
        match best_swap(buckets) {
            Some(swap) => {
                apply_swap(buckets, &swap);
                swaps += 1;
            }
            None => break,
        }
    }
    (rounds, swaps)
}

/// Seed then refine.
pub fn balance(drivers: &[RatedDriver], teams: &[TeamId], capacity: usize) -> BalanceOutcome {
    let mut buckets = seed(drivers, teams, capacity);
    let seed_gap = gap(&buckets);
    let (rounds, swaps) = refine(&mut buckets);
    BalanceOutcome {
        final_gap: gap(&buckets),
        buckets,
        seed_gap,
        rounds,
        swaps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drivers(ratings: &[f64]) -> Vec<RatedDriver> {
        ratings
            .iter()
            .enumerate()
            .map(|(i, r)| RatedDriver::new(RegistrationId::new(format!("d{i}")), *r))
            .collect()
    }

    fn teams(n: usize) -> Vec<TeamId> {
        (0..n).map(|i| TeamId::new(format!("t{i}"))).collect()
    }

    fn member_ids(bucket: &Bucket) -> Vec<&str> {
        bucket.members.iter().map(|m| m.registration_id.as_str()).collect()
    }

    #[test]
    fn seed_alternates_strongest_into_weakest_team() {
        let buckets = seed(&drivers(&[1000.0, 3000.0, 2000.0, 4000.0]), &teams(2), 2);
        assert_eq!(member_ids(&buckets[0]), vec!["d3", "d0"]);
        assert_eq!(member_ids(&buckets[1]), vec!["d1", "d2"]);
    }

    #[test]
    fn ties_keep_signup_order() {
        let buckets = seed(&drivers(&[1500.0, 1500.0, 1500.0]), &teams(3), 1);
        assert_eq!(member_ids(&buckets[0]), vec!["d0"]);
        assert_eq!(member_ids(&buckets[1]), vec!["d1"]);
        assert_eq!(member_ids(&buckets[2]), vec!["d2"]);
    }

    #[test]
    fn seed_respects_capacity() {
        let buckets = seed(&drivers(&[10.0, 0.0, 0.0, 0.0]), &teams(2), 2);
        assert!(buckets.iter().all(|b| b.len() <= 2));
    }

    #[test]
    fn equal_totals_pick_the_earliest_team_with_room() {
        let buckets = seed(&drivers(&[0.0, 0.0, 0.0]), &teams(3), 2);
        assert_eq!(member_ids(&buckets[0]), vec!["d0", "d1"]);
        assert_eq!(member_ids(&buckets[1]), vec!["d2"]);
        assert!(buckets[2].is_empty());
    }

    #[test]
    fn seed_overflows_when_every_team_is_full() {
        let buckets = seed(&drivers(&[3.0, 2.0, 1.0]), &teams(1), 2);
        assert_eq!(buckets[0].len(), 3);
    }

    #[test]
    fn empty_bucket_averages_zero() {
        let buckets = seed(&drivers(&[900.0]), &teams(2), 2);
        assert_eq!(buckets[1].average(), 0.0);
        assert_eq!(gap(&buckets), 900.0);
    }

    #[test]
    fn refinement_narrows_greedy_gap() {
        let input = drivers(&[5000.0, 4900.0, 4800.0, 1000.0, 900.0, 100.0]);
        let outcome = balance(&input, &teams(2), 3);
        assert!(outcome.final_gap <= outcome.seed_gap);
        assert!(outcome.rounds <= MAX_REFINEMENT_ROUNDS);
        assert!(outcome.buckets.iter().all(|b| b.len() <= 3));
        let placed: usize = outcome.buckets.iter().map(Bucket::len).sum();
        assert_eq!(placed, input.len());
    }

    #[test]
    fn swaps_below_threshold_are_rejected() {
        let mut buckets = seed(&drivers(&[100.5, 100.0]), &teams(2), 1);
        let (rounds, swaps) = refine(&mut buckets);
        assert_eq!((rounds, swaps), (1, 0));
    }

    #[test]
    fn no_teams_yields_no_buckets() {
        let outcome = balance(&drivers(&[1.0, 2.0]), &[], 2);
        assert!(outcome.buckets.is_empty());
        assert_eq!(outcome.final_gap, 0.0);
    }
}
