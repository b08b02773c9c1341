//! Assignment strategies: spread one class's drivers across its team pool.
//!
//! Both strategies are pure and stable, so rerunning on unchanged input
//! yields the same plan and [`minimal_writes`] filters it down to nothing.

use std::collections::HashMap;

use pitwall_state::{
    AssignmentStrategy, RegistrationId, RegistrationRecord, TeamAssignment, TeamId,
};

use super::balance::{self, BalanceOutcome, RatedDriver};
use crate::domain::resolve_rating;

/// Desired team for every registration of one class
#[derive(Debug, Clone)]
pub struct Distribution {
    pub assignments: Vec<TeamAssignment>,
    /// Present for the balanced-rating strategy
    pub balance: Option<BalanceOutcome>,
}

/// Contiguous split in signup order: `floor(n / t)` each, earliest teams take
/// one extra until the remainder is used up.
pub fn round_robin(
    class_registrations: &[&RegistrationRecord],
    teams: &[TeamId],
) -> Vec<TeamAssignment> {
    if teams.is_empty() {
        return Vec::new();
    }
    let base = class_registrations.len() / teams.len();
    let remainder = class_registrations.len() % teams.len();

    let mut assignments = Vec::with_capacity(class_registrations.len());
    let mut regs = class_registrations.iter();
    for (idx, team) in teams.iter().enumerate() {
        let size = base + usize::from(idx < remainder);
        for reg in regs.by_ref().take(size) {
            assignments.push(TeamAssignment {
                registration_id: reg.id.clone(),
                team_id: Some(team.clone()),
            });
        }
    }
    assignments
}

/// Balanced-rating distribution via the optimizer.
pub fn balanced(
    class_registrations: &[&RegistrationRecord],
    teams: &[TeamId],
    capacity: usize,
    primary_category: Option<&str>,
) -> (Vec<TeamAssignment>, BalanceOutcome) {
    let drivers: Vec<RatedDriver> = class_registrations
        .iter()
        .map(|r| RatedDriver::new(r.id.clone(), resolve_rating(&r.driver, primary_category)))
        .collect();
    let outcome = balance::balance(&drivers, teams, capacity);

    let placed: HashMap<&RegistrationId, &TeamId> = outcome
        .buckets
        .iter()
        .flat_map(|b| b.members.iter().map(move |m| (&m.registration_id, &b.team_id)))
        .collect();
    let assignments = resolve_in_signup_order(class_registrations, teams, &placed);
    (assignments, outcome)
}

/// Map every registration to its bucket, falling back to the first team for
/// any registration the buckets did not place.
fn resolve_in_signup_order(
    class_registrations: &[&RegistrationRecord],
    teams: &[TeamId],
    placed: &HashMap<&RegistrationId, &TeamId>,
) -> Vec<TeamAssignment> {
    let Some(fallback) = teams.first() else {
        return Vec::new();
    };
    class_registrations
        .iter()
        .map(|r| TeamAssignment {
            registration_id: r.id.clone(),
            team_id: Some(placed.get(&r.id).copied().unwrap_or(fallback).clone()),
        })
        .collect()
}

/// Run the race's strategy for one class.
pub fn distribute(
    strategy: AssignmentStrategy,
    class_registrations: &[&RegistrationRecord],
    teams: &[TeamId],
    capacity: usize,
    primary_category: Option<&str>,
) -> Distribution {
    match strategy {
        AssignmentStrategy::RoundRobin => Distribution {
            assignments: round_robin(class_registrations, teams),
            balance: None,
        },
        AssignmentStrategy::BalancedRating => {
            let (assignments, outcome) =
                balanced(class_registrations, teams, capacity, primary_category);
            Distribution {
                assignments,
                balance: Some(outcome),
            }
        }
    }
}

/// Keep only assignments that change a registration's stored team.
pub fn minimal_writes(
    current: &[RegistrationRecord],
    desired: &[TeamAssignment],
) -> Vec<TeamAssignment> {
    let stored: HashMap<&RegistrationId, Option<&TeamId>> =
        current.iter().map(|r| (&r.id, r.team_id.as_ref())).collect();
    desired
        .iter()
        .filter(|a| stored.get(&a.registration_id).copied() != Some(a.team_id.as_ref()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use pitwall_state::{CarClassId, Driver, RaceId};

    fn regs(n: usize) -> Vec<RegistrationRecord> {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                RegistrationRecord::new(
                    format!("d{i}"),
                    &RaceId::from("r1"),
                    Driver::user(format!("u{i}"), format!("Driver {i}"))
                        .with_rating("sports_car", 1000.0 + 100.0 * i as f64),
                    &CarClassId::from("gt3"),
                    t0 + Duration::minutes(i as i64),
                )
            })
            .collect()
    }

    fn teams(n: usize) -> Vec<TeamId> {
        (0..n).map(|i| TeamId::new(format!("t{i}"))).collect()
    }

    fn counts(assignments: &[TeamAssignment], teams: &[TeamId]) -> Vec<usize> {
        teams
            .iter()
            .map(|t| assignments.iter().filter(|a| a.team_id.as_ref() == Some(t)).count())
            .collect()
    }

    #[test]
    fn round_robin_gives_remainder_to_earliest_teams() {
        let records = regs(7);
        let refs: Vec<&RegistrationRecord> = records.iter().collect();
        let pool = teams(3);
        let plan = round_robin(&refs, &pool);
        assert_eq!(counts(&plan, &pool), vec![3, 2, 2]);
        // Contiguous in signup order
        assert_eq!(plan[0].team_id, Some(TeamId::from("t0")));
        assert_eq!(plan[3].team_id, Some(TeamId::from("t1")));
        assert_eq!(plan[6].team_id, Some(TeamId::from("t2")));
    }

    #[test]
    fn round_robin_without_teams_plans_nothing() {
        let records = regs(2);
        let refs: Vec<&RegistrationRecord> = records.iter().collect();
        assert!(round_robin(&refs, &[]).is_empty());
    }

    #[test]
    fn balanced_places_every_registration() {
        let records = regs(6);
        let refs: Vec<&RegistrationRecord> = records.iter().collect();
        let pool = teams(2);
        let dist = distribute(
            AssignmentStrategy::BalancedRating,
            &refs,
            &pool,
            3,
            Some("sports_car"),
        );
        assert_eq!(dist.assignments.len(), 6);
        assert_eq!(counts(&dist.assignments, &pool), vec![3, 3]);
        let outcome = dist.balance.expect("balanced run reports outcome");
        assert!(outcome.final_gap <= outcome.seed_gap);
    }

    #[test]
    fn minimal_writes_skips_unchanged() {
        let mut records = regs(3);
        records[0].team_id = Some(TeamId::from("t0"));
        let desired = vec![
            TeamAssignment {
                registration_id: RegistrationId::from("d0"),
                team_id: Some(TeamId::from("t0")),
            },
            TeamAssignment {
                registration_id: RegistrationId::from("d1"),
                team_id: Some(TeamId::from("t0")),
            },
        ];
        let writes = minimal_writes(&records, &desired);
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].registration_id, RegistrationId::from("d1"));
    }

    #[test]
    fn strategies_are_stable() {
        let records = regs(5);
        let refs: Vec<&RegistrationRecord> = records.iter().collect();
        let pool = teams(2);
        for strategy in [AssignmentStrategy::RoundRobin, AssignmentStrategy::BalancedRating] {
            let first = distribute(strategy, &refs, &pool, 3, None).assignments;
            let second = distribute(strategy, &refs, &pool, 3, None).assignments;
            assert_eq!(first, second);
        }
    }
}
