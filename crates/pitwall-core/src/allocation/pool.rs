//! Team pool allocation.
//!
//! Decides which existing teams take part for one car class in one race and
//! how many are needed. Teams already hosting a different class in the race
//! are never candidates.

use std::collections::HashSet;

use pitwall_state::{
    CarClassId, LeagueStore, RaceId, RegistrationId, RegistrationRecord, TeamId, TeamRecord,
};
use tracing::debug;

use crate::domain::Result;
use crate::obs;

/// Parameters for one class allocation
#[derive(Debug, Clone)]
pub struct PoolRequest<'a> {
    pub car_class_id: &'a CarClassId,
    /// `None` means unconstrained; allocation is skipped
    pub capacity: Option<usize>,
    /// Registration left out of the count (e.g. one being edited)
    pub excluded: Option<&'a RegistrationId>,
}

/// Teams needed for `ceil(n / capacity)` drivers.
pub fn required_teams(drivers: usize, capacity: usize) -> usize {
    drivers.div_ceil(capacity.max(1))
}

/// Compute the ordered team list for one class.
///
/// `registrations` must be in signup order and `teams` in name order. An
/// empty result tells the caller there is nothing to assign.
pub fn allocate_team_pool(
    registrations: &[RegistrationRecord],
    teams: &[TeamRecord],
    request: &PoolRequest<'_>,
) -> Vec<TeamId> {
    let Some(capacity) = request.capacity else {
        return Vec::new();
    };

    let active = registrations
        .iter()
        .filter(|r| Some(&r.id) != request.excluded);

    let mut class_count = 0usize;
    let mut class_teams: HashSet<&TeamId> = HashSet::new();
    let mut used_team_ids: HashSet<&TeamId> = HashSet::new();
    for reg in active {
        if &reg.car_class_id == request.car_class_id {
            class_count += 1;
            if let Some(team) = &reg.team_id {
                class_teams.insert(team);
            }
        } else if let Some(team) = &reg.team_id {
            used_team_ids.insert(team);
        }
    }

    let available = |team: &&TeamRecord| !used_team_ids.contains(&team.id);

    // Candidates in global name order
    let mut pool: Vec<TeamId> = teams
        .iter()
        .filter(available)
        .filter(|t| class_teams.contains(&t.id))
        .map(|t| t.id.clone())
        .collect();

    if pool.is_empty() {
        if let Some(first) = teams.iter().find(available) {
            pool.push(first.id.clone());
        }
    }

    let required = required_teams(class_count, capacity);
    if required > pool.len() {
        let extra: Vec<TeamId> = teams
            .iter()
            .filter(available)
            .filter(|t| !pool.contains(&t.id))
            .take(required - pool.len())
            .map(|t| t.id.clone())
            .collect();
        pool.extend(extra);
    } else {
        pool.truncate(required);
    }

    if pool.len() < required {
        debug!(
            car_class = %request.car_class_id,
            required,
            available = pool.len(),
            "Team pool exhausted"
        );
    }

    pool
}

/// Store-backed allocator: reads fresh state, then runs [`allocate_team_pool`].
pub struct TeamPoolAllocator<'s> {
    store: &'s dyn LeagueStore,
}

impl<'s> TeamPoolAllocator<'s> {
    pub fn new(store: &'s dyn LeagueStore) -> Self {
        TeamPoolAllocator { store }
    }

    /// Allocate the pool for `car_class_id` in `race_id` from stored state.
    pub async fn allocate(
        &self,
        race_id: &RaceId,
        car_class_id: &CarClassId,
        capacity: Option<usize>,
        excluded: Option<&RegistrationId>,
    ) -> Result<Vec<TeamId>> {
        if capacity.is_none() {
            return Ok(Vec::new());
        }
        let (registrations, teams) = futures::try_join!(
            self.store.list_registrations(race_id),
            self.store.list_teams()
        )?;
        let pool = allocate_team_pool(
            &registrations,
            &teams,
            &PoolRequest {
                car_class_id,
                capacity,
                excluded,
            },
        );
        let drivers = registrations
            .iter()
            .filter(|r| &r.car_class_id == car_class_id && Some(&r.id) != excluded)
            .count();
        obs::emit_allocation_computed(
            race_id.as_str(),
            car_class_id.as_str(),
            pool.len(),
            drivers,
        );
        Ok(pool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn reg(id: &str, class: &str, team: Option<&str>, minute: i64) -> RegistrationRecord {
        let created =
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minute);
        let mut reg = RegistrationRecord::new(
            id,
            &RaceId::from("r1"),
            pitwall_state::Driver::user(format!("u-{id}"), id),
            &CarClassId::from(class),
            created,
        );
        reg.team_id = team.map(TeamId::from);
        reg
    }

    fn teams() -> Vec<TeamRecord> {
        ["Alpha", "Bravo", "Charlie", "Delta", "Echo"]
            .iter()
            .map(|n| TeamRecord::new(format!("t-{}", n.to_lowercase()), *n))
            .collect()
    }

    fn ids(pool: &[TeamId]) -> Vec<&str> {
        pool.iter().map(TeamId::as_str).collect()
    }

    #[test]
    fn required_teams_rounds_up() {
        assert_eq!(required_teams(0, 3), 0);
        assert_eq!(required_teams(5, 3), 2);
        assert_eq!(required_teams(6, 3), 2);
        assert_eq!(required_teams(7, 3), 3);
    }

    #[test]
    fn unconstrained_capacity_is_a_no_op() {
        let regs = vec![reg("a", "gt3", None, 0)];
        let class = CarClassId::from("gt3");
        let pool = allocate_team_pool(
            &regs,
            &teams(),
            &PoolRequest {
                car_class_id: &class,
                capacity: None,
                excluded: None,
            },
        );
        assert!(pool.is_empty());
    }

    #[test]
    fn fresh_class_grows_from_first_free_team() {
        let regs: Vec<_> = (0..5).map(|i| reg(&format!("d{i}"), "gt3", None, i)).collect();
        let class = CarClassId::from("gt3");
        let pool = allocate_team_pool(
            &regs,
            &teams(),
            &PoolRequest {
                car_class_id: &class,
                capacity: Some(2),
                excluded: None,
            },
        );
        assert_eq!(ids(&pool), vec!["t-alpha", "t-bravo", "t-charlie"]);
    }

    #[test]
    fn teams_of_other_classes_are_excluded() {
        let regs = vec![
            reg("g1", "gt4", Some("t-alpha"), 0),
            reg("a", "gt3", None, 1),
            reg("b", "gt3", None, 2),
        ];
        let class = CarClassId::from("gt3");
        let pool = allocate_team_pool(
            &regs,
            &teams(),
            &PoolRequest {
                car_class_id: &class,
                capacity: Some(1),
                excluded: None,
            },
        );
        assert_eq!(ids(&pool), vec!["t-bravo", "t-charlie"]);
    }

    #[test]
    fn shrinking_pool_truncates_by_name_order() {
        let regs = vec![
            reg("a", "gt3", Some("t-delta"), 0),
            reg("b", "gt3", Some("t-bravo"), 1),
            reg("c", "gt3", Some("t-charlie"), 2),
        ];
        let class = CarClassId::from("gt3");
        let pool = allocate_team_pool(
            &regs,
            &teams(),
            &PoolRequest {
                car_class_id: &class,
                capacity: Some(2),
                excluded: None,
            },
        );
        assert_eq!(ids(&pool), vec!["t-bravo", "t-charlie"]);
    }

    #[test]
    fn growing_pool_appends_after_existing_teams() {
        let regs = vec![
            reg("a", "gt3", Some("t-delta"), 0),
            reg("b", "gt3", Some("t-delta"), 1),
            reg("c", "gt3", None, 2),
        ];
        let class = CarClassId::from("gt3");
        let pool = allocate_team_pool(
            &regs,
            &teams(),
            &PoolRequest {
                car_class_id: &class,
                capacity: Some(2),
                excluded: None,
            },
        );
        assert_eq!(ids(&pool), vec!["t-delta", "t-alpha"]);
    }

    #[test]
    fn excluded_registration_is_not_counted() {
        let regs = vec![reg("a", "gt3", None, 0), reg("b", "gt3", None, 1)];
        let class = CarClassId::from("gt3");
        let excluded = RegistrationId::from("b");
        let pool = allocate_team_pool(
            &regs,
            &teams(),
            &PoolRequest {
                car_class_id: &class,
                capacity: Some(1),
                excluded: Some(&excluded),
            },
        );
        assert_eq!(ids(&pool), vec!["t-alpha"]);
    }

    #[test]
    fn exhausted_pool_returns_what_exists() {
        let regs: Vec<_> = (0..8).map(|i| reg(&format!("d{i}"), "gt3", None, i)).collect();
        let class = CarClassId::from("gt3");
        let pool = allocate_team_pool(
            &regs,
            &teams(),
            &PoolRequest {
                car_class_id: &class,
                capacity: Some(1),
                excluded: None,
            },
        );
        assert_eq!(pool.len(), 5);
    }
}
