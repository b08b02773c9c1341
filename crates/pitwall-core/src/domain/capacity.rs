//! Per-race team capacity.

use pitwall_state::RaceRecord;

use super::error::{LeagueError, Result};

/// Minutes of racing covered by one driver when capacity is derived.
pub const MINUTES_PER_DRIVER: u32 = 60;

/// Effective drivers-per-team cap for a race.
///
/// An explicit `max_drivers_per_team` must be at least 1. Without one, a race
/// gets one driver per started hour of its duration (minimum 1). `None` means
/// the race is unconstrained and allocation is skipped.
pub fn effective_capacity(race: &RaceRecord) -> Result<Option<usize>> {
    match (race.max_drivers_per_team, race.duration_minutes) {
        (Some(0), _) => Err(LeagueError::validation(format!(
            "race {}: max drivers per team must be at least 1",
            race.id
        ))),
        (Some(max), _) => Ok(Some(max as usize)),
        (None, Some(minutes)) => Ok(Some(minutes.div_ceil(MINUTES_PER_DRIVER).max(1) as usize)),
        (None, None) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn race(max: Option<u32>, duration: Option<u32>) -> RaceRecord {
        let mut race = RaceRecord::new("r1", "e1", Utc::now());
        race.max_drivers_per_team = max;
        race.duration_minutes = duration;
        race
    }

    #[test]
    fn explicit_cap_wins_over_duration() {
        assert_eq!(effective_capacity(&race(Some(2), Some(360))).unwrap(), Some(2));
    }

    #[test]
    fn duration_derives_one_driver_per_started_hour() {
        assert_eq!(effective_capacity(&race(None, Some(60))).unwrap(), Some(1));
        assert_eq!(effective_capacity(&race(None, Some(90))).unwrap(), Some(2));
        assert_eq!(effective_capacity(&race(None, Some(150))).unwrap(), Some(3));
        assert_eq!(effective_capacity(&race(None, Some(0))).unwrap(), Some(1));
    }

    #[test]
    fn zero_cap_is_rejected() {
        let err = effective_capacity(&race(Some(0), Some(120))).unwrap_err();
        assert!(matches!(err, LeagueError::Validation(_)));
    }

    #[test]
    fn unconstrained_race_has_no_capacity() {
        assert_eq!(effective_capacity(&race(None, None)).unwrap(), None);
    }
}
