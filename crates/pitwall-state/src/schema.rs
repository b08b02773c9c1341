//! Row definitions for the Pitwall SurrealDB tables
//!
//! Tables:
//! - races: race timeslots plus reconciliation state
//! - registrations: driver signups (one per driver per race)
//! - teams: long-lived team names
//! - car_classes: racing categories
//!
//! Rows keep domain ids as plain string columns and convert to/from the
//! `storage_traits` records at the store boundary.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::StoredSnapshot;
use crate::storage_traits::{
    AssignmentStrategy, CarClassId, CarClassRecord, Driver, EventId, RaceId, RaceRecord,
    RegistrationId, RegistrationRecord, TeamId, TeamRecord, ThreadHandle,
};

/// Module for serializing chrono DateTime to SurrealDB datetime format
mod surreal_datetime {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};
    use surrealdb::sql::Datetime as SurrealDatetime;

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let sd = SurrealDatetime::from(*date);
        serde::Serialize::serialize(&sd, serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let sd = SurrealDatetime::deserialize(deserializer)?;
        Ok(DateTime::from(sd))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RaceRow {
    pub race_id: String,
    pub event_id: String,
    #[serde(with = "surreal_datetime")]
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: Option<u32>,
    pub max_drivers_per_team: Option<u32>,
    #[serde(default)]
    pub strategy: AssignmentStrategy,
    #[serde(default)]
    pub teams_assigned: bool,
    #[serde(default)]
    pub snapshot: Option<StoredSnapshot>,
    #[serde(default)]
    pub thread_map: BTreeMap<String, String>,
    #[serde(default)]
    pub event_thread: Option<String>,
}

impl From<RaceRecord> for RaceRow {
    fn from(race: RaceRecord) -> Self {
        RaceRow {
            race_id: race.id.0,
            event_id: race.event_id.0,
            starts_at: race.starts_at,
            duration_minutes: race.duration_minutes,
            max_drivers_per_team: race.max_drivers_per_team,
            strategy: race.strategy,
            teams_assigned: race.teams_assigned,
            snapshot: race.snapshot,
            thread_map: race
                .thread_map
                .into_iter()
                .map(|(team, thread)| (team.0, thread.0))
                .collect(),
            event_thread: race.event_thread.map(|t| t.0),
        }
    }
}

impl From<RaceRow> for RaceRecord {
    fn from(row: RaceRow) -> Self {
        RaceRecord {
            id: RaceId(row.race_id),
            event_id: EventId(row.event_id),
            starts_at: row.starts_at,
            duration_minutes: row.duration_minutes,
            max_drivers_per_team: row.max_drivers_per_team,
            strategy: row.strategy,
            teams_assigned: row.teams_assigned,
            snapshot: row.snapshot,
            thread_map: row
                .thread_map
                .into_iter()
                .map(|(team, thread)| (TeamId(team), ThreadHandle(thread)))
                .collect(),
            event_thread: row.event_thread.map(ThreadHandle),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RegistrationRow {
    pub registration_id: String,
    pub race_id: String,
    pub driver: Driver,
    pub car_class_id: String,
    pub team_id: Option<String>,
    #[serde(with = "surreal_datetime")]
    pub created_at: DateTime<Utc>,
}

impl From<RegistrationRecord> for RegistrationRow {
    fn from(reg: RegistrationRecord) -> Self {
        RegistrationRow {
            registration_id: reg.id.0,
            race_id: reg.race_id.0,
            driver: reg.driver,
            car_class_id: reg.car_class_id.0,
            team_id: reg.team_id.map(|t| t.0),
            created_at: reg.created_at,
        }
    }
}

impl From<RegistrationRow> for RegistrationRecord {
    fn from(row: RegistrationRow) -> Self {
        RegistrationRecord {
            id: RegistrationId(row.registration_id),
            race_id: RaceId(row.race_id),
            driver: row.driver,
            car_class_id: CarClassId(row.car_class_id),
            team_id: row.team_id.map(TeamId),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TeamRow {
    pub team_id: String,
    pub name: String,
}

impl From<TeamRow> for TeamRecord {
    fn from(row: TeamRow) -> Self {
        TeamRecord {
            id: TeamId(row.team_id),
            name: row.name,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CarClassRow {
    pub class_id: String,
    pub name: String,
}

impl From<CarClassRow> for CarClassRecord {
    fn from(row: CarClassRow) -> Self {
        CarClassRecord {
            id: CarClassId(row.class_id),
            name: row.name,
        }
    }
}
