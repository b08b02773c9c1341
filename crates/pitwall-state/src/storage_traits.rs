//! Storage trait definitions for Pitwall
//!
//! `LeagueStore` is the single data-access seam consumed by the core. It
//! guarantees:
//! - registrations are always returned in signup order (`created_at`, then id)
//! - teams are always returned in name order (then id)
//! - multi-record writes are all-or-nothing
//! - assignment writes only touch registrations whose team actually changes
//!
//! In-memory fakes are provided for testing via the `fakes` module.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::snapshot::{Snapshot, StoredSnapshot};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            /// Generate a new random identifier
            pub fn generate() -> Self {
                $name(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique identifier for a registration (one driver in one race)
    RegistrationId
);
string_id!(
    /// Unique identifier for a race timeslot
    RaceId
);
string_id!(
    /// Unique identifier for an event grouping several races
    EventId
);
string_id!(
    /// Unique identifier for a long-lived team
    TeamId
);
string_id!(
    /// Unique identifier for a car class
    CarClassId
);
string_id!(
    /// Identifier of a registered portal user
    UserId
);
string_id!(
    /// Opaque handle of a conversation thread in the chat service
    ThreadHandle
);

// ---------------------------------------------------------------------------
// Drivers, teams, classes
// ---------------------------------------------------------------------------

/// One skill-rating observation in a category (e.g. "sports_car")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingObservation {
    pub category: String,
    pub value: f64,
}

/// Who a driver is: a portal account or a manually entered name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriverIdentity {
    User { user_id: UserId },
    Manual { entry_id: String },
}

/// A driver as seen by one registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub identity: DriverIdentity,
    pub name: String,
    #[serde(default)]
    pub ratings: Vec<RatingObservation>,
}

impl Driver {
    pub fn user(user_id: impl Into<String>, name: impl Into<String>) -> Self {
        Driver {
            identity: DriverIdentity::User {
                user_id: UserId::new(user_id),
            },
            name: name.into(),
            ratings: Vec::new(),
        }
    }

    pub fn manual(entry_id: impl Into<String>, name: impl Into<String>) -> Self {
        Driver {
            identity: DriverIdentity::Manual {
                entry_id: entry_id.into(),
            },
            name: name.into(),
            ratings: Vec::new(),
        }
    }

    /// Attach a rating observation
    pub fn with_rating(mut self, category: impl Into<String>, value: f64) -> Self {
        self.ratings.push(RatingObservation {
            category: category.into(),
            value,
        });
        self
    }

    /// Portal account behind this driver, if any. Manual entries cannot be
    /// invited into chat threads.
    pub fn user_id(&self) -> Option<&UserId> {
        match &self.identity {
            DriverIdentity::User { user_id } => Some(user_id),
            DriverIdentity::Manual { .. } => None,
        }
    }
}

/// A named group reused across races. Capacity is supplied per race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub id: TeamId,
    pub name: String,
}

impl TeamRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        TeamRecord {
            id: TeamId::new(id),
            name: name.into(),
        }
    }
}

/// A racing category. Classes never share a team within one race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarClassRecord {
    pub id: CarClassId,
    pub name: String,
}

impl CarClassRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        CarClassRecord {
            id: CarClassId::new(id),
            name: name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Races and registrations
// ---------------------------------------------------------------------------

/// How drivers of one class are spread across the allocated teams
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStrategy {
    #[default]
    RoundRobin,
    BalancedRating,
}

/// One timeslot of an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRecord {
    pub id: RaceId,
    pub event_id: EventId,
    pub starts_at: DateTime<Utc>,
    /// Scheduled length; used to derive capacity when no explicit cap is set
    pub duration_minutes: Option<u32>,
    pub max_drivers_per_team: Option<u32>,
    #[serde(default)]
    pub strategy: AssignmentStrategy,
    #[serde(default)]
    pub teams_assigned: bool,
    /// Last-notified driver -> team state, in whatever format it was written
    #[serde(default)]
    pub snapshot: Option<StoredSnapshot>,
    /// Team id -> chat thread created for that team in this race
    #[serde(default)]
    pub thread_map: BTreeMap<TeamId, ThreadHandle>,
    /// Thread shared by every race of the event
    #[serde(default)]
    pub event_thread: Option<ThreadHandle>,
}

impl RaceRecord {
    pub fn new(id: impl Into<String>, event_id: impl Into<String>, starts_at: DateTime<Utc>) -> Self {
        RaceRecord {
            id: RaceId::new(id),
            event_id: EventId::new(event_id),
            starts_at,
            duration_minutes: None,
            max_drivers_per_team: None,
            strategy: AssignmentStrategy::RoundRobin,
            teams_assigned: false,
            snapshot: None,
            thread_map: BTreeMap::new(),
            event_thread: None,
        }
    }
}

/// Binding of one driver to one race and one car class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub id: RegistrationId,
    pub race_id: RaceId,
    pub driver: Driver,
    pub car_class_id: CarClassId,
    pub team_id: Option<TeamId>,
    /// Signup time; the canonical processing order for allocation
    pub created_at: DateTime<Utc>,
}

impl RegistrationRecord {
    pub fn new(
        id: impl Into<String>,
        race_id: &RaceId,
        driver: Driver,
        car_class_id: &CarClassId,
        created_at: DateTime<Utc>,
    ) -> Self {
        RegistrationRecord {
            id: RegistrationId::new(id),
            race_id: race_id.clone(),
            driver,
            car_class_id: car_class_id.clone(),
            team_id: None,
            created_at,
        }
    }

    pub fn with_team(mut self, team_id: &TeamId) -> Self {
        self.team_id = Some(team_id.clone());
        self
    }
}

/// Canonical signup ordering shared by every store implementation.
pub fn signup_order(a: &RegistrationRecord, b: &RegistrationRecord) -> std::cmp::Ordering {
    a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
}

/// Canonical team ordering shared by every store implementation.
pub fn team_order(a: &TeamRecord, b: &TeamRecord) -> std::cmp::Ordering {
    a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id))
}

// ---------------------------------------------------------------------------
// Write payloads
// ---------------------------------------------------------------------------

/// Desired team for one registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamAssignment {
    pub registration_id: RegistrationId,
    pub team_id: Option<TeamId>,
}

/// Full desired state of an existing registration after an admin edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationUpdate {
    pub id: RegistrationId,
    pub race_id: RaceId,
    pub car_class_id: CarClassId,
    pub team_id: Option<TeamId>,
}

/// Everything one admin save produces; applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationBatch {
    #[serde(default)]
    pub inserts: Vec<RegistrationRecord>,
    #[serde(default)]
    pub updates: Vec<RegistrationUpdate>,
    #[serde(default)]
    pub deletes: Vec<RegistrationId>,
}

impl RegistrationBatch {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }
}

/// Row counts written by a committed batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

// ---------------------------------------------------------------------------
// LeagueStore
// ---------------------------------------------------------------------------

/// Data-access context for league state.
///
/// Implementations must honour the ordering guarantees in the module docs and
/// must apply every multi-record write atomically.
#[async_trait]
pub trait LeagueStore: Send + Sync {
    /// Fetch a race. Returns `StorageError::NotFound` if absent.
    async fn get_race(&self, race_id: &RaceId) -> StorageResult<RaceRecord>;

    /// Create or replace a race record.
    async fn save_race(&self, race: RaceRecord) -> StorageResult<()>;

    /// Every race, ordered by start time.
    async fn list_races(&self) -> StorageResult<Vec<RaceRecord>>;

    /// All races of an event, ordered by start time.
    async fn list_event_races(&self, event_id: &EventId) -> StorageResult<Vec<RaceRecord>>;

    /// All registrations of a race in signup order.
    async fn list_registrations(&self, race_id: &RaceId) -> StorageResult<Vec<RegistrationRecord>>;

    /// Every team in the league, in name order.
    async fn list_teams(&self) -> StorageResult<Vec<TeamRecord>>;

    /// Create or rename a team.
    async fn save_team(&self, team: TeamRecord) -> StorageResult<()>;

    /// Every car class, in name order.
    async fn list_car_classes(&self) -> StorageResult<Vec<CarClassRecord>>;

    /// Create or rename a car class.
    async fn save_car_class(&self, class: CarClassRecord) -> StorageResult<()>;

    /// Write team assignments for registrations of `race_id`.
    ///
    /// Only registrations whose stored team differs are written; the count of
    /// rows actually changed is returned. Fails without writing anything when
    /// any registration is unknown or belongs to another race.
    async fn apply_team_assignments(
        &self,
        race_id: &RaceId,
        assignments: &[TeamAssignment],
    ) -> StorageResult<usize>;

    /// Apply inserts, updates and deletes as one transaction.
    async fn apply_registration_batch(&self, batch: RegistrationBatch)
        -> StorageResult<BatchOutcome>;

    /// Set the race's `teams_assigned` flag.
    async fn set_teams_assigned(&self, race_id: &RaceId, assigned: bool) -> StorageResult<()>;

    /// Replace the race's stored snapshot wholesale.
    async fn save_snapshot(&self, race_id: &RaceId, snapshot: &Snapshot) -> StorageResult<()>;

    /// Replace the race's team -> thread map.
    async fn save_thread_map(
        &self,
        race_id: &RaceId,
        thread_map: &BTreeMap<TeamId, ThreadHandle>,
    ) -> StorageResult<()>;

    /// Bind a thread to every race of an event. Returns the number of races updated.
    async fn set_event_thread(&self, event_id: &EventId, thread: &ThreadHandle)
        -> StorageResult<usize>;

    /// Swap `old` for `new` on every race that references `old`, either as its
    /// event thread or inside its thread map, in a single update. Returns the
    /// number of races touched.
    async fn replace_thread_handle(
        &self,
        old: &ThreadHandle,
        new: &ThreadHandle,
    ) -> StorageResult<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn ids_serialize_transparently() {
        let id = TeamId::new("team-a");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"team-a\"");
        let back: TeamId = serde_json::from_str("\"team-a\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(RegistrationId::generate(), RegistrationId::generate());
    }

    #[test]
    fn manual_driver_has_no_user_id() {
        let manual = Driver::manual("entry-1", "Guest Driver");
        assert!(manual.user_id().is_none());
        let user = Driver::user("u-1", "Account Driver");
        assert_eq!(user.user_id(), Some(&UserId::new("u-1")));
    }

    #[test]
    fn strategy_defaults_to_round_robin() {
        assert_eq!(AssignmentStrategy::default(), AssignmentStrategy::RoundRobin);
        let parsed: AssignmentStrategy = serde_json::from_str("\"balanced_rating\"").unwrap();
        assert_eq!(parsed, AssignmentStrategy::BalancedRating);
    }

    #[test]
    fn signup_order_breaks_timestamp_ties_by_id() {
        let race = RaceId::new("r1");
        let class = CarClassId::new("gt3");
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap();
        let a = RegistrationRecord::new("b", &race, Driver::manual("1", "B"), &class, at);
        let b = RegistrationRecord::new("a", &race, Driver::manual("2", "A"), &class, at);
        assert_eq!(signup_order(&a, &b), std::cmp::Ordering::Greater);
    }

    #[test]
    fn race_record_tolerates_missing_reconciliation_fields() {
        let json = serde_json::json!({
            "id": "r1",
            "event_id": "e1",
            "starts_at": "2026-03-01T18:00:00Z",
            "duration_minutes": 90,
            "max_drivers_per_team": null
        });
        let race: RaceRecord = serde_json::from_value(json).unwrap();
        assert!(race.snapshot.is_none());
        assert!(race.thread_map.is_empty());
        assert_eq!(race.strategy, AssignmentStrategy::RoundRobin);
    }
}
