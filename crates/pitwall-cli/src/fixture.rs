//! League fixtures: seed a store from a TOML file.
//!
//! ```toml
//! [[car_classes]]
//! id = "gt3"
//! name = "GT3"
//!
//! [[teams]]
//! id = "team-a"
//! name = "Apex"
//!
//! [[races]]
//! id = "race-1"
//! event_id = "spa-24"
//! starts_at = "2026-07-25T14:00:00Z"
//! duration_minutes = 360
//! strategy = "balanced_rating"
//!
//! [[registrations]]
//! id = "reg-1"
//! race_id = "race-1"
//! car_class_id = "gt3"
//! driver = "Alice"
//! user_id = "1001"
//! created_at = "2026-07-01T09:00:00Z"
//! ratings = { sports_car = 2450.0 }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pitwall_state::{
    AssignmentStrategy, CarClassId, CarClassRecord, Driver, LeagueStore, RaceId, RaceRecord,
    RegistrationBatch, RegistrationId, RegistrationRecord, StorageError, TeamId, TeamRecord,
};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct RaceFixture {
    pub id: String,
    pub event_id: String,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: Option<u32>,
    pub max_drivers_per_team: Option<u32>,
    #[serde(default)]
    pub strategy: AssignmentStrategy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationFixture {
    pub id: String,
    pub race_id: String,
    pub car_class_id: String,
    pub team_id: Option<String>,
    /// Display name
    pub driver: String,
    /// Portal account; omitted for manual entries
    pub user_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub ratings: BTreeMap<String, f64>,
}

impl RegistrationFixture {
    fn to_record(&self) -> RegistrationRecord {
        let driver = match &self.user_id {
            Some(user_id) => Driver::user(user_id.as_str(), self.driver.as_str()),
            None => Driver::manual(self.id.as_str(), self.driver.as_str()),
        };
        let driver = self
            .ratings
            .iter()
            .fold(driver, |d, (category, value)| d.with_rating(category.as_str(), *value));
        let record = RegistrationRecord::new(
            self.id.as_str(),
            &RaceId::from(self.race_id.as_str()),
            driver,
            &CarClassId::from(self.car_class_id.as_str()),
            self.created_at,
        );
        match &self.team_id {
            Some(team) => record.with_team(&TeamId::from(team.as_str())),
            None => record,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LeagueFixture {
    pub car_classes: Vec<CarClassRecord>,
    pub teams: Vec<TeamRecord>,
    pub races: Vec<RaceFixture>,
    pub registrations: Vec<RegistrationFixture>,
}

/// What a seed run wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub car_classes: usize,
    pub teams: usize,
    pub races: usize,
    pub registrations: usize,
    /// Registrations already present and left untouched
    pub skipped: usize,
}

impl LeagueFixture {
    pub fn parse(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Invalid league fixture")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("In {}", path.display()))
    }

    /// Write the fixture into `store`.
    ///
    /// Safe to rerun: existing races keep their notification state and
    /// registrations that already exist are skipped.
    pub async fn apply(&self, store: &dyn LeagueStore) -> Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        for class in &self.car_classes {
            store.save_car_class(class.clone()).await?;
            summary.car_classes += 1;
        }
        for team in &self.teams {
            store.save_team(team.clone()).await?;
            summary.teams += 1;
        }

        for fixture in &self.races {
            let mut race = RaceRecord::new(
                fixture.id.as_str(),
                fixture.event_id.as_str(),
                fixture.starts_at,
            );
            race.duration_minutes = fixture.duration_minutes;
            race.max_drivers_per_team = fixture.max_drivers_per_team;
            race.strategy = fixture.strategy;

            match store.get_race(&race.id).await {
                Ok(existing) => {
                    race.teams_assigned = existing.teams_assigned;
                    race.snapshot = existing.snapshot;
                    race.thread_map = existing.thread_map;
                    race.event_thread = existing.event_thread;
                }
                Err(StorageError::NotFound { .. }) => {}
                Err(e) => return Err(e.into()),
            }
            store.save_race(race).await?;
            summary.races += 1;
        }

        let mut existing: HashSet<RegistrationId> = HashSet::new();
        let race_ids: HashSet<&str> = self.registrations.iter().map(|r| r.race_id.as_str()).collect();
        for race_id in race_ids {
            for reg in store.list_registrations(&RaceId::from(race_id)).await? {
                existing.insert(reg.id);
            }
        }

        let inserts: Vec<RegistrationRecord> = self
            .registrations
            .iter()
            .map(RegistrationFixture::to_record)
            .filter(|r| !existing.contains(&r.id))
            .collect();
        summary.skipped = self.registrations.len() - inserts.len();
        if !inserts.is_empty() {
            let outcome = store
                .apply_registration_batch(RegistrationBatch {
                    inserts,
                    ..Default::default()
                })
                .await?;
            summary.registrations = outcome.inserted;
        }

        info!(
            races = summary.races,
            teams = summary.teams,
            registrations = summary.registrations,
            skipped = summary.skipped,
            "Fixture applied"
        );
        Ok(summary)
    }
}
