//! In-memory fake for `LeagueStore` (testing only)
//!
//! `MemoryLeagueStore` satisfies the trait contract without any external
//! dependencies. Every write validates the whole payload before mutating, so
//! batches are all-or-nothing exactly like the database-backed store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::snapshot::Snapshot;
use crate::storage_traits::*;

#[derive(Debug, Default)]
struct LeagueData {
    races: HashMap<RaceId, RaceRecord>,
    registrations: HashMap<RegistrationId, RegistrationRecord>,
    teams: HashMap<TeamId, TeamRecord>,
    car_classes: HashMap<CarClassId, CarClassRecord>,
}

/// In-memory league store backed by `HashMap`s behind one `Mutex`.
#[derive(Debug, Default)]
pub struct MemoryLeagueStore {
    data: Mutex<LeagueData>,
    writes: Mutex<usize>,
}

impl MemoryLeagueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed registrations directly, bypassing batch validation.
    pub fn insert_registrations(&self, registrations: impl IntoIterator<Item = RegistrationRecord>) {
        let mut data = self.data.lock().unwrap();
        for reg in registrations {
            data.registrations.insert(reg.id.clone(), reg);
        }
    }

    /// Number of registration rows written through the trait so far.
    pub fn registration_writes(&self) -> usize {
        *self.writes.lock().unwrap()
    }

    fn record_writes(&self, count: usize) {
        *self.writes.lock().unwrap() += count;
    }
}

#[async_trait]
impl LeagueStore for MemoryLeagueStore {
    async fn get_race(&self, race_id: &RaceId) -> StorageResult<RaceRecord> {
        let data = self.data.lock().unwrap();
        data.races
            .get(race_id)
            .cloned()
            .ok_or_else(|| StorageError::not_found("race", race_id))
    }

    async fn save_race(&self, race: RaceRecord) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap();
        data.races.insert(race.id.clone(), race);
        Ok(())
    }

    async fn list_races(&self) -> StorageResult<Vec<RaceRecord>> {
        let data = self.data.lock().unwrap();
        let mut races: Vec<RaceRecord> = data.races.values().cloned().collect();
        races.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.id.cmp(&b.id)));
        Ok(races)
    }

    async fn list_event_races(&self, event_id: &EventId) -> StorageResult<Vec<RaceRecord>> {
        let data = self.data.lock().unwrap();
        let mut races: Vec<RaceRecord> = data
            .races
            .values()
            .filter(|r| &r.event_id == event_id)
            .cloned()
            .collect();
        races.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.id.cmp(&b.id)));
        Ok(races)
    }

    async fn list_registrations(
        &self,
        race_id: &RaceId,
    ) -> StorageResult<Vec<RegistrationRecord>> {
        let data = self.data.lock().unwrap();
        let mut regs: Vec<RegistrationRecord> = data
            .registrations
            .values()
            .filter(|r| &r.race_id == race_id)
            .cloned()
            .collect();
        regs.sort_by(signup_order);
        Ok(regs)
    }

    async fn list_teams(&self) -> StorageResult<Vec<TeamRecord>> {
        let data = self.data.lock().unwrap();
        let mut teams: Vec<TeamRecord> = data.teams.values().cloned().collect();
        teams.sort_by(team_order);
        Ok(teams)
    }

    async fn save_team(&self, team: TeamRecord) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap();
        data.teams.insert(team.id.clone(), team);
        Ok(())
    }

    async fn list_car_classes(&self) -> StorageResult<Vec<CarClassRecord>> {
        let data = self.data.lock().unwrap();
        let mut classes: Vec<CarClassRecord> = data.car_classes.values().cloned().collect();
        classes.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(classes)
    }

    async fn save_car_class(&self, class: CarClassRecord) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap();
        data.car_classes.insert(class.id.clone(), class);
        Ok(())
    }

    async fn apply_team_assignments(
        &self,
        race_id: &RaceId,
        assignments: &[TeamAssignment],
    ) -> StorageResult<usize> {
        let mut data = self.data.lock().unwrap();

        for assignment in assignments {
            let reg = data
                .registrations
                .get(&assignment.registration_id)
                .ok_or_else(|| StorageError::not_found("registration", &assignment.registration_id))?;
            if &reg.race_id != race_id {
                return Err(StorageError::InvalidRecord {
                    kind: "registration",
                    id: reg.id.to_string(),
                    reason: format!("belongs to race {}, not {}", reg.race_id, race_id),
                });
            }
        }

        let mut changed = 0;
        for assignment in assignments {
            if let Some(reg) = data.registrations.get_mut(&assignment.registration_id) {
                if reg.team_id != assignment.team_id {
                    reg.team_id = assignment.team_id.clone();
                    changed += 1;
                }
            }
        }
        drop(data);
        self.record_writes(changed);
        Ok(changed)
    }

    async fn apply_registration_batch(
        &self,
        batch: RegistrationBatch,
    ) -> StorageResult<BatchOutcome> {
        let mut data = self.data.lock().unwrap();

        for insert in &batch.inserts {
            if data.registrations.contains_key(&insert.id) {
                return Err(StorageError::InvalidRecord {
                    kind: "registration",
                    id: insert.id.to_string(),
                    reason: "already exists".to_string(),
                });
            }
        }
        for update in &batch.updates {
            if !data.registrations.contains_key(&update.id) {
                return Err(StorageError::not_found("registration", &update.id));
            }
        }
        for id in &batch.deletes {
            if !data.registrations.contains_key(id) {
                return Err(StorageError::not_found("registration", id));
            }
        }

        let outcome = BatchOutcome {
            inserted: batch.inserts.len(),
            updated: batch.updates.len(),
            deleted: batch.deletes.len(),
        };
        for insert in batch.inserts {
            data.registrations.insert(insert.id.clone(), insert);
        }
        for update in batch.updates {
            if let Some(reg) = data.registrations.get_mut(&update.id) {
                reg.race_id = update.race_id;
                reg.car_class_id = update.car_class_id;
                reg.team_id = update.team_id;
            }
        }
        for id in &batch.deletes {
            data.registrations.remove(id);
        }
        drop(data);
        self.record_writes(outcome.inserted + outcome.updated + outcome.deleted);
        Ok(outcome)
    }

    async fn set_teams_assigned(&self, race_id: &RaceId, assigned: bool) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap();
        let race = data
            .races
            .get_mut(race_id)
            .ok_or_else(|| StorageError::not_found("race", race_id))?;
        race.teams_assigned = assigned;
        Ok(())
    }

    async fn save_snapshot(&self, race_id: &RaceId, snapshot: &Snapshot) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap();
        let race = data
            .races
            .get_mut(race_id)
            .ok_or_else(|| StorageError::not_found("race", race_id))?;
        race.snapshot = Some(snapshot.to_stored());
        Ok(())
    }

    async fn save_thread_map(
        &self,
        race_id: &RaceId,
        thread_map: &BTreeMap<TeamId, ThreadHandle>,
    ) -> StorageResult<()> {
        let mut data = self.data.lock().unwrap();
        let race = data
            .races
            .get_mut(race_id)
            .ok_or_else(|| StorageError::not_found("race", race_id))?;
        race.thread_map = thread_map.clone();
        Ok(())
    }

    async fn set_event_thread(
        &self,
        event_id: &EventId,
        thread: &ThreadHandle,
    ) -> StorageResult<usize> {
        let mut data = self.data.lock().unwrap();
        let mut touched = 0;
        for race in data.races.values_mut().filter(|r| &r.event_id == event_id) {
            race.event_thread = Some(thread.clone());
            touched += 1;
        }
        Ok(touched)
    }

    async fn replace_thread_handle(
        &self,
        old: &ThreadHandle,
        new: &ThreadHandle,
    ) -> StorageResult<usize> {
        let mut data = self.data.lock().unwrap();
        let mut touched = 0;
        for race in data.races.values_mut() {
            let mut hit = false;
            if race.event_thread.as_ref() == Some(old) {
                race.event_thread = Some(new.clone());
                hit = true;
            }
            for handle in race.thread_map.values_mut() {
                if handle == old {
                    *handle = new.clone();
                    hit = true;
                }
            }
            if hit {
                touched += 1;
            }
        }
        Ok(touched)
    }
}
