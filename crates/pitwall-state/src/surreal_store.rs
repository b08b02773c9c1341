//! SurrealDB-backed LeagueStore implementation
//!
//! Uses the `schema` row types for persistence, converting to/from
//! `storage_traits` records at the boundary. Records are keyed by their
//! domain id (`type::thing(table, id)`), and every multi-record write is sent
//! as one `BEGIN TRANSACTION ... COMMIT TRANSACTION` query.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

use crate::error::StorageError;
use crate::handle::{self, ConnectTarget};
use crate::schema::{CarClassRow, RaceRow, RegistrationRow, TeamRow};
use crate::snapshot::{Snapshot, StoredSnapshot};
use crate::storage_traits::*;

/// SurrealDB-backed implementation of [`LeagueStore`].
#[derive(Clone)]
pub struct SurrealLeagueStore {
    db: Surreal<Any>,
}

fn backend(err: surrealdb::Error) -> StorageError {
    StorageError::Backend(err.to_string())
}

impl SurrealLeagueStore {
    /// Wrap an already-connected client (schema must be initialized).
    pub fn new(db: Surreal<Any>) -> Self {
        Self { db }
    }

    /// Create an in-memory instance for testing.
    pub async fn in_memory() -> crate::Result<Self> {
        let db = handle::connect_in_memory().await?;
        info!("SurrealLeagueStore connected (in-memory)");
        Ok(Self { db })
    }

    /// Connect to an explicit target.
    pub async fn connect(target: &ConnectTarget) -> crate::Result<Self> {
        let db = target.connect().await?;
        info!(db = %target.describe(), "SurrealLeagueStore connected");
        Ok(Self { db })
    }

    /// Create from environment variables (see [`ConnectTarget::from_env`]).
    pub async fn from_env() -> crate::Result<Self> {
        Self::connect(&ConnectTarget::from_env()).await
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_race_row(&self, race_id: &RaceId) -> StorageResult<RaceRow> {
        let mut res = self
            .db
            .query("SELECT * FROM races WHERE race_id = $rid")
            .bind(("rid", race_id.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<RaceRow> = res.take(0).map_err(backend)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| StorageError::not_found("race", race_id))
    }

    async fn fetch_registrations_by_id(
        &self,
        ids: Vec<String>,
    ) -> StorageResult<HashMap<String, RegistrationRow>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut res = self
            .db
            .query("SELECT * FROM registrations WHERE registration_id IN $ids")
            .bind(("ids", ids))
            .await
            .map_err(backend)?;

        let rows: Vec<RegistrationRow> = res.take(0).map_err(backend)?;
        Ok(rows
            .into_iter()
            .map(|row| (row.registration_id.clone(), row))
            .collect())
    }

    async fn update_race_field<T>(&self, race_id: &RaceId, field: &str, value: T) -> StorageResult<()>
    where
        T: serde::Serialize + 'static,
    {
        let sql = format!("UPDATE races SET {field} = $value WHERE race_id = $rid");
        let mut res = self
            .db
            .query(sql)
            .bind(("value", value))
            .bind(("rid", race_id.0.clone()))
            .await
            .map_err(backend)?;

        let updated: Vec<RaceRow> = res.take(0).map_err(backend)?;
        if updated.is_empty() {
            return Err(StorageError::not_found("race", race_id));
        }
        Ok(())
    }
}

#[async_trait]
impl LeagueStore for SurrealLeagueStore {
    #[instrument(skip(self), fields(race_id = %race_id))]
    async fn get_race(&self, race_id: &RaceId) -> StorageResult<RaceRecord> {
        Ok(self.fetch_race_row(race_id).await?.into())
    }

    #[instrument(skip(self, race), fields(race_id = %race.id))]
    async fn save_race(&self, race: RaceRecord) -> StorageResult<()> {
        debug!("saving race");
        let rid = race.id.0.clone();
        self.db
            .query("UPSERT type::thing('races', $rid) CONTENT $row")
            .bind(("rid", rid))
            .bind(("row", RaceRow::from(race)))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_races(&self) -> StorageResult<Vec<RaceRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM races ORDER BY starts_at ASC, race_id ASC")
            .await
            .map_err(backend)?;

        let rows: Vec<RaceRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(RaceRecord::from).collect())
    }

    #[instrument(skip(self), fields(event_id = %event_id))]
    async fn list_event_races(&self, event_id: &EventId) -> StorageResult<Vec<RaceRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM races WHERE event_id = $eid ORDER BY starts_at ASC, race_id ASC")
            .bind(("eid", event_id.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<RaceRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(RaceRecord::from).collect())
    }

    #[instrument(skip(self), fields(race_id = %race_id))]
    async fn list_registrations(
        &self,
        race_id: &RaceId,
    ) -> StorageResult<Vec<RegistrationRecord>> {
        let mut res = self
            .db
            .query(
                "SELECT * FROM registrations WHERE race_id = $rid \
                 ORDER BY created_at ASC, registration_id ASC",
            )
            .bind(("rid", race_id.0.clone()))
            .await
            .map_err(backend)?;

        let rows: Vec<RegistrationRow> = res.take(0).map_err(backend)?;
        let mut regs: Vec<RegistrationRecord> =
            rows.into_iter().map(RegistrationRecord::from).collect();
        // Re-sort in process so ordering never depends on collation details.
        regs.sort_by(signup_order);
        Ok(regs)
    }

    #[instrument(skip(self))]
    async fn list_teams(&self) -> StorageResult<Vec<TeamRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM teams ORDER BY name ASC, team_id ASC")
            .await
            .map_err(backend)?;

        let rows: Vec<TeamRow> = res.take(0).map_err(backend)?;
        let mut teams: Vec<TeamRecord> = rows.into_iter().map(TeamRecord::from).collect();
        teams.sort_by(team_order);
        Ok(teams)
    }

    #[instrument(skip(self, team), fields(team_id = %team.id))]
    async fn save_team(&self, team: TeamRecord) -> StorageResult<()> {
        let row = TeamRow {
            team_id: team.id.0.clone(),
            name: team.name,
        };
        self.db
            .query("UPSERT type::thing('teams', $tid) CONTENT $row")
            .bind(("tid", team.id.0))
            .bind(("row", row))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_car_classes(&self) -> StorageResult<Vec<CarClassRecord>> {
        let mut res = self
            .db
            .query("SELECT * FROM car_classes ORDER BY name ASC, class_id ASC")
            .await
            .map_err(backend)?;

        let rows: Vec<CarClassRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(CarClassRecord::from).collect())
    }

    #[instrument(skip(self, class), fields(class_id = %class.id))]
    async fn save_car_class(&self, class: CarClassRecord) -> StorageResult<()> {
        let row = CarClassRow {
            class_id: class.id.0.clone(),
            name: class.name,
        };
        self.db
            .query("UPSERT type::thing('car_classes', $cid) CONTENT $row")
            .bind(("cid", class.id.0))
            .bind(("row", row))
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;
        Ok(())
    }

    #[instrument(skip(self, assignments), fields(race_id = %race_id, requested = assignments.len()))]
    async fn apply_team_assignments(
        &self,
        race_id: &RaceId,
        assignments: &[TeamAssignment],
    ) -> StorageResult<usize> {
        let ids: Vec<String> = assignments
            .iter()
            .map(|a| a.registration_id.0.clone())
            .collect();
        let existing = self.fetch_registrations_by_id(ids).await?;

        let mut changes: Vec<(String, Option<String>)> = Vec::new();
        for assignment in assignments {
            let row = existing
                .get(assignment.registration_id.as_str())
                .ok_or_else(|| StorageError::not_found("registration", &assignment.registration_id))?;
            if row.race_id != race_id.0 {
                return Err(StorageError::InvalidRecord {
                    kind: "registration",
                    id: row.registration_id.clone(),
                    reason: format!("belongs to race {}, not {}", row.race_id, race_id),
                });
            }
            let desired = assignment.team_id.as_ref().map(|t| t.0.clone());
            if row.team_id != desired {
                changes.push((row.registration_id.clone(), desired));
            }
        }

        if changes.is_empty() {
            debug!("no assignment changes to write");
            return Ok(0);
        }

        let mut query = self.db.query("BEGIN TRANSACTION");
        for (i, (reg_id, team_id)) in changes.iter().enumerate() {
            query = query
                .query(format!(
                    "UPDATE type::thing('registrations', $reg{i}) SET team_id = $team{i}"
                ))
                .bind((format!("reg{i}"), reg_id.clone()))
                .bind((format!("team{i}"), team_id.clone()));
        }
        query
            .query("COMMIT TRANSACTION")
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;

        debug!(written = changes.len(), "assignment changes committed");
        Ok(changes.len())
    }

    #[instrument(skip(self, batch), fields(
        inserts = batch.inserts.len(),
        updates = batch.updates.len(),
        deletes = batch.deletes.len()
    ))]
    async fn apply_registration_batch(
        &self,
        batch: RegistrationBatch,
    ) -> StorageResult<BatchOutcome> {
        let referenced: Vec<String> = batch
            .inserts
            .iter()
            .map(|r| r.id.0.clone())
            .chain(batch.updates.iter().map(|u| u.id.0.clone()))
            .chain(batch.deletes.iter().map(|d| d.0.clone()))
            .collect();
        let existing = self.fetch_registrations_by_id(referenced).await?;

        for insert in &batch.inserts {
            if existing.contains_key(insert.id.as_str()) {
                return Err(StorageError::InvalidRecord {
                    kind: "registration",
                    id: insert.id.to_string(),
                    reason: "already exists".to_string(),
                });
            }
        }
        for update in &batch.updates {
            if !existing.contains_key(update.id.as_str()) {
                return Err(StorageError::not_found("registration", &update.id));
            }
        }
        for id in &batch.deletes {
            if !existing.contains_key(id.as_str()) {
                return Err(StorageError::not_found("registration", id));
            }
        }

        let outcome = BatchOutcome {
            inserted: batch.inserts.len(),
            updated: batch.updates.len(),
            deleted: batch.deletes.len(),
        };
        if batch.is_empty() {
            return Ok(outcome);
        }

        let mut query = self.db.query("BEGIN TRANSACTION");
        for (i, insert) in batch.inserts.into_iter().enumerate() {
            query = query
                .query(format!(
                    "CREATE type::thing('registrations', $ins_id{i}) CONTENT $ins{i}"
                ))
                .bind((format!("ins_id{i}"), insert.id.0.clone()))
                .bind((format!("ins{i}"), RegistrationRow::from(insert)));
        }
        for (i, update) in batch.updates.into_iter().enumerate() {
            query = query
                .query(format!(
                    "UPDATE type::thing('registrations', $upd_id{i}) \
                     SET race_id = $upd_race{i}, car_class_id = $upd_class{i}, team_id = $upd_team{i}"
                ))
                .bind((format!("upd_id{i}"), update.id.0))
                .bind((format!("upd_race{i}"), update.race_id.0))
                .bind((format!("upd_class{i}"), update.car_class_id.0))
                .bind((format!("upd_team{i}"), update.team_id.map(|t| t.0)));
        }
        for (i, id) in batch.deletes.into_iter().enumerate() {
            query = query
                .query(format!("DELETE type::thing('registrations', $del_id{i})"))
                .bind((format!("del_id{i}"), id.0));
        }
        query
            .query("COMMIT TRANSACTION")
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;

        info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            deleted = outcome.deleted,
            "registration batch committed"
        );
        Ok(outcome)
    }

    async fn set_teams_assigned(&self, race_id: &RaceId, assigned: bool) -> StorageResult<()> {
        self.update_race_field(race_id, "teams_assigned", assigned)
            .await
    }

    #[instrument(skip(self, snapshot), fields(race_id = %race_id, entries = snapshot.len()))]
    async fn save_snapshot(&self, race_id: &RaceId, snapshot: &Snapshot) -> StorageResult<()> {
        let stored: StoredSnapshot = snapshot.to_stored();
        self.update_race_field(race_id, "snapshot", stored).await
    }

    #[instrument(skip(self, thread_map), fields(race_id = %race_id))]
    async fn save_thread_map(
        &self,
        race_id: &RaceId,
        thread_map: &BTreeMap<TeamId, ThreadHandle>,
    ) -> StorageResult<()> {
        let map: BTreeMap<String, String> = thread_map
            .iter()
            .map(|(team, thread)| (team.0.clone(), thread.0.clone()))
            .collect();
        self.update_race_field(race_id, "thread_map", map).await
    }

    #[instrument(skip(self), fields(event_id = %event_id, thread = %thread))]
    async fn set_event_thread(
        &self,
        event_id: &EventId,
        thread: &ThreadHandle,
    ) -> StorageResult<usize> {
        let mut res = self
            .db
            .query("UPDATE races SET event_thread = $thread WHERE event_id = $eid")
            .bind(("thread", thread.0.clone()))
            .bind(("eid", event_id.0.clone()))
            .await
            .map_err(backend)?;

        let updated: Vec<RaceRow> = res.take(0).map_err(backend)?;
        Ok(updated.len())
    }

    #[instrument(skip(self), fields(old = %old, new = %new))]
    async fn replace_thread_handle(
        &self,
        old: &ThreadHandle,
        new: &ThreadHandle,
    ) -> StorageResult<usize> {
        let mut res = self
            .db
            .query("SELECT * FROM races")
            .await
            .map_err(backend)?;
        let rows: Vec<RaceRow> = res.take(0).map_err(backend)?;

        let mut affected: Vec<RaceRow> = Vec::new();
        for mut row in rows {
            let mut hit = false;
            if row.event_thread.as_deref() == Some(old.as_str()) {
                row.event_thread = Some(new.0.clone());
                hit = true;
            }
            for handle in row.thread_map.values_mut() {
                if handle.as_str() == old.as_str() {
                    *handle = new.0.clone();
                    hit = true;
                }
            }
            if hit {
                affected.push(row);
            }
        }

        if affected.is_empty() {
            return Ok(0);
        }

        let touched = affected.len();
        let mut query = self.db.query("BEGIN TRANSACTION");
        for (i, row) in affected.into_iter().enumerate() {
            query = query
                .query(format!(
                    "UPDATE races SET event_thread = $et{i}, thread_map = $tm{i} WHERE race_id = $rid{i}"
                ))
                .bind((format!("et{i}"), row.event_thread))
                .bind((format!("tm{i}"), row.thread_map))
                .bind((format!("rid{i}"), row.race_id));
        }
        query
            .query("COMMIT TRANSACTION")
            .await
            .map_err(backend)?
            .check()
            .map_err(backend)?;

        info!(touched, "thread handle replaced across races");
        Ok(touched)
    }
}
