//! Race coordinator: the pipelines an admin action or a scheduled tick runs.
//!
//! ```text
//! rebalance_race      pool -> strategy (-> optimizer) -> minimal writes
//! apply_admin_changes validate -> guard thread-bound teams -> atomic batch
//! rename_team         validate -> guard thread-bound teams -> save
//! notify_race         load -> diff -> summarize -> threads -> snapshot
//! ```
//!
//! Collaborators are injected; nothing here holds global state.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use futures::future::try_join_all;
use pitwall_chat::{ChatService, OutgoingMessage};
use pitwall_state::{
    BatchOutcome, CarClassId, CarClassRecord, LeagueStore, RaceId, RaceRecord, RegistrationBatch,
    RegistrationId, RegistrationRecord, Snapshot, SnapshotEntry, TeamAssignment, TeamId,
    TeamRecord, ThreadHandle, UserId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::allocation::{allocate_team_pool, distribute, minimal_writes, BalanceStats, PoolRequest};
use crate::diff::{diff_snapshots, join_names, summarize, ChangeDetail, ChangeSummary, TeamNames};
use crate::domain::{effective_capacity, LeagueError, Result};
use crate::metrics::METRICS;
use crate::obs::{self, RaceSpan};
use crate::reconcile::{StatusOutcome, ThreadOutcome, ThreadReconciler};

/// Who is asking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub is_admin: bool,
}

impl Actor {
    pub fn admin(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: UserId::new(user_id),
            is_admin: true,
        }
    }

    pub fn member(user_id: impl Into<String>) -> Self {
        Actor {
            user_id: UserId::new(user_id),
            is_admin: false,
        }
    }
}

/// Coordinator settings (the `[league]` table of `pitwall.toml`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Rating category preferred by the balancer
    pub primary_rating_category: Option<String>,
    /// Chat channel under which event and team threads are created
    pub parent_channel_id: String,
    /// Type marker prefix for status messages
    pub status_marker: String,
    /// How many recent messages to search for a prior status
    pub message_window: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            primary_rating_category: Some("sports_car".to_string()),
            parent_channel_id: "race-control".to_string(),
            status_marker: "roster-status".to_string(),
            message_window: 50,
        }
    }
}

/// Allocation result for one car class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassAllocation {
    pub car_class_id: CarClassId,
    pub drivers: usize,
    pub teams: Vec<TeamId>,
    pub balance: Option<BalanceStats>,
}

/// Outcome of [`RaceCoordinator::rebalance_race`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceReport {
    pub race_id: RaceId,
    pub capacity: Option<usize>,
    pub classes: Vec<ClassAllocation>,
    /// Assignments that differed from stored state
    pub planned: usize,
    /// Rows the store actually changed
    pub written: usize,
}

/// Diff between the last notified snapshot and current state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RacePreview {
    pub race_id: RaceId,
    pub changes: Vec<ChangeDetail>,
    pub summary: ChangeSummary,
    #[serde(skip)]
    pub pending: Snapshot,
}

/// A chat step that failed during notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationFailure {
    pub stage: String,
    pub error: String,
}

/// Outcome of [`RaceCoordinator::notify_race`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationReport {
    pub race_id: RaceId,
    pub changes: Vec<ChangeDetail>,
    pub event_thread: Option<ThreadHandle>,
    pub status: Option<StatusOutcome>,
    pub threads_created: BTreeMap<TeamId, ThreadHandle>,
    /// Team threads that had vanished and were recreated
    pub threads_replaced: BTreeMap<TeamId, ThreadHandle>,
    pub failures: Vec<NotificationFailure>,
    pub snapshot_saved: bool,
    pub fingerprint: Option<String>,
}

impl NotificationReport {
    fn new(race_id: &RaceId) -> Self {
        NotificationReport {
            race_id: race_id.clone(),
            changes: Vec::new(),
            event_thread: None,
            status: None,
            threads_created: BTreeMap::new(),
            threads_replaced: BTreeMap::new(),
            failures: Vec::new(),
            snapshot_saved: false,
            fingerprint: None,
        }
    }

    /// True when nothing changed and nothing was sent
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
            && self.threads_created.is_empty()
            && self.threads_replaced.is_empty()
            && self.failures.is_empty()
    }

    fn record_failure(&mut self, stage: &str, error: &LeagueError) {
        obs::emit_notification_failed(self.race_id.as_str(), stage, error);
        METRICS.inc_notification_failures();
        self.failures.push(NotificationFailure {
            stage: stage.to_string(),
            error: error.to_string(),
        });
    }
}

/// Everything one pipeline run reads up front
struct RaceState {
    race: RaceRecord,
    registrations: Vec<RegistrationRecord>,
    teams: Vec<TeamRecord>,
    classes: Vec<CarClassRecord>,
}

impl RaceState {
    fn team_names(&self) -> TeamNames {
        self.teams
            .iter()
            .map(|t| (t.id.clone(), t.name.clone()))
            .collect()
    }

    fn pending_snapshot(&self) -> Snapshot {
        let names = self.team_names();
        let classes: HashMap<&CarClassId, &str> = self
            .classes
            .iter()
            .map(|c| (&c.id, c.name.as_str()))
            .collect();
        let entries = self
            .registrations
            .iter()
            .map(|reg| {
                let entry = SnapshotEntry {
                    team_id: reg.team_id.clone(),
                    team_name: reg.team_id.as_ref().and_then(|t| names.get(t).cloned()),
                    driver_name: reg.driver.name.clone(),
                    car_class_id: Some(reg.car_class_id.clone()),
                    car_class_name: classes.get(&reg.car_class_id).map(|n| n.to_string()),
                };
                (reg.id.clone(), entry)
            })
            .collect();
        Snapshot::new(entries)
    }

    /// Teams carrying drivers in this race, in name order
    fn participating_teams(&self) -> Vec<TeamId> {
        let used: BTreeSet<&TeamId> = self
            .registrations
            .iter()
            .filter_map(|r| r.team_id.as_ref())
            .collect();
        self.teams
            .iter()
            .filter(|t| used.contains(&t.id))
            .map(|t| t.id.clone())
            .collect()
    }

    fn race_label(&self) -> String {
        format!(
            "Race {} ({})",
            self.race.id,
            self.race.starts_at.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

fn validate_id(kind: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(LeagueError::validation(format!("{kind} id must not be empty")));
    }
    Ok(())
}

fn require_admin(actor: &Actor, action: &str) -> Result<()> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(LeagueError::Unauthorized(format!(
            "user {} may not {action}",
            actor.user_id
        )))
    }
}

fn validate_batch(race_id: &RaceId, batch: &RegistrationBatch) -> Result<()> {
    for reg in &batch.inserts {
        validate_id("registration", reg.id.as_str())?;
        validate_id("car class", reg.car_class_id.as_str())?;
        if &reg.race_id != race_id {
            return Err(LeagueError::validation(format!(
                "registration {} targets race {} inside a save for race {race_id}",
                reg.id, reg.race_id
            )));
        }
        if let Some(team) = &reg.team_id {
            validate_id("team", team.as_str())?;
        }
    }
    for update in &batch.updates {
        validate_id("registration", update.id.as_str())?;
        validate_id("race", update.race_id.as_str())?;
        validate_id("car class", update.car_class_id.as_str())?;
        if let Some(team) = &update.team_id {
            validate_id("team", team.as_str())?;
        }
    }
    for id in &batch.deletes {
        validate_id("registration", id.as_str())?;
    }
    Ok(())
}

/// Parse an admin save payload (`{inserts, updates, deletes}`).
pub fn parse_admin_batch(json: &str) -> Result<RegistrationBatch> {
    Ok(serde_json::from_str(json)?)
}

type ClassesByTeam = BTreeMap<(RaceId, TeamId), BTreeSet<CarClassId>>;

#[derive(Clone)]
struct Placement {
    race_id: RaceId,
    car_class_id: CarClassId,
    team_id: Option<TeamId>,
}

fn classes_by_team<'a>(placements: impl Iterator<Item = &'a Placement>) -> ClassesByTeam {
    let mut map = ClassesByTeam::new();
    for p in placements {
        if let Some(team) = &p.team_id {
            map.entry((p.race_id.clone(), team.clone()))
                .or_default()
                .insert(p.car_class_id.clone());
        }
    }
    map
}

/// Runs team formation and change notification for races.
pub struct RaceCoordinator {
    store: Arc<dyn LeagueStore>,
    chat: Arc<dyn ChatService>,
    config: CoordinatorConfig,
}

impl RaceCoordinator {
    pub fn new(
        store: Arc<dyn LeagueStore>,
        chat: Arc<dyn ChatService>,
        config: CoordinatorConfig,
    ) -> Self {
        RaceCoordinator {
            store,
            chat,
            config,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    async fn load_race_state(&self, race_id: &RaceId) -> Result<RaceState> {
        let (race, registrations, teams, classes) = futures::try_join!(
            self.store.get_race(race_id),
            self.store.list_registrations(race_id),
            self.store.list_teams(),
            self.store.list_car_classes(),
        )?;
        Ok(RaceState {
            race,
            registrations,
            teams,
            classes,
        })
    }

    /// Recompute team assignments for every class in a race.
    ///
    /// Classes run in order of their first signup. Each class sees the
    /// assignments already planned for earlier classes, so class isolation
    /// holds across the whole race. All changed rows are written in one
    /// transaction.
    pub async fn rebalance_race(&self, actor: &Actor, race_id: &RaceId) -> Result<RebalanceReport> {
        validate_id("race", race_id.as_str())?;
        require_admin(actor, "rebalance teams")?;
        let _span = RaceSpan::enter(race_id.as_str());

        let (race, registrations, teams) = futures::try_join!(
            self.store.get_race(race_id),
            self.store.list_registrations(race_id),
            self.store.list_teams(),
        )?;
        let capacity = effective_capacity(&race)?;
        let mut report = RebalanceReport {
            race_id: race_id.clone(),
            capacity,
            classes: Vec::new(),
            planned: 0,
            written: 0,
        };
        let Some(cap) = capacity else {
            debug!("Race has no capacity; skipping allocation");
            return Ok(report);
        };

        let mut class_order: Vec<CarClassId> = Vec::new();
        for reg in &registrations {
            if !class_order.contains(&reg.car_class_id) {
                class_order.push(reg.car_class_id.clone());
            }
        }

        let mut working = registrations.clone();
        let mut desired: Vec<TeamAssignment> = Vec::new();
        for class_id in &class_order {
            let pool = allocate_team_pool(
                &working,
                &teams,
                &PoolRequest {
                    car_class_id: class_id,
                    capacity: Some(cap),
                    excluded: None,
                },
            );
            let class_regs: Vec<&RegistrationRecord> = working
                .iter()
                .filter(|r| &r.car_class_id == class_id)
                .collect();
            obs::emit_allocation_computed(
                race_id.as_str(),
                class_id.as_str(),
                pool.len(),
                class_regs.len(),
            );
            if pool.is_empty() {
                continue;
            }

            let distribution = distribute(
                race.strategy,
                &class_regs,
                &pool,
                cap,
                self.config.primary_rating_category.as_deref(),
            );
            report.classes.push(ClassAllocation {
                car_class_id: class_id.clone(),
                drivers: class_regs.len(),
                teams: pool,
                balance: distribution.balance.as_ref().map(|b| b.stats()),
            });

            let planned: HashMap<&RegistrationId, &Option<TeamId>> = distribution
                .assignments
                .iter()
                .map(|a| (&a.registration_id, &a.team_id))
                .collect();
            for reg in working.iter_mut() {
                if let Some(team) = planned.get(&reg.id) {
                    reg.team_id = (*team).clone();
                }
            }
            desired.extend(distribution.assignments);
        }

        let writes = minimal_writes(&registrations, &desired);
        report.planned = writes.len();
        report.written = self.store.apply_team_assignments(race_id, &writes).await?;
        self.store.set_teams_assigned(race_id, true).await?;

        METRICS.add_assignments_written(report.written as u64);
        obs::emit_assignments_written(race_id.as_str(), report.planned, report.written);
        Ok(report)
    }

    /// Commit one admin save for a race.
    ///
    /// Rejected without side effects when the actor is not an admin, when a
    /// team would end up hosting two classes, or when a team with a bound
    /// thread would change class.
    pub async fn apply_admin_changes(
        &self,
        actor: &Actor,
        race_id: &RaceId,
        batch: RegistrationBatch,
    ) -> Result<BatchOutcome> {
        validate_id("race", race_id.as_str())?;
        validate_batch(race_id, &batch)?;
        require_admin(actor, "edit registrations")?;
        if batch.is_empty() {
            return Ok(BatchOutcome::default());
        }
        let _span = RaceSpan::enter(race_id.as_str());

        let mut affected: BTreeSet<RaceId> = BTreeSet::new();
        affected.insert(race_id.clone());
        affected.extend(batch.updates.iter().map(|u| u.race_id.clone()));

        let store = &self.store;
        let loaded = try_join_all(affected.iter().map(|id| async move {
            futures::try_join!(store.get_race(id), store.list_registrations(id))
        }))
        .await?;

        let mut placements: BTreeMap<RegistrationId, Placement> = BTreeMap::new();
        for (_, regs) in &loaded {
            for reg in regs {
                placements.insert(
                    reg.id.clone(),
                    Placement {
                        race_id: reg.race_id.clone(),
                        car_class_id: reg.car_class_id.clone(),
                        team_id: reg.team_id.clone(),
                    },
                );
            }
        }
        let before = classes_by_team(placements.values());

        for id in &batch.deletes {
            placements.remove(id);
        }
        for update in &batch.updates {
            placements.insert(
                update.id.clone(),
                Placement {
                    race_id: update.race_id.clone(),
                    car_class_id: update.car_class_id.clone(),
                    team_id: update.team_id.clone(),
                },
            );
        }
        for reg in &batch.inserts {
            placements.insert(
                reg.id.clone(),
                Placement {
                    race_id: reg.race_id.clone(),
                    car_class_id: reg.car_class_id.clone(),
                    team_id: reg.team_id.clone(),
                },
            );
        }
        let after = classes_by_team(placements.values());

        for (race, _) in &loaded {
            for team_id in race.thread_map.keys() {
                let key = (race.id.clone(), team_id.clone());
                match (before.get(&key), after.get(&key)) {
                    (Some(old), Some(new)) if old != new => {
                        return Err(LeagueError::conflict(
                            team_id,
                            format!(
                                "team has an active thread in race {}; its car class cannot change",
                                race.id
                            ),
                        ));
                    }
                    _ => {}
                }
            }
        }

        if let Some(((race, team), classes)) = after.iter().find(|(_, c)| c.len() > 1) {
            let classes: Vec<&str> = classes.iter().map(CarClassId::as_str).collect();
            return Err(LeagueError::validation(format!(
                "team {team} would host classes {} in race {race}",
                classes.join(", ")
            )));
        }

        let outcome = self.store.apply_registration_batch(batch).await?;
        info!(
            inserted = outcome.inserted,
            updated = outcome.updated,
            deleted = outcome.deleted,
            "Admin changes committed"
        );
        Ok(outcome)
    }

    /// Rename a team that is not bound to any chat thread.
    pub async fn rename_team(&self, actor: &Actor, team_id: &TeamId, name: &str) -> Result<TeamRecord> {
        validate_id("team", team_id.as_str())?;
        let name = name.trim();
        if name.is_empty() {
            return Err(LeagueError::validation("team name must not be empty"));
        }
        require_admin(actor, "rename teams")?;

        let (teams, races) = futures::try_join!(self.store.list_teams(), self.store.list_races())?;
        let team = teams
            .into_iter()
            .find(|t| &t.id == team_id)
            .ok_or_else(|| LeagueError::NotFound(format!("team {team_id}")))?;
        if team.name == name {
            return Ok(team);
        }
        if let Some(race) = races.iter().find(|r| r.thread_map.contains_key(team_id)) {
            return Err(LeagueError::conflict(
                team_id,
                format!("team is bound to a chat thread in race {}", race.id),
            ));
        }

        let renamed = TeamRecord {
            id: team.id,
            name: name.to_string(),
        };
        self.store.save_team(renamed.clone()).await?;
        info!(team_id = %renamed.id, name = %renamed.name, "Team renamed");
        Ok(renamed)
    }

    fn preview_state(&self, state: &RaceState) -> RacePreview {
        let pending = state.pending_snapshot();
        let original = state
            .race
            .snapshot
            .clone()
            .map(|stored| stored.normalize(|id| pending.get(id).cloned()))
            .unwrap_or_default();
        let names = state.team_names();
        let changes = diff_snapshots(&original, &pending, &names);
        let summary = summarize(
            &changes,
            &names,
            &state.race.thread_map,
            &state.participating_teams(),
        );
        RacePreview {
            race_id: state.race.id.clone(),
            changes,
            summary,
            pending,
        }
    }

    /// Compute what the next notification would report, without side effects.
    pub async fn preview_changes(&self, race_id: &RaceId) -> Result<RacePreview> {
        validate_id("race", race_id.as_str())?;
        let state = self.load_race_state(race_id).await?;
        Ok(self.preview_state(&state))
    }

    fn reconciler_for(&self, race_id: &RaceId) -> ThreadReconciler {
        ThreadReconciler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.chat),
            self.config.parent_channel_id.clone(),
            format!("{}:{}", self.config.status_marker, race_id),
            self.config.message_window,
        )
    }

    /// Bring the event thread up to date with the race's status message.
    async fn deliver_status(
        &self,
        reconciler: &ThreadReconciler,
        race: &RaceRecord,
        title: &str,
        message: &OutgoingMessage,
    ) -> Result<(ThreadHandle, StatusOutcome)> {
        let (thread, outcome) = reconciler
            .ensure_thread(race.event_thread.as_ref(), title, message)
            .await?;
        match outcome {
            ThreadOutcome::Created => {
                self.store.set_event_thread(&race.event_id, &thread).await?;
                METRICS.inc_status_posts();
                obs::emit_status_upserted(thread.as_str(), StatusOutcome::Posted.as_str());
                Ok((thread, StatusOutcome::Posted))
            }
            ThreadOutcome::Replaced { .. } => {
                obs::emit_status_upserted(thread.as_str(), StatusOutcome::Recreated.as_str());
                Ok((thread, StatusOutcome::Recreated))
            }
            ThreadOutcome::Reused => {
                let delivery = reconciler.upsert_status(&thread, title, message).await?;
                Ok((delivery.thread, delivery.outcome))
            }
        }
    }

    /// Give every participating team a live thread.
    ///
    /// Stored handles are verified first; a vanished thread is recreated and
    /// the replacement propagated to every race that referenced it. Teams
    /// without a handle get a new thread. Either way the team's registered
    /// users are invited.
    async fn sync_team_threads(
        &self,
        reconciler: &ThreadReconciler,
        state: &RaceState,
        label: &str,
        report: &mut NotificationReport,
    ) -> Result<()> {
        let names = state.team_names();
        let mut thread_map = state.race.thread_map.clone();
        let mut created = false;

        for team_id in state.participating_teams() {
            let team_name = names
                .get(&team_id)
                .cloned()
                .unwrap_or_else(|| team_id.to_string());
            let members: Vec<&RegistrationRecord> = state
                .registrations
                .iter()
                .filter(|r| r.team_id.as_ref() == Some(&team_id))
                .collect();
            let drivers: Vec<String> = members.iter().map(|r| r.driver.name.clone()).collect();
            let intro = OutgoingMessage::new(format!(
                "{team_name} crew for {label}: {}.",
                join_names(&drivers)
            ));
            let title = format!("{label} - {team_name}");

            let thread = match reconciler
                .ensure_thread(thread_map.get(&team_id), &title, &intro)
                .await
            {
                Ok((_, ThreadOutcome::Reused)) => continue,
                Ok((thread, ThreadOutcome::Created)) => {
                    created = true;
                    report.threads_created.insert(team_id.clone(), thread.clone());
                    thread
                }
                Ok((thread, ThreadOutcome::Replaced { .. })) => {
                    report.threads_replaced.insert(team_id.clone(), thread.clone());
                    thread
                }
                Err(e @ LeagueError::Chat(_)) => {
                    report.record_failure("team_thread", &e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            thread_map.insert(team_id.clone(), thread.clone());

            let participants: Vec<String> = members
                .iter()
                .filter_map(|r| r.driver.user_id())
                .map(|u| u.to_string())
                .collect();
            if !participants.is_empty() {
                if let Err(e) = self
                    .chat
                    .add_participants(thread.as_str(), &participants)
                    .await
                {
                    report.record_failure("participants", &e.into());
                }
            }
        }

        // Replacements are already stored by the reconciler
        if created {
            self.store.save_thread_map(&state.race.id, &thread_map).await?;
        }
        Ok(())
    }

    /// Run one notification cycle for a race.
    ///
    /// Chat failures are logged and reported, never returned. The stored
    /// snapshot only advances once the status message has been delivered,
    /// so undelivered changes are reported again on the next cycle. Team
    /// threads are reconciled on every cycle, so one that failed to open or
    /// was deleted is created on the next run even when the roster is
    /// unchanged.
    pub async fn notify_race(&self, race_id: &RaceId) -> Result<NotificationReport> {
        validate_id("race", race_id.as_str())?;
        let _span = RaceSpan::enter(race_id.as_str());

        let state = self.load_race_state(race_id).await?;
        let preview = self.preview_state(&state);
        let destructive = preview.changes.iter().filter(|c| c.destructive).count();
        obs::emit_changes_detected(race_id.as_str(), preview.changes.len(), destructive);

        let mut report = NotificationReport::new(race_id);
        let reconciler = self.reconciler_for(race_id);
        let label = state.race_label();

        if !preview.changes.is_empty() {
            report.changes = preview.changes.clone();
            let event_title = format!("Event {}", state.race.event_id);
            let message = OutgoingMessage::new(preview.summary.render(&format!("{label} roster")))
                .with_marker(reconciler.marker());

            match self
                .deliver_status(&reconciler, &state.race, &event_title, &message)
                .await
            {
                Ok((thread, outcome)) => {
                    report.event_thread = Some(thread);
                    report.status = Some(outcome);
                }
                Err(e @ LeagueError::Chat(_)) => report.record_failure("status", &e),
                Err(e) => return Err(e),
            }
        }

        // Checked every cycle, changed roster or not
        self.sync_team_threads(&reconciler, &state, &label, &mut report)
            .await?;

        if report.status.is_some() {
            self.store.save_snapshot(race_id, &preview.pending).await?;
            report.snapshot_saved = true;
            report.fingerprint = Some(preview.pending.fingerprint());
        }
        info!(
            changes = report.changes.len(),
            threads_created = report.threads_created.len(),
            threads_replaced = report.threads_replaced.len(),
            failures = report.failures.len(),
            snapshot_saved = report.snapshot_saved,
            "Notification cycle finished"
        );
        Ok(report)
    }
}
