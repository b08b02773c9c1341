//! Snapshot differ: classify what changed between two assignment snapshots.
//!
//! Two passes:
//! 1. team level, over "stable" teams whose member set is identical in both
//!    snapshots: one `team_renamed` and/or one `team_class_changed` per team
//! 2. registration level, over the union of registration ids
//!
//! Pure: no I/O, and diffing a snapshot against itself yields nothing.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use pitwall_state::{RegistrationId, Snapshot, SnapshotEntry, TeamId};
use serde::{Deserialize, Serialize};

/// What a change refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ChangeSubject {
    Registration(RegistrationId),
    Team(TeamId),
}

/// Classification of one change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Moved,
    Dropped,
    ClassChanged,
    TeamRenamed,
    TeamClassChanged,
}

impl ChangeKind {
    /// Destructive changes get emphasis in notifications.
    pub fn is_destructive(self) -> bool {
        matches!(
            self,
            ChangeKind::Moved
                | ChangeKind::Dropped
                | ChangeKind::ClassChanged
                | ChangeKind::TeamClassChanged
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Moved => "moved",
            ChangeKind::Dropped => "dropped",
            ChangeKind::ClassChanged => "class_changed",
            ChangeKind::TeamRenamed => "team_renamed",
            ChangeKind::TeamClassChanged => "team_class_changed",
        }
    }
}

/// One classified difference between two snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDetail {
    pub subject: ChangeSubject,
    pub kind: ChangeKind,
    pub from_team: Option<TeamId>,
    pub to_team: Option<TeamId>,
    /// The driver for registration changes; every affected driver (sorted)
    /// for `team_class_changed`; empty for `team_renamed`
    pub driver_names: Vec<String>,
    /// Human-readable rendering
    pub line: String,
    pub destructive: bool,
}

impl ChangeDetail {
    fn new(
        subject: ChangeSubject,
        kind: ChangeKind,
        from_team: Option<TeamId>,
        to_team: Option<TeamId>,
        driver_names: Vec<String>,
        line: String,
    ) -> Self {
        ChangeDetail {
            subject,
            kind,
            from_team,
            to_team,
            driver_names,
            line,
            destructive: kind.is_destructive(),
        }
    }
}

/// Current display names for teams, used when a snapshot entry carries none
pub type TeamNames = BTreeMap<TeamId, String>;

const UNASSIGNED_CLASS: &str = "no class";

fn team_label(team_id: &TeamId, captured: Option<&str>, names: &TeamNames) -> String {
    captured
        .map(str::to_string)
        .or_else(|| names.get(team_id).cloned())
        .unwrap_or_else(|| team_id.to_string())
}

fn entry_team_label(entry: &SnapshotEntry, names: &TeamNames) -> Option<String> {
    entry
        .team_id
        .as_ref()
        .map(|id| team_label(id, entry.team_name.as_deref(), names))
}

/// Comparable class value: the id when recorded, else the display name.
fn class_key(entry: &SnapshotEntry) -> Option<&str> {
    entry
        .car_class_id
        .as_ref()
        .map(|c| c.as_str())
        .or(entry.car_class_name.as_deref())
}

fn class_label(entry: &SnapshotEntry) -> String {
    entry
        .car_class_name
        .clone()
        .or_else(|| entry.car_class_id.as_ref().map(ToString::to_string))
        .unwrap_or_else(|| UNASSIGNED_CLASS.to_string())
}

fn members_by_team(snapshot: &Snapshot) -> BTreeMap<&TeamId, BTreeSet<&RegistrationId>> {
    let mut teams: BTreeMap<&TeamId, BTreeSet<&RegistrationId>> = BTreeMap::new();
    for (id, entry) in &snapshot.entries {
        if let Some(team) = &entry.team_id {
            teams.entry(team).or_default().insert(id);
        }
    }
    teams
}

/// The single class shared by all of `members`, if uniform.
fn uniform_class<'a>(
    snapshot: &'a Snapshot,
    members: &BTreeSet<&RegistrationId>,
) -> Option<Option<&'a str>> {
    let mut classes = members
        .iter()
        .filter_map(|id| snapshot.get(id))
        .map(class_key);
    let first = classes.next()?;
    classes.all(|c| c == first).then_some(first)
}

/// Team-level pass over stable teams. Returns the changes and the
/// registrations already covered by a `team_class_changed`.
fn diff_stable_teams<'a>(
    original: &'a Snapshot,
    pending: &'a Snapshot,
    names: &TeamNames,
) -> (Vec<ChangeDetail>, HashSet<&'a RegistrationId>) {
    let mut changes = Vec::new();
    let mut covered = HashSet::new();

    let before = members_by_team(original);
    let after = members_by_team(pending);

    for (team_id, members) in &before {
        if after.get(team_id) != Some(members) {
            continue;
        }
        // Any member works for name resolution; stable means the set matches
        let Some(first) = members.iter().next() else {
            continue;
        };
        let (Some(old_entry), Some(new_entry)) = (original.get(first), pending.get(first)) else {
            continue;
        };

        let old_name = team_label(team_id, old_entry.team_name.as_deref(), names);
        let new_name = team_label(team_id, new_entry.team_name.as_deref(), names);
        if old_name != new_name {
            changes.push(ChangeDetail::new(
                ChangeSubject::Team((*team_id).clone()),
                ChangeKind::TeamRenamed,
                Some((*team_id).clone()),
                Some((*team_id).clone()),
                Vec::new(),
                format!("{old_name} was renamed to {new_name}."),
            ));
        }

        if let (Some(old_class), Some(new_class)) = (
            uniform_class(original, members),
            uniform_class(pending, members),
        ) {
            if old_class != new_class {
                let mut drivers: Vec<String> = members
                    .iter()
                    .filter_map(|id| pending.get(id))
                    .map(|e| e.driver_name.clone())
                    .collect();
                drivers.sort();
                let line = format!(
                    "{new_name} switched class from {} to {} ({}).",
                    class_label(old_entry),
                    class_label(new_entry),
                    drivers.join(", ")
                );
                changes.push(ChangeDetail::new(
                    ChangeSubject::Team((*team_id).clone()),
                    ChangeKind::TeamClassChanged,
                    Some((*team_id).clone()),
                    Some((*team_id).clone()),
                    drivers,
                    line,
                ));
                covered.extend(members.iter().copied());
            }
        }
    }

    (changes, covered)
}

fn registration_change(
    id: &RegistrationId,
    old: Option<&SnapshotEntry>,
    new: Option<&SnapshotEntry>,
    names: &TeamNames,
    covered: &HashSet<&RegistrationId>,
) -> Option<ChangeDetail> {
    let subject = ChangeSubject::Registration(id.clone());
    match (old, new) {
        (None, None) => None,
        (None, Some(new)) => {
            let driver = new.driver_name.clone();
            let line = match entry_team_label(new, names) {
                Some(team) => format!("Added {driver} to {team}."),
                None => format!("{driver} registered (unassigned)."),
            };
            Some(ChangeDetail::new(
                subject,
                ChangeKind::Added,
                None,
                new.team_id.clone(),
                vec![driver],
                line,
            ))
        }
        (Some(old), None) => {
            let driver = old.driver_name.clone();
            let line = match entry_team_label(old, names) {
                Some(team) => format!("{driver} withdrew from {team}."),
                None => format!("{driver} withdrew (unassigned)."),
            };
            Some(ChangeDetail::new(
                subject,
                ChangeKind::Dropped,
                old.team_id.clone(),
                None,
                vec![driver],
                line,
            ))
        }
        (Some(old), Some(new)) => {
            let driver = new.driver_name.clone();
            let old_team = entry_team_label(old, names);
            let new_team = entry_team_label(new, names);
            let (kind, line) = match (&old.team_id, &new.team_id) {
                (None, Some(_)) => (
                    ChangeKind::Added,
                    format!("Added {driver} to {}.", new_team.unwrap_or_default()),
                ),
                (Some(_), None) => (
                    ChangeKind::Dropped,
                    format!("Removed {driver} from {}.", old_team.unwrap_or_default()),
                ),
                (Some(a), Some(b)) if a != b => (
                    ChangeKind::Moved,
                    format!(
                        "Moved {driver} from {} to {}.",
                        old_team.unwrap_or_default(),
                        new_team.unwrap_or_default()
                    ),
                ),
                _ => {
                    if class_key(old) == class_key(new) || covered.contains(id) {
                        return None;
                    }
                    (
                        ChangeKind::ClassChanged,
                        format!(
                            "{driver} switched class from {} to {}.",
                            class_label(old),
                            class_label(new)
                        ),
                    )
                }
            };
            Some(ChangeDetail::new(
                subject,
                kind,
                old.team_id.clone(),
                new.team_id.clone(),
                vec![driver],
                line,
            ))
        }
    }
}

/// Diff two snapshots. Output is sorted by `line`.
pub fn diff_snapshots(
    original: &Snapshot,
    pending: &Snapshot,
    names: &TeamNames,
) -> Vec<ChangeDetail> {
    let (mut changes, covered) = diff_stable_teams(original, pending, names);

    let ids: BTreeSet<&RegistrationId> = original
        .entries
        .keys()
        .chain(pending.entries.keys())
        .collect();
    changes.extend(ids.into_iter().filter_map(|id| {
        registration_change(id, original.get(id), pending.get(id), names, &covered)
    }));

    changes.sort_by(|a, b| a.line.cmp(&b.line));
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use pitwall_state::CarClassId;

    fn entry(team: Option<(&str, &str)>, driver: &str, class: &str) -> SnapshotEntry {
        SnapshotEntry {
            team_id: team.map(|(id, _)| TeamId::from(id)),
            team_name: team.map(|(_, name)| name.to_string()),
            driver_name: driver.to_string(),
            car_class_id: Some(CarClassId::from(class)),
            car_class_name: Some(class.to_uppercase()),
        }
    }

    fn snapshot(entries: Vec<(&str, SnapshotEntry)>) -> Snapshot {
        Snapshot::new(
            entries
                .into_iter()
                .map(|(id, e)| (RegistrationId::from(id), e))
                .collect(),
        )
    }

    #[test]
    fn added_into_team_is_not_a_move() {
        let before = snapshot(vec![("r1", entry(None, "Alice", "gt3"))]);
        let after = snapshot(vec![("r1", entry(Some(("t1", "Red")), "Alice", "gt3"))]);
        let changes = diff_snapshots(&before, &after, &TeamNames::new());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::Added);
        assert_eq!(changes[0].line, "Added Alice to Red.");
        assert!(!changes[0].destructive);
    }

    #[test]
    fn unassigned_registration_is_labelled() {
        let after = snapshot(vec![("r1", entry(None, "Bob", "gt3"))]);
        let changes = diff_snapshots(&Snapshot::default(), &after, &TeamNames::new());
        assert_eq!(changes[0].line, "Bob registered (unassigned).");
    }

    #[test]
    fn class_change_inside_same_team_is_reported_per_driver() {
        let before = snapshot(vec![
            ("r1", entry(Some(("t1", "Red")), "Alice", "gt3")),
            ("r2", entry(Some(("t1", "Red")), "Bob", "gt3")),
        ]);
        let after = snapshot(vec![
            ("r1", entry(Some(("t1", "Red")), "Alice", "gt4")),
            ("r2", entry(Some(("t1", "Red")), "Bob", "gt3")),
        ]);
        let changes = diff_snapshots(&before, &after, &TeamNames::new());
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind, ChangeKind::ClassChanged);
        assert_eq!(changes[0].line, "Alice switched class from GT3 to GT4.");
    }

    #[test]
    fn legacy_team_name_resolves_through_lookup() {
        let mut before_entry = entry(Some(("t1", "ignored")), "Alice", "gt3");
        before_entry.team_name = None;
        let before = snapshot(vec![("r1", before_entry)]);
        let after = snapshot(vec![("r1", entry(Some(("t1", "Red")), "Alice", "gt3"))]);
        let mut names = TeamNames::new();
        names.insert(TeamId::from("t1"), "Red".to_string());
        assert!(diff_snapshots(&before, &after, &names).is_empty());
    }
}
