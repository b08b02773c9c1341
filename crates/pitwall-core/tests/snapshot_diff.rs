//! Snapshot differ and summarizer properties.

use std::collections::BTreeMap;

use pitwall_core::{diff_snapshots, summarize, ChangeKind, ChangeSubject, TeamNames};
use pitwall_state::{
    CarClassId, RegistrationId, Snapshot, SnapshotEntry, StoredSnapshot, TeamId, ThreadHandle,
};

fn entry(team: Option<(&str, &str)>, driver: &str, class: &str) -> SnapshotEntry {
    SnapshotEntry {
        team_id: team.map(|(id, _)| TeamId::from(id)),
        team_name: team.map(|(_, name)| name.to_string()),
        driver_name: driver.to_string(),
        car_class_id: Some(CarClassId::from(class)),
        car_class_name: Some(class.to_uppercase()),
    }
}

fn snapshot(entries: &[(&str, SnapshotEntry)]) -> Snapshot {
    Snapshot::new(
        entries
            .iter()
            .map(|(id, e)| (RegistrationId::from(*id), e.clone()))
            .collect(),
    )
}

fn grid() -> Snapshot {
    snapshot(&[
        ("r1", entry(Some(("t1", "Apex")), "Alice", "gt3")),
        ("r2", entry(Some(("t1", "Apex")), "Ben", "gt3")),
        ("r3", entry(Some(("t2", "Blue Flag")), "Cleo", "gt4")),
        ("r4", entry(None, "Dana", "gt4")),
    ])
}

fn names() -> TeamNames {
    let mut names = TeamNames::new();
    names.insert(TeamId::from("t1"), "Apex".to_string());
    names.insert(TeamId::from("t2"), "Blue Flag".to_string());
    names.insert(TeamId::from("t3"), "Chicane".to_string());
    names
}

#[test]
fn self_diff_is_empty() {
    let snap = grid();
    assert!(diff_snapshots(&snap, &snap, &names()).is_empty());
    assert!(diff_snapshots(&Snapshot::default(), &Snapshot::default(), &names()).is_empty());
}

#[test]
fn rename_of_stable_team_is_one_event() {
    let before = grid();
    let after = snapshot(&[
        ("r1", entry(Some(("t1", "Apex Motorsport")), "Alice", "gt3")),
        ("r2", entry(Some(("t1", "Apex Motorsport")), "Ben", "gt3")),
        ("r3", entry(Some(("t2", "Blue Flag")), "Cleo", "gt4")),
        ("r4", entry(None, "Dana", "gt4")),
    ]);

    let changes = diff_snapshots(&before, &after, &names());
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::TeamRenamed);
    assert_eq!(changes[0].subject, ChangeSubject::Team(TeamId::from("t1")));
    assert_eq!(changes[0].line, "Apex was renamed to Apex Motorsport.");
    assert!(!changes[0].destructive);
}

#[test]
fn whole_team_class_switch_is_reported_once() {
    let before = grid();
    let after = snapshot(&[
        ("r1", entry(Some(("t1", "Apex")), "Alice", "gt4")),
        ("r2", entry(Some(("t1", "Apex")), "Ben", "gt4")),
        ("r3", entry(Some(("t2", "Blue Flag")), "Cleo", "gt4")),
        ("r4", entry(None, "Dana", "gt4")),
    ]);

    let changes = diff_snapshots(&before, &after, &names());
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::TeamClassChanged);
    assert_eq!(changes[0].driver_names, vec!["Alice", "Ben"]);
    assert_eq!(changes[0].line, "Apex switched class from GT3 to GT4 (Alice, Ben).");
    assert!(changes[0].destructive);
}

#[test]
fn assignment_from_unassigned_is_an_addition() {
    let before = grid();
    let mut after = grid();
    after.entries.insert(
        RegistrationId::from("r4"),
        entry(Some(("t2", "Blue Flag")), "Dana", "gt4"),
    );
    after.entries.insert(
        RegistrationId::from("r5"),
        entry(Some(("t3", "Chicane")), "Eli", "gt3"),
    );

    let changes = diff_snapshots(&before, &after, &names());
    assert_eq!(changes.len(), 2);
    assert!(changes.iter().all(|c| c.kind == ChangeKind::Added));
    assert!(changes.iter().all(|c| !c.destructive));
}

#[test]
fn moves_and_withdrawals_are_destructive() {
    let before = grid();
    let after = snapshot(&[
        ("r1", entry(Some(("t1", "Apex")), "Alice", "gt3")),
        ("r2", entry(Some(("t3", "Chicane")), "Ben", "gt3")),
        ("r4", entry(None, "Dana", "gt4")),
    ]);

    let changes = diff_snapshots(&before, &after, &names());
    let lines: Vec<&str> = changes.iter().map(|c| c.line.as_str()).collect();
    assert_eq!(
        lines,
        vec!["Cleo withdrew from Blue Flag.", "Moved Ben from Apex to Chicane."]
    );
    assert!(changes.iter().all(|c| c.destructive));
}

#[test]
fn team_and_class_change_together_reports_the_move_only() {
    let before = grid();
    let after = snapshot(&[
        ("r1", entry(Some(("t1", "Apex")), "Alice", "gt3")),
        ("r2", entry(Some(("t1", "Apex")), "Ben", "gt3")),
        ("r3", entry(Some(("t3", "Chicane")), "Cleo", "gt3")),
        ("r4", entry(None, "Dana", "gt4")),
    ]);

    let changes = diff_snapshots(&before, &after, &names());
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Moved);
}

#[test]
fn legacy_snapshot_matching_current_roster_yields_no_changes() {
    let pending = grid();
    let legacy: BTreeMap<RegistrationId, Option<TeamId>> = [
        ("r1", Some("t1")),
        ("r2", Some("t1")),
        ("r3", Some("t2")),
        ("r4", None),
    ]
    .into_iter()
    .map(|(id, team)| (RegistrationId::from(id), team.map(TeamId::from)))
    .collect();

    let stored = StoredSnapshot::Legacy(legacy);
    assert!(stored.is_legacy());
    let original = stored.normalize(|id| pending.get(id).cloned());

    assert!(diff_snapshots(&original, &pending, &names()).is_empty());
}

#[test]
fn legacy_entry_for_deleted_registration_reads_as_unknown_driver() {
    let pending = grid();
    let mut legacy: BTreeMap<RegistrationId, Option<TeamId>> = pending
        .entries
        .iter()
        .map(|(id, e)| (id.clone(), e.team_id.clone()))
        .collect();
    legacy.insert(RegistrationId::from("r9"), Some(TeamId::from("t2")));

    let original = StoredSnapshot::Legacy(legacy).normalize(|id| pending.get(id).cloned());
    let changes = diff_snapshots(&original, &pending, &names());

    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].kind, ChangeKind::Dropped);
    assert_eq!(changes[0].line, "Unknown driver withdrew from Blue Flag.");
}

#[test]
fn summary_flags_participating_teams_without_threads() {
    let before = Snapshot::default();
    let after = grid();
    let changes = diff_snapshots(&before, &after, &names());

    let mut threads = BTreeMap::new();
    threads.insert(TeamId::from("t1"), ThreadHandle::from("thread-1"));
    let participating = vec![TeamId::from("t1"), TeamId::from("t2")];
    let summary = summarize(&changes, &names(), &threads, &participating);

    assert_eq!(
        summary.additions,
        vec![
            "Added Alice and Ben to Apex.".to_string(),
            "Added Cleo to Blue Flag.".to_string(),
            "Dana registered (unassigned).".to_string(),
        ]
    );
    assert!(summary.destructive.is_empty());
    assert_eq!(summary.teams_needing_thread, vec![TeamId::from("t2")]);
}
