//! Change summarizer: group differ output into one outbound message.

use std::collections::BTreeMap;

use pitwall_state::{TeamId, ThreadHandle};
use serde::Serialize;

use super::snapshot_diff::{ChangeDetail, ChangeKind, TeamNames};

/// Notification-ready buckets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSummary {
    /// Merged per team: "Added A and B to Red."
    pub additions: Vec<String>,
    /// Deduplicated and sorted
    pub destructive: Vec<String>,
    /// Non-destructive team-level notices (renames)
    pub notices: Vec<String>,
    /// Participating teams without a stored thread, in participation order
    pub teams_needing_thread: Vec<TeamId>,
}

impl ChangeSummary {
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.destructive.is_empty() && self.notices.is_empty()
    }

    /// Render the status message body.
    pub fn render(&self, heading: &str) -> String {
        let mut out = vec![format!("**{heading}**")];
        if self.is_empty() {
            out.push("No roster changes.".to_string());
        }
        out.extend(self.additions.iter().cloned());
        out.extend(self.notices.iter().cloned());
        if !self.destructive.is_empty() {
            out.push(String::new());
            out.push("**Needs attention**".to_string());
            out.extend(self.destructive.iter().map(|l| format!("- {l}")));
        }
        out.join("\n")
    }
}

/// "A", "A and B", "A, B and C"
pub fn join_names(names: &[String]) -> String {
    match names {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

/// Group changes for one outbound message.
///
/// `participating` lists the teams that currently carry drivers in the race
/// (in display order); each one missing from `thread_map` is reported.
pub fn summarize(
    changes: &[ChangeDetail],
    names: &TeamNames,
    thread_map: &BTreeMap<TeamId, ThreadHandle>,
    participating: &[TeamId],
) -> ChangeSummary {
    let mut additions_by_team: Vec<(&TeamId, Vec<String>)> = Vec::new();
    let mut additions = Vec::new();
    let mut destructive = Vec::new();
    let mut notices = Vec::new();

    for change in changes {
        match (change.kind, &change.to_team) {
            (ChangeKind::Added, Some(team)) => {
                let drivers = change.driver_names.iter().cloned();
                match additions_by_team.iter_mut().find(|(t, _)| *t == team) {
                    Some((_, list)) => list.extend(drivers),
                    None => additions_by_team.push((team, drivers.collect())),
                }
            }
            (ChangeKind::Added, None) => additions.push(change.line.clone()),
            _ if change.destructive => destructive.push(change.line.clone()),
            _ => notices.push(change.line.clone()),
        }
    }

    for (team, drivers) in additions_by_team {
        let label = names.get(team).cloned().unwrap_or_else(|| team.to_string());
        additions.push(format!("Added {} to {label}.", join_names(&drivers)));
    }
    additions.sort();
    destructive.sort();
    destructive.dedup();
    notices.sort();
    notices.dedup();

    let teams_needing_thread = participating
        .iter()
        .filter(|t| !thread_map.contains_key(*t))
        .cloned()
        .collect();

    ChangeSummary {
        additions,
        destructive,
        notices,
        teams_needing_thread,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::snapshot_diff::ChangeSubject;
    use pitwall_state::RegistrationId;

    fn added(reg: &str, driver: &str, team: Option<&str>) -> ChangeDetail {
        ChangeDetail {
            subject: ChangeSubject::Registration(RegistrationId::from(reg)),
            kind: ChangeKind::Added,
            from_team: None,
            to_team: team.map(TeamId::from),
            driver_names: vec![driver.to_string()],
            line: match team {
                Some(t) => format!("Added {driver} to {t}."),
                None => format!("{driver} registered (unassigned)."),
            },
            destructive: false,
        }
    }

    fn dropped(reg: &str, line: &str) -> ChangeDetail {
        ChangeDetail {
            subject: ChangeSubject::Registration(RegistrationId::from(reg)),
            kind: ChangeKind::Dropped,
            from_team: Some(TeamId::from("t1")),
            to_team: None,
            driver_names: vec![],
            line: line.to_string(),
            destructive: true,
        }
    }

    fn names() -> TeamNames {
        let mut names = TeamNames::new();
        names.insert(TeamId::from("t1"), "Red".to_string());
        names.insert(TeamId::from("t2"), "Blue".to_string());
        names
    }

    #[test]
    fn join_names_reads_naturally() {
        let n = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(join_names(&n(&[])), "");
        assert_eq!(join_names(&n(&["A"])), "A");
        assert_eq!(join_names(&n(&["A", "B"])), "A and B");
        assert_eq!(join_names(&n(&["A", "B", "C"])), "A, B and C");
    }

    #[test]
    fn additions_merge_per_team() {
        let changes = vec![
            added("r1", "Alice", Some("t1")),
            added("r2", "Bob", Some("t1")),
            added("r3", "Cara", Some("t2")),
            added("r4", "Dan", None),
        ];
        let summary = summarize(&changes, &names(), &BTreeMap::new(), &[]);
        assert_eq!(
            summary.additions,
            vec![
                "Added Alice and Bob to Red.".to_string(),
                "Added Cara to Blue.".to_string(),
                "Dan registered (unassigned).".to_string(),
            ]
        );
    }

    #[test]
    fn destructive_lines_are_deduplicated() {
        let changes = vec![
            dropped("r1", "Zed withdrew from Red."),
            dropped("r2", "Amy withdrew from Red."),
            dropped("r1", "Zed withdrew from Red."),
        ];
        let summary = summarize(&changes, &names(), &BTreeMap::new(), &[]);
        assert_eq!(
            summary.destructive,
            vec!["Amy withdrew from Red.".to_string(), "Zed withdrew from Red.".to_string()]
        );
    }

    #[test]
    fn teams_without_threads_are_listed() {
        let mut threads = BTreeMap::new();
        threads.insert(TeamId::from("t1"), ThreadHandle::from("th-1"));
        let participating = vec![TeamId::from("t2"), TeamId::from("t1")];
        let summary = summarize(&[], &names(), &threads, &participating);
        assert_eq!(summary.teams_needing_thread, vec![TeamId::from("t2")]);
    }

    #[test]
    fn render_emphasises_destructive_section() {
        let summary = ChangeSummary {
            additions: vec!["Added Alice to Red.".to_string()],
            destructive: vec!["Moved Bob from Red to Blue.".to_string()],
            ..Default::default()
        };
        let body = summary.render("Race 1 roster");
        assert!(body.starts_with("**Race 1 roster**"));
        assert!(body.contains("Added Alice to Red."));
        assert!(body.contains("**Needs attention**\n- Moved Bob from Red to Blue."));
    }
}
