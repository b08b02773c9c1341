//! Last-notified assignment snapshots.
//!
//! Races have carried two snapshot layouts over time:
//! - legacy: a flat `{registration_id: team_id | null}` map
//! - current: `{version, entries}` with driver and class details per entry
//!
//! `StoredSnapshot` accepts either on read. Callers normalize it into a
//! [`Snapshot`] exactly once when a race is loaded; nothing downstream ever
//! branches on the stored layout.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::storage_traits::{CarClassId, RegistrationId, TeamId};

/// Layout version written by [`Snapshot::to_stored`].
pub const SNAPSHOT_VERSION: u32 = 2;

/// Driver name used when a legacy entry can no longer be matched to a registration.
pub const UNKNOWN_DRIVER: &str = "Unknown driver";

/// State of one registration at notification time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub team_id: Option<TeamId>,
    /// Team name at capture time, used to detect renames
    #[serde(default)]
    pub team_name: Option<String>,
    pub driver_name: String,
    #[serde(default)]
    pub car_class_id: Option<CarClassId>,
    #[serde(default)]
    pub car_class_name: Option<String>,
}

/// Normalized, immutable registration -> assignment map
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub entries: BTreeMap<RegistrationId, SnapshotEntry>,
}

impl Snapshot {
    pub fn new(entries: BTreeMap<RegistrationId, SnapshotEntry>) -> Self {
        Snapshot { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, id: &RegistrationId) -> Option<&SnapshotEntry> {
        self.entries.get(id)
    }

    /// SHA-256 over the canonical JSON encoding (entries are key-ordered).
    pub fn fingerprint(&self) -> String {
        let bytes = serde_json::to_vec(&self.entries).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        hex::encode(hasher.finalize())
    }

    /// Encode in the current stored layout.
    pub fn to_stored(&self) -> StoredSnapshot {
        StoredSnapshot::Current {
            version: SNAPSHOT_VERSION,
            entries: self.entries.clone(),
        }
    }
}

/// Snapshot as persisted on a race record, in either historical layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredSnapshot {
    Current {
        version: u32,
        entries: BTreeMap<RegistrationId, SnapshotEntry>,
    },
    Legacy(BTreeMap<RegistrationId, Option<TeamId>>),
}

impl StoredSnapshot {
    /// Convert into the normalized form.
    ///
    /// Legacy entries only recorded a team id. Their driver and class details
    /// come from `lookup` (normally the race's current registrations); entries
    /// whose registration is gone get [`UNKNOWN_DRIVER`] and no class.
    pub fn normalize<F>(self, lookup: F) -> Snapshot
    where
        F: Fn(&RegistrationId) -> Option<SnapshotEntry>,
    {
        match self {
            StoredSnapshot::Current { entries, .. } => Snapshot { entries },
            StoredSnapshot::Legacy(map) => {
                let entries = map
                    .into_iter()
                    .map(|(id, team_id)| {
                        let entry = match lookup(&id) {
                            Some(current) => SnapshotEntry {
                                team_id,
                                team_name: None,
                                ..current
                            },
                            None => SnapshotEntry {
                                team_id,
                                team_name: None,
                                driver_name: UNKNOWN_DRIVER.to_string(),
                                car_class_id: None,
                                car_class_name: None,
                            },
                        };
                        (id, entry)
                    })
                    .collect();
                Snapshot { entries }
            }
        }
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, StoredSnapshot::Legacy(_))
    }
}
