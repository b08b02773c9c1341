//! Pitwall-State: persistence layer for league operations
//!
//! This crate owns every durable record the team formation engine reads or
//! writes: registrations, races, teams, car classes, and the per-race
//! reconciliation state (last-notified snapshot plus external thread handles).
//!
//! ## Layer 0 - Data/Persistence
//!
//! Focus: deterministic ordering, all-or-nothing batches, and minimal writes.
//!
//! ## Key Components
//!
//! - `LeagueStore`: backend-agnostic data-access trait injected into the core
//! - `MemoryLeagueStore`: in-memory fake satisfying the trait contract
//! - `SurrealLeagueStore`: SurrealDB-backed implementation
//! - `StoredSnapshot`: on-disk snapshot formats, normalized once at load time

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod snapshot;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use handle::{connect_in_memory, CloudConfig, ConnectTarget};
pub use snapshot::{Snapshot, SnapshotEntry, StoredSnapshot, SNAPSHOT_VERSION};
pub use storage_traits::{
    AssignmentStrategy, BatchOutcome, CarClassId, CarClassRecord, Driver, DriverIdentity, EventId,
    LeagueStore, RaceId, RaceRecord, RatingObservation, RegistrationBatch, RegistrationId,
    RegistrationRecord, RegistrationUpdate, StorageResult, TeamAssignment, TeamId, TeamRecord,
    ThreadHandle, UserId,
};
pub use surreal_store::SurrealLeagueStore;

/// Result type for connection and schema operations
pub type Result<T> = std::result::Result<T, StateError>;
