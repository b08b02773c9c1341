//! Pitwall Core Library
//!
//! Team formation and change reconciliation for endurance race events.
//! Re-exports the pieces the CLI and integration tests drive.

pub mod allocation;
pub mod coordinator;
pub mod diff;
pub mod domain;
pub mod metrics;
pub mod obs;
pub mod reconcile;
pub mod telemetry;

pub use allocation::{
    allocate_team_pool, distribute, minimal_writes, required_teams, round_robin, BalanceOutcome,
    BalanceStats, Distribution, PoolRequest, TeamPoolAllocator, MAX_REFINEMENT_ROUNDS,
    MIN_IMPROVEMENT,
};

pub use coordinator::{
    parse_admin_batch, Actor, ClassAllocation, CoordinatorConfig, NotificationFailure,
    NotificationReport, RaceCoordinator, RacePreview, RebalanceReport,
};

pub use diff::{
    diff_snapshots, join_names, summarize, ChangeDetail, ChangeKind, ChangeSubject, ChangeSummary,
    TeamNames,
};

pub use domain::{effective_capacity, resolve_rating, LeagueError, Result};

pub use reconcile::{StatusDelivery, StatusOutcome, ThreadOutcome, ThreadReconciler};

pub use pitwall_chat::{ChatService, OutgoingMessage};
pub use pitwall_state::{LeagueStore, RaceId, RegistrationBatch, TeamId};
