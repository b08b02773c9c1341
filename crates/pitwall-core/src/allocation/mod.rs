//! Team formation.
//!
//! - `pool`: which teams take part for a class, and how many
//! - `strategy`: round-robin or balanced-rating distribution over that pool
//! - `balance`: the greedy seed plus swap search behind balanced-rating

pub mod balance;
pub mod pool;
pub mod strategy;

pub use balance::{BalanceOutcome, BalanceStats, MAX_REFINEMENT_ROUNDS, MIN_IMPROVEMENT};
pub use pool::{allocate_team_pool, required_teams, PoolRequest, TeamPoolAllocator};
pub use strategy::{distribute, minimal_writes, round_robin, Distribution};
