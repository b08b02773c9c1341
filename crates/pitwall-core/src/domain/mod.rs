//! Domain rules for Pitwall.
//!
//! - `error`: the error taxonomy every operation reports through
//! - `rating`: one comparable skill number per driver
//! - `capacity`: drivers-per-team cap for a race

pub mod capacity;
pub mod error;
pub mod rating;

pub use capacity::effective_capacity;
pub use error::{LeagueError, Result};
pub use rating::resolve_rating;
