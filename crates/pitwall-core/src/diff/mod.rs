//! Change detection between notification cycles.
//!
//! - `snapshot_diff`: typed, human-readable change records
//! - `summary`: groups records into one outbound status message

pub mod snapshot_diff;
pub mod summary;

pub use snapshot_diff::{diff_snapshots, ChangeDetail, ChangeKind, ChangeSubject, TeamNames};
pub use summary::{join_names, summarize, ChangeSummary};
