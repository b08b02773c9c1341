//! SurrealDB schema migrations and initialization
//!
//! Sets up every league table with its indexes. Safe to call on every
//! connection (all statements are `IF NOT EXISTS`).

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StateError;
use crate::Result;

/// Initialize all Pitwall tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Pitwall SurrealDB schema");

    init_races_table(db).await?;
    init_registrations_table(db).await?;
    init_teams_table(db).await?;
    init_car_classes_table(db).await?;

    info!("Pitwall schema initialization complete");
    Ok(())
}

/// Initialize `races` table
///
/// Schema:
/// ```text
/// TABLE races {
///   race_id:              STRING (unique)
///   event_id:             STRING (indexed)
///   starts_at:            DATETIME
///   duration_minutes:     INT?
///   max_drivers_per_team: INT?
///   strategy:             STRING (round_robin | balanced_rating)
///   teams_assigned:       BOOL
///   snapshot:             OBJECT? (legacy map or {version, entries})
///   thread_map:           OBJECT (team_id -> thread handle)
///   event_thread:         STRING?
/// }
/// ```
async fn init_races_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing races table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS races SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_race_id ON TABLE races COLUMNS race_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_race_event ON TABLE races COLUMNS event_id, starts_at;
        DEFINE INDEX IF NOT EXISTS idx_race_event_thread ON TABLE races COLUMNS event_thread;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    debug!("races table initialized");
    Ok(())
}

/// Initialize `registrations` table
///
/// Constraints:
/// - `registration_id` is unique
/// - `(race_id, created_at)` index backs the signup-order scan
async fn init_registrations_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing registrations table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS registrations SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_registration_id ON TABLE registrations COLUMNS registration_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_registration_race ON TABLE registrations COLUMNS race_id, created_at;
        DEFINE INDEX IF NOT EXISTS idx_registration_team ON TABLE registrations COLUMNS team_id;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    debug!("registrations table initialized");
    Ok(())
}

async fn init_teams_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing teams table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS teams SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_team_id ON TABLE teams COLUMNS team_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_team_name ON TABLE teams COLUMNS name;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    debug!("teams table initialized");
    Ok(())
}

async fn init_car_classes_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing car_classes table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS car_classes SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_car_class_id ON TABLE car_classes COLUMNS class_id UNIQUE;
    "#;

    db.query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    debug!("car_classes table initialized");
    Ok(())
}
