//! Where the league database lives and how to reach it.
//!
//! [`ConnectTarget`] is resolved from the environment first and connected
//! second, so the resolution rules can be tested without a database. Every
//! connection selects the namespace/database and applies the schema before it
//! is handed to a store.

use std::path::PathBuf;

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StateError;
use crate::migrations;
use crate::Result;

const DEFAULT_NAMESPACE: &str = "pitwall";
const DEFAULT_DATABASE: &str = "league";
const LOCAL_DB_PATH: &str = ".pitwall/db";

/// Credentials for a hosted SurrealDB instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudConfig {
    /// WebSocket endpoint, e.g. `wss://league.example.surrealdb.cloud`
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Sign in as a root user instead of a database user
    pub is_root: bool,
}

impl CloudConfig {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Read `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME` and `SURREALDB_PASSWORD`
    /// (all required), plus optional `SURREALDB_NAMESPACE`,
    /// `SURREALDB_DATABASE` and `SURREALDB_ROOT`.
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> std::result::Result<Self, String> {
        let required = |key: &str| lookup(key).ok_or_else(|| format!("{key} not set"));
        let mut config = Self::new(
            required("SURREALDB_ENDPOINT")?,
            required("SURREALDB_USERNAME")?,
            required("SURREALDB_PASSWORD")?,
        );
        if let Some(ns) = lookup("SURREALDB_NAMESPACE") {
            config.namespace = ns;
        }
        if let Some(db) = lookup("SURREALDB_DATABASE") {
            config.database = db;
        }
        config.is_root = lookup("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true"));
        Ok(config)
    }
}

/// A resolved database location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectTarget {
    /// Throwaway `mem://` database
    Memory,
    /// Hosted instance with credentials
    Cloud(CloudConfig),
    /// Any URL SurrealDB understands, without sign-in
    Url(String),
    /// `surrealkv://` files on local disk
    Local(PathBuf),
}

impl ConnectTarget {
    /// Hosted credentials win, then `SURREALDB_URL`, then local files under
    /// `PITWALL_DB_PATH` (default `.pitwall/db`).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Ok(config) = CloudConfig::from_lookup(&lookup) {
            return ConnectTarget::Cloud(config);
        }
        if let Some(url) = lookup("SURREALDB_URL") {
            return ConnectTarget::Url(url);
        }
        let path = lookup("PITWALL_DB_PATH").unwrap_or_else(|| LOCAL_DB_PATH.to_string());
        ConnectTarget::Local(PathBuf::from(path))
    }

    /// Open the connection and apply the schema.
    #[instrument(skip_all, fields(db = %self.describe()))]
    pub async fn connect(&self) -> Result<Surreal<Any>> {
        match self {
            ConnectTarget::Memory => open("mem://", DEFAULT_NAMESPACE, DEFAULT_DATABASE).await,
            ConnectTarget::Cloud(config) => connect_cloud(config).await,
            ConnectTarget::Url(url) => {
                info!("Connecting to league database at {}", url);
                open(url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await
            }
            ConnectTarget::Local(path) => {
                std::fs::create_dir_all(path).map_err(|e| {
                    StateError::Connection(format!(
                        "Failed to create database directory {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                info!("Using local league database under {}", path.display());
                let url = format!("surrealkv://{}", path.display());
                open(&url, DEFAULT_NAMESPACE, DEFAULT_DATABASE).await
            }
        }
    }

    /// Log-safe description; never includes credentials.
    pub fn describe(&self) -> String {
        match self {
            ConnectTarget::Memory => "memory".to_string(),
            ConnectTarget::Cloud(config) => {
                format!("cloud {} ({}/{})", config.endpoint, config.namespace, config.database)
            }
            ConnectTarget::Url(url) => url.clone(),
            ConnectTarget::Local(path) => format!("local {}", path.display()),
        }
    }
}

/// Fresh in-memory database with the schema applied.
pub async fn connect_in_memory() -> Result<Surreal<Any>> {
    ConnectTarget::Memory.connect().await
}

async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root sign-in failed: {e}")))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Database sign-in failed: {e}")))?;
    }

    select_and_migrate(db, &config.namespace, &config.database).await
}

async fn open(url: &str, namespace: &str, database: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;
    select_and_migrate(db, namespace, database).await
}

async fn select_and_migrate(
    db: Surreal<Any>,
    namespace: &str,
    database: &str,
) -> Result<Surreal<Any>> {
    db.use_ns(namespace)
        .use_db(database)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;
    migrations::init_schema(&db).await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn cloud_config_defaults_and_builders() {
        let config = CloudConfig::new("wss://db.example", "svc", "secret");
        assert_eq!(config.namespace, "pitwall");
        assert_eq!(config.database, "league");
        assert!(!config.is_root);

        let config = config
            .with_namespace("staging")
            .with_database("s7")
            .with_root(true);
        assert_eq!(config.namespace, "staging");
        assert_eq!(config.database, "s7");
        assert!(config.is_root);
    }

    #[test]
    fn cloud_credentials_take_priority() {
        let target = ConnectTarget::from_lookup(env(&[
            ("SURREALDB_ENDPOINT", "wss://db.example"),
            ("SURREALDB_USERNAME", "svc"),
            ("SURREALDB_PASSWORD", "secret"),
            ("SURREALDB_ROOT", "TRUE"),
            ("SURREALDB_URL", "ws://ignored:8000"),
        ]));
        let ConnectTarget::Cloud(config) = target else {
            panic!("expected cloud target, got {target:?}");
        };
        assert!(config.is_root);
        assert_eq!(config.namespace, "pitwall");
    }

    #[test]
    fn partial_credentials_fall_back_to_url() {
        let target = ConnectTarget::from_lookup(env(&[
            ("SURREALDB_ENDPOINT", "wss://db.example"),
            ("SURREALDB_URL", "ws://localhost:8000"),
        ]));
        assert_eq!(target, ConnectTarget::Url("ws://localhost:8000".to_string()));
    }

    #[test]
    fn local_path_is_the_last_resort() {
        assert_eq!(
            ConnectTarget::from_lookup(env(&[])),
            ConnectTarget::Local(PathBuf::from(".pitwall/db"))
        );
        assert_eq!(
            ConnectTarget::from_lookup(env(&[("PITWALL_DB_PATH", "/var/lib/pitwall")])),
            ConnectTarget::Local(PathBuf::from("/var/lib/pitwall"))
        );
    }

    #[test]
    fn description_hides_credentials() {
        let target = ConnectTarget::Cloud(CloudConfig::new("wss://db.example", "svc", "hunter2"));
        let text = target.describe();
        assert!(text.contains("wss://db.example"));
        assert!(!text.contains("hunter2"));
    }

    #[tokio::test]
    async fn in_memory_connection_applies_schema() {
        let db = connect_in_memory().await.expect("connect");
        // Schema init is idempotent
        migrations::init_schema(&db).await.expect("re-init schema");
    }
}
