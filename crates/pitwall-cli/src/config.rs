//! `pitwall.toml` loading.
//!
//! ```toml
//! admins = ["1234"]
//!
//! [league]
//! parent_channel_id = "987654321"
//! primary_rating_category = "sports_car"
//!
//! [chat]
//! api_base = "https://discord.com/api/v10"
//! bot_user_id = "555"
//! ```
//!
//! Secrets (the chat token, database credentials) stay in the environment.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pitwall_chat::ChatConfig;
use pitwall_core::{Actor, CoordinatorConfig};
use serde::Deserialize;

/// Looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "pitwall.toml";

/// Non-secret chat settings
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub api_base: Option<String>,
    pub bot_user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PitwallConfig {
    pub league: CoordinatorConfig,
    pub chat: ChatSection,
    /// User ids allowed to run admin commands; empty means any operator
    pub admins: Vec<String>,
}

impl PitwallConfig {
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).context("Invalid pitwall configuration")
    }

    /// Load an explicit path, else `pitwall.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Self::default());
                }
                fallback
            }
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("In {}", path.display()))
    }

    /// Chat client settings: environment first, then this file.
    pub fn chat_config(&self) -> ChatConfig {
        let mut config = ChatConfig::from_env();
        if std::env::var_os("PITWALL_CHAT_API").is_none() {
            if let Some(api_base) = &self.chat.api_base {
                config.api_base = api_base.trim_end_matches('/').to_string();
            }
        }
        if config.bot_user_id.is_none() {
            config.bot_user_id = self.chat.bot_user_id.clone();
        }
        config
    }

    pub fn actor(&self, user_id: &str) -> Actor {
        if self.admins.is_empty() || self.admins.iter().any(|a| a == user_id) {
            Actor::admin(user_id)
        } else {
            Actor::member(user_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_file_gives_defaults() {
        let config = PitwallConfig::from_toml("").unwrap();
        assert_eq!(config, PitwallConfig::default());
        assert_eq!(config.league.message_window, 50);
    }

    #[test]
    fn league_section_overrides_coordinator_defaults() {
        let config = PitwallConfig::from_toml(
            r#"
            admins = ["42"]

            [league]
            parent_channel_id = "chan-9"
            primary_rating_category = "formula_car"

            [chat]
            bot_user_id = "bot-1"
            "#,
        )
        .unwrap();
        assert_eq!(config.league.parent_channel_id, "chan-9");
        assert_eq!(config.league.primary_rating_category.as_deref(), Some("formula_car"));
        assert_eq!(config.league.status_marker, "roster-status");
        assert_eq!(config.chat.bot_user_id.as_deref(), Some("bot-1"));
        assert!(config.actor("42").is_admin);
        assert!(!config.actor("43").is_admin);
    }

    #[test]
    fn anyone_is_admin_without_an_admin_list() {
        assert!(PitwallConfig::default().actor("anyone").is_admin);
    }

    #[test]
    fn load_reads_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[league]\nmessage_window = 10").unwrap();
        let config = PitwallConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.league.message_window, 10);
    }

    #[test]
    fn load_rejects_missing_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = PitwallConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read config"));
    }

    #[test]
    fn malformed_toml_is_reported() {
        let err = PitwallConfig::from_toml("[league\n").unwrap_err();
        assert!(format!("{err:#}").contains("Invalid pitwall configuration"));
    }
}
