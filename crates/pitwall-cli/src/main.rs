//! Pitwall - league operations CLI
//!
//! The `pitwall` command drives team formation and roster notifications for
//! race events.
//!
//! ## Commands
//!
//! - `seed`: Load races, teams, and registrations from a TOML fixture
//! - `rebalance`: Recompute team assignments for a race
//! - `diff`: Preview the roster changes the next notification would report
//! - `notify`: Run one notification cycle for a race
//! - `rename-team`: Rename a team that has no chat thread yet
//! - `apply`: Commit an admin registration batch from a JSON file

mod config;
mod fixture;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use pitwall_chat::{
    ChatError, ChatResult, ChatService, EditOutcome, HttpChatClient, MessageSummary,
    OutgoingMessage,
};
use pitwall_core::metrics::METRICS;
use pitwall_core::{
    parse_admin_batch, NotificationReport, RaceCoordinator, RacePreview, RebalanceReport,
};
use pitwall_state::{LeagueStore, RaceId, SurrealLeagueStore, TeamId};
use serde::Serialize;
use tracing::{info, Level};

use crate::config::PitwallConfig;
use crate::fixture::{LeagueFixture, SeedSummary};

#[derive(Parser)]
#[command(name = "pitwall")]
#[command(author = "Pitwall Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "League team formation and roster notifications", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ./pitwall.toml when present)
    #[arg(long, global = true, env = "PITWALL_CONFIG")]
    config: Option<PathBuf>,

    /// User id the command runs as
    #[arg(long = "as", global = true, env = "PITWALL_ACTOR", default_value = "operator")]
    actor: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a league fixture into the store
    Seed {
        /// Path to the fixture (TOML)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Recompute team assignments for every class in a race
    Rebalance {
        /// Race id
        #[arg(short, long)]
        race: String,

        /// Run a notification cycle afterwards
        #[arg(long)]
        notify: bool,
    },

    /// Show the changes the next notification would report
    Diff {
        /// Race id
        #[arg(short, long)]
        race: String,
    },

    /// Post roster changes for a race to chat
    Notify {
        /// Race id
        #[arg(short, long)]
        race: String,
    },

    /// Rename a team
    RenameTeam {
        /// Team id
        #[arg(short, long)]
        team: String,

        /// New display name
        #[arg(short, long)]
        name: String,
    },

    /// Commit an admin registration batch
    Apply {
        /// Race id the batch belongs to
        #[arg(short, long)]
        race: String,

        /// Batch file (JSON: inserts, updates, deletes)
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    pitwall_core::telemetry::init_tracing(cli.json, level);

    let config = PitwallConfig::load(cli.config.as_deref())?;
    let store: Arc<dyn LeagueStore> = Arc::new(
        SurrealLeagueStore::from_env()
            .await
            .context("Failed to connect to Pitwall database")?,
    );

    let needs_chat = matches!(
        cli.command,
        Commands::Notify { .. } | Commands::Rebalance { notify: true, .. }
    );
    let chat = chat_service(&config, needs_chat)?;
    let coordinator = RaceCoordinator::new(Arc::clone(&store), chat, config.league.clone());
    let actor = config.actor(&cli.actor);
    let out = Output { json: cli.json };

    let result = match cli.command {
        Commands::Seed { file } => cmd_seed(store.as_ref(), &file, out).await,
        Commands::Rebalance { race, notify } => {
            let race_id = RaceId::from(race.as_str());
            let report = coordinator.rebalance_race(&actor, &race_id).await?;
            out.print(&report, render_rebalance)?;
            if notify {
                cmd_notify(&coordinator, &race_id, out).await
            } else {
                Ok(())
            }
        }
        Commands::Diff { race } => {
            let preview = coordinator
                .preview_changes(&RaceId::from(race.as_str()))
                .await?;
            out.print(&preview, render_preview)
        }
        Commands::Notify { race } => {
            cmd_notify(&coordinator, &RaceId::from(race.as_str()), out).await
        }
        Commands::RenameTeam { team, name } => {
            let team = coordinator
                .rename_team(&actor, &TeamId::from(team.as_str()), &name)
                .await?;
            println!("Team {} is now '{}'", team.id, team.name);
            Ok(())
        }
        Commands::Apply { race, file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read batch {}", file.display()))?;
            let batch = parse_admin_batch(&raw)?;
            let outcome = coordinator
                .apply_admin_changes(&actor, &RaceId::from(race.as_str()), batch)
                .await?;
            println!(
                "Inserted {}, updated {}, deleted {}",
                outcome.inserted, outcome.updated, outcome.deleted
            );
            Ok(())
        }
    };

    METRICS.flush();
    result
}

#[derive(Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn print<T: Serialize>(&self, value: &T, render: fn(&T) -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", render(value));
        }
        Ok(())
    }
}

/// Stand-in for commands that never talk to chat.
struct ChatDisabled;

impl ChatDisabled {
    fn error() -> ChatError {
        ChatError::Config("chat is not configured (set PITWALL_CHAT_TOKEN)".to_string())
    }
}

#[async_trait]
impl ChatService for ChatDisabled {
    async fn resource_exists(&self, _handle: &str) -> ChatResult<bool> {
        Err(Self::error())
    }

    async fn create_resource(
        &self,
        _parent_id: &str,
        _title: &str,
        _initial: &OutgoingMessage,
    ) -> ChatResult<String> {
        Err(Self::error())
    }

    async fn list_recent_messages(
        &self,
        _handle: &str,
        _limit: usize,
    ) -> ChatResult<Vec<MessageSummary>> {
        Err(Self::error())
    }

    async fn edit_message(
        &self,
        _handle: &str,
        _message_id: &str,
        _message: &OutgoingMessage,
    ) -> ChatResult<EditOutcome> {
        Err(Self::error())
    }

    async fn post_message(&self, _handle: &str, _message: &OutgoingMessage) -> ChatResult<String> {
        Err(Self::error())
    }

    async fn add_participants(&self, _handle: &str, _participant_ids: &[String]) -> ChatResult<()> {
        Err(Self::error())
    }
}

fn chat_service(config: &PitwallConfig, required: bool) -> Result<Arc<dyn ChatService>> {
    let chat_config = config.chat_config();
    if chat_config.token.is_none() && !required {
        return Ok(Arc::new(ChatDisabled));
    }
    let client = HttpChatClient::new(chat_config).context("Failed to set up chat client")?;
    Ok(Arc::new(client))
}

/// Load a fixture file into the store
async fn cmd_seed(store: &dyn LeagueStore, file: &Path, out: Output) -> Result<()> {
    info!("Seeding league data from {:?}", file);
    let fixture = LeagueFixture::load(file)?;
    let summary = fixture.apply(store).await?;
    out.print(&summary, render_seed)
}

/// Run one notification cycle and print its report
async fn cmd_notify(coordinator: &RaceCoordinator, race_id: &RaceId, out: Output) -> Result<()> {
    let report = coordinator.notify_race(race_id).await?;
    out.print(&report, render_notification)?;
    if !report.failures.is_empty() {
        anyhow::bail!(
            "{} chat step(s) failed for race {}; rerun notify to retry",
            report.failures.len(),
            race_id
        );
    }
    Ok(())
}

fn render_seed(summary: &SeedSummary) -> String {
    format!(
        "Seeded {} race(s), {} team(s), {} car class(es), {} registration(s) ({} already present)",
        summary.races, summary.teams, summary.car_classes, summary.registrations, summary.skipped
    )
}

fn render_rebalance(report: &RebalanceReport) -> String {
    let Some(capacity) = report.capacity else {
        return format!("Race {}: no team capacity set, nothing to assign", report.race_id);
    };
    let mut lines = vec![format!(
        "Race {} (up to {capacity} driver(s) per team)",
        report.race_id
    )];
    for class in &report.classes {
        let teams: Vec<&str> = class.teams.iter().map(TeamId::as_str).collect();
        let mut line = format!(
            "  {}: {} driver(s) across {}",
            class.car_class_id,
            class.drivers,
            teams.join(", ")
        );
        if let Some(stats) = class.balance {
            line.push_str(&format!(
                " [gap {:.1} -> {:.1}, {} swap(s)]",
                stats.seed_gap, stats.final_gap, stats.swaps
            ));
        }
        lines.push(line);
    }
    lines.push(format!(
        "{} assignment(s) changed, {} written",
        report.planned, report.written
    ));
    lines.join("\n")
}

fn render_preview(preview: &RacePreview) -> String {
    if preview.changes.is_empty() {
        return format!("Race {}: no roster changes since the last notification", preview.race_id);
    }
    let mut out = preview
        .summary
        .render(&format!("Pending changes for race {}", preview.race_id));
    if !preview.summary.teams_needing_thread.is_empty() {
        let teams: Vec<&str> = preview
            .summary
            .teams_needing_thread
            .iter()
            .map(TeamId::as_str)
            .collect();
        out.push_str(&format!("\nNew team threads: {}", teams.join(", ")));
    }
    out.push_str(&format!("\nFingerprint: {}", preview.pending.fingerprint()));
    out
}

fn render_notification(report: &NotificationReport) -> String {
    if report.is_noop() {
        return format!("Race {}: nothing to report", report.race_id);
    }
    let mut lines = vec![format!(
        "Race {}: {} change(s)",
        report.race_id,
        report.changes.len()
    )];
    match (&report.status, &report.event_thread) {
        (Some(status), Some(thread)) => {
            lines.push(format!("  status {} in thread {thread}", status.as_str()))
        }
        _ if report.changes.is_empty() => {}
        _ => lines.push("  status not delivered".to_string()),
    }
    for (team, thread) in &report.threads_created {
        lines.push(format!("  created thread {thread} for team {team}"));
    }
    for (team, thread) in &report.threads_replaced {
        lines.push(format!("  recreated thread {thread} for team {team}"));
    }
    for failure in &report.failures {
        lines.push(format!("  failed at {}: {}", failure.stage, failure.error));
    }
    if let Some(fingerprint) = &report.fingerprint {
        lines.push(format!("  snapshot {fingerprint}"));
    }
    lines.join("\n")
}
