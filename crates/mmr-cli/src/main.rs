//! Command-line admin client for a Matrix media repository.
//!
//! Connection settings come from `config.json` (or `MMR_CONFIG_PATH`) and the flat
//! `.mmr-admin` file (or `MMR_SETTINGS_PATH`, overridable with `MMR_HOMESERVER_URL` and
//! `MMR_ACCESS_TOKEN`). Run `mmr configure` to write them.

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use mmr_api_client::{ApiClient, CredentialValidator, ValidationState};
use mmr_cli::{format_task_list, format_task_row, init_tracing, parse_cutoff};
use mmr_core::models::PurgeScope;
use mmr_core::{
    AdminError, ConfigPaths, ConfigResolver, ConnectionConfig, ErrorMetadata, FlatSettings,
    LogLevel, StructuredConfig,
};
use mmr_tasks::{PollConfig, TaskMonitor, TaskViews};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "mmr", about = "Media repository admin CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save the homeserver URL and access token
    Configure {
        /// Homeserver base URL, e.g. https://matrix.example.org
        #[arg(long)]
        url: String,
        /// Access token of a repository admin
        #[arg(long)]
        token: String,
        /// Write the flat key/value settings file instead of config.json
        #[arg(long)]
        flat: bool,
    },
    /// Check that the saved credentials belong to a repository admin
    Validate,
    /// Storage usage of this server
    Stats,
    /// Reachability and datastore health
    Health,
    /// Uploads of this server
    Media {
        /// Maximum number of media entries to print
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Per-user storage usage
    Users {
        /// Only this user, e.g. @alice:example.org
        #[arg(long)]
        user_id: Option<String>,
    },
    /// Configured datastores
    Datastores {
        /// Also fetch the size estimate of each datastore
        #[arg(long)]
        estimates: bool,
    },
    /// Move all media from one datastore to another (starts a background task)
    Migrate {
        /// Source datastore ID
        from: String,
        /// Target datastore ID
        to: String,
    },
    /// Delete one piece of media
    DeleteMedia {
        /// Media ID on this server
        media_id: String,
    },
    /// Quarantine one piece of media
    Quarantine {
        /// Media ID on this server
        media_id: String,
    },
    /// Download media to a file
    Download {
        /// Origin server name of the media
        server_name: String,
        /// Media ID
        media_id: String,
        /// Output file
        #[arg(long, short)]
        output: PathBuf,
    },
    /// Bulk delete media
    Purge {
        #[command(subcommand)]
        scope: PurgeCommands,
    },
    /// Background tasks
    Tasks {
        #[command(subcommand)]
        sub: TaskCommands,
    },
}

#[derive(Subcommand)]
enum PurgeCommands {
    /// Cached remote media older than the cutoff
    Remote {
        /// Millis, RFC 3339 or an age like 30d
        #[arg(long)]
        before: String,
    },
    /// All quarantined media
    Quarantined,
    /// Media not accessed since the cutoff
    Old {
        #[arg(long)]
        before: String,
        /// Include media uploaded by local users
        #[arg(long)]
        include_local: bool,
    },
    /// Media uploaded by a user
    User {
        user_id: String,
        #[arg(long)]
        before: String,
    },
    /// Media referenced in a room
    Room {
        room_id: String,
        #[arg(long)]
        before: String,
    },
    /// Media from a remote server
    Server {
        server_name: String,
        #[arg(long)]
        before: String,
    },
}

#[derive(Subcommand)]
enum TaskCommands {
    /// Every known task
    All,
    /// Tasks still running
    Unfinished,
    /// One task
    Show { task_id: i64 },
    /// Poll task lists until Ctrl-C
    Watch {
        /// Poll interval in seconds
        #[arg(long, default_value = "5")]
        interval: u64,
        /// Also follow one task
        #[arg(long)]
        task_id: Option<i64>,
    },
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

fn load_connection() -> anyhow::Result<ConnectionConfig> {
    let paths = ConfigPaths::from_env();
    let resolver = ConfigResolver::load(&paths).context("Failed to read saved configuration")?;
    resolver.resolve().context(
        "No usable configuration. Run `mmr configure --url <homeserver> --token <token>`",
    )
}

fn build_client() -> anyhow::Result<ApiClient> {
    let client = ApiClient::new(load_connection()?).context("Failed to create API client")?;
    tracing::debug!(server_name = %client.server_name(), "Using homeserver {}", client.base_url());
    Ok(client)
}

impl PurgeCommands {
    fn into_scope(self) -> anyhow::Result<PurgeScope> {
        let now = Utc::now();
        Ok(match self {
            PurgeCommands::Remote { before } => PurgeScope::RemoteBefore {
                before_ts: parse_cutoff(&before, now)?,
            },
            PurgeCommands::Quarantined => PurgeScope::Quarantined,
            PurgeCommands::Old {
                before,
                include_local,
            } => PurgeScope::StaleBefore {
                before_ts: parse_cutoff(&before, now)?,
                include_local,
            },
            PurgeCommands::User { user_id, before } => PurgeScope::ByUser {
                user_id,
                before_ts: parse_cutoff(&before, now)?,
            },
            PurgeCommands::Room { room_id, before } => PurgeScope::ByRoom {
                room_id,
                before_ts: parse_cutoff(&before, now)?,
            },
            PurgeCommands::Server {
                server_name,
                before,
            } => PurgeScope::ByServer {
                server_name,
                before_ts: parse_cutoff(&before, now)?,
            },
        })
    }
}

async fn watch_tasks(client: ApiClient, interval: u64, task_id: Option<i64>) -> anyhow::Result<()> {
    let monitor = Arc::new(TaskMonitor::new(client));
    if let Some(task_id) = task_id {
        // failures land on the detail view and are printed with it
        let _ = monitor.get_detail(task_id).await;
    }

    let handle = monitor.clone().start_polling(PollConfig {
        interval: Duration::from_secs(interval.max(1)),
        views: TaskViews::EVERYTHING,
    });
    let mut updates = handle.updates();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let Some(snapshot) = updates.borrow_and_update().clone() else {
                    continue;
                };
                let now = snapshot.taken_at;
                println!("{}", format_task_list("Unfinished", &snapshot.unfinished, now));
                println!("{}", format_task_list("All", &snapshot.all, now));
                if let Some(detail) = &snapshot.selected {
                    match (&detail.task, &detail.error) {
                        (_, Some(error)) => println!("Task {}: ! {}", detail.task_id, error),
                        (Some(task), None) => println!("Task {}:\n{}", detail.task_id, format_task_row(task, now)),
                        (None, None) => {}
                    }
                }
                println!();
            }
        }
    }

    handle.stop().await;
    Ok(())
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Configure { url, token, flat } => {
            let config = ConnectionConfig::new(url, token)?;
            let paths = ConfigPaths::from_env();
            let path = if flat {
                FlatSettings::from(&config).save(&paths.flat)?;
                paths.flat
            } else {
                StructuredConfig::from(&config).save(&paths.structured)?;
                paths.structured
            };
            print_json(&serde_json::json!({
                "saved": path.display().to_string(),
                "homeserver": config.base_url(),
            }))?;
        }
        Commands::Validate => {
            let config = load_connection()?;
            let mut validator = CredentialValidator::new()?;
            let state = validator.validate(&config).await.clone();
            print_json(&state)?;
            if let ValidationState::Failed(failure) = state {
                anyhow::bail!("Credential validation failed: {}", failure);
            }
        }
        Commands::Stats => {
            let client = build_client()?;
            print_json(&client.server_stats().await?)?;
        }
        Commands::Health => {
            let client = build_client()?;
            print_json(&client.server_health().await)?;
        }
        Commands::Media { limit } => {
            let client = build_client()?;
            let mut summary = client.list_media_summary().await?;
            if let Some(limit) = limit {
                summary.media.truncate(limit);
            }
            print_json(&summary)?;
        }
        Commands::Users { user_id } => {
            let client = build_client()?;
            match user_id {
                Some(user_id) => match client.user_usage(&user_id).await? {
                    Some(usage) => print_json(&usage)?,
                    None => anyhow::bail!("No usage recorded for {}", user_id),
                },
                None => print_json(&client.all_users_usage().await?)?,
            }
        }
        Commands::Datastores { estimates } => {
            let client = build_client()?;
            let datastores = if estimates {
                client.list_datastores_with_estimates().await?
            } else {
                client.list_datastores().await?
            };
            print_json(&datastores)?;
        }
        Commands::Migrate { from, to } => {
            let client = build_client()?;
            print_json(&client.migrate_datastore(&from, &to).await?)?;
        }
        Commands::DeleteMedia { media_id } => {
            let client = build_client()?;
            print_json(&client.delete_media(&media_id).await?)?;
        }
        Commands::Quarantine { media_id } => {
            let client = build_client()?;
            print_json(&client.quarantine_media(&media_id).await?)?;
        }
        Commands::Download {
            server_name,
            media_id,
            output,
        } => {
            let client = build_client()?;
            let bytes = client.download_media(&server_name, &media_id).await?;
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("Failed to write {}", output.display()))?;
            print_json(&serde_json::json!({
                "saved": output.display().to_string(),
                "size_bytes": bytes.len(),
            }))?;
        }
        Commands::Purge { scope } => {
            let client = build_client()?;
            let scope = scope.into_scope()?;
            print_json(&client.purge(&scope).await?)?;
        }
        Commands::Tasks { sub } => {
            let client = build_client()?;
            match sub {
                TaskCommands::All => print_json(&client.list_all_tasks().await?)?,
                TaskCommands::Unfinished => print_json(&client.list_unfinished_tasks().await?)?,
                TaskCommands::Show { task_id } => print_json(&client.task_detail(task_id).await?)?,
                TaskCommands::Watch { interval, task_id } => {
                    watch_tasks(client, interval, task_id).await?
                }
            }
        }
    }

    Ok(())
}

fn report(err: &anyhow::Error) {
    let Some(admin) = err.chain().find_map(|e| e.downcast_ref::<AdminError>()) else {
        return;
    };
    match admin.log_level() {
        LogLevel::Debug => tracing::debug!(code = admin.error_code(), "{}", admin),
        LogLevel::Warn => tracing::warn!(code = admin.error_code(), "{}", admin),
        LogLevel::Error => tracing::error!(code = admin.error_code(), "{}", admin),
    }
    if let Some(action) = admin.suggested_action() {
        eprintln!("hint: {}", action);
    }
    if admin.is_recoverable() {
        eprintln!("hint: this error may be temporary, retrying can help");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = run(cli.command).await;
    if let Err(err) = &result {
        report(err);
    }
    result
}
