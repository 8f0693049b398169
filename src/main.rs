//! File Sync Homelab - command line front-end
//!
//! Configures the sync target, runs one-off transfers, and watches the local
//! folder until interrupted. With `--json`, status events and command results
//! are written to stdout as JSON lines for a GUI to consume.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use file_sync_homelab::services::sync::{
    EventSink, JsonLinesSink, RsyncTransfer, TracingSink, DEFAULT_DEBOUNCE_MS,
};
use file_sync_homelab::storage::ConfigService;
use file_sync_homelab::{parse_ignore_list, AppState, CommandResponse, SyncSettings, WatchStatus};

#[derive(Parser, Debug)]
#[command(name = "file-sync-homelab")]
#[command(about = "Mirror a local folder to a homelab server over SSH whenever it changes")]
#[command(version)]
struct Cli {
    /// Settings file (defaults to ~/.file-sync-homelab-config.json)
    #[arg(long, global = true, env = "FILE_SYNC_HOMELAB_CONFIG")]
    config: Option<PathBuf>,

    /// Write events and results to stdout as JSON lines
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the saved settings
    Show,

    /// Update and save settings (the connection is checked first)
    Configure {
        /// Local folder to watch
        #[arg(long)]
        local_folder: Option<String>,

        /// SSH destination, e.g. user@homelab
        #[arg(long)]
        ssh_connection: Option<String>,

        /// Folder on the remote host
        #[arg(long)]
        remote_path: Option<String>,

        /// Exclude pattern (repeatable); replaces the saved list
        #[arg(long = "ignore", value_name = "PATTERN")]
        ignore: Vec<String>,

        /// File with one exclude pattern per line; replaces the saved list
        #[arg(long, value_name = "FILE")]
        ignore_file: Option<PathBuf>,

        /// How long a front-end keeps its activity log
        #[arg(long)]
        log_retention_minutes: Option<u32>,

        /// Save without checking the connection
        #[arg(long, default_value = "false")]
        skip_check: bool,
    },

    /// Check that the remote host is reachable and the remote folder exists
    TestConnection,

    /// Mirror the whole folder now, deleting remote files that no longer exist
    Sync,

    /// Copy one file or folder without deleting anything
    SyncFile {
        /// Path inside the local folder (absolute or relative to it)
        path: PathBuf,
    },

    /// Watch the local folder and mirror it on every change until Ctrl-C
    Watch {
        /// Quiet period after the last change before a mirror starts
        #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS)]
        debounce_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // logs go to stderr so stdout stays machine readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let json_sink = if cli.json {
        Some(Arc::new(
            JsonLinesSink::stdout().context("failed to start the JSON event writer")?,
        ))
    } else {
        None
    };
    let sink: Arc<dyn EventSink> = match &json_sink {
        Some(json_sink) => json_sink.clone(),
        None => Arc::new(TracingSink),
    };

    let config = match &cli.config {
        Some(path) => ConfigService::open(path.clone()),
        None => ConfigService::new(),
    }
    .context("failed to open settings")?;

    let json = cli.json;
    let debounce = match &cli.command {
        Commands::Watch { debounce_ms } => Duration::from_millis(*debounce_ms),
        _ => Duration::from_millis(DEFAULT_DEBOUNCE_MS),
    };
    let state = AppState::new(config, Arc::new(RsyncTransfer::new()), sink).with_debounce(debounce);

    let result = run(cli.command, &state, json).await;
    // queued event lines reach stdout before we exit
    if let Some(json_sink) = json_sink {
        json_sink.close();
    }
    result
}

async fn run(command: Commands, state: &AppState, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Show => {
            let settings = state.get_settings().await;
            report(json, Ok(settings), |s| {
                serde_json::to_string_pretty(s).unwrap_or_default()
            })
        }

        Commands::Configure {
            local_folder,
            ssh_connection,
            remote_path,
            ignore,
            ignore_file,
            log_retention_minutes,
            skip_check,
        } => {
            let mut settings = state.get_settings().await;
            if let Some(v) = local_folder {
                settings.local_folder = v;
            }
            if let Some(v) = ssh_connection {
                settings.ssh_connection = v;
            }
            if let Some(v) = remote_path {
                settings.remote_path = v;
            }
            if let Some(v) = log_retention_minutes {
                settings.log_retention_minutes = Some(v);
            }
            if let Some(file) = ignore_file {
                let text = std::fs::read_to_string(&file)
                    .with_context(|| format!("failed to read {}", file.display()))?;
                let mut patterns = parse_ignore_list(&text);
                patterns.extend(ignore.iter().map(|p| p.trim().to_string()));
                settings.ignore_list = patterns;
            } else if !ignore.is_empty() {
                settings.ignore_list = ignore;
            }

            let result = state.save_settings(settings, !skip_check).await;
            report(json, result, |s: &SyncSettings| {
                format!("Saved settings for {}", s.local_folder)
            })
        }

        Commands::TestConnection => {
            let settings = state.get_settings().await;
            let result = state
                .test_connection(&settings.ssh_connection, &settings.remote_path)
                .await
                .map(|_| format!("{}:{} is reachable", settings.ssh_connection, settings.remote_path));
            report(json, result, String::clone)
        }

        Commands::Sync => {
            let result = state.sync_entire_folder().await;
            report(json, result, String::clone)
        }

        Commands::SyncFile { path } => {
            let result = state.sync_file(&path).await;
            report(json, result, String::clone)
        }

        Commands::Watch { .. } => {
            let root = state
                .start_watching()
                .await
                .context("failed to start watching")?;
            info!(root = %root.display(), "Watching, press Ctrl-C to stop");
            if json {
                let dirs = state.watched_dirs().await.len();
                print_json(&CommandResponse::ok(WatchStatus {
                    watching: true,
                    root: Some(root.to_string_lossy().to_string()),
                    watched_dirs: dirs,
                }));
            }

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            info!("Stopping");

            if let Some(handle) = state.stop_watching().await {
                let stats = handle.finished().await;
                info!(
                    events = stats.events,
                    ignored = stats.ignored,
                    transfers = stats.transfers,
                    failures = stats.failures,
                    "Watch session ended"
                );
            }
            Ok(())
        }
    }
}

/// Print a command result and turn failures into a non-zero exit
fn report<T: Serialize>(
    json: bool,
    result: file_sync_homelab::AppResult<T>,
    human: impl Fn(&T) -> String,
) -> anyhow::Result<()> {
    if json {
        let failure = result.as_ref().err().map(|e| e.to_string());
        print_json(&CommandResponse::from(result));
        if let Some(message) = failure {
            bail!(message);
        }
        return Ok(());
    }

    match result {
        Ok(data) => {
            let text = human(&data);
            if !text.trim().is_empty() {
                println!("{}", text.trim_end());
            }
            Ok(())
        }
        Err(e) => bail!(e),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::error!("Failed to serialize result: {}", e),
    }
}
