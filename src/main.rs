//! AI Pupil - teach a simulated student JavaScript and track what it remembers.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use ai_pupil::ai::{AiClient, AiError, TranscriptCompressor};
use ai_pupil::config::{AppConfig, ConfigError, ConfigLoader};
use ai_pupil::display;
use ai_pupil::knowledge::{apply_decay, xp_to_next_level};
use ai_pupil::server::{AppState, PupilServer, ServerError};
use ai_pupil::session::KnowledgeView;
use ai_pupil::store::{PupilStore, StoreError};

/// Elapsed days shown by `decay-preview` when none are given.
const DEFAULT_PREVIEW_DAYS: [i64; 9] = [0, 3, 4, 7, 10, 14, 21, 30, 60];

/// Longest gap `decay-preview` accepts, about a century.
const MAX_PREVIEW_DAYS: i64 = 36_500;

#[derive(Parser)]
#[command(
    name = "ai-pupil",
    about = "Teach a simulated AI student and track what it remembers",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to a config file instead of the default search locations.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        /// Address to bind to.
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show an agent's level, XP and decay-corrected knowledge.
    Inspect {
        /// Agent ID.
        agent_id: Uuid,
        /// Database file to read.
        #[arg(long)]
        database: Option<PathBuf>,
    },
    /// Show how an understanding level decays over time.
    DecayPreview {
        /// Starting understanding level.
        #[arg(short, long)]
        level: f64,
        /// Days since last review to evaluate.
        #[arg(
            short,
            long,
            num_args = 1..,
            value_parser = clap::value_parser!(i64).range(0..=MAX_PREVIEW_DAYS)
        )]
        days: Vec<i64>,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error(transparent)]
    Server(#[from] ServerError),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => ConfigLoader::with_path(path).load(),
        None => ConfigLoader::new().load(),
    }
}

async fn serve(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), CliError> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let db_path = config.database.resolved_path();
    let store = PupilStore::open(&db_path).await?;
    tracing::info!(path = %db_path.display(), "Opened database");

    let client = AiClient::from_config(config.ai.clone())?.with_compressor(
        TranscriptCompressor::new(config.tutor.history_messages, config.tutor.history_chars),
    );
    tracing::info!(
        provider = ?client.provider_kind(),
        model = %client.model(),
        "Student generator ready"
    );

    let state = AppState::new(
        store,
        Arc::new(client),
        &config.tutor,
        &config.rate_limit,
    );

    let cancel = state.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Received Ctrl-C, shutting down");
        }
        cancel.cancel();
    });

    PupilServer::new(state)
        .with_config(config.server)
        .run()
        .await?;
    Ok(())
}

async fn inspect(
    config: &AppConfig,
    agent_id: Uuid,
    database: Option<PathBuf>,
) -> Result<(), CliError> {
    let path = database.unwrap_or_else(|| config.database.resolved_path());
    let store = PupilStore::open(&path).await?;

    let agent = store.get_agent(agent_id).await?;
    let now = Utc::now();
    let knowledge: Vec<KnowledgeView> = store
        .list_knowledge(agent_id)
        .await?
        .iter()
        .map(|row| KnowledgeView::from_row(row, now))
        .collect();
    let next = xp_to_next_level(agent.total_xp, agent.level, &config.tutor.level_thresholds);

    display::print_agent_report(&agent, next, &knowledge);
    Ok(())
}

/// Decayed level after each gap. Gaps outside chrono's range are skipped.
fn decay_rows(level: f64, days: &[i64], now: DateTime<Utc>) -> Vec<(i64, f64)> {
    days.iter()
        .filter_map(|&d| {
            let reviewed = Duration::try_days(d).and_then(|gap| now.checked_sub_signed(gap))?;
            Some((d, apply_decay(reviewed, level, now)))
        })
        .collect()
}

fn decay_preview(level: f64, days: &[i64]) {
    let days = if days.is_empty() {
        DEFAULT_PREVIEW_DAYS.as_slice()
    } else {
        days
    };
    let rows = decay_rows(level, days, Utc::now());
    display::print_decay_preview(level, &rows);
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Inspect { agent_id, database } => inspect(&config, agent_id, database).await,
        Commands::DecayPreview { level, days } => {
            decay_preview(level, &days);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            display::print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
