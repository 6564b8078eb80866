use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use playlist_merge as lib;
use lib::api::spotify::SpotifyCatalog;
use lib::api::Catalog;
use lib::config::Config;
use lib::merge::{MergeOrchestrator, MergeSettings, MergeSnapshot, MergeStatus};
use lib::models::{Credential, Selection};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::subscriber as tracing_subscriber_global;
use tracing_appender::rolling::RollingFileAppender;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "playlist-merge", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Access token to use instead of SPOTIFY_ACCESS_TOKEN or the stored token
    #[arg(long, value_name = "TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize in the browser and store an access token (interactive)
    Auth,
    /// Show the user the access token belongs to
    Whoami,
    /// List your playlists
    Playlists,
    /// Merge playlists into a new one without duplicates
    Merge {
        /// Ids of the playlists to merge (see `playlists`)
        #[arg(value_name = "ID", required_unless_present = "all")]
        ids: Vec<String>,

        /// Merge every playlist in your library
        #[arg(long, conflicts_with = "ids")]
        all: bool,
    },
    /// Validate config file and exit
    ConfigValidate,
}

fn resolve_config(explicit: Option<&PathBuf>) -> Result<Config> {
    if let Some(p) = explicit {
        return Config::load(p).with_context(|| format!("loading config from {}", p.display()));
    }
    let user_path = dirs::config_dir().map(|d| d.join("playlist-merge").join("config.toml"));
    match user_path {
        Some(p) if p.exists() => {
            Config::load(&p).with_context(|| format!("loading config from {}", p.display()))
        }
        _ => Ok(Config::from_env()),
    }
}

fn init_logging(cfg: &Config) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // log -> tracing bridge; the transport logs through the `log` facade.
    let _ = LogTracer::init();
    std::fs::create_dir_all(&cfg.log_dir)
        .with_context(|| format!("creating log dir {}", cfg.log_dir.display()))?;
    let file_appender: RollingFileAppender =
        tracing_appender::rolling::daily(&cfg.log_dir, "playlist-merge.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Honor RUST_LOG if set, otherwise default to info.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(fmt::layer().with_writer(std::io::stderr));
    tracing_subscriber_global::set_global_default(subscriber)
        .context("installing global tracing subscriber")?;
    Ok(guard)
}

fn resolve_credential(cli_token: Option<String>, cfg: &Config) -> Result<Credential> {
    if let Some(t) = cli_token.filter(|t| !t.trim().is_empty()) {
        return Ok(Credential::new(t));
    }
    if let Ok(t) = std::env::var("SPOTIFY_ACCESS_TOKEN") {
        if !t.trim().is_empty() {
            return Ok(Credential::new(t));
        }
    }
    lib::auth::load_credential(cfg)
}

/// Extra advice for failures the user can fix by logging in again.
fn failure_hint(e: &anyhow::Error) -> Option<&'static str> {
    e.downcast_ref::<lib::error::Error>()
        .filter(|e| e.requires_reauth())
        .map(|_| "Run `playlist-merge auth` to log in again.")
}

fn render(s: &MergeSnapshot) {
    match s.status {
        MergeStatus::Idle => {}
        MergeStatus::Success | MergeStatus::Error => println!("[{:>3}%] {:?}: {}", s.progress, s.status, s.message),
        _ => println!("[{:>3}%] {}", s.progress, s.message),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let cfg = match resolve_config(cli.config.as_ref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let log_guard = match init_logging(&cfg) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match run(cli, cfg).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            if let Some(hint) = failure_hint(&e) {
                eprintln!("{}", hint);
            }
            ExitCode::FAILURE
        }
    };
    // flush buffered file logs before the process ends
    drop(log_guard);
    code
}

async fn run(cli: Cli, cfg: Config) -> Result<ExitCode> {
    if !matches!(cli.command, Commands::ConfigValidate) {
        cfg.validate().context("invalid config")?;
    }

    match cli.command {
        Commands::ConfigValidate => {
            if let Err(e) = cfg.validate() {
                eprintln!("Config validation failed: {}", e);
                return Ok(ExitCode::from(2));
            }
            println!("OK");
        }
        Commands::Auth => {
            lib::auth::run_auth(&cfg).await.context("running authorization")?;
        }
        Commands::Whoami => {
            let catalog = SpotifyCatalog::from_config(resolve_credential(cli.token, &cfg)?, &cfg);
            let user = catalog.current_user().await?;
            println!(
                "{} ({})",
                user.display_name.as_deref().unwrap_or(&user.id),
                user.id
            );
        }
        Commands::Playlists => {
            let catalog = SpotifyCatalog::from_config(resolve_credential(cli.token, &cfg)?, &cfg);
            let user = catalog.current_user().await?;
            let playlists = catalog.list_user_playlists(&user.id).await?;
            for p in &playlists {
                println!("{}\t{:>5}\t{}", p.id, p.track_count, p.name);
            }
            println!("{} playlist(s)", playlists.len());
        }
        Commands::Merge { ids, all } => {
            let catalog: Arc<dyn Catalog> = Arc::new(SpotifyCatalog::from_config(
                resolve_credential(cli.token, &cfg)?,
                &cfg,
            ));
            let user = catalog.current_user().await?;
            let playlists = catalog.list_user_playlists(&user.id).await?;

            let mut selection = if all {
                let mut s = Selection::new();
                s.toggle_all(&playlists);
                s
            } else {
                Selection::from_ids(ids.iter().cloned())
            };
            for id in ids.iter().filter(|id| !playlists.iter().any(|p| &p.id == *id)) {
                eprintln!("Skipping unknown playlist id {}", id);
            }
            let selected = selection.resolve(&playlists).len();
            if selected == 0 {
                eprintln!("None of the given playlists were found in your library.");
                return Ok(ExitCode::FAILURE);
            }
            if selected < 2 {
                eprintln!("Only one playlist selected; the result is a de-duplicated copy.");
            }

            let mut orchestrator = MergeOrchestrator::new(catalog, user.id, MergeSettings::from(&cfg));
            let mut events = orchestrator.subscribe();
            let renderer = tokio::spawn(async move {
                loop {
                    match events.recv().await {
                        Ok(s) => render(&s),
                        Err(RecvError::Lagged(n)) => tracing::debug!("skipped {} progress updates", n),
                        Err(RecvError::Closed) => break,
                    }
                }
            });

            let outcome = orchestrator.run(&mut selection, &playlists).await?;
            drop(orchestrator);
            let _ = renderer.await;

            if outcome.status != MergeStatus::Success {
                if outcome.reauth_required {
                    eprintln!("Run `playlist-merge auth` to log in again.");
                }
                return Ok(ExitCode::FAILURE);
            }
            if let Some(url) = &outcome.result_url {
                println!("Open: {}", url);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
