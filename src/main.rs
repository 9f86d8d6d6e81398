//! branch-pruner - prune fully-merged remote branches
//!
//! Mirrors every configured repository, deletes the remote branches that are
//! already contained in master, and reports each deletion to Slack. Meant to be
//! run periodically by a scheduler; every run starts from a fresh fetch.

use branch_pruner::config::Config;
use branch_pruner::credentials::{CredentialProvider, StoredCredentialProvider};
use branch_pruner::notifier;
use branch_pruner::runner::Runner;
use clap::Parser;
use color_eyre::eyre::{Context, Result};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{info, info_span, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Prune fully-merged remote branches across configured repositories
#[derive(Parser, Debug)]
#[command(name = "branch-pruner")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Never push deletions, whatever the configuration says
    #[arg(long)]
    dry_run: bool,

    /// Only process the named repositories (repeatable)
    #[arg(long = "repo", value_name = "NAME")]
    repos: Vec<String>,

    /// Print the effective configuration and exit
    #[arg(long)]
    show_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    color_eyre::install()?;
    init_logging(&args)?;

    let config_path = Config::resolve_path(args.config.as_deref())?;
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    if args.dry_run {
        config.push_deletes_to_remote = false;
    }

    if args.show_config {
        println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    let repositories = config.select_repositories(&args.repos)?;

    let run_id = uuid::Uuid::new_v4();
    let span = info_span!("run", %run_id);
    let _guard = span.enter();

    info!(
        "Pruning {} repositories from {} (push deletes: {})",
        repositories.len(),
        config_path.display(),
        config.push_deletes_to_remote
    );
    if !config.push_deletes_to_remote {
        warn!("PushDeletesToRemote is off; merged branches will only be logged");
    }

    let credentials = StoredCredentialProvider::new().credentials();
    let notifier = notifier::from_config(&config);
    let runner = Runner::from_config(&config, credentials, notifier.as_ref());

    runner.run(&repositories);
    Ok(())
}

/// Console logging by default, plain-text file logging with `--log-file`
fn init_logging(args: &Args) -> Result<()> {
    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    match &args.log_file {
        Some(path) => {
            let log_file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file: {}", path.display()))?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(Mutex::new(log_file)),
                )
                .init();
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }

    Ok(())
}
