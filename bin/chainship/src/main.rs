//! chainship deploys contracts across many chains and keeps a ledger of their addresses.

mod cli;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use chainship_deploy::{
    ChainSelection, ConsolePrompter, ContractTable, CoverageReport, DeployConfig, DeployError,
    Ledger, LedgerStore, Orchestrator, ProcessRunner,
};
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env before parsing so it can feed CHAINSHIP_* arguments.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    match dotenv {
        Ok(path) => tracing::debug!("Loaded environment variables from {:?}", path),
        Err(e) if e.not_found() => tracing::debug!("No .env file found"),
        Err(e) => anyhow::bail!("failed to load .env file: {}", e),
    }

    match cli.command {
        Command::Deploy { contracts, chains } => {
            let config = DeployConfig::load_from_file(&cli.config)?;
            let orchestrator = orchestrator(&config)?;

            let summary = orchestrator
                .deploy(&contracts, &ChainSelection::from_names(chains))
                .await
                .inspect_err(log_abort)?;
            print!("{summary}");
        }
        Command::Run { script, chains } => {
            let config = DeployConfig::load_from_file(&cli.config)?;
            let orchestrator = orchestrator(&config)?;

            let summary = orchestrator
                .run_script(&script, &ChainSelection::from_names(chains))
                .await
                .inspect_err(log_abort)?;
            print!("{summary}");
        }
        Command::Check => {
            let config = if cli.config.exists() {
                DeployConfig::load_from_file(&cli.config)?
            } else {
                tracing::debug!(path = %cli.config.display(), "No configuration file, using defaults");
                DeployConfig::default()
            };

            let ledger = Ledger::load_from_file(&config.ledger)?;
            if ledger.is_empty() {
                tracing::warn!(path = %config.ledger.display(), "Ledger has no chains yet");
            }
            let report = CoverageReport::build(&ledger, &ContractTable::builtin());
            print!("{report}");
        }
        Command::Init { force } => init(&cli.config, force)?,
    }

    Ok(())
}

fn orchestrator(
    config: &DeployConfig,
) -> Result<Orchestrator<'_, ProcessRunner, ConsolePrompter>> {
    let ledger = LedgerStore::open(&config.ledger)?;

    tracing::info!(
        ledger = %ledger.path().display(),
        chains = config.chains.len(),
        "Ledger opened"
    );

    Ok(Orchestrator::new(
        config,
        ContractTable::builtin(),
        ledger,
        ProcessRunner,
        ConsolePrompter,
    ))
}

fn log_abort(err: &anyhow::Error) {
    if err
        .downcast_ref::<DeployError>()
        .is_some_and(DeployError::is_fatal)
    {
        tracing::error!(%err, "Run aborted, the ledger cannot be used");
    }
}

/// Write the starter configuration and, if absent, an empty ledger.
fn init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file {} already exists, use --force to overwrite it",
            config_path.display()
        );
    }

    let config = DeployConfig::starter();
    config.save_to_file(config_path)?;

    if config.ledger.exists() {
        tracing::info!(path = %config.ledger.display(), "Keeping existing ledger");
    } else {
        Ledger::default()
            .save_to_file(&config.ledger)
            .with_context(|| format!("Failed to create ledger {}", config.ledger.display()))?;
        tracing::info!(path = %config.ledger.display(), "Empty ledger created");
    }

    Ok(())
}
