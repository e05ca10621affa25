use std::path::PathBuf;

use chainship_deploy::{CONFIG_FILENAME, ContractTable};
use clap::{Parser, Subcommand};
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(name = "chainship")]
#[command(
    author,
    version,
    about = "Deploy and verify contracts across many chains, and keep track of where they live"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "CHAINSHIP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to the chainship configuration file.
    #[arg(long, alias = "conf", global = true, env = "CHAINSHIP_CONFIG", default_value = CONFIG_FILENAME)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Deploy and verify contracts, recording their addresses in the ledger.
    Deploy {
        /// The contracts to deploy, by canonical name (e.g. PeanutV4).
        #[arg(
            short,
            long = "contract",
            required = true,
            num_args = 1..,
            value_parser = known_contract
        )]
        contracts: Vec<String>,

        /// The chains to deploy to.
        ///
        /// If not provided, every configured chain is offered interactively.
        #[arg(long = "chain", num_args = 1..)]
        chains: Vec<String>,
    },

    /// Run an arbitrary script on the selected chains. The ledger is not updated.
    Run {
        /// Path to the script, optionally with a `:Contract` suffix.
        #[arg(long)]
        script: PathBuf,

        /// The chains to run the script on.
        ///
        /// If not provided, every configured chain is offered interactively.
        #[arg(long = "chain", num_args = 1..)]
        chains: Vec<String>,
    },

    /// Report which contracts are missing on which chains of the ledger.
    Check,

    /// Write a starter configuration file and an empty ledger.
    Init {
        /// Overwrite an existing configuration file.
        #[arg(long)]
        force: bool,
    },
}

fn known_contract(name: &str) -> Result<String, String> {
    let table = ContractTable::builtin();
    match table.short_key(name) {
        Ok(_) => Ok(name.to_string()),
        Err(err) => Err(format!(
            "{err}, expected one of: {}",
            table.names().collect::<Vec<_>>().join(", ")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_deploy_arguments() {
        let cli = Cli::parse_from([
            "chainship",
            "deploy",
            "-c",
            "PeanutV4",
            "PeanutBatcherV4",
            "--chain",
            "goerli",
            "sepolia",
        ]);

        match cli.command {
            Command::Deploy { contracts, chains } => {
                assert_eq!(contracts, vec!["PeanutV4", "PeanutBatcherV4"]);
                assert_eq!(chains, vec!["goerli", "sepolia"]);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.config, PathBuf::from(CONFIG_FILENAME));
    }

    #[test]
    fn test_deploy_rejects_unknown_contract() {
        let err = Cli::try_parse_from(["chainship", "deploy", "-c", "Nope"])
            .err()
            .unwrap();
        let message = err.to_string();
        assert!(message.contains("PeanutV3, PeanutV4, PeanutBatcherV4"), "{message}");
        assert!(Cli::try_parse_from(["chainship", "deploy"]).is_err());
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::parse_from(["chainship", "check", "--config", "other.toml", "-v", "debug"]);

        assert!(matches!(cli.command, Command::Check));
        assert_eq!(cli.config, PathBuf::from("other.toml"));
        assert_eq!(cli.verbosity, LevelFilter::DEBUG);
    }
}
