//! chainship-deploy - Multi-chain contract deployment library.
//!
//! This crate drives an external contract toolchain over many chains, keeps a
//! JSON ledger of deployed addresses, and reports which deployments are missing.

mod config;
pub use config::{
    CONFIG_FILENAME, Chain, ChainConfig, DEFAULT_LEDGER_PATH, DeployConfig, ENV_PREFIX,
    RetryPolicy, ToolchainConfig,
};

mod contracts;
pub use contracts::{BUILTIN_CONTRACTS, ContractTable};

mod coverage;
pub use coverage::{CoverageReport, MissingDeployments};

mod error;
pub use error::DeployError;

mod fs;

mod ledger;
pub use ledger::{ChainEntry, Ledger, LedgerStore, METADATA_KEYS};

mod orchestrator;
pub use orchestrator::{ChainSelection, Orchestrator, PairOutcome, PairReport, RunSummary};

pub mod prompt;
pub use prompt::{ConsolePrompter, ExistingAction, Prompter};

pub mod runner;
pub use runner::{CommandRunner, Invocation, Outcome, ProcessRunner};

pub mod toolchain;
