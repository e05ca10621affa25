//! Error taxonomy for a deployment run.
//!
//! Most variants are scoped to a single (contract, chain) pair and end up in the
//! run summary. [`DeployError::LedgerMissing`] and [`DeployError::LedgerCorrupt`]
//! are fatal and abort the whole run.

use std::path::PathBuf;

/// A failure that happened while processing one deployment target.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeployError {
    /// The chain name is not present in the configuration.
    #[error("unknown chain `{0}`")]
    UnknownChain(String),

    /// The contract name is not present in the short-key table.
    #[error("unknown contract `{0}`")]
    UnknownContract(String),

    /// The chain is configured but lacks an endpoint or a verification key.
    #[error("chain `{chain}` has no {missing} configured")]
    MissingCredential { chain: String, missing: &'static str },

    /// The toolchain exited with a non-zero status.
    #[error("`{command}` failed with exit code {}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    /// The toolchain binary could not be started at all.
    #[error("failed to start `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    /// The block explorer kept failing to detect the deployment.
    #[error("block explorer could not detect the deployment after {attempts} attempt(s)")]
    TransientVerificationFault { attempts: usize },

    /// The broadcast artifact did not yield a contract address.
    #[error("no contract address recovered from {}: {reason}", .path.display())]
    ArtifactExtraction { path: PathBuf, reason: String },

    /// The ledger file does not exist.
    #[error("ledger file {} not found", .0.display())]
    LedgerMissing(PathBuf),

    /// The ledger file is not a valid ledger document.
    #[error("ledger file {} is corrupt: {reason}", .path.display())]
    LedgerCorrupt { path: PathBuf, reason: String },
}

impl DeployError {
    /// Whether the failure is worth retrying after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientVerificationFault { .. })
    }

    /// Whether the failure invalidates the whole run rather than one target.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LedgerMissing(_) | Self::LedgerCorrupt { .. })
    }
}
