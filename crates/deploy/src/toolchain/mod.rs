//! The external contract toolchain: how it is invoked and where it leaves its
//! broadcast artifacts.

mod artifact;
mod cmd;

use std::path::{Path, PathBuf};

pub use artifact::{
    BroadcastArtifact, BroadcastTransaction, ensure_written_since, extract_contract_address,
};
pub use cmd::ForgeScriptCmdBuilder;

use crate::{Chain, ToolchainConfig, runner::Invocation};

/// Name of the artifact the toolchain writes for the latest run of a script.
pub const LATEST_RUN_ARTIFACT: &str = "run-latest.json";

/// What a deployment invocation should do on chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployMode {
    /// Broadcast the deployment and verify it.
    Broadcast,
    /// Only verify what an earlier broadcast left behind.
    VerifyOnly,
}

/// Builds toolchain invocations from the run configuration.
#[derive(Debug, Clone, Copy)]
pub struct Toolchain<'a> {
    config: &'a ToolchainConfig,
}

impl<'a> Toolchain<'a> {
    pub fn new(config: &'a ToolchainConfig) -> Self {
        Self { config }
    }

    fn script_file(contract: &str) -> String {
        format!("{contract}.s.sol")
    }

    /// Invocation of a contract's deployment script on a chain.
    ///
    /// Verification is always requested. The verification key, if any, is only
    /// passed through the environment.
    pub fn deploy_invocation(&self, contract: &str, chain: &Chain, mode: DeployMode) -> Invocation {
        let target = format!(
            "{}:{}",
            self.config
                .script_dir
                .join(Self::script_file(contract))
                .display(),
            self.config.script_entry
        );

        let args = ForgeScriptCmdBuilder::new(target)
            .rpc_url(&chain.endpoint_url)
            .broadcast(mode == DeployMode::Broadcast)
            .verify(true)
            .legacy(chain.legacy)
            .verbosity(self.config.verbosity)
            .extra_args(&self.config.extra_args)
            .build();

        self.with_credential(Invocation::new(&self.config.program, args), chain)
    }

    /// Invocation of an arbitrary script, outside the contract table.
    pub fn script_invocation(&self, script: &Path, chain: &Chain) -> Invocation {
        let args = ForgeScriptCmdBuilder::new(script.display().to_string())
            .rpc_url(&chain.endpoint_url)
            .broadcast(true)
            .verify(chain.verifier_key.is_some())
            .legacy(chain.legacy)
            .verbosity(self.config.verbosity)
            .extra_args(&self.config.extra_args)
            .build();

        self.with_credential(Invocation::new(&self.config.program, args), chain)
    }

    fn with_credential(&self, invocation: Invocation, chain: &Chain) -> Invocation {
        match &chain.verifier_key {
            Some(key) => invocation.env(&self.config.api_key_env, key),
            None => invocation,
        }
    }

    /// Where the latest broadcast of `contract` on `chain_id` is recorded.
    pub fn artifact_path(&self, contract: &str, chain_id: u64) -> PathBuf {
        self.config
            .broadcast_dir
            .join(Self::script_file(contract))
            .join(chain_id.to_string())
            .join(LATEST_RUN_ARTIFACT)
    }
}
