//! Sequences deployments across chains and contracts.
//!
//! Every (contract, chain) pair goes through the same steps: validate the
//! contract and the chain, look up the ledger, ask the operator what to do
//! about an existing record, run the toolchain (retrying the explorer
//! detection fault), read the deployed address back from the broadcast
//! artifact, and record it.
//!
//! Pairs are processed one at a time. A failure on one pair is reported and the
//! run moves on; only ledger-level problems abort the run.

use std::{
    fmt,
    path::Path,
    sync::atomic::{AtomicUsize, Ordering},
    time::SystemTime,
};

use anyhow::Result;
use backon::{ConstantBuilder, Retryable};

use crate::{
    Chain, ContractTable, DeployConfig, DeployError, LedgerStore,
    prompt::{ExistingAction, Prompter},
    runner::{Classification, CommandRunner, Invocation, Outcome, classify},
    toolchain::{DeployMode, Toolchain, ensure_written_since, extract_contract_address},
};

/// Which chains a run targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSelection {
    /// Offer every configured chain to the operator, in configured order.
    Interactive,
    /// Exactly these chains, in this order.
    Named(Vec<String>),
}

impl ChainSelection {
    /// No names means interactive selection.
    pub fn from_names(names: Vec<String>) -> Self {
        if names.is_empty() {
            Self::Interactive
        } else {
            Self::Named(names)
        }
    }
}

/// What happened to one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    /// Deployed and recorded in the ledger.
    Deployed { address: String },
    /// An existing deployment was verified again.
    Verified { address: String },
    /// A script ran to completion.
    Ran,
    /// The operator chose to leave the target alone.
    Cancelled,
    /// The target was never attempted.
    Skipped(DeployError),
    /// The toolchain failed for this target.
    Failed(DeployError),
    /// The toolchain succeeded but no address could be recorded.
    Unrecorded(DeployError),
}

impl PairOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::Skipped(_) | Self::Failed(_) | Self::Unrecorded(_)
        )
    }
}

/// Outcome of one (target, chain) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairReport {
    /// Contract name, or script path in script mode.
    pub target: String,
    pub chain: String,
    pub outcome: PairOutcome,
}

/// Everything that happened during a run, in processing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub reports: Vec<PairReport>,
}

impl RunSummary {
    fn push(&mut self, target: &str, chain: &str, outcome: PairOutcome) {
        self.reports.push(PairReport {
            target: target.to_string(),
            chain: chain.to_string(),
            outcome,
        });
    }

    /// The outcome recorded for a pair, if it was processed.
    pub fn outcome(&self, target: &str, chain: &str) -> Option<&PairOutcome> {
        self.reports
            .iter()
            .find(|r| r.target == target && r.chain == chain)
            .map(|r| &r.outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PairReport> {
        self.reports.iter().filter(|r| r.outcome.is_failure())
    }
}

/// Drives the toolchain over a set of targets and keeps the ledger current.
pub struct Orchestrator<'a, R, P> {
    config: &'a DeployConfig,
    contracts: ContractTable,
    ledger: LedgerStore,
    runner: R,
    prompter: P,
}

impl<'a, R, P> Orchestrator<'a, R, P>
where
    R: CommandRunner,
    P: Prompter,
{
    pub fn new(
        config: &'a DeployConfig,
        contracts: ContractTable,
        ledger: LedgerStore,
        runner: R,
        prompter: P,
    ) -> Self {
        Self {
            config,
            contracts,
            ledger,
            runner,
            prompter,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn prompter(&self) -> &P {
        &self.prompter
    }

    fn toolchain(&self) -> Toolchain<'a> {
        Toolchain::new(&self.config.toolchain)
    }

    /// Deploy `contracts` to the selected chains.
    ///
    /// Returns `Err` only for failures that make the rest of the run unsafe,
    /// such as an unreadable ledger.
    pub async fn deploy(
        &self,
        contracts: &[String],
        selection: &ChainSelection,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        for chain_name in self.select_chains(selection)? {
            self.deploy_to_chain(&chain_name, contracts, &mut summary)
                .await?;
        }

        Ok(summary)
    }

    /// Run an arbitrary script once on each selected chain. The ledger is not
    /// touched.
    pub async fn run_script(&self, script: &Path, selection: &ChainSelection) -> Result<RunSummary> {
        let target = script.display().to_string();
        let mut summary = RunSummary::default();

        for chain_name in self.select_chains(selection)? {
            let chain = match self.config.resolve(&chain_name) {
                Ok(chain) => chain,
                Err(err) => {
                    tracing::error!(chain = %chain_name, %err, "Skipping chain");
                    summary.push(&target, &chain_name, PairOutcome::Skipped(err));
                    continue;
                }
            };

            tracing::info!(script = %target, chain = %chain.name, chain_id = chain.chain_id, "Running script");

            let invocation = self.toolchain().script_invocation(script, &chain);
            let outcome = match self.run_once(&invocation, 1).await {
                Ok(_) => PairOutcome::Ran,
                Err(err) => {
                    tracing::error!(script = %target, chain = %chain.name, %err, "Script failed");
                    PairOutcome::Failed(err)
                }
            };
            summary.push(&target, &chain_name, outcome);
        }

        Ok(summary)
    }

    fn select_chains(&self, selection: &ChainSelection) -> Result<Vec<String>> {
        match selection {
            ChainSelection::Named(names) => Ok(names.clone()),
            ChainSelection::Interactive => {
                let mut selected = Vec::new();
                for name in self.config.chain_names() {
                    if self.prompter.confirm(&format!("Deploy to {name}?"))? {
                        selected.push(name.to_string());
                    }
                }
                Ok(selected)
            }
        }
    }

    /// A chain is usable when it is configured with an endpoint and a
    /// verification key.
    fn usable_chain(&self, name: &str) -> Result<Chain, DeployError> {
        let chain = self.config.resolve(name)?;

        if !self.config.has_verification_credential(name) {
            return Err(DeployError::MissingCredential {
                chain: name.to_string(),
                missing: "verification key",
            });
        }

        Ok(chain)
    }

    async fn deploy_to_chain(
        &self,
        chain_name: &str,
        contracts: &[String],
        summary: &mut RunSummary,
    ) -> Result<()> {
        let chain = self.usable_chain(chain_name);
        if let Err(err) = &chain {
            tracing::error!(chain = %chain_name, %err, "Skipping chain");
        }

        for contract in contracts {
            let short_key = match self.contracts.short_key(contract) {
                Ok(key) => key,
                Err(err) => {
                    tracing::error!(%err, "Skipping contract");
                    summary.push(contract, chain_name, PairOutcome::Skipped(err));
                    continue;
                }
            };

            let outcome = match &chain {
                Ok(chain) => self.deploy_pair(contract, short_key, chain).await?,
                Err(err) => PairOutcome::Skipped(err.clone()),
            };
            summary.push(contract, chain_name, outcome);
        }

        Ok(())
    }

    async fn deploy_pair(&self, contract: &str, short_key: &str, chain: &Chain) -> Result<PairOutcome> {
        let ledger = self.ledger.load()?;

        if let Some(existing) = ledger.get_address(chain.chain_id, short_key) {
            match self
                .prompter
                .existing_deployment(contract, &chain.name, existing)?
            {
                ExistingAction::Redeploy => {
                    tracing::warn!(
                        contract,
                        chain = %chain.name,
                        stale_address = existing,
                        "Redeploying over a recorded address"
                    );
                }
                ExistingAction::VerifyOnly => {
                    return Ok(self.verify_existing(contract, chain, existing).await);
                }
                ExistingAction::Cancel => {
                    tracing::info!(contract, chain = %chain.name, "Keeping existing deployment");
                    return Ok(PairOutcome::Cancelled);
                }
            }
        }

        tracing::info!(
            contract,
            chain = %chain.name,
            chain_id = chain.chain_id,
            legacy = chain.legacy,
            "Deploying contract"
        );

        let started = SystemTime::now();
        if let Err(err) = self.broadcast_with_retry(contract, chain).await {
            tracing::error!(contract, chain = %chain.name, %err, "Deployment failed");
            return Ok(PairOutcome::Failed(err));
        }

        let artifact = self.toolchain().artifact_path(contract, chain.chain_id);
        let address = match ensure_written_since(&artifact, started)
            .and_then(|()| extract_contract_address(&artifact))
        {
            Ok(address) => address,
            Err(err) => {
                // TODO: recover the address from the chain (deployer nonce) instead of leaving it unrecorded.
                tracing::error!(contract, chain = %chain.name, %err, "Deployment ran but its address was not recorded");
                return Ok(PairOutcome::Unrecorded(err));
            }
        };

        self.ledger.record(chain.chain_id, short_key, &address)?;

        tracing::info!(contract, chain = %chain.name, address = %address, "Contract deployed");

        Ok(PairOutcome::Deployed { address })
    }

    async fn verify_existing(&self, contract: &str, chain: &Chain, address: &str) -> PairOutcome {
        tracing::info!(contract, chain = %chain.name, address, "Verifying existing deployment");

        let invocation = self
            .toolchain()
            .deploy_invocation(contract, chain, DeployMode::VerifyOnly);

        match self.run_once(&invocation, 1).await {
            Ok(_) => PairOutcome::Verified {
                address: address.to_string(),
            },
            Err(err) => {
                tracing::error!(contract, chain = %chain.name, %err, "Verification failed");
                PairOutcome::Failed(err)
            }
        }
    }

    /// Broadcast the deployment, then keep re-verifying while the explorer
    /// reports it cannot see the contract, within the retry budget.
    async fn broadcast_with_retry(&self, contract: &str, chain: &Chain) -> Result<Outcome, DeployError> {
        let policy = self.config.retry;
        let attempts = &AtomicUsize::new(0);

        let attempt = move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            // The transaction is already on chain after the first attempt.
            let mode = if attempt == 1 {
                DeployMode::Broadcast
            } else {
                DeployMode::VerifyOnly
            };
            let invocation = self.toolchain().deploy_invocation(contract, chain, mode);
            self.run_once(&invocation, attempt).await
        };

        attempt
            .retry(
                ConstantBuilder::default()
                    .with_delay(policy.interval())
                    .with_max_times(policy.max_attempts() - 1),
            )
            .sleep(tokio::time::sleep)
            .when(DeployError::is_transient)
            .notify(|err, delay| {
                tracing::warn!(
                    contract,
                    chain = %chain.name,
                    %err,
                    ?delay,
                    "Block explorer has not picked up the deployment yet, retrying verification"
                );
            })
            .await
    }

    async fn run_once(&self, invocation: &Invocation, attempt: usize) -> Result<Outcome, DeployError> {
        let outcome = self
            .runner
            .execute(invocation)
            .await
            .map_err(|e| DeployError::Spawn {
                command: invocation.to_string(),
                reason: format!("{e:#}"),
            })?;

        match classify(&outcome) {
            Classification::Success => Ok(outcome),
            Classification::TransientVerificationFault => {
                Err(DeployError::TransientVerificationFault { attempts: attempt })
            }
            Classification::Failed => Err(DeployError::CommandFailed {
                command: invocation.to_string(),
                exit_code: outcome.exit_code,
                output: outcome.output,
            }),
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reports.is_empty() {
            return writeln!(f, "No targets were processed.");
        }

        let failures = self.failures().count();
        writeln!(
            f,
            "Run summary: {} target(s), {} problem(s)",
            self.reports.len(),
            failures
        )?;

        for report in &self.reports {
            writeln!(f, "{}", report)?;
        }

        Ok(())
    }
}

impl fmt::Display for PairReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {:<9} {} on {}: ", status_icon(&self.outcome), self.target, self.chain)?;

        match &self.outcome {
            PairOutcome::Deployed { address } => write!(f, "deployed at {address}"),
            PairOutcome::Verified { address } => write!(f, "verified {address}"),
            PairOutcome::Ran => write!(f, "ran"),
            PairOutcome::Cancelled => write!(f, "kept existing deployment"),
            PairOutcome::Skipped(err) => write!(f, "skipped, {err}"),
            PairOutcome::Failed(err) => write!(f, "{err}"),
            PairOutcome::Unrecorded(err) => write!(f, "ran but not recorded, {err}"),
        }
    }
}

fn status_icon(outcome: &PairOutcome) -> &'static str {
    match outcome {
        PairOutcome::Deployed { .. } | PairOutcome::Verified { .. } | PairOutcome::Ran => "[ok]",
        PairOutcome::Cancelled => "[kept]",
        PairOutcome::Skipped(_) => "[skipped]",
        PairOutcome::Failed(_) => "[FAILED]",
        PairOutcome::Unrecorded(_) => "[WARN]",
    }
}
