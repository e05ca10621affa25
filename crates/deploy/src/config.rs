//! Run configuration: chains, toolchain invocation and retry policy.
//!
//! The configuration is read once at startup from a TOML file, layered with
//! `CHAINSHIP_`-prefixed environment variables, and then passed by reference to
//! everything that needs it.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Chainship.toml";

/// The default path of the deployment ledger.
pub const DEFAULT_LEDGER_PATH: &str = "contracts.json";

/// Prefix of the environment variables that override configuration keys.
pub const ENV_PREFIX: &str = "CHAINSHIP_";

/// Top-level configuration of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Path to the JSON deployment ledger.
    pub ledger: PathBuf,
    /// How the external toolchain is invoked.
    pub toolchain: ToolchainConfig,
    /// Retry policy for the explorer detection fault.
    pub retry: RetryPolicy,
    /// Target chains, in the order they are offered to the operator.
    pub chains: Vec<ChainConfig>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            ledger: PathBuf::from(DEFAULT_LEDGER_PATH),
            toolchain: ToolchainConfig::default(),
            retry: RetryPolicy::default(),
            chains: Vec::new(),
        }
    }
}

/// Settings of the external deployment toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Executable to run.
    pub program: String,
    /// Directory holding the per-contract deployment scripts.
    pub script_dir: PathBuf,
    /// Entry point contract inside each deployment script.
    pub script_entry: String,
    /// Directory the toolchain writes broadcast artifacts into.
    pub broadcast_dir: PathBuf,
    /// Number of `v`s passed as the verbosity flag.
    pub verbosity: u8,
    /// Environment variable the verification key is exported as.
    pub api_key_env: String,
    /// Arguments appended to every invocation, e.g. `--slow`.
    pub extra_args: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: "forge".to_string(),
            script_dir: PathBuf::from("script"),
            script_entry: "DeployScript".to_string(),
            broadcast_dir: PathBuf::from("broadcast"),
            verbosity: 4,
            api_key_env: "ETHERSCAN_API_KEY".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Bounded retry for the block explorer detection fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total time budget spent waiting between attempts.
    pub budget_secs: u64,
    /// Fixed wait before each retry.
    pub interval_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            budget_secs: 120,
            interval_secs: 30,
        }
    }
}

impl RetryPolicy {
    /// Total number of invocations allowed, the first one included.
    pub fn max_attempts(&self) -> usize {
        if self.interval_secs == 0 {
            return 1;
        }
        ((self.budget_secs / self.interval_secs) as usize).max(1)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// A chain entry as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    /// Human name used on the command line.
    pub name: String,
    /// Numeric chain id, used as the ledger key.
    pub chain_id: u64,
    /// RPC endpoint. Supports `${VAR}` interpolation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
    /// Whether the network needs pre-EIP-1559 transactions.
    #[serde(default)]
    pub legacy: bool,
    /// Block explorer verification key. Supports `${VAR}` interpolation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier_key: Option<String>,
}

/// A chain resolved for use in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chain {
    pub name: String,
    pub chain_id: u64,
    pub endpoint_url: String,
    pub legacy: bool,
    pub verifier_key: Option<String>,
}

impl DeployConfig {
    /// Load the configuration from a TOML file, applying environment overrides.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Configuration file not found: {}", path.display());
        }

        let config: Self = Figment::new()
            .merge(Toml::file(path))
            .merge(
                Env::prefixed(ENV_PREFIX)
                    .ignore(&["config", "verbosity"])
                    .split("__"),
            )
            .extract()
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        config.validate()?;

        tracing::info!(
            path = %path.display(),
            chains = config.chains.len(),
            ledger = %config.ledger.display(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// A configuration with one example chain, used to bootstrap a project.
    pub fn starter() -> Self {
        Self {
            chains: vec![ChainConfig {
                name: "sepolia".to_string(),
                chain_id: 11155111,
                rpc_url: Some("https://ethereum-sepolia-rpc.publicnode.com".to_string()),
                legacy: false,
                verifier_key: Some("${ETHERSCAN_API_KEY}".to_string()),
            }],
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if self.retry.interval_secs == 0 {
            anyhow::bail!("retry.interval_secs must be greater than zero");
        }

        let mut seen = HashSet::new();
        for chain in &self.chains {
            if !seen.insert(chain.name.as_str()) {
                anyhow::bail!("Chain `{}` is configured more than once", chain.name);
            }
        }

        Ok(())
    }

    /// Names of all configured chains, in configured order.
    pub fn chain_names(&self) -> impl Iterator<Item = &str> {
        self.chains.iter().map(|chain| chain.name.as_str())
    }

    fn chain_config(&self, name: &str) -> Result<&ChainConfig, DeployError> {
        self.chains
            .iter()
            .find(|chain| chain.name == name)
            .ok_or_else(|| DeployError::UnknownChain(name.to_string()))
    }

    /// Resolve a chain by name, interpolating its endpoint and key.
    pub fn resolve(&self, name: &str) -> Result<Chain, DeployError> {
        self.resolve_with(name, |var| std::env::var(var).ok())
    }

    /// Whether the chain has a usable block explorer verification key.
    pub fn has_verification_credential(&self, name: &str) -> bool {
        self.chain_config(name)
            .ok()
            .and_then(|chain| chain.verifier_key.as_deref())
            .and_then(|key| interpolate(key, |var| std::env::var(var).ok()))
            .is_some()
    }

    fn resolve_with(
        &self,
        name: &str,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Chain, DeployError> {
        let config = self.chain_config(name)?;

        let endpoint_url = config
            .rpc_url
            .as_deref()
            .and_then(|url| interpolate(url, &lookup))
            .ok_or_else(|| DeployError::MissingCredential {
                chain: name.to_string(),
                missing: "RPC endpoint",
            })?;

        let verifier_key = config
            .verifier_key
            .as_deref()
            .and_then(|key| interpolate(key, &lookup));

        Ok(Chain {
            name: config.name.clone(),
            chain_id: config.chain_id,
            endpoint_url,
            legacy: config.legacy,
            verifier_key,
        })
    }
}

/// Replace every `${VAR}` in `value` using `lookup`.
///
/// Returns `None` if a variable is unset or empty, if a placeholder is not
/// terminated, or if the result is empty.
fn interpolate(value: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        let resolved = lookup(&after[..end]).filter(|v| !v.is_empty())?;
        out.push_str(&resolved);
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    let out = out.trim().to_string();
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    fn lookup(var: &str) -> Option<String> {
        match var {
            "INFURA_KEY" => Some("abc123".to_string()),
            "EMPTY" => Some(String::new()),
            _ => None,
        }
    }

    fn chain(name: &str, chain_id: u64) -> ChainConfig {
        ChainConfig {
            name: name.to_string(),
            chain_id,
            rpc_url: Some(format!("https://{name}.example.org")),
            legacy: false,
            verifier_key: Some("key".to_string()),
        }
    }

    #[test]
    fn test_interpolate() {
        assert_eq!(
            interpolate("https://goerli.infura.io/v3/${INFURA_KEY}", lookup).as_deref(),
            Some("https://goerli.infura.io/v3/abc123")
        );
        assert_eq!(interpolate("plain", lookup).as_deref(), Some("plain"));
        assert_eq!(interpolate("${MISSING}", lookup), None);
        assert_eq!(interpolate("${EMPTY}", lookup), None);
        assert_eq!(interpolate("https://x/${INFURA_KEY", lookup), None);
        assert_eq!(interpolate("  ", lookup), None);
    }

    #[test]
    fn test_retry_attempts() {
        assert_eq!(RetryPolicy::default().max_attempts(), 4);
        let policy = RetryPolicy {
            budget_secs: 10,
            interval_secs: 30,
        };
        assert_eq!(policy.max_attempts(), 1);
        let policy = RetryPolicy {
            budget_secs: 100,
            interval_secs: 0,
        };
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_resolve_known_chain() {
        let mut goerli = chain("goerli", 5);
        goerli.rpc_url = Some("https://goerli.infura.io/v3/${INFURA_KEY}".to_string());
        goerli.legacy = true;
        let config = DeployConfig {
            chains: vec![goerli],
            ..Default::default()
        };

        let resolved = config.resolve_with("goerli", lookup).unwrap();
        assert_eq!(resolved.chain_id, 5);
        assert!(resolved.legacy);
        assert_eq!(resolved.endpoint_url, "https://goerli.infura.io/v3/abc123");
        assert_eq!(resolved.verifier_key.as_deref(), Some("key"));
    }

    #[test]
    fn test_resolve_unknown_chain() {
        let config = DeployConfig::default();
        assert_eq!(
            config.resolve("mars"),
            Err(DeployError::UnknownChain("mars".to_string()))
        );
        assert!(!config.has_verification_credential("mars"));
    }

    #[test]
    fn test_resolve_missing_endpoint() {
        let mut base = chain("base", 8453);
        base.rpc_url = Some("https://base/${MISSING}".to_string());
        let config = DeployConfig {
            chains: vec![base],
            ..Default::default()
        };

        assert_eq!(
            config.resolve_with("base", lookup),
            Err(DeployError::MissingCredential {
                chain: "base".to_string(),
                missing: "RPC endpoint",
            })
        );
    }

    #[test]
    fn test_verification_credential() {
        let mut keyless = chain("keyless", 10);
        keyless.verifier_key = None;
        let config = DeployConfig {
            chains: vec![chain("keyed", 1), keyless],
            ..Default::default()
        };

        assert!(config.has_verification_credential("keyed"));
        assert!(!config.has_verification_credential("keyless"));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new("chainship-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            r#"
ledger = "deployments.json"

[retry]
interval_secs = 10

[[chains]]
name = "goerli"
chain_id = 5
rpc_url = "https://goerli.example.org"
legacy = true
verifier_key = "k"

[[chains]]
name = "sepolia"
chain_id = 11155111
"#,
        )
        .unwrap();

        let config = DeployConfig::load_from_file(&path).unwrap();
        assert_eq!(config.ledger, PathBuf::from("deployments.json"));
        assert_eq!(config.retry.interval_secs, 10);
        assert_eq!(config.retry.budget_secs, 120);
        assert_eq!(config.toolchain.program, "forge");
        assert_eq!(
            config.chain_names().collect::<Vec<_>>(),
            vec!["goerli", "sepolia"]
        );
        assert!(config.chains[0].legacy);
        assert_eq!(config.chains[1].rpc_url, None);
    }

    #[test]
    fn test_load_rejects_duplicate_chains() {
        let temp_dir = TempDir::new("chainship-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILENAME);
        std::fs::write(
            &path,
            "[[chains]]\nname = \"a\"\nchain_id = 1\n\n[[chains]]\nname = \"a\"\nchain_id = 2\n",
        )
        .unwrap();

        assert!(DeployConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new("chainship-test").expect("Failed to create temp dir");
        assert!(DeployConfig::load_from_file(&temp_dir.path().join("nope.toml")).is_err());
    }

    #[test]
    fn test_starter_round_trips_through_file() {
        let temp_dir = TempDir::new("chainship-test").expect("Failed to create temp dir");
        let path = temp_dir.path().join(CONFIG_FILENAME);

        let starter = DeployConfig::starter();
        starter.save_to_file(&path).unwrap();
        let loaded = DeployConfig::load_from_file(&path).unwrap();

        assert_eq!(starter, loaded);
    }
}
