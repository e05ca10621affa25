//! Deployment ledger: which contract lives at which address on which chain.
//!
//! The ledger is a JSON document keyed by chain id, each entry mapping contract
//! short keys to addresses:
//!
//! ```json
//! {
//!     "5": { "name": "Goerli", "v4": "0x..." },
//!     "137": { "name": "Polygon", "mainnet": "true", "v3": "0x..." }
//! }
//! ```
//!
//! It is always read and written whole. Every successful deployment goes through
//! its own load-mutate-save cycle, so a crash loses at most the record in flight.

use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, ser::PrettyFormatter};

use crate::{DeployError, fs::FsHandler};

/// Per-chain keys that describe the chain rather than record a deployment.
pub const METADATA_KEYS: &[&str] = &["name", "mainnet"];

/// The whole ledger document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ledger {
    chains: BTreeMap<String, Map<String, Value>>,
}

impl Ledger {
    /// Read and parse a ledger file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DeployError::LedgerMissing(path.to_path_buf()).into());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ledger from {}", path.display()))?;

        let ledger = serde_json::from_str(&content).map_err(|e| DeployError::LedgerCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Ok(ledger)
    }

    /// Serialize the ledger with four-space indentation.
    pub fn to_json_pretty(&self) -> Result<String> {
        let mut buf = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(b"    "));
        self.serialize(&mut serializer)
            .context("Failed to serialize ledger")?;
        buf.push(b'\n');
        String::from_utf8(buf).context("Ledger serialized to invalid UTF-8")
    }

    /// Write the ledger over `path` atomically.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = self.to_json_pretty()?;
        FsHandler::write_atomic(path, json.as_bytes())
            .with_context(|| format!("Failed to save ledger to {}", path.display()))
    }

    /// The recorded address of `short_key` on `chain_id`, if any.
    pub fn get_address(&self, chain_id: u64, short_key: &str) -> Option<&str> {
        self.chains
            .get(&chain_id.to_string())?
            .get(short_key)?
            .as_str()
    }

    /// Record an address, creating the chain entry if needed.
    pub fn set_address(&mut self, chain_id: u64, short_key: &str, address: &str) {
        self.chains
            .entry(chain_id.to_string())
            .or_default()
            .insert(short_key.to_string(), Value::String(address.to_string()));
    }

    /// Iterate over chain ids and their entries.
    pub fn chains(&self) -> impl Iterator<Item = ChainEntry<'_>> {
        self.chains
            .iter()
            .map(|(chain_id, fields)| ChainEntry { chain_id, fields })
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

/// A view of one chain's ledger entry.
#[derive(Debug, Clone, Copy)]
pub struct ChainEntry<'a> {
    pub chain_id: &'a str,
    fields: &'a Map<String, Value>,
}

impl<'a> ChainEntry<'a> {
    /// Short keys with a recorded deployment, metadata keys excluded.
    pub fn contract_keys(&self) -> impl Iterator<Item = &'a str> {
        self.fields
            .keys()
            .map(String::as_str)
            .filter(|key| !METADATA_KEYS.contains(key))
    }

    /// Whether the entry is flagged as a mainnet (`true` or `"true"`).
    pub fn is_mainnet(&self) -> bool {
        match self.fields.get("mainnet") {
            Some(Value::Bool(flag)) => *flag,
            Some(Value::String(flag)) => flag == "true",
            _ => false,
        }
    }

    /// The chain's display name, falling back to its id.
    pub fn display_name(&self) -> String {
        self.fields
            .get("name")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("Chain ID {}", self.chain_id))
    }
}

/// Handle on the ledger file for the duration of a run.
///
/// Holds an advisory lock so that two runs cannot interleave their writes.
#[derive(Debug)]
pub struct LedgerStore {
    path: PathBuf,
    _lock: File,
}

impl LedgerStore {
    /// Open the ledger at `path`. The file must already exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(DeployError::LedgerMissing(path).into());
        }

        let lock = FsHandler::lock_exclusive(&path)?;

        tracing::debug!(path = %path.display(), "Ledger opened");

        Ok(Self { path, _lock: lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Ledger> {
        Ledger::load_from_file(&self.path)
    }

    pub fn save(&self, ledger: &Ledger) -> Result<()> {
        ledger.save_to_file(&self.path)
    }

    /// Persist one deployment immediately.
    pub fn record(&self, chain_id: u64, short_key: &str, address: &str) -> Result<()> {
        let mut ledger = self.load()?;
        ledger.set_address(chain_id, short_key, address);
        self.save(&ledger)?;

        tracing::info!(
            chain_id,
            contract = short_key,
            address,
            ledger = %self.path.display(),
            "Deployment recorded"
        );

        Ok(())
    }
}
