//! Broadcast artifacts written by `forge script --broadcast`.

use std::{
    path::Path,
    str::FromStr,
    time::{Duration, SystemTime},
};

use alloy_core::primitives::Address;
use serde::Deserialize;

use crate::DeployError;

/// The parts of `run-latest.json` this tool reads.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastArtifact {
    #[serde(default)]
    pub transactions: Vec<BroadcastTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastTransaction {
    #[serde(default)]
    pub contract_name: Option<String>,
    #[serde(default)]
    pub contract_address: Option<String>,
}

impl BroadcastArtifact {
    pub fn load_from_file(path: &Path) -> Result<Self, DeployError> {
        let extraction_error = |reason: String| DeployError::ArtifactExtraction {
            path: path.to_path_buf(),
            reason,
        };

        let content = std::fs::read_to_string(path)
            .map_err(|e| extraction_error(format!("failed to read artifact: {e}")))?;

        serde_json::from_str(&content)
            .map_err(|e| extraction_error(format!("failed to parse artifact: {e}")))
    }

    /// Address created by the first recorded transaction.
    ///
    /// The string is returned as written by the toolchain, after checking it is
    /// a 20-byte hex address.
    pub fn deployed_address(&self) -> Result<&str, String> {
        let first = self
            .transactions
            .first()
            .ok_or_else(|| "artifact has no transactions".to_string())?;

        let address = first
            .contract_address
            .as_deref()
            .ok_or_else(|| "first transaction has no contract address".to_string())?;

        Address::from_str(address)
            .map_err(|e| format!("`{address}` is not a valid address: {e}"))?;

        Ok(address)
    }
}

/// Tolerance for file systems with coarse modification times.
const MTIME_SLACK: Duration = Duration::from_secs(2);

/// Fail if the artifact at `path` was last written before `since`.
///
/// The toolchain overwrites `run-latest.json` on every broadcast, so an older
/// file belongs to a previous run and its address must not be recorded.
pub fn ensure_written_since(path: &Path, since: SystemTime) -> Result<(), DeployError> {
    let extraction_error = |reason: String| DeployError::ArtifactExtraction {
        path: path.to_path_buf(),
        reason,
    };

    let modified = std::fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|e| extraction_error(format!("failed to read artifact metadata: {e}")))?;

    if modified + MTIME_SLACK < since {
        return Err(extraction_error(
            "artifact was not rewritten by this run".to_string(),
        ));
    }

    Ok(())
}

/// Read the address deployed by the artifact at `path`.
pub fn extract_contract_address(path: &Path) -> Result<String, DeployError> {
    let artifact = BroadcastArtifact::load_from_file(path)?;
    let address = artifact
        .deployed_address()
        .map_err(|reason| DeployError::ArtifactExtraction {
            path: path.to_path_buf(),
            reason,
        })?;

    if let Some(name) = artifact.transactions[0].contract_name.as_deref() {
        tracing::debug!(contract = name, address, "Found deployed contract in artifact");
    }

    Ok(address.to_string())
}
