//! Contract name to ledger short-key table.

use crate::DeployError;

/// Contracts known to the deployment tool, as `(canonical name, short key)`.
///
/// The short keys are the ones written to the ledger. Any consumer reading the
/// ledger (the coverage report included) must use this same table.
pub const BUILTIN_CONTRACTS: &[(&str, &str)] = &[
    ("PeanutV3", "v3"),
    ("PeanutV4", "v4"),
    ("PeanutBatcherV4", "v4b"),
];

/// Lookup table from canonical contract name to ledger short key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractTable {
    entries: Vec<(String, String)>,
}

impl ContractTable {
    /// Create a table from `(canonical name, short key)` pairs, in declaration order.
    pub fn new<N, K>(entries: impl IntoIterator<Item = (N, K)>) -> Self
    where
        N: Into<String>,
        K: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, key)| (name.into(), key.into()))
                .collect(),
        }
    }

    /// The table shipped with the tool.
    pub fn builtin() -> Self {
        Self::new(BUILTIN_CONTRACTS.iter().copied())
    }

    pub fn short_key(&self, name: &str) -> Result<&str, DeployError> {
        self.entries
            .iter()
            .find(|(canonical, _)| canonical == name)
            .map(|(_, key)| key.as_str())
            .ok_or_else(|| DeployError::UnknownContract(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn short_keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(_, key)| key.as_str())
    }
}

impl Default for ContractTable {
    fn default() -> Self {
        Self::builtin()
    }
}
