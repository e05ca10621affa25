//! Coverage report: which expected contracts are missing on which chains.

use std::fmt;

use comfy_table::{Table, presets::UTF8_FULL_CONDENSED};

use crate::{ContractTable, Ledger};

/// Missing deployments of one contract short key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissingDeployments {
    pub short_key: String,
    /// Display names of mainnets without a record.
    pub mainnets: Vec<String>,
    /// Display names of testnets without a record.
    pub testnets: Vec<String>,
}

impl MissingDeployments {
    pub fn is_complete(&self) -> bool {
        self.mainnets.is_empty() && self.testnets.is_empty()
    }
}

/// Coverage of the ledger against the contract table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageReport {
    /// One entry per expected short key, in table order.
    pub contracts: Vec<MissingDeployments>,
}

impl CoverageReport {
    /// Compare every chain in the ledger against the expected short keys.
    pub fn build(ledger: &Ledger, table: &ContractTable) -> Self {
        let mut contracts: Vec<MissingDeployments> = table
            .short_keys()
            .map(|key| MissingDeployments {
                short_key: key.to_string(),
                ..Default::default()
            })
            .collect();

        for chain in ledger.chains() {
            let deployed: Vec<&str> = chain.contract_keys().collect();
            let mainnet = chain.is_mainnet();

            for missing in contracts
                .iter_mut()
                .filter(|m| !deployed.contains(&m.short_key.as_str()))
            {
                let bucket = if mainnet {
                    &mut missing.mainnets
                } else {
                    &mut missing.testnets
                };
                bucket.push(chain.display_name());
            }
        }

        Self { contracts }
    }

    pub fn is_complete(&self) -> bool {
        self.contracts.iter().all(MissingDeployments::is_complete)
    }

    /// Render the report as a table.
    pub fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_header(vec!["Contract", "Missing on mainnets", "Missing on testnets"]);

        for missing in &self.contracts {
            table.add_row(vec![
                missing.short_key.clone(),
                join_or_dash(&missing.mainnets),
                join_or_dash(&missing.testnets),
            ]);
        }

        table
    }
}

fn join_or_dash(names: &[String]) -> String {
    if names.is_empty() {
        "-".to_string()
    } else {
        names.join(", ")
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_complete() {
            "COMPLETE"
        } else {
            "INCOMPLETE"
        };
        writeln!(f, "Deployment coverage: {}", status)?;
        writeln!(f, "{}", self.table())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger(json: &str) -> Ledger {
        serde_json::from_str(json).expect("Invalid test ledger")
    }

    fn table() -> ContractTable {
        ContractTable::new([("PeanutV3", "v3"), ("PeanutV4", "v4"), ("PeanutBatcherV4", "v4b")])
    }

    #[test]
    fn test_partitions_by_mainnet_flag() {
        let ledger = ledger(
            r#"{
                "1": {"name": "Ethereum", "mainnet": "true", "v3": "0x1", "v4": "0x2"},
                "137": {"name": "Polygon", "mainnet": true, "v3": "0x3", "v4": "0x4", "v4b": "0x5"},
                "5": {"name": "Goerli", "v4": "0x6"},
                "80001": {"v3": "0x7", "v4": "0x8", "v4b": "0x9"}
            }"#,
        );

        let report = CoverageReport::build(&ledger, &table());

        assert_eq!(
            report.contracts,
            vec![
                MissingDeployments {
                    short_key: "v3".to_string(),
                    mainnets: vec![],
                    testnets: vec!["Goerli".to_string()],
                },
                MissingDeployments {
                    short_key: "v4".to_string(),
                    mainnets: vec![],
                    testnets: vec![],
                },
                MissingDeployments {
                    short_key: "v4b".to_string(),
                    mainnets: vec!["Ethereum".to_string()],
                    testnets: vec!["Goerli".to_string()],
                },
            ]
        );
        assert!(!report.is_complete());
    }

    #[test]
    fn test_metadata_never_counts_as_deployment() {
        let ledger = ledger(r#"{"5": {"name": "v3", "mainnet": "false"}}"#);
        let report = CoverageReport::build(&ledger, &ContractTable::new([("PeanutV3", "v3")]));

        assert_eq!(report.contracts[0].testnets, vec!["v3".to_string()]);
    }

    #[test]
    fn test_unnamed_chain_uses_id() {
        let ledger = ledger(r#"{"42": {}}"#);
        let report = CoverageReport::build(&ledger, &ContractTable::new([("PeanutV3", "v3")]));

        assert_eq!(report.contracts[0].testnets, vec!["Chain ID 42".to_string()]);
    }

    #[test]
    fn test_complete_report_renders() {
        let ledger = ledger(r#"{"5": {"a": "0x1"}}"#);
        let report = CoverageReport::build(&ledger, &ContractTable::new([("Alpha", "a")]));

        assert!(report.is_complete());
        let rendered = report.to_string();
        assert!(rendered.starts_with("Deployment coverage: COMPLETE\n"));
        assert!(rendered.contains("Missing on mainnets"));
    }
}
