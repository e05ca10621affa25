//! Operator prompts.
//!
//! The orchestrator only talks to the operator through [`Prompter`], so the
//! decision logic can be driven by a scripted prompter in tests.

use std::io::{BufRead, Write};

use anyhow::{Context, Result};

/// What to do with a contract that already has a recorded address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ExistingAction {
    /// Deploy again and overwrite the recorded address.
    #[strum(serialize = "r", serialize = "redeploy")]
    Redeploy,
    /// Re-run verification only, leaving the ledger alone.
    #[strum(serialize = "v", serialize = "verify")]
    VerifyOnly,
    /// Leave this contract alone.
    #[strum(serialize = "c", serialize = "cancel")]
    Cancel,
}

impl ExistingAction {
    /// Parse an operator answer. Anything unrecognized cancels.
    pub fn from_answer(answer: &str) -> Self {
        answer.trim().parse().unwrap_or(Self::Cancel)
    }
}

/// Parse a yes/no answer. Anything but `y`/`yes` is a no.
pub fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Line-based operator interaction.
pub trait Prompter {
    /// Ask a yes/no question. Defaults to no.
    fn confirm(&self, question: &str) -> Result<bool>;

    /// Ask what to do about an existing deployment. Defaults to cancel.
    fn existing_deployment(&self, contract: &str, chain: &str, address: &str)
    -> Result<ExistingAction>;
}

/// Prompts on stdout and reads answers from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolePrompter;

impl ConsolePrompter {
    fn ask(&self, question: &str) -> Result<String> {
        let mut stdout = std::io::stdout().lock();
        write!(stdout, "{question} ").context("Failed to write prompt")?;
        stdout.flush().context("Failed to flush prompt")?;

        let mut answer = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut answer)
            .context("Failed to read answer from stdin")?;
        Ok(answer)
    }
}

impl Prompter for ConsolePrompter {
    fn confirm(&self, question: &str) -> Result<bool> {
        Ok(is_yes(&self.ask(&format!("{question} (y/n)"))?))
    }

    fn existing_deployment(
        &self,
        contract: &str,
        chain: &str,
        address: &str,
    ) -> Result<ExistingAction> {
        let answer = self.ask(&format!(
            "{contract} is already deployed on {chain} at {address}. [r]edeploy, [v]erify only or [c]ancel?"
        ))?;
        Ok(ExistingAction::from_answer(&answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_yes() {
        assert!(is_yes("y\n"));
        assert!(is_yes("YES"));
        assert!(!is_yes(""));
        assert!(!is_yes("n"));
        assert!(!is_yes("sure"));
    }

    #[test]
    fn test_existing_action_answers() {
        assert_eq!(ExistingAction::from_answer("r\n"), ExistingAction::Redeploy);
        assert_eq!(ExistingAction::from_answer("Redeploy"), ExistingAction::Redeploy);
        assert_eq!(ExistingAction::from_answer(" v "), ExistingAction::VerifyOnly);
        assert_eq!(ExistingAction::from_answer("verify"), ExistingAction::VerifyOnly);
        assert_eq!(ExistingAction::from_answer("c"), ExistingAction::Cancel);
        assert_eq!(ExistingAction::from_answer(""), ExistingAction::Cancel);
        assert_eq!(ExistingAction::from_answer("yes"), ExistingAction::Cancel);
    }
}
