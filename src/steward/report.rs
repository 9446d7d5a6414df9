//! Per-run tally of affected cards.

use std::fmt;

use super::rules::TransitionRule;

/// Result of one rule pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub rule: TransitionRule,
    /// Cards the rule acted on before finishing or aborting.
    pub affected: usize,
    /// Why the rule stopped early, if it did.
    pub error: Option<String>,
}

/// Counts for every rule that ran, in run order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    outcomes: Vec<RuleOutcome>,
    total: usize,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, rule: TransitionRule, affected: usize, error: Option<String>) {
        self.total += affected;
        self.outcomes.push(RuleOutcome {
            rule,
            affected,
            error,
        });
    }

    pub fn outcomes(&self) -> &[RuleOutcome] {
        &self.outcomes
    }

    /// Cards affected by a rule this run (0 if it has not run).
    pub fn affected(&self, rule: TransitionRule) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.rule == rule)
            .map(|o| o.affected)
            .sum()
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Whether any rule aborted.
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|o| o.error.is_some())
    }

    /// Human-readable summary, one line per rule plus the total.
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| match &o.error {
                None => format!("[{}] {}", o.affected, o.rule.summary()),
                Some(e) => format!("[{}] {} (aborted: {e})", o.affected, o.rule.summary()),
            })
            .collect();
        lines.push(format!("[{}] Board steward finished.", self.total));
        lines
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in self.lines() {
            writeln!(f, "{line}")?;
        }
        Ok(())
    }
}
