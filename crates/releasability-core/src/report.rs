//! Aggregated releasability report.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check_result::{CheckResult, CheckState};
use crate::check_set::ExpectedCheckSet;

/// One result per check name, ordered by the expected set.
///
/// Names outside the expected set follow in insertion order. Recording a
/// name twice keeps the later result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasabilityChecksReport {
    checks: Vec<CheckResult>,
}

impl ReleasabilityChecksReport {
    /// Build a report from results in arrival order.
    pub fn new(expected: &ExpectedCheckSet, results: impl IntoIterator<Item = CheckResult>) -> Self {
        let mut latest: Vec<CheckResult> = Vec::new();
        for result in results {
            match latest.iter_mut().find(|r| r.name() == result.name()) {
                Some(slot) => *slot = result,
                None => latest.push(result),
            }
        }

        // Stable sort: expected names by position, everything else after, in arrival order.
        latest.sort_by_key(|r| expected.position(r.name()).unwrap_or(usize::MAX));
        Self { checks: latest }
    }

    /// Report ordered purely by arrival, for callers without an expected set.
    pub fn from_results(results: impl IntoIterator<Item = CheckResult>) -> Self {
        Self::new(&ExpectedCheckSet::default(), results)
    }

    /// Results in report order.
    pub fn checks(&self) -> &[CheckResult] {
        &self.checks
    }

    pub fn get(&self, name: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|r| r.name() == name)
    }

    /// Whether any check is `ERROR`, `FAILED` or `TIMEOUT`. Ignores optionality.
    pub fn contains_error(&self) -> bool {
        self.checks.iter().any(|r| r.state().is_failing())
    }

    /// Names of failing checks, in report order.
    pub fn failed_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|r| r.state().is_failing())
            .map(CheckResult::name)
            .collect()
    }

    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|r| r.has_passed()).count()
    }

    pub fn count_in_state(&self, state: CheckState) -> usize {
        self.checks.iter().filter(|r| r.state() == state).count()
    }

    /// One line per check, joined with newlines.
    pub fn render(&self) -> String {
        self.checks
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Compact form handed to the status step.
    pub fn summary(&self) -> ReportSummary {
        ReportSummary {
            status: if self.contains_error() { "1" } else { "0" }.to_string(),
            checks: self
                .checks
                .iter()
                .map(|r| (r.name().to_string(), r.state()))
                .collect(),
        }
    }
}

impl fmt::Display for ReleasabilityChecksReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Exit status plus per-check states, as exchanged between pipeline steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// `"0"` when no check failed, `"1"` otherwise.
    pub status: String,
    pub checks: BTreeMap<String, CheckState>,
}

impl ReportSummary {
    pub fn passed(&self) -> bool {
        self.status == "0"
    }

    /// Failing check names in name order.
    pub fn failed_checks(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|(_, state)| state.is_failing())
            .map(|(name, _)| name.as_str())
            .collect()
    }
}
