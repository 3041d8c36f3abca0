//! Optional-check downgrade.
//!
//! Folds a report into the commit status shown on the release: failing only
//! when a check outside the optional set failed. Optional failures are still
//! named in the message.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check_set::OptionalCheckSet;
use crate::report::{ReleasabilityChecksReport, ReportSummary};

/// Commit status state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    Success,
    Failure,
}

impl CommitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommitState::Success => "success",
            CommitState::Failure => "failure",
        }
    }

    /// `"0"` for success, `"1"` for failure.
    pub fn status_code(&self) -> &'static str {
        match self {
            CommitState::Success => "0",
            CommitState::Failure => "1",
        }
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall decision for one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverallVerdict {
    pub state: CommitState,
    pub message: String,
    /// Failing checks outside the optional set.
    pub failed_mandatory: Vec<String>,
    /// Failing checks in the optional set.
    pub failed_optional: Vec<String>,
}

impl OverallVerdict {
    fn from_failed<'a>(
        failed: impl IntoIterator<Item = &'a str>,
        optional: &OptionalCheckSet,
    ) -> Self {
        let (failed_optional, failed_mandatory): (Vec<String>, Vec<String>) = failed
            .into_iter()
            .map(str::to_string)
            .partition(|name| optional.contains(name));

        let (state, message) = match (failed_mandatory.is_empty(), failed_optional.is_empty()) {
            (true, true) => (
                CommitState::Success,
                "passed releasability checks".to_string(),
            ),
            (true, false) => (
                CommitState::Success,
                format!("failed optional checks -> {}", failed_optional.join(",")),
            ),
            (false, true) => (
                CommitState::Failure,
                format!("failed checks -> {}", failed_mandatory.join(",")),
            ),
            (false, false) => (
                CommitState::Failure,
                format!(
                    "failed checks -> {}; non-blocking failures -> {}",
                    failed_mandatory.join(","),
                    failed_optional.join(",")
                ),
            ),
        };

        Self {
            state,
            message,
            failed_mandatory,
            failed_optional,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == CommitState::Success
    }

    /// The message as shown on a release, e.g. `✈ 1.2.3.4 passed releasability checks`.
    pub fn headline(&self, version: &str) -> String {
        format!("\u{2708} {version} {}", self.message)
    }
}

/// Overall state of `report` with failures in `optional` downgraded.
pub fn overall(report: &ReleasabilityChecksReport, optional: &OptionalCheckSet) -> OverallVerdict {
    OverallVerdict::from_failed(report.failed_checks(), optional)
}

/// [`overall`] for a summary handed over from a previous pipeline step.
///
/// A summary whose status is `"0"` passes regardless of its entries.
pub fn overall_from_summary(summary: &ReportSummary, optional: &OptionalCheckSet) -> OverallVerdict {
    if summary.passed() {
        return OverallVerdict::from_failed(std::iter::empty(), optional);
    }
    OverallVerdict::from_failed(summary.failed_checks(), optional)
}
