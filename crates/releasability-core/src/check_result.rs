//! Terminal outcome of a single releasability check.

use std::fmt;

use serde::{Deserialize, Serialize};

const SUCCESS_PREFIX: &str = "\u{2705}";
const NOT_RELEVANT_PREFIX: &str = "\u{2713}";
const FAILURE_PREFIX: &str = "\u{274c}";
const UNKNOWN_PREFIX: &str = "\u{2753}";

/// How many list items are shown under a result line.
const MAX_DETAIL_ITEMS: usize = 5;

/// Terminal state of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckState {
    Passed,
    NotRelevant,
    Error,
    Failed,
    /// Synthesized locally when no worker answered before the deadline.
    Timeout,
    /// A worker reported a state this build does not know.
    Unknown,
}

impl CheckState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckState::Passed => "PASSED",
            CheckState::NotRelevant => "NOT_RELEVANT",
            CheckState::Error => "ERROR",
            CheckState::Failed => "FAILED",
            CheckState::Timeout => "TIMEOUT",
            CheckState::Unknown => "UNKNOWN",
        }
    }

    /// Anything but `PASSED` and `NOT_RELEVANT` fails a run.
    pub fn is_failing(&self) -> bool {
        !matches!(self, CheckState::Passed | CheckState::NotRelevant)
    }

    fn prefix(&self) -> &'static str {
        match self {
            CheckState::Passed => SUCCESS_PREFIX,
            CheckState::NotRelevant => NOT_RELEVANT_PREFIX,
            CheckState::Error | CheckState::Failed => FAILURE_PREFIX,
            CheckState::Timeout | CheckState::Unknown => UNKNOWN_PREFIX,
        }
    }
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extra information attached to a result, rendered under its line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Text(String),
    List(Vec<String>),
}

/// One check's outcome. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    name: String,
    state: CheckState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    /// Kept in insertion order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    details: Vec<(String, DetailValue)>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, state: CheckState, message: Option<String>) -> Self {
        Self {
            name: name.into(),
            state,
            message,
            details: Vec::new(),
        }
    }

    pub fn passed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckState::Passed, Some(message.into()))
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckState::Failed, Some(message.into()))
    }

    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckState::Error, Some(message.into()))
    }

    /// Result for a check that never answered.
    pub fn timeout(name: impl Into<String>, waited_secs: u64) -> Self {
        Self::new(
            name,
            CheckState::Timeout,
            Some(format!("no result received within {waited_secs} seconds")),
        )
    }

    /// Attach a detail entry. An existing key keeps its position.
    pub fn with_detail(mut self, key: impl Into<String>, value: DetailValue) -> Self {
        let key = key.into();
        match self.details.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.details.push((key, value)),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> CheckState {
        self.state
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn details(&self) -> &[(String, DetailValue)] {
        &self.details
    }

    pub fn detail(&self, key: &str) -> Option<&DetailValue> {
        self.details
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    /// `PASSED` and `NOT_RELEVANT` count as passed.
    pub fn has_passed(&self) -> bool {
        !self.state.is_failing()
    }

    fn format_details(&self) -> String {
        let mut lines = Vec::new();
        for (key, value) in &self.details {
            match value {
                DetailValue::List(items) if !items.is_empty() => {
                    lines.push(format!("{key}: {} items", items.len()));
                    for item in items.iter().take(MAX_DETAIL_ITEMS) {
                        lines.push(format!("  \u{2022} {item}"));
                    }
                    if items.len() > MAX_DETAIL_ITEMS {
                        lines.push(format!("  ... and {} more", items.len() - MAX_DETAIL_ITEMS));
                    }
                }
                DetailValue::Text(text) if !text.is_empty() => {
                    lines.push(format!("{key}: {text}"));
                }
                _ => {}
            }
        }
        lines.join("\n")
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut note = match &self.message {
            Some(message) => format!(" - {message}"),
            None => String::new(),
        };

        let details = self.format_details();
        if !details.is_empty() {
            note.push('\n');
            note.push_str(&details);
        }

        write!(f, "{} {} {}", self.state.prefix(), self.name, note)
    }
}
