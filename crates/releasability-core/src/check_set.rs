//! Named sets of checks: the expected set and the optional set.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Remote checks answered by out-of-process workers, in report order.
pub const DEFAULT_REMOTE_CHECKS: [&str; 8] = [
    "CheckDependencies",
    "QA",
    "Jira",
    "CheckPeacheeLanguagesStatistics",
    "QualityGate",
    "ParentPOM",
    "GitHub",
    "CheckManifestValues",
];

/// Fixed, ordered set of check names a run waits for.
///
/// Order is the report order. Duplicate names keep their first position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct ExpectedCheckSet {
    names: Vec<String>,
}

impl ExpectedCheckSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::default();
        for name in names {
            set.insert(name);
        }
        set
    }

    /// The remote checks of a standard deployment.
    pub fn remote_defaults() -> Self {
        Self::new(DEFAULT_REMOTE_CHECKS)
    }

    /// Append a name. Returns `false` if it was already present.
    pub fn insert(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.names.push(name);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// This set followed by the names of `other` not already present.
    pub fn union(&self, other: &ExpectedCheckSet) -> ExpectedCheckSet {
        let mut merged = self.clone();
        for name in other.iter() {
            merged.insert(name);
        }
        merged
    }
}

impl From<Vec<String>> for ExpectedCheckSet {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<ExpectedCheckSet> for Vec<String> {
    fn from(set: ExpectedCheckSet) -> Self {
        set.names
    }
}

/// Checks whose failure does not block the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionalCheckSet {
    names: BTreeSet<String>,
}

impl OptionalCheckSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a comma-separated list such as `"Jira,QA"`. Blank entries are ignored.
    pub fn parse(input: &str) -> Self {
        Self::new(
            input
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty()),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
