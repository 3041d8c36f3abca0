//! Run context and correlation identity.

use serde::{Deserialize, Serialize};

use crate::error::{ReleasabilityError, Result};
use crate::version;

/// Everything a check needs to know about the release candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckContext {
    pub organization: String,
    pub repository: String,
    pub branch: String,
    pub version: String,
    pub commit_sha: String,
}

impl CheckContext {
    pub fn new(
        organization: impl Into<String>,
        repository: impl Into<String>,
        branch: impl Into<String>,
        version: impl Into<String>,
        commit_sha: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            repository: repository.into(),
            branch: branch.into(),
            version: version.into(),
            commit_sha: commit_sha.into(),
        }
    }

    /// `organization/repository`
    pub fn repo_slug(&self) -> String {
        format!("{}/{}", self.organization, self.repository)
    }

    /// Build number carried by the version.
    pub fn build_number(&self) -> Result<u64> {
        version::extract_build_number(&self.version)
    }

    /// Reject empty fields and malformed versions.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("organization", &self.organization),
            ("repository", &self.repository),
            ("branch", &self.branch),
            ("commit_sha", &self.commit_sha),
        ];
        for (field, value) in fields {
            if value.trim().is_empty() {
                return Err(ReleasabilityError::InvalidContext(format!(
                    "{field} must not be empty"
                )));
            }
        }
        version::validate_version(&self.version)
    }
}

impl std::fmt::Display for CheckContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{}#{}@{}",
            self.organization, self.repository, self.version, self.commit_sha
        )
    }
}

/// Token scoping all bus traffic to exactly one orchestration run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh random id.
    pub fn new() -> Self {
        CorrelationId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        CorrelationId(s.to_string())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
