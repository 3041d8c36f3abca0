//! Release version helpers.
//!
//! Versions follow `<MAJOR>.<MINOR>.<PATCH>.<BUILD NUMBER>`, optionally with a
//! milestone suffix on the patch part (`1.2.3-M4.567`).

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{ReleasabilityError, Result};

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d+\.\d+\.\d+(?:-M\d+)?\.\d+$").expect("version pattern is valid")
    })
}

/// Reject versions that do not follow the organization-wide format.
pub fn validate_version(version: &str) -> Result<()> {
    if version_pattern().is_match(version) {
        Ok(())
    } else {
        Err(ReleasabilityError::InvalidVersion(version.to_string()))
    }
}

/// Extract the build number (fourth part) from a version.
pub fn extract_build_number(version: &str) -> Result<u64> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() != 4 {
        return Err(ReleasabilityError::InvalidVersion(version.to_string()));
    }
    parts[3]
        .parse::<u64>()
        .map_err(|_| ReleasabilityError::InvalidVersion(version.to_string()))
}

/// Extract `MAJOR.MINOR.PATCH` from a version with at least three parts.
pub fn extract_semantic_version(version: &str) -> Result<String> {
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() < 3 {
        return Err(ReleasabilityError::InvalidVersion(version.to_string()));
    }
    Ok(format!("{}.{}.{}", parts[0], parts[1], parts[2]))
}

/// Whether the version has the four-part shape expected by SonarQube.
pub fn is_valid_sonar_version(version: &str) -> bool {
    version.contains('.') && version.split('.').count() == 4
}
