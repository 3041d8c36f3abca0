//! Checks executed in-process, next to the remote workers.

use std::fmt;
use std::sync::Arc;

use crate::check_result::{CheckResult, CheckState, DetailValue};
use crate::context::CheckContext;
use crate::error::{ReleasabilityError, Result};
use crate::version;

pub const CHECK_LICENSES: &str = "CheckLicenses";
pub const CHECK_VERSION_FORMAT: &str = "CheckVersionFormat";

/// Compares the licenses shipped with a release against the expected texts.
///
/// Returns the list of mismatching entries; empty means compliant. `Err`
/// carries a reason the comparison could not be made.
pub trait LicenseValidator: Send + Sync {
    fn validate(&self, context: &CheckContext) -> std::result::Result<Vec<String>, String>;
}

/// License compliance, delegated to a [`LicenseValidator`].
#[derive(Clone, Default)]
pub struct LicensesCheck {
    validator: Option<Arc<dyn LicenseValidator>>,
}

impl LicensesCheck {
    pub fn new(validator: Arc<dyn LicenseValidator>) -> Self {
        Self {
            validator: Some(validator),
        }
    }

    /// A check with nothing to compare against; reports `NOT_RELEVANT`.
    pub fn unconfigured() -> Self {
        Self::default()
    }

    fn execute(&self, context: &CheckContext) -> Result<CheckResult> {
        let Some(validator) = &self.validator else {
            return Ok(CheckResult::new(
                CHECK_LICENSES,
                CheckState::NotRelevant,
                Some(format!("no license validator configured for {}", context.repository)),
            ));
        };

        Ok(match validator.validate(context) {
            Ok(mismatches) if mismatches.is_empty() => CheckResult::passed(
                CHECK_LICENSES,
                format!("licenses of {} match the expected texts", context.repository),
            ),
            Ok(mismatches) => CheckResult::failed(
                CHECK_LICENSES,
                format!("{} license mismatch(es)", mismatches.len()),
            )
            .with_detail("mismatches", DetailValue::List(mismatches)),
            Err(reason) => {
                return Err(ReleasabilityError::InlineCheck {
                    check: CHECK_LICENSES.to_string(),
                    reason,
                })
            }
        })
    }
}

impl fmt::Debug for LicensesCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LicensesCheck")
            .field("configured", &self.validator.is_some())
            .finish()
    }
}

/// Closed set of in-process checks.
#[derive(Debug, Clone)]
pub enum InlineCheck {
    Licenses(LicensesCheck),
    /// The release version follows `MAJOR.MINOR.PATCH.BUILD`.
    VersionFormat,
}

impl InlineCheck {
    pub fn name(&self) -> &'static str {
        match self {
            InlineCheck::Licenses(_) => CHECK_LICENSES,
            InlineCheck::VersionFormat => CHECK_VERSION_FORMAT,
        }
    }

    /// Run the check. An `Err` is recorded by the caller as `ERROR`.
    pub fn execute(&self, context: &CheckContext) -> Result<CheckResult> {
        match self {
            InlineCheck::Licenses(check) => check.execute(context),
            InlineCheck::VersionFormat => Ok(match version::validate_version(&context.version) {
                Ok(()) => CheckResult::passed(
                    CHECK_VERSION_FORMAT,
                    format!("{} follows the release version format", context.version),
                ),
                Err(e) => CheckResult::failed(CHECK_VERSION_FORMAT, e.to_string()),
            }),
        }
    }
}

impl fmt::Display for InlineCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InlineCheck({})", self.name())
    }
}
