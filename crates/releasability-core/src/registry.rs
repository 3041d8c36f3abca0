//! Registry of remote and inline checks.

use std::time::Instant;

use crate::check_result::CheckResult;
use crate::check_set::ExpectedCheckSet;
use crate::context::CheckContext;
use crate::inline_check::InlineCheck;
use crate::obs;

/// Known checks of a deployment: remote ones answered over the bus, inline
/// ones executed in-process.
#[derive(Debug, Clone, Default)]
pub struct CheckRegistry {
    remote: ExpectedCheckSet,
    inline: Vec<InlineCheck>,
}

impl CheckRegistry {
    pub fn new(remote: ExpectedCheckSet) -> Self {
        Self {
            remote,
            inline: Vec::new(),
        }
    }

    /// Remote defaults plus the standard inline checks.
    pub fn standard() -> Self {
        Self::new(ExpectedCheckSet::remote_defaults())
            .with_inline_check(InlineCheck::VersionFormat)
    }

    /// Register an inline check, replacing any with the same name.
    pub fn register_inline_check(&mut self, check: InlineCheck) {
        match self.inline.iter_mut().find(|c| c.name() == check.name()) {
            Some(slot) => *slot = check,
            None => self.inline.push(check),
        }
    }

    pub fn with_inline_check(mut self, check: InlineCheck) -> Self {
        self.register_inline_check(check);
        self
    }

    pub fn get_inline_check(&self, name: &str) -> Option<&InlineCheck> {
        self.inline.iter().find(|c| c.name() == name)
    }

    pub fn remote_check_names(&self) -> &ExpectedCheckSet {
        &self.remote
    }

    pub fn inline_check_names(&self) -> ExpectedCheckSet {
        ExpectedCheckSet::new(self.inline.iter().map(InlineCheck::name))
    }

    /// Remote checks first, then inline checks: the report order.
    pub fn all_check_names(&self) -> ExpectedCheckSet {
        self.remote.union(&self.inline_check_names())
    }

    pub fn is_inline_check(&self, name: &str) -> bool {
        self.get_inline_check(name).is_some()
    }

    pub fn is_remote_check(&self, name: &str) -> bool {
        self.remote.contains(name)
    }

    /// Execute every inline check. A check returning `Err` yields an
    /// `ERROR` result instead of aborting.
    pub fn execute_inline_checks(&self, context: &CheckContext) -> Vec<CheckResult> {
        self.execute_selected(context, |_| true)
    }

    /// Execute the inline checks named in `selected`.
    pub fn execute_inline_checks_in(
        &self,
        context: &CheckContext,
        selected: &ExpectedCheckSet,
    ) -> Vec<CheckResult> {
        self.execute_selected(context, |name| selected.contains(name))
    }

    fn execute_selected(
        &self,
        context: &CheckContext,
        keep: impl Fn(&str) -> bool,
    ) -> Vec<CheckResult> {
        self.inline
            .iter()
            .filter(|check| keep(check.name()))
            .map(|check| {
                let started = Instant::now();
                let result = check
                    .execute(context)
                    .unwrap_or_else(|e| CheckResult::error(check.name(), e.to_string()));
                obs::emit_inline_check_executed(
                    result.name(),
                    result.state(),
                    started.elapsed().as_millis() as u64,
                );
                result
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check_result::CheckState;
    use crate::inline_check::{LicenseValidator, LicensesCheck, CHECK_LICENSES};
    use std::sync::Arc;

    struct Unreachable;

    impl LicenseValidator for Unreachable {
        fn validate(&self, _context: &CheckContext) -> Result<Vec<String>, String> {
            Err("license service unreachable".to_string())
        }
    }

    #[test]
    fn test_standard_registry() {
        let registry = CheckRegistry::standard();
        assert_eq!(registry.remote_check_names().len(), 8);
        assert!(registry.is_inline_check("CheckVersionFormat"));
        assert!(registry.is_remote_check("QA"));
        assert!(!registry.is_inline_check("QA"));
        assert_eq!(registry.all_check_names().len(), 9);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = CheckRegistry::new(ExpectedCheckSet::new(["QA"]));
        registry.register_inline_check(InlineCheck::Licenses(LicensesCheck::unconfigured()));
        registry.register_inline_check(InlineCheck::Licenses(LicensesCheck::new(Arc::new(
            Unreachable,
        ))));
        assert_eq!(registry.inline_check_names().len(), 1);
        assert_eq!(
            registry.all_check_names().iter().collect::<Vec<_>>(),
            vec!["QA", CHECK_LICENSES]
        );
    }

    #[test]
    fn test_inline_error_becomes_error_result() {
        let registry = CheckRegistry::new(ExpectedCheckSet::default())
            .with_inline_check(InlineCheck::Licenses(LicensesCheck::new(Arc::new(Unreachable))))
            .with_inline_check(InlineCheck::VersionFormat);

        let ctx = CheckContext::new("org", "repo", "main", "1.0.0.1", "abc");
        let results = registry.execute_inline_checks(&ctx);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].state(), CheckState::Error);
        assert!(results[0].message().unwrap().contains("unreachable"));
        assert_eq!(results[1].state(), CheckState::Passed);

        let only_version = ExpectedCheckSet::new(["CheckVersionFormat", "QA"]);
        let selected = registry.execute_inline_checks_in(&ctx, &only_version);
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].name(), "CheckVersionFormat");
    }
}
