//! Releasability run orchestration.
//!
//! One run: validate the context, mint a correlation id, broadcast the
//! remote triggers, execute the inline checks, then listen for the remote
//! answers until every check reported or the deadline passed.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;

use crate::bus::{BusTopology, ResultInbox, TriggerBus};
use crate::check_set::ExpectedCheckSet;
use crate::config::{ListenerConfig, ReleasabilityConfig};
use crate::context::{CheckContext, CorrelationId};
use crate::error::Result;
use crate::listener::ResultListener;
use crate::obs;
use crate::publisher::TriggerPublisher;
use crate::registry::CheckRegistry;
use crate::report::ReleasabilityChecksReport;

/// Drives releasability runs against one bus deployment.
pub struct CheckOrchestrator {
    publisher: TriggerPublisher,
    inbox: Arc<dyn ResultInbox>,
    registry: CheckRegistry,
    listener_config: ListenerConfig,
}

impl CheckOrchestrator {
    pub fn new(
        trigger_bus: Arc<dyn TriggerBus>,
        inbox: Arc<dyn ResultInbox>,
        registry: CheckRegistry,
        topology: BusTopology,
        listener_config: ListenerConfig,
    ) -> Self {
        Self {
            publisher: TriggerPublisher::new(trigger_bus, topology),
            inbox,
            registry,
            listener_config,
        }
    }

    /// Build an orchestrator from a loaded configuration.
    pub fn from_config(
        trigger_bus: Arc<dyn TriggerBus>,
        inbox: Arc<dyn ResultInbox>,
        registry: CheckRegistry,
        config: &ReleasabilityConfig,
    ) -> Self {
        Self::new(
            trigger_bus,
            inbox,
            registry,
            config.topology.clone(),
            config.listener.clone(),
        )
    }

    pub fn registry(&self) -> &CheckRegistry {
        &self.registry
    }

    pub fn listener_config(&self) -> &ListenerConfig {
        &self.listener_config
    }

    /// Run every registered check with the configured timing.
    pub async fn run(&self, context: &CheckContext) -> Result<ReleasabilityChecksReport> {
        let expected = self.registry.all_check_names();
        self.run_checks(context, &expected, &self.listener_config).await
    }

    /// Run the checks in `expected` with the configured timing.
    ///
    /// Names registered as inline checks are executed in-process; every
    /// other name is triggered remotely.
    pub async fn run_selected(
        &self,
        context: &CheckContext,
        expected: &ExpectedCheckSet,
    ) -> Result<ReleasabilityChecksReport> {
        self.run_checks(context, expected, &self.listener_config).await
    }

    /// [`run_selected`](Self::run_selected) with an explicit deadline and a
    /// fixed poll interval.
    pub async fn run_with(
        &self,
        context: &CheckContext,
        expected: &ExpectedCheckSet,
        deadline_secs: u64,
        poll_interval_secs: u64,
    ) -> Result<ReleasabilityChecksReport> {
        let timing = ListenerConfig::with_timing(deadline_secs, poll_interval_secs);
        let config = ListenerConfig {
            deadline_secs: timing.deadline_secs,
            backoff: timing.backoff,
            ..self.listener_config.clone()
        };
        self.run_checks(context, expected, &config).await
    }

    async fn run_checks(
        &self,
        context: &CheckContext,
        expected: &ExpectedCheckSet,
        config: &ListenerConfig,
    ) -> Result<ReleasabilityChecksReport> {
        context.validate()?;
        config.validate()?;

        let correlation_id = CorrelationId::new();
        let span = obs::run_span(correlation_id.as_str());

        async {
            let started = Instant::now();
            obs::emit_run_started(correlation_id.as_str(), &context.to_string(), expected.len());

            let result = self
                .collect(context, &correlation_id, expected, config)
                .await;
            match &result {
                Ok(report) => obs::emit_run_finished(
                    correlation_id.as_str(),
                    started.elapsed().as_millis() as u64,
                    report.checks().len(),
                    report.failed_checks().len(),
                ),
                Err(e) => obs::emit_run_aborted(correlation_id.as_str(), e),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn collect(
        &self,
        context: &CheckContext,
        correlation_id: &CorrelationId,
        expected: &ExpectedCheckSet,
        config: &ListenerConfig,
    ) -> Result<ReleasabilityChecksReport> {
        let remote = ExpectedCheckSet::new(
            expected
                .iter()
                .filter(|name| !self.registry.is_inline_check(name)),
        );

        self.publisher
            .publish(context, correlation_id, &remote)
            .await?;

        // Remote workers start while the inline checks run.
        let inline_results = self.registry.execute_inline_checks_in(context, expected);

        let listener = ResultListener::new(Arc::clone(&self.inbox), config.clone());
        let outcome = listener.listen(correlation_id, &remote).await?;

        Ok(ReleasabilityChecksReport::new(
            expected,
            outcome.results.into_iter().chain(inline_results),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusError, ResultKind};
    use crate::check_result::CheckState;
    use crate::error::ReleasabilityError;
    use crate::fakes::MemoryBus;
    use crate::inline_check::{InlineCheck, CHECK_VERSION_FORMAT};

    fn context() -> CheckContext {
        CheckContext::new("org", "repo", "main", "1.2.3.42", "abc123")
    }

    fn orchestrator(bus: &Arc<MemoryBus>, registry: CheckRegistry) -> CheckOrchestrator {
        CheckOrchestrator::new(
            bus.clone(),
            bus.clone(),
            registry,
            BusTopology::default(),
            ListenerConfig::with_timing(10, 1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_inline_checks_are_not_triggered() {
        let bus = Arc::new(MemoryBus::new());
        bus.reply_to("QA", ResultKind::Passed, None);
        let registry = CheckRegistry::new(ExpectedCheckSet::new(["QA"]))
            .with_inline_check(InlineCheck::VersionFormat);

        let report = orchestrator(&bus, registry).run(&context()).await.unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "ReleasabilityTriggerTopic");
        assert_eq!(published[0].1.check_name.as_deref(), Some("QA"));

        let names: Vec<_> = report.checks().iter().map(|r| r.name()).collect();
        assert_eq!(names, vec!["QA", CHECK_VERSION_FORMAT]);
        assert!(!report.contains_error());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_context_is_rejected_before_publish() {
        let bus = Arc::new(MemoryBus::new());
        let mut ctx = context();
        ctx.version = "1.2.3".to_string();

        let err = orchestrator(&bus, CheckRegistry::standard())
            .run(&ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, ReleasabilityError::InvalidVersion(_)));
        assert!(bus.published().is_empty());
        assert_eq!(bus.receive_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_overrides_expected_set() {
        let bus = Arc::new(MemoryBus::new());
        bus.reply_to("Jira", ResultKind::Failed, Some("ticket open"));

        let report = orchestrator(&bus, CheckRegistry::standard())
            .run_with(&context(), &ExpectedCheckSet::new(["Jira"]), 5, 1)
            .await
            .unwrap();

        assert_eq!(bus.published().len(), 1);
        assert_eq!(report.checks().len(), 1);
        assert_eq!(report.get("Jira").unwrap().state(), CheckState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_receive_aborts_without_report() {
        let bus = Arc::new(MemoryBus::new());
        bus.push_failure(BusError::Fatal("inbox deleted".to_string()));

        let err = orchestrator(&bus, CheckRegistry::new(ExpectedCheckSet::new(["QA"])))
            .run(&context())
            .await
            .unwrap_err();

        assert!(matches!(err, ReleasabilityError::Listener { attempts: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_deadline_is_rejected_before_publish() {
        let bus = Arc::new(MemoryBus::new());

        let err = orchestrator(&bus, CheckRegistry::standard())
            .run_with(&context(), &ExpectedCheckSet::new(["QA"]), u64::MAX, 1)
            .await
            .unwrap_err();

        assert!(matches!(err, ReleasabilityError::Config(_)));
        assert!(bus.published().is_empty());
    }
}
