//! Result listener: polls the shared inbox until every expected check has
//! answered or the deadline passes.
//!
//! The inbox is treated as an unordered, duplicate-tolerant stream that also
//! carries other runs' traffic. Correctness rests on per-message filtering
//! by correlation id and check name, never on delivery order.
//!
//! [`ResultCollector`] is the synchronous state machine
//! (`Waiting` → `Complete` | `TimedOut`); [`ResultListener`] drives it
//! against a [`ResultInbox`] with backoff, retries and the deadline.
//! Completion is decided per receive batch, so a duplicate later in the
//! batch that answers the last outstanding check still replaces it.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep_until, Instant};

use crate::bus::{InboxMessage, ResultInbox, ResultMessage};
use crate::check_result::CheckResult;
use crate::check_set::ExpectedCheckSet;
use crate::config::{DuplicatePolicy, ListenerConfig};
use crate::context::CorrelationId;
use crate::error::{ReleasabilityError, Result};
use crate::obs;

/// Listener lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerState {
    /// At least one expected check is outstanding.
    Waiting,
    /// Every expected check answered.
    Complete,
    /// The deadline passed with checks outstanding.
    TimedOut,
}

/// Why a message did not change the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Belongs to another run.
    ForeignCorrelation,
    /// Worker acknowledgement without an outcome.
    Acknowledgement,
    /// Names a check this run does not wait for.
    UnexpectedCheck,
    /// Repeat answer under [`DuplicatePolicy::KeepFirst`].
    Duplicate,
    /// Arrived after the listener left `Waiting`.
    AlreadyFinalized,
}

impl DiscardReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscardReason::ForeignCorrelation => "foreign_correlation",
            DiscardReason::Acknowledgement => "acknowledgement",
            DiscardReason::UnexpectedCheck => "unexpected_check",
            DiscardReason::Duplicate => "duplicate",
            DiscardReason::AlreadyFinalized => "already_finalized",
        }
    }
}

/// Effect of one step of the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The result was stored. `superseded` is set when it replaced an earlier answer.
    Recorded { check: String, superseded: bool },
    Discarded(DiscardReason),
    /// Deadline reached; `missing` were synthesized as `TIMEOUT`.
    TimedOut { missing: Vec<String> },
}

/// Correlation and dedup state for one run.
#[derive(Debug)]
pub struct ResultCollector {
    correlation_id: CorrelationId,
    expected: ExpectedCheckSet,
    policy: DuplicatePolicy,
    answered: HashSet<String>,
    results: Vec<CheckResult>,
    state: ListenerState,
}

impl ResultCollector {
    pub fn new(
        correlation_id: CorrelationId,
        expected: ExpectedCheckSet,
        policy: DuplicatePolicy,
    ) -> Self {
        let state = if expected.is_empty() {
            ListenerState::Complete
        } else {
            ListenerState::Waiting
        };
        Self {
            correlation_id,
            expected,
            policy,
            answered: HashSet::new(),
            results: Vec::new(),
            state,
        }
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Expected checks without an answer, in expected order.
    pub fn outstanding(&self) -> Vec<&str> {
        self.expected
            .iter()
            .filter(|name| !self.answered.contains(*name))
            .collect()
    }

    /// Whether a message carries this run's correlation id.
    pub fn owns(&self, message: &ResultMessage) -> bool {
        message.correlation_id == self.correlation_id
    }

    /// Feed one inbox message. Call [`settle`](Self::settle) once the
    /// batch it came in has been offered.
    pub fn offer(&mut self, message: &ResultMessage) -> Disposition {
        if !self.owns(message) {
            return Disposition::Discarded(DiscardReason::ForeignCorrelation);
        }
        if self.state != ListenerState::Waiting {
            return Disposition::Discarded(DiscardReason::AlreadyFinalized);
        }
        let Some(result) = message.to_check_result() else {
            return Disposition::Discarded(DiscardReason::Acknowledgement);
        };
        if !self.expected.contains(result.name()) {
            return Disposition::Discarded(DiscardReason::UnexpectedCheck);
        }

        let superseded = self.answered.contains(result.name());
        if superseded && self.policy == DuplicatePolicy::KeepFirst {
            return Disposition::Discarded(DiscardReason::Duplicate);
        }

        let check = result.name().to_string();
        match self.results.iter_mut().find(|r| r.name() == check) {
            Some(slot) => *slot = result,
            None => self.results.push(result),
        }
        self.answered.insert(check.clone());
        Disposition::Recorded { check, superseded }
    }

    /// Leave `Waiting` for `Complete` once every expected check answered.
    pub fn settle(&mut self) -> ListenerState {
        if self.state == ListenerState::Waiting && self.answered.len() == self.expected.len() {
            self.state = ListenerState::Complete;
        }
        self.state
    }

    /// Deadline reached: synthesize `TIMEOUT` for every outstanding check.
    ///
    /// No-op unless `Waiting`; `missing` is then empty.
    pub fn expire(&mut self, waited_secs: u64) -> Disposition {
        if self.state != ListenerState::Waiting {
            return Disposition::TimedOut {
                missing: Vec::new(),
            };
        }
        let missing: Vec<String> = self.outstanding().into_iter().map(str::to_string).collect();
        for name in &missing {
            self.results.push(CheckResult::timeout(name.clone(), waited_secs));
        }
        self.state = ListenerState::TimedOut;
        Disposition::TimedOut { missing }
    }

    /// Results in arrival order, one per check.
    pub fn into_results(self) -> Vec<CheckResult> {
        self.results
    }
}

/// Outcome of a complete listen.
#[derive(Debug, Clone)]
pub struct ListenOutcome {
    pub state: ListenerState,
    /// One result per expected check, in arrival order; timeouts last.
    pub results: Vec<CheckResult>,
    /// Checks synthesized as `TIMEOUT`.
    pub timed_out: Vec<String>,
    pub polls: u32,
}

/// Polls a [`ResultInbox`] on behalf of one run.
pub struct ResultListener {
    inbox: Arc<dyn ResultInbox>,
    config: ListenerConfig,
}

impl ResultListener {
    pub fn new(inbox: Arc<dyn ResultInbox>, config: ListenerConfig) -> Self {
        Self { inbox, config }
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }

    /// Poll until every check in `expected` answered or the deadline passed.
    ///
    /// Fails with [`ReleasabilityError::Listener`] when the inbox keeps
    /// failing past the retry budget; no partial results are returned then.
    pub async fn listen(
        &self,
        correlation_id: &CorrelationId,
        expected: &ExpectedCheckSet,
    ) -> Result<ListenOutcome> {
        let deadline = Instant::now()
            .checked_add(self.config.deadline())
            .ok_or_else(|| {
                ReleasabilityError::Config(format!(
                    "deadline of {}s is out of range",
                    self.config.deadline_secs
                ))
            })?;
        let mut collector = ResultCollector::new(
            correlation_id.clone(),
            expected.clone(),
            self.config.duplicate_policy,
        );
        let mut polls = 0u32;
        let mut empty_polls = 0u32;
        let mut timed_out = Vec::new();

        while collector.state() == ListenerState::Waiting {
            if Instant::now() >= deadline {
                if let Disposition::TimedOut { missing } = collector.expire(self.config.deadline_secs)
                {
                    obs::emit_listener_timed_out(correlation_id.as_str(), &missing);
                    timed_out = missing;
                }
                break;
            }

            let messages = self.receive_with_retry(correlation_id, deadline).await?;
            polls += 1;

            let recorded_any = self.absorb(&mut collector, messages).await;
            if collector.settle() != ListenerState::Waiting {
                break;
            }

            if recorded_any {
                empty_polls = 0;
            }
            let delay = self.config.backoff.delay(empty_polls);
            if !recorded_any {
                empty_polls = empty_polls.saturating_add(1);
            }
            let wake = Instant::now().checked_add(delay).unwrap_or(deadline);
            sleep_until(wake.min(deadline)).await;
        }

        Ok(ListenOutcome {
            state: collector.state(),
            results: collector.into_results(),
            timed_out,
            polls,
        })
    }

    /// Offer a batch to the collector and acknowledge this run's messages.
    /// Returns whether anything was recorded.
    async fn absorb(&self, collector: &mut ResultCollector, messages: Vec<InboxMessage>) -> bool {
        let mut recorded_any = false;
        let mut receipts = Vec::new();
        let run_id = collector.correlation_id.to_string();

        for message in messages {
            if collector.owns(&message.body) {
                receipts.push(message.receipt);
            }
            match collector.offer(&message.body) {
                Disposition::Recorded { check, superseded } => {
                    recorded_any = true;
                    obs::emit_result_recorded(&run_id, &check, message.body.kind, superseded);
                }
                Disposition::Discarded(reason) => {
                    obs::emit_result_discarded(&message.body.check_name, reason);
                }
                Disposition::TimedOut { .. } => {}
            }
        }

        if !receipts.is_empty() {
            // Unacknowledged messages are redelivered and then discarded by name.
            if let Err(e) = self.inbox.acknowledge(&receipts).await {
                obs::emit_acknowledge_failed(&run_id, receipts.len(), &e);
            }
        }
        recorded_any
    }

    async fn receive_with_retry(
        &self,
        correlation_id: &CorrelationId,
        deadline: Instant,
    ) -> Result<Vec<InboxMessage>> {
        let mut attempt = 0u32;
        loop {
            match self.inbox.receive(self.config.max_messages_per_poll).await {
                Ok(messages) => return Ok(messages),
                Err(e) if e.is_transient() && attempt < self.config.max_receive_retries => {
                    attempt += 1;
                    let delay = self.config.retry_delay(attempt);
                    obs::emit_receive_retry(correlation_id.as_str(), attempt, delay, &e);

                    let wake = Instant::now().checked_add(delay).unwrap_or(deadline);
                    if wake >= deadline {
                        // Let the caller time the run out instead of retrying past it.
                        sleep_until(deadline).await;
                        return Ok(Vec::new());
                    }
                    sleep_until(wake).await;
                }
                Err(e) => {
                    return Err(ReleasabilityError::Listener {
                        attempts: attempt + 1,
                        source: e,
                    })
                }
            }
        }
    }
}
