//! Transport seam between the orchestrator and the check workers.
//!
//! These traits define the two halves of the bus:
//! - `TriggerBus`: one-to-many broadcast of trigger messages
//! - `ResultInbox`: shared inbox the workers answer into
//!
//! Delivery is at-least-once. An inbox may return duplicates, out-of-order
//! results and messages belonging to other runs; callers filter by
//! correlation id. In-memory fakes are provided in the `fakes` module and a
//! directory spool in `fs_bus`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::check_result::{CheckResult, CheckState};
use crate::context::{CheckContext, CorrelationId};
use crate::error::Result;

/// Errors raised by a bus implementation.
#[derive(Error, Debug)]
pub enum BusError {
    /// Worth retrying: throttling, dropped connection, lock contention.
    #[error("transient bus error: {0}")]
    Transient(String),

    #[error("bus error: {0}")]
    Fatal(String),

    #[error("bus payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("bus I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BusError {
    pub fn is_transient(&self) -> bool {
        matches!(self, BusError::Transient(_))
    }
}

/// Result type for bus operations.
pub type BusResult<T> = std::result::Result<T, BusError>;

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

/// Trigger broadcast to the check workers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMessage {
    /// Correlation id of the run.
    pub uuid: CorrelationId,
    /// Topic the workers answer to.
    pub response_to: String,
    pub repo_slug: String,
    pub version: String,
    pub vcs_revision: String,
    pub artifactory_build_number: u64,
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_name: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl TriggerMessage {
    pub fn new(
        context: &CheckContext,
        correlation_id: &CorrelationId,
        response_to: &str,
        check_name: Option<&str>,
    ) -> Result<Self> {
        Ok(Self {
            uuid: correlation_id.clone(),
            response_to: response_to.to_string(),
            repo_slug: context.repo_slug(),
            version: context.version.clone(),
            vcs_revision: context.commit_sha.clone(),
            artifactory_build_number: context.build_number()?,
            branch_name: context.branch.clone(),
            check_name: check_name.map(str::to_string),
            issued_at: Utc::now(),
        })
    }
}

/// Message type reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultKind {
    /// Worker picked up the trigger; carries no outcome.
    Ack,
    Passed,
    NotRelevant,
    Error,
    Failed,
    /// Any type this build does not recognise. Counts as failing.
    #[serde(other)]
    Unknown,
}

impl ResultKind {
    /// Outcome carried by this message, `None` for acknowledgements.
    pub fn check_state(&self) -> Option<CheckState> {
        match self {
            ResultKind::Ack => None,
            ResultKind::Passed => Some(CheckState::Passed),
            ResultKind::NotRelevant => Some(CheckState::NotRelevant),
            ResultKind::Error => Some(CheckState::Error),
            ResultKind::Failed => Some(CheckState::Failed),
            ResultKind::Unknown => Some(CheckState::Unknown),
        }
    }
}

/// Result message published by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultMessage {
    #[serde(rename = "requestUUID")]
    pub correlation_id: CorrelationId,
    #[serde(rename = "checkName")]
    pub check_name: String,
    #[serde(rename = "type")]
    pub kind: ResultKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResultMessage {
    pub fn new(
        correlation_id: impl Into<CorrelationId>,
        check_name: impl Into<String>,
        kind: ResultKind,
        message: Option<&str>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            check_name: check_name.into(),
            kind,
            message: message.map(str::to_string),
        }
    }

    /// Convert to a check result. `None` for acknowledgements.
    pub fn to_check_result(&self) -> Option<CheckResult> {
        self.kind
            .check_state()
            .map(|state| CheckResult::new(self.check_name.clone(), state, self.message.clone()))
    }
}

/// A message as read from an inbox, with the handle needed to acknowledge it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxMessage {
    pub receipt: String,
    pub body: ResultMessage,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Broadcast side of the bus.
#[async_trait]
pub trait TriggerBus: Send + Sync {
    /// Publish a trigger to `topic`, returning the bus-assigned message id.
    async fn publish(&self, topic: &str, message: &TriggerMessage) -> BusResult<String>;
}

/// Shared inbox the workers answer into.
#[async_trait]
pub trait ResultInbox: Send + Sync {
    /// Receive up to `max_messages` messages. May return none, duplicates
    /// or messages for other runs.
    async fn receive(&self, max_messages: usize) -> BusResult<Vec<InboxMessage>>;

    /// Remove messages so they are not delivered again. Unknown receipts are ignored.
    async fn acknowledge(&self, receipts: &[String]) -> BusResult<()>;
}

/// Topic names of a deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusTopology {
    pub trigger_topic: String,
    pub result_topic: String,
}

impl Default for BusTopology {
    fn default() -> Self {
        Self {
            trigger_topic: "ReleasabilityTriggerTopic".to_string(),
            result_topic: "ReleasabilityResultTopic".to_string(),
        }
    }
}
