//! Releasability Core Library
//!
//! Triggers release-readiness checks over a shared bus, collects their
//! asynchronous answers under a per-run correlation id and aggregates them
//! into a single report.

pub mod bus;
pub mod check_result;
pub mod check_set;
pub mod config;
pub mod context;
pub mod downgrade;
pub mod error;
pub mod fakes;
pub mod fs_bus;
pub mod inline_check;
pub mod listener;
pub mod obs;
pub mod orchestrator;
pub mod publisher;
pub mod registry;
pub mod report;
pub mod telemetry;
pub mod version;

pub use bus::{
    BusError, BusResult, BusTopology, InboxMessage, ResultInbox, ResultKind, ResultMessage,
    TriggerBus, TriggerMessage,
};
pub use check_result::{CheckResult, CheckState, DetailValue};
pub use check_set::{ExpectedCheckSet, OptionalCheckSet, DEFAULT_REMOTE_CHECKS};
pub use config::{
    DuplicatePolicy, ListenerConfig, PollBackoff, ReleasabilityConfig, MAX_DEADLINE_SECS,
};
pub use context::{CheckContext, CorrelationId};
pub use downgrade::{overall, overall_from_summary, CommitState, OverallVerdict};
pub use error::{ReleasabilityError, Result};
pub use fs_bus::FsBus;
pub use inline_check::{
    InlineCheck, LicenseValidator, LicensesCheck, CHECK_LICENSES, CHECK_VERSION_FORMAT,
};
pub use listener::{
    DiscardReason, Disposition, ListenOutcome, ListenerState, ResultCollector, ResultListener,
};
pub use orchestrator::CheckOrchestrator;
pub use publisher::TriggerPublisher;
pub use registry::CheckRegistry;
pub use report::{ReleasabilityChecksReport, ReportSummary};

pub use obs::{
    emit_listener_timed_out, emit_result_recorded, emit_run_finished, emit_run_started, run_span,
};
pub use telemetry::init_tracing;

/// Releasability version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
