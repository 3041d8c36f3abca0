//! Structured observability hooks for the releasability run lifecycle.
//!
//! This module provides:
//! - A run-scoped tracing span via `run_span`
//! - Emission functions for key lifecycle events: start, trigger, result,
//!   retry, timeout, finish
//!
//! Events carry an `event` field; verbosity follows `RUST_LOG`.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bus::{BusError, ResultKind};
use crate::check_result::CheckState;
use crate::listener::DiscardReason;

/// Span tagging every event of one run with its correlation id.
///
/// Attach it to the run future with `tracing::Instrument::instrument` so the
/// future stays `Send`.
pub fn run_span(correlation_id: &str) -> tracing::Span {
    tracing::info_span!("releasability.run", correlation_id = %correlation_id)
}

pub fn emit_run_started(correlation_id: &str, release: &str, expected_checks: usize) {
    info!(
        event = "run.started",
        correlation_id = %correlation_id,
        release = %release,
        expected_checks = expected_checks,
    );
}

pub fn emit_trigger_published(correlation_id: &str, check: &str, message_id: &str) {
    info!(
        event = "trigger.published",
        correlation_id = %correlation_id,
        check = %check,
        message_id = %message_id,
    );
}

pub fn emit_inline_check_executed(check: &str, state: CheckState, duration_ms: u64) {
    info!(
        event = "inline_check.executed",
        check = %check,
        state = %state,
        duration_ms = duration_ms,
    );
}

pub fn emit_result_recorded(correlation_id: &str, check: &str, kind: ResultKind, superseded: bool) {
    info!(
        event = "result.recorded",
        correlation_id = %correlation_id,
        check = %check,
        kind = ?kind,
        superseded = superseded,
    );
}

/// Discards are routine on a shared inbox, so they stay at debug level.
pub fn emit_result_discarded(check: &str, reason: DiscardReason) {
    debug!(event = "result.discarded", check = %check, reason = reason.as_str());
}

pub fn emit_receive_retry(correlation_id: &str, attempt: u32, delay: Duration, error: &BusError) {
    warn!(
        event = "receive.retry",
        correlation_id = %correlation_id,
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
    );
}

pub fn emit_acknowledge_failed(correlation_id: &str, receipts: usize, error: &BusError) {
    warn!(
        event = "acknowledge.failed",
        correlation_id = %correlation_id,
        receipts = receipts,
        error = %error,
    );
}

pub fn emit_listener_timed_out(correlation_id: &str, missing: &[String]) {
    warn!(
        event = "listener.timed_out",
        correlation_id = %correlation_id,
        missing = %missing.join(","),
    );
}

pub fn emit_run_finished(correlation_id: &str, duration_ms: u64, total_checks: usize, failed: usize) {
    info!(
        event = "run.finished",
        correlation_id = %correlation_id,
        duration_ms = duration_ms,
        total_checks = total_checks,
        failed = failed,
        success = failed == 0,
    );
}

pub fn emit_run_aborted(correlation_id: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.aborted", correlation_id = %correlation_id, error = %error);
}
