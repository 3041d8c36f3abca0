//! Observability tests for the releasability run lifecycle.
//!
//! A JSON subscriber writing into a shared buffer is installed for the
//! current thread, so each test can assert on the emitted `event` fields.

use std::io;
use std::sync::{Arc, Mutex};

use releasability_core::fakes::MemoryBus;
use releasability_core::{
    emit_run_finished, emit_run_started, BusTopology, CheckOrchestrator, CheckRegistry,
    CheckContext, ExpectedCheckSet, ListenerConfig, ResultKind, ResultMessage,
};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    fn events(&self) -> Vec<serde_json::Value> {
        self.text()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Captured {
    type Writer = Captured;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn capture() -> (Captured, tracing::subscriber::DefaultGuard) {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_max_level(tracing::Level::DEBUG)
        .with_current_span(true)
        .with_writer(captured.clone())
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (captured, guard)
}

fn event_names(events: &[serde_json::Value]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| e["fields"]["event"].as_str().map(str::to_string))
        .collect()
}

#[test]
fn emit_run_started_carries_correlation_id() {
    let (captured, _guard) = capture();
    emit_run_started("run-123", "acme/widget#1.0.0.1@abc", 8);

    let events = captured.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["fields"]["event"], "run.started");
    assert_eq!(events[0]["fields"]["correlation_id"], "run-123");
    assert_eq!(events[0]["fields"]["expected_checks"], 8);
}

#[test]
fn emit_run_finished_reports_success_flag() {
    let (captured, _guard) = capture();
    emit_run_finished("run-456", 5000, 9, 2);

    let events = captured.events();
    assert_eq!(events[0]["fields"]["event"], "run.finished");
    assert_eq!(events[0]["fields"]["success"], false);
    assert_eq!(events[0]["level"], "INFO");
}

#[tokio::test(start_paused = true)]
async fn run_emits_lifecycle_events_in_order() {
    let (captured, _guard) = capture();

    let bus = Arc::new(MemoryBus::new());
    bus.push_batch(vec![ResultMessage::new(
        "other-run",
        "QA",
        ResultKind::Passed,
        None,
    )]);
    bus.reply_to("QA", ResultKind::Passed, None);

    let orchestrator = CheckOrchestrator::new(
        bus.clone(),
        bus.clone(),
        CheckRegistry::new(ExpectedCheckSet::new(["QA", "Jira"])),
        BusTopology::default(),
        ListenerConfig::with_timing(3, 1),
    );
    let context = CheckContext::new("acme", "widget", "main", "1.0.0.1", "abc");
    orchestrator.run(&context).await.unwrap();

    let events = captured.events();
    let names = event_names(&events);
    assert_eq!(
        names,
        vec![
            "run.started",
            "trigger.published",
            "trigger.published",
            "result.discarded",
            "result.recorded",
            "listener.timed_out",
            "run.finished",
        ]
    );

    // Every run event sits inside the run span.
    let run_id = events[0]["fields"]["correlation_id"].as_str().unwrap();
    for event in &events {
        assert_eq!(event["span"]["correlation_id"], run_id);
    }
    let timed_out = events
        .iter()
        .find(|e| e["fields"]["event"] == "listener.timed_out")
        .unwrap();
    assert_eq!(timed_out["fields"]["missing"], "Jira");
}
