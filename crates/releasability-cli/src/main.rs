//! Releasability checks CLI
//!
//! The `releasability` command runs the release-readiness checks of a
//! version and turns their report into a commit status.
//!
//! ## Commands
//!
//! - `check`: trigger the checks, wait for their results and print the report
//! - `status`: fold a report summary into a commit status, downgrading
//!   optional checks

mod github_output;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn, Level};

use releasability_core::{
    overall_from_summary, CheckContext, CheckOrchestrator, CheckRegistry, ExpectedCheckSet,
    FsBus, OptionalCheckSet, PollBackoff, ReleasabilityConfig, ReportSummary,
};

use crate::github_output::GithubOutput;

const OUTPUT_LOGS: &str = "logs";
const OUTPUT_REPORT: &str = "report";
const OUTPUT_STATUS: &str = "status";
const OUTPUT_STATE: &str = "state";
const OUTPUT_MESSAGE: &str = "message";

const GENERIC_FAILURE_MESSAGE: &str = "Releasability checks failed, check logs for more details";

#[derive(Parser)]
#[command(name = "releasability")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Release-readiness checks for versioned builds", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Trigger the releasability checks of a version and report their results
    Check(CheckArgs),

    /// Compute the commit status from a report summary
    Status(StatusArgs),
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Organization owning the repository
    #[arg(long, env = "INPUT_ORGANIZATION")]
    organization: String,

    /// Repository name
    #[arg(long, env = "INPUT_REPOSITORY")]
    repository: String,

    /// Branch the version was built from
    #[arg(long, env = "INPUT_BRANCH")]
    branch: String,

    /// Version to check, MAJOR.MINOR.PATCH.BUILD
    #[arg(long, env = "INPUT_VERSION")]
    version: String,

    /// Commit the version was built from
    #[arg(long, env = "INPUT_COMMIT_SHA")]
    commit_sha: String,

    /// Comma-separated check names (default: every registered check)
    #[arg(long, env = "RELEASABILITY_CHECKS")]
    checks: Option<String>,

    /// Root directory of the filesystem bus
    #[arg(long, env = "RELEASABILITY_BUS_DIR")]
    bus_dir: Option<PathBuf>,

    /// Seconds to wait for the remote checks
    #[arg(long)]
    deadline_secs: Option<u64>,

    /// Seconds between inbox polls
    #[arg(long)]
    poll_interval_secs: Option<u64>,
}

#[derive(Args, Debug)]
struct StatusArgs {
    /// Version the report belongs to
    #[arg(long, env = "INPUT_VERSION")]
    version: Option<String>,

    /// Report summary as written to the `report` output of `check`
    #[arg(long, env = "RELEASABILITY_CHECK_RESULT")]
    result: Option<String>,

    /// Comma-separated checks whose failure does not fail the status
    #[arg(long, env = "OPTIONAL_CHECKS", default_value = "")]
    optional_checks: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    releasability_core::init_tracing(cli.json, level);

    let outputs = GithubOutput::from_env();

    let passed = match cli.command {
        Commands::Check(args) => cmd_check(args, &outputs).await,
        Commands::Status(args) => cmd_status(args, &outputs),
    };

    match passed {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            println!("::error:: {e:#}");
            if let Err(e) = outputs.set(OUTPUT_STATUS, "1") {
                warn!(error = %e, "Could not record failure status");
            }
            ExitCode::FAILURE
        }
    }
}

/// Build the effective configuration: environment first, flags on top.
fn check_config(args: &CheckArgs) -> Result<ReleasabilityConfig> {
    let config =
        ReleasabilityConfig::from_env().context("Failed to load releasability configuration")?;
    Ok(apply_check_flags(config, args))
}

/// Flags only replace what they name; the configured backoff survives a
/// bare `--deadline-secs`.
fn apply_check_flags(mut config: ReleasabilityConfig, args: &CheckArgs) -> ReleasabilityConfig {
    if let Some(dir) = &args.bus_dir {
        config.bus_dir = dir.clone();
    }
    if let Some(deadline) = args.deadline_secs {
        config.listener.deadline_secs = deadline;
    }
    if let Some(interval) = args.poll_interval_secs {
        config.listener.backoff = PollBackoff::Fixed {
            interval_ms: interval.saturating_mul(1_000),
        };
    }
    config
}

/// Run the checks. Returns whether the report is free of failures.
async fn cmd_check(args: CheckArgs, outputs: &GithubOutput) -> Result<bool> {
    let config = check_config(&args)?;
    let context = CheckContext::new(
        &args.organization,
        &args.repository,
        &args.branch,
        &args.version,
        &args.commit_sha,
    );

    let bus = Arc::new(FsBus::new(&config.bus_dir).with_context(|| {
        format!("Failed to open bus at {}", config.bus_dir.display())
    })?);
    let registry = CheckRegistry::standard();
    let expected = match &args.checks {
        Some(names) => ExpectedCheckSet::new(
            names.split(',').map(str::trim).filter(|name| !name.is_empty()),
        ),
        None => registry.all_check_names(),
    };

    info!(release = %context, checks = expected.len(), "Starting releasability checks");
    let orchestrator = CheckOrchestrator::from_config(bus.clone(), bus, registry, &config);
    let report = orchestrator.run_selected(&context, &expected).await?;

    let logs = report.render();
    println!("{logs}");

    let summary = report.summary();
    outputs.set_multiline(OUTPUT_LOGS, &logs)?;
    outputs.set(OUTPUT_REPORT, &serde_json::to_string(&summary)?)?;
    outputs.set(OUTPUT_STATUS, &summary.status)?;

    if report.contains_error() {
        println!("::error::Releasability checks failed");
        Ok(false)
    } else {
        println!("::notice::Releasability checks passed successfully");
        Ok(true)
    }
}

/// Fold a report summary into a commit status.
///
/// The outcome is carried by the outputs; only missing input fails the step.
fn cmd_status(args: StatusArgs, outputs: &GithubOutput) -> Result<bool> {
    let version = args.version.filter(|v| !v.is_empty());
    let result = args.result.filter(|r| !r.is_empty());
    let (Some(version), Some(result)) = (version, result) else {
        outputs.set(OUTPUT_STATUS, "1")?;
        outputs.set(OUTPUT_STATE, "failure")?;
        outputs.set(OUTPUT_MESSAGE, GENERIC_FAILURE_MESSAGE)?;
        return Ok(false);
    };

    let summary: ReportSummary =
        serde_json::from_str(&result).context("Failed to parse releasability check result")?;
    let optional = OptionalCheckSet::parse(&args.optional_checks);
    let verdict = overall_from_summary(&summary, &optional);

    if !verdict.failed_optional.is_empty() || !verdict.failed_mandatory.is_empty() {
        info!(
            failed = ?verdict.failed_mandatory,
            optional = ?verdict.failed_optional,
            "Failed checks"
        );
    }

    outputs.set(OUTPUT_STATUS, verdict.state.status_code())?;
    outputs.set(OUTPUT_STATE, verdict.state.as_str())?;
    outputs.set(OUTPUT_MESSAGE, &verdict.headline(&version))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use releasability_core::{CheckResult, ReleasabilityChecksReport};

    fn output_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("github_output");
        (dir, path)
    }

    fn summary_json() -> String {
        let report = ReleasabilityChecksReport::new(
            &ExpectedCheckSet::new(["QA", "Jira", "QualityGate"]),
            vec![
                CheckResult::passed("QA", "ok"),
                CheckResult::failed("Jira", "open tickets"),
                CheckResult::passed("QualityGate", "green"),
            ],
        );
        serde_json::to_string(&report.summary()).unwrap()
    }

    fn status_args(version: Option<&str>, result: Option<String>, optional: &str) -> StatusArgs {
        StatusArgs {
            version: version.map(str::to_string),
            result,
            optional_checks: optional.to_string(),
        }
    }

    #[test]
    fn test_cli_parses_check_flags() {
        let cli = Cli::try_parse_from([
            "releasability",
            "--verbose",
            "check",
            "--organization",
            "acme",
            "--repository",
            "widget",
            "--branch",
            "main",
            "--version",
            "1.2.3.4",
            "--commit-sha",
            "abc",
            "--deadline-secs",
            "30",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.version, "1.2.3.4");
                assert_eq!(args.deadline_secs, Some(30));
                assert!(args.poll_interval_secs.is_none());
            }
            Commands::Status(_) => panic!("expected check"),
        }
    }

    #[test]
    fn test_status_downgrades_optional_failure() {
        let (_dir, path) = output_file();
        let outputs = GithubOutput::to_file(&path);

        let ok = cmd_status(status_args(Some("1.2.3.4"), Some(summary_json()), "Jira"), &outputs)
            .unwrap();
        assert!(ok);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "status=0\nstate=success\nmessage=\u{2708} 1.2.3.4 failed optional checks -> Jira\n"
        );
    }

    #[test]
    fn test_status_mandatory_failure() {
        let (_dir, path) = output_file();
        let outputs = GithubOutput::to_file(&path);

        cmd_status(status_args(Some("1.2.3.4"), Some(summary_json()), ""), &outputs).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("status=1\n"));
        assert!(written.contains("state=failure\n"));
        assert!(written.contains("message=\u{2708} 1.2.3.4 failed checks -> Jira\n"));
    }

    #[test]
    fn test_status_missing_input() {
        let (_dir, path) = output_file();
        let outputs = GithubOutput::to_file(&path);

        let ok = cmd_status(status_args(None, Some(summary_json()), ""), &outputs).unwrap();
        assert!(!ok);

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            format!("status=1\nstate=failure\nmessage={GENERIC_FAILURE_MESSAGE}\n")
        );
    }

    #[test]
    fn test_status_rejects_malformed_result() {
        let outputs = GithubOutput::to_file(output_file().1);
        let err = cmd_status(
            status_args(Some("1.2.3.4"), Some("{not json".to_string()), ""),
            &outputs,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }

    fn check_args(deadline_secs: Option<u64>, poll_interval_secs: Option<u64>) -> CheckArgs {
        CheckArgs {
            organization: "acme".to_string(),
            repository: "widget".to_string(),
            branch: "main".to_string(),
            version: "1.2.3.4".to_string(),
            commit_sha: "abc".to_string(),
            checks: None,
            bus_dir: None,
            deadline_secs,
            poll_interval_secs,
        }
    }

    #[test]
    fn test_deadline_flag_keeps_configured_backoff() {
        let mut config = ReleasabilityConfig::default();
        config.listener.backoff = PollBackoff::Exponential {
            initial_ms: 2_000,
            max_ms: 16_000,
        };

        let config = apply_check_flags(config, &check_args(Some(45), None));
        assert_eq!(config.listener.deadline_secs, 45);
        assert_eq!(
            config.listener.backoff,
            PollBackoff::Exponential {
                initial_ms: 2_000,
                max_ms: 16_000
            }
        );
    }

    #[test]
    fn test_poll_interval_flag_sets_fixed_backoff() {
        let config = apply_check_flags(ReleasabilityConfig::default(), &check_args(None, Some(3)));
        assert_eq!(config.listener.deadline_secs, 600);
        assert_eq!(
            config.listener.backoff,
            PollBackoff::Fixed { interval_ms: 3_000 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_without_workers_times_out() {
        let (dir, path) = output_file();
        let outputs = GithubOutput::to_file(&path);
        let args = CheckArgs {
            organization: "acme".to_string(),
            repository: "widget".to_string(),
            branch: "main".to_string(),
            version: "1.2.3.4".to_string(),
            commit_sha: "abc".to_string(),
            checks: Some("QA,CheckVersionFormat".to_string()),
            bus_dir: Some(dir.path().join("bus")),
            deadline_secs: Some(3),
            poll_interval_secs: Some(1),
        };

        let passed = cmd_check(args, &outputs).await.unwrap();
        assert!(!passed);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with("logs<<EOF\n"));
        assert!(written.contains("\u{2753} QA  - no result received within 3 seconds"));
        assert!(written.contains("\u{2705} CheckVersionFormat"));
        assert!(written.contains("\"QA\":\"TIMEOUT\""));
        assert!(written.ends_with("status=1\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_rejects_bad_version() {
        let dir = tempfile::tempdir().unwrap();
        let outputs = GithubOutput::to_file(dir.path().join("out"));
        let args = CheckArgs {
            organization: "acme".to_string(),
            repository: "widget".to_string(),
            branch: "main".to_string(),
            version: "1.2".to_string(),
            commit_sha: "abc".to_string(),
            checks: None,
            bus_dir: Some(dir.path().join("bus")),
            deadline_secs: Some(3),
            poll_interval_secs: None,
        };

        let err = cmd_check(args, &outputs).await.unwrap_err();
        assert!(err.to_string().contains("1.2"));
        assert!(!dir.path().join("bus").join("topics").join("ReleasabilityTriggerTopic").exists());
    }
}
