//! Local process runner tests against real child processes
#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use timesync_harness::{
    AgentCommand, LocalProcessRunner, ProcessRunner, RunnerConfig, RunnerError, READY_MARKER,
};

fn shell(script: &str) -> AgentCommand {
    AgentCommand::new(Path::new("/bin/sh"), vec!["-c".to_string(), script.to_string()])
}

#[tokio::test]
async fn test_start_waits_for_marker_and_collects_output() {
    let mut runner = LocalProcessRunner::new(RunnerConfig::default());
    let agent = shell("echo booting; echo 'Device ready to service events'; sleep 30");

    runner
        .start("node01", &agent, "TIME-SYNC-SERVER", Some(READY_MARKER))
        .await
        .unwrap();
    assert_eq!(runner.running_tags(), vec!["TIME-SYNC-SERVER".to_string()]);

    runner.stop("node01", "TIME-SYNC-SERVER").await.unwrap();
    assert!(runner.running_tags().is_empty());

    let output = runner
        .collect_output("node01", "TIME-SYNC-SERVER")
        .await
        .unwrap();
    assert!(output.text.starts_with("booting\n"));
    assert!(output.text.contains("ready to service events"));
    assert_ne!(output.status, 0);
}

#[tokio::test]
async fn test_exit_status_of_finished_process() {
    let mut runner = LocalProcessRunner::new(RunnerConfig::default());

    runner
        .start("node01", &shell("echo Sync Succeeded; exit 3"), "TIME-SYNC-CLIENT", None)
        .await
        .unwrap();

    let output = runner
        .collect_output("node01", "TIME-SYNC-CLIENT")
        .await
        .unwrap();
    assert_eq!(output.status, 3);
    assert_eq!(output.text, "Sync Succeeded\n");
}

#[tokio::test]
async fn test_exit_before_marker_is_an_error() {
    let mut runner = LocalProcessRunner::new(RunnerConfig::default());

    let err = runner
        .start("node01", &shell("echo starting"), "TIME-SYNC-CLIENT", Some("Sync Succeeded"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::OutputClosed { .. }));

    // Whatever was printed is still collectable.
    let output = runner
        .collect_output("node01", "TIME-SYNC-CLIENT")
        .await
        .unwrap();
    assert_eq!(output.text, "starting\n");
}

#[tokio::test]
async fn test_duplicate_running_tag_is_rejected() {
    let mut runner = LocalProcessRunner::new(RunnerConfig::default());
    let agent = shell("echo up; sleep 30");

    runner
        .start("node01", &agent, "TIME-SYNC-SERVER", Some("up"))
        .await
        .unwrap();
    let err = runner
        .start("node01", &agent, "TIME-SYNC-SERVER", Some("up"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::DuplicateTag { .. }));

    runner.stop("node01", "TIME-SYNC-SERVER").await.unwrap();
}

#[tokio::test]
async fn test_restart_keeps_accumulating_output() {
    let mut runner = LocalProcessRunner::new(RunnerConfig::default());

    runner
        .start("node03", &shell("echo first; sleep 30"), "TIME-SYNC-SERVER", Some("first"))
        .await
        .unwrap();
    runner.stop("node03", "TIME-SYNC-SERVER").await.unwrap();

    runner
        .start("node03", &shell("echo second; sleep 30"), "TIME-SYNC-SERVER", Some("second"))
        .await
        .unwrap();
    runner.stop("node03", "TIME-SYNC-SERVER").await.unwrap();

    let output = runner
        .collect_output("node03", "TIME-SYNC-SERVER")
        .await
        .unwrap();
    assert_eq!(output.text, "first\nsecond\n");
}

#[tokio::test]
async fn test_failed_restart_keeps_earlier_output() {
    let mut runner = LocalProcessRunner::new(RunnerConfig::default());

    runner
        .start("node03", &shell("echo first; sleep 30"), "TIME-SYNC-SERVER", Some("first"))
        .await
        .unwrap();
    runner.stop("node03", "TIME-SYNC-SERVER").await.unwrap();

    let missing = AgentCommand::new(Path::new("/nonexistent/mock-device"), Vec::new());
    let err = runner
        .start("node03", &missing, "TIME-SYNC-SERVER", Some("second"))
        .await
        .unwrap_err();
    assert!(matches!(err, RunnerError::Spawn { .. }));

    let output = runner
        .collect_output("node03", "TIME-SYNC-SERVER")
        .await
        .unwrap();
    assert_eq!(output.text, "first\n");
}

// ----------------------------------------------------------------------------
// Bounded Collection
// ----------------------------------------------------------------------------

fn quick_reap() -> RunnerConfig {
    RunnerConfig {
        reap_timeout_secs: 1,
        ..RunnerConfig::default()
    }
}

#[tokio::test]
async fn test_agent_ignoring_sigterm_is_killed_with_its_group() {
    let mut runner = LocalProcessRunner::new(quick_reap());
    let agent = shell("trap '' TERM; echo 'ready to service events'; sleep 20");

    runner
        .start("node03", &agent, "TIME-SYNC-SERVER", Some(READY_MARKER))
        .await
        .unwrap();
    runner.stop("node03", "TIME-SYNC-SERVER").await.unwrap();

    let started = Instant::now();
    let output = tokio::time::timeout(
        Duration::from_secs(8),
        runner.collect_output("node03", "TIME-SYNC-SERVER"),
    )
    .await
    .expect("collection should finish once the group is killed")
    .unwrap();

    assert!(started.elapsed() < Duration::from_secs(8));
    assert!(output.text.contains(READY_MARKER));
    assert_eq!(output.status, -1);
}

#[tokio::test]
async fn test_restart_after_sigterm_is_ignored() {
    let mut runner = LocalProcessRunner::new(quick_reap());
    let stubborn = shell("trap '' TERM; echo up; sleep 20");

    runner
        .start("node03", &stubborn, "TIME-SYNC-SERVER", Some("up"))
        .await
        .unwrap();
    runner.stop("node03", "TIME-SYNC-SERVER").await.unwrap();

    let restart = tokio::time::timeout(
        Duration::from_secs(8),
        runner.start("node03", &shell("echo again"), "TIME-SYNC-SERVER", Some("again")),
    )
    .await
    .expect("restart should not wait on the old group");
    restart.unwrap();

    let output = runner
        .collect_output("node03", "TIME-SYNC-SERVER")
        .await
        .unwrap();
    assert_eq!(output.text, "up\nagain\n");
}

#[tokio::test]
async fn test_background_process_holding_output_is_cut_off() {
    let mut runner = LocalProcessRunner::new(quick_reap());
    // The agent exits at once but leaves a group member with the pipe open.
    let agent = shell("echo up; (trap '' TERM; sleep 20) & exit 0");

    runner
        .start("node01", &agent, "TIME-SYNC-CLIENT", Some("up"))
        .await
        .unwrap();

    let output = tokio::time::timeout(
        Duration::from_secs(8),
        runner.collect_output("node01", "TIME-SYNC-CLIENT"),
    )
    .await
    .expect("collection should not wait for the background process")
    .unwrap();

    assert_eq!(output.status, 0);
    assert_eq!(output.text, "up\n");
}
