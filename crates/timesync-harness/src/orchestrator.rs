//! Scenario orchestrator
//!
//! Sequences one time sync run: resolve roles, start them in mode order with
//! synchronization-on-output waits, run the mode-specific timing step, stop
//! everything, collect artifacts and compute the verdict. The run is strictly
//! sequential; each start completes before the next one is issued.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::command::build_args;
use crate::config::ScenarioConfig;
use crate::directory::Directory;
use crate::errors::Result;
use crate::lifecycle::{AgentLocator, LifecycleController, StartOutcome};
use crate::resolver::resolve_roles;
use crate::results::{aggregate, RunSummary};
use crate::runner::ProcessRunner;
use crate::types::{Mode, ResolvedRoles, RoleKind, RunArtifacts, ScenarioPhase, Verdict};

/// Start order shared by every mode that runs local peers
const PEER_START_ORDER: [RoleKind; 3] = [RoleKind::Server, RoleKind::Coordinator, RoleKind::Client];

/// Stop (and collection) order: start order reversed
const STOP_ORDER: [RoleKind; 3] = [RoleKind::Client, RoleKind::Coordinator, RoleKind::Server];

/// Roles started for `mode`, in order
pub fn start_order(mode: Mode) -> &'static [RoleKind] {
    match mode {
        Mode::ServiceOverTunnel => &[RoleKind::Client],
        Mode::Auto | Mode::Local | Mode::Service => &PEER_START_ORDER,
    }
}

/// Current phase and every phase entered during the last run
#[derive(Debug, Default)]
struct PhaseLog {
    current: ScenarioPhase,
    entered: Vec<ScenarioPhase>,
}

impl PhaseLog {
    fn advance(&mut self, next: ScenarioPhase) {
        debug!("Scenario phase {:?} -> {:?}", self.current, next);
        self.current = next;
        self.entered.push(next);
    }
}

/// Drives time sync scenarios against a directory and a process runner
pub struct ScenarioOrchestrator<D, R> {
    directory: D,
    runner: R,
    phases: PhaseLog,
    summary: Option<RunSummary>,
}

impl<D: Directory, R: ProcessRunner> ScenarioOrchestrator<D, R> {
    pub fn new(directory: D, runner: R) -> Self {
        Self {
            directory,
            runner,
            phases: PhaseLog::default(),
            summary: None,
        }
    }

    pub fn phase(&self) -> ScenarioPhase {
        self.phases.current
    }

    /// Phases entered by the last run, in order; empty if it never validated
    pub fn phase_history(&self) -> &[ScenarioPhase] {
        &self.phases.entered
    }

    /// Summary of the last completed run
    pub fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn into_parts(self) -> (D, R) {
        (self.directory, self.runner)
    }

    /// Run one scenario to completion.
    ///
    /// Configuration errors abort before any process is started. A verdict
    /// of `passed == false` is a normal result, not an error.
    pub async fn run(&mut self, config: &ScenarioConfig) -> Result<Verdict> {
        info!("Running time sync scenario in {} mode", config.mode);
        self.phases = PhaseLog::default();
        self.summary = None;

        let roles = match resolve_roles(config, &self.directory) {
            Ok(roles) => roles,
            Err(e) => {
                error!("TimeSync: {}", e);
                return Err(e.into());
            }
        };
        self.phases.advance(ScenarioPhase::Validated);

        let mut lifecycle = LifecycleController::new(
            &mut self.runner,
            AgentLocator::new(config.agent.clone()),
            config.timing.sync_timeout(),
        );

        self.phases.advance(ScenarioPhase::RolesStarting);
        let mut started = Vec::new();
        if let Err(e) = drive_roles(&mut lifecycle, &roles, config, &mut started, &mut self.phases).await {
            error!("TimeSync: {}", e);
            stop_started(&mut lifecycle, &roles, &started).await;
            self.phases.advance(ScenarioPhase::Done);
            return Err(e);
        }

        self.phases.advance(ScenarioPhase::RolesStopping);
        for kind in STOP_ORDER {
            if let Some(role) = roles.get(kind).filter(|_| roles.has_lifecycle(kind)) {
                lifecycle.stop_role(role).await?;
            }
        }

        let mut artifacts = RunArtifacts::default();
        for kind in STOP_ORDER {
            if let Some(role) = roles.get(kind).filter(|_| roles.has_lifecycle(kind)) {
                *artifacts.role_mut(kind) = lifecycle.collect_role(role).await?;
            }
        }
        self.phases.advance(ScenarioPhase::Collected);

        let verdict = aggregate(artifacts);
        let summary = RunSummary::new(&roles, config.mode, &verdict);
        summary.print(config.quiet);
        info!(
            "Time sync scenario finished: {}",
            if verdict.passed { "passed" } else { "failed" }
        );

        self.summary = Some(summary);
        self.phases.advance(ScenarioPhase::Done);
        Ok(verdict)
    }
}

/// Start the roles for the configured mode, then run its timing step
async fn drive_roles<R: ProcessRunner>(
    lifecycle: &mut LifecycleController<'_, R>,
    roles: &ResolvedRoles,
    config: &ScenarioConfig,
    started: &mut Vec<RoleKind>,
    phases: &mut PhaseLog,
) -> Result<()> {
    start_roles(lifecycle, roles, config, started).await?;
    phases.advance(ScenarioPhase::RolesRunning);

    match config.mode {
        Mode::Auto => {
            // Bounce the server so the running client and coordinator see a
            // change notification, not just the initial convergence.
            if roles.has_lifecycle(RoleKind::Server) {
                info!("Restarting server to trigger a time change notification");
                let server = &roles.server;
                lifecycle.stop_role(server).await?;
                if let Some(args) = build_args(RoleKind::Server, roles, config) {
                    lifecycle
                        .start_role(server, args, RoleKind::Server.wait_marker())
                        .await?;
                }
            }
            hold(config.timing.settle_delay()).await;
        }
        Mode::ServiceOverTunnel => hold(config.timing.tunnel_hold()).await,
        Mode::Local | Mode::Service => {}
    }

    Ok(())
}

async fn start_roles<R: ProcessRunner>(
    lifecycle: &mut LifecycleController<'_, R>,
    roles: &ResolvedRoles,
    config: &ScenarioConfig,
    started: &mut Vec<RoleKind>,
) -> Result<()> {
    for &kind in start_order(config.mode) {
        if !roles.has_lifecycle(kind) {
            debug!("Skipping start of {}", kind);
            continue;
        }
        let (Some(role), Some(args)) = (roles.get(kind), build_args(kind, roles, config)) else {
            continue;
        };

        // Mark as started before waiting so a stalled role is still stopped.
        started.push(kind);
        if lifecycle.start_role(role, args, kind.wait_marker()).await? == StartOutcome::AgentUnavailable {
            started.pop();
        }
    }
    Ok(())
}

/// Best-effort stop of roles already running when a run is aborted
async fn stop_started<R: ProcessRunner>(
    lifecycle: &mut LifecycleController<'_, R>,
    roles: &ResolvedRoles,
    started: &[RoleKind],
) {
    for kind in started.iter().rev() {
        if let Some(role) = roles.get(*kind) {
            if let Err(e) = lifecycle.stop_role(role).await {
                warn!("Failed to stop {} during cleanup: {}", kind, e);
            }
        }
    }
}

async fn hold(duration: Duration) {
    if !duration.is_zero() {
        debug!("Holding for {:?}", duration);
        tokio::time::sleep(duration).await;
    }
}
