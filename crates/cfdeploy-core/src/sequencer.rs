//! Build → stop (+ deploy) → start deployment cycle.

use tracing::{error, info};

use crate::builder::{BuildResult, PluginBuilder};
use crate::error::HarnessError;
use crate::process::{HostControl, LaunchReport, StopReport};

/// How a deployment cycle ended. Every failure is terminal for the cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    Completed {
        build: BuildResult,
        stop: StopReport,
        launch: LaunchReport,
    },
    BuildFailed(BuildResult),
    StopFailed(HarnessError),
    StartFailed {
        stop: StopReport,
        error: HarnessError,
    },
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, CycleOutcome::Completed { .. })
    }

    /// Stage the cycle ended in.
    pub fn stage(&self) -> &'static str {
        match self {
            CycleOutcome::Completed { .. } => "completed",
            CycleOutcome::BuildFailed(_) => "build",
            CycleOutcome::StopFailed(_) => "stop",
            CycleOutcome::StartFailed { .. } => "start",
        }
    }
}

/// Runs the stages strictly in order.
pub struct Sequencer<'a> {
    builder: &'a dyn PluginBuilder,
    host: &'a dyn HostControl,
}

impl<'a> Sequencer<'a> {
    pub fn new(builder: &'a dyn PluginBuilder, host: &'a dyn HostControl) -> Self {
        Self { builder, host }
    }

    pub async fn run_cycle(&self) -> CycleOutcome {
        info!(stage = "build", "Starting deployment cycle");
        let build = self.builder.build().await;
        if !build.success {
            error!(
                step = ?build.failed_step,
                stderr = %build.stderr,
                "Plugin build failed; cycle aborted"
            );
            return CycleOutcome::BuildFailed(build);
        }

        info!(stage = "stop", "Stopping Maya");
        let stop = match self.host.stop().await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Could not close the running Maya; close it manually and retry");
                return CycleOutcome::StopFailed(e);
            }
        };

        info!(stage = "start", "Starting Maya");
        match self.host.start().await {
            Ok(launch) => {
                info!(strategy = launch.strategy, "Deployment cycle completed");
                CycleOutcome::Completed {
                    build,
                    stop,
                    launch,
                }
            }
            Err(e) => {
                error!(error = %e, "Maya was not started");
                CycleOutcome::StartFailed { stop, error: e }
            }
        }
    }
}
