//! Stop / deploy / start of the host application.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{info, warn};

use super::launch::{render_launch_script, strategies_for, LaunchContext, LaunchStrategy};
use super::{find_process, render_kill_script, HostProcess};
use crate::command::{run_script, CommandRunner};
use crate::config::Config;
use crate::deployer::{ArtifactDeployer, DeployReport};
use crate::error::{HarnessError, Result};
use crate::host::{COMMAND_NAME, FILE_DELIMITER};

/// Result of [`HostControl::stop`].
#[derive(Debug, Clone)]
pub struct StopReport {
    /// Pid of the host that was terminated, if one was running.
    pub stopped_pid: Option<u32>,
    /// Outcome of the deployment that always follows a stop.
    pub deployment: DeployReport,
}

/// Result of a successful [`HostControl::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    /// Name of the strategy that started the host.
    pub strategy: &'static str,
    /// Launch script that was executed.
    pub script: PathBuf,
}

/// Host lifecycle seam used by the sequencer.
#[async_trait]
pub trait HostControl: Send + Sync {
    /// Terminate the host (if running) and deploy the plugin.
    async fn stop(&self) -> Result<StopReport>;

    /// Launch the host.
    async fn start(&self) -> Result<LaunchReport>;
}

/// One-line merge invocation shown once the host is starting.
fn merge_example() -> String {
    format!(
        "cmds.{}(\"D:/res/a.fbx{}D:/res/b.fbx\", \"D:/res/merged.fbx\", \"D:/res/skin_weights.json\")",
        COMMAND_NAME, FILE_DELIMITER
    )
}

/// Controls the Maya process through generated scripts.
pub struct ProcessController {
    config: Arc<Config>,
    runner: Arc<dyn CommandRunner>,
    deployer: Arc<dyn ArtifactDeployer>,
    strategies: Vec<Box<dyn LaunchStrategy>>,
}

impl ProcessController {
    pub fn new(
        config: Arc<Config>,
        runner: Arc<dyn CommandRunner>,
        deployer: Arc<dyn ArtifactDeployer>,
    ) -> Self {
        let strategies = strategies_for(&config.process.launch_strategies);
        Self {
            config,
            runner,
            deployer,
            strategies,
        }
    }

    /// Replace the launch strategy chain.
    pub fn with_strategies(mut self, strategies: Vec<Box<dyn LaunchStrategy>>) -> Self {
        self.strategies = strategies;
        self
    }

    pub async fn is_running(&self) -> Result<Option<HostProcess>> {
        find_process(
            self.runner.as_ref(),
            self.config.process.dialect,
            &self.config.host.process_name,
        )
        .await
    }

    /// Poll the process list until `process` is gone or the stop timeout elapses.
    ///
    /// A query that fails after the close script succeeded is taken as exit,
    /// the same way [`HostControl::stop`] treats a failed first query.
    async fn wait_for_exit(&self, process: HostProcess) -> Result<u32> {
        let timeout = self.config.process.stop_timeout();
        let start = Instant::now();
        loop {
            match self.is_running().await {
                Ok(None) => {
                    info!(pid = process.pid(), "Maya exited");
                    return Ok(process.pid());
                }
                Ok(Some(_)) => {}
                Err(e) => {
                    warn!(
                        pid = process.pid(),
                        error = %e,
                        "Could not query process list; assuming Maya exited"
                    );
                    return Ok(process.pid());
                }
            }
            if start.elapsed() >= timeout {
                return Err(HarnessError::ProcessControl(format!(
                    "{} (pid {}) still running after {}s",
                    process.image(),
                    process.pid(),
                    timeout.as_secs()
                )));
            }
            tokio::time::sleep(self.config.process.poll_interval()).await;
        }
    }

    async fn terminate(&self) -> Result<()> {
        let process = &self.config.process;
        let script = render_kill_script(process.dialect, &self.config.host.process_name);
        let output = run_script(
            self.runner.as_ref(),
            process.dialect,
            &process.script_dir(),
            "close_maya",
            &script,
        )
        .await
        .map_err(|e| HarnessError::ProcessControl(format!("close script did not run: {}", e)))?;

        if !output.success() {
            return Err(HarnessError::ProcessControl(format!(
                "close script exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        info!(output = %output.stdout.trim(), "Close script finished");
        Ok(())
    }
}

#[async_trait]
impl HostControl for ProcessController {
    async fn stop(&self) -> Result<StopReport> {
        let running = match self.is_running().await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "Could not query process list; assuming Maya is not running");
                None
            }
        };

        self.terminate().await?;

        let stopped_pid = match running {
            Some(process) => {
                let pid = self.wait_for_exit(process).await?;
                let settle = self.config.process.settle_delay();
                info!(settle_secs = settle.as_secs(), "Waiting for file handles to be released");
                tokio::time::sleep(settle).await;
                Some(pid)
            }
            None => {
                info!("Maya was not running");
                None
            }
        };

        let deployment = self.deployer.deploy().await;
        match deployment.deployed_to() {
            Some(dir) => info!(dir = %dir.display(), "Plugin copy succeeded"),
            None => warn!(artifact = %deployment.artifact.display(), "Plugin copy failed"),
        }

        Ok(StopReport {
            stopped_pid,
            deployment,
        })
    }

    async fn start(&self) -> Result<LaunchReport> {
        let binary = self.config.host.binary_path();
        if !binary.exists() {
            warn!(binary = %binary.display(), "Maya binary not found");
            return Err(HarnessError::ConfigurationMissing {
                what: "host binary",
                path: binary,
            });
        }

        let script = render_launch_script(self.config.process.dialect, &self.config.host);
        let ctx = LaunchContext {
            config: &self.config,
            runner: self.runner.as_ref(),
            script: &script,
        };

        let mut last_error = None;
        for strategy in &self.strategies {
            info!(strategy = strategy.name(), "Launching Maya");
            match strategy.launch(&ctx).await {
                Ok(script) => {
                    info!(
                        strategy = strategy.name(),
                        example = %merge_example(),
                        "Maya launch requested; run the merge command from the script editor"
                    );
                    return Ok(LaunchReport {
                        strategy: strategy.name(),
                        script,
                    });
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Launch strategy failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            HarnessError::ProcessControl("no launch strategy configured".to_string())
        }))
    }
}
