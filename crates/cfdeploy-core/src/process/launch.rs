//! Host launch strategies.
//!
//! Starting Maya from a remote or service session is often refused, so the
//! controller walks an ordered list of strategies and stops at the first one
//! that reports success.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::{write_script, CommandRunner, ScriptDialect};
use crate::config::{Config, HostConfig};
use crate::error::{HarnessError, Result};

/// Configurable launch strategy names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LaunchStrategyKind {
    /// Run the launch script directly through the interpreter.
    Direct,
    /// Register and run a one-shot scheduled task.
    ScheduledTask,
    /// Drop a launch script on the desktop for the operator.
    DesktopScript,
}

impl LaunchStrategyKind {
    /// Default chain for `dialect`. The task scheduler only exists on Windows,
    /// so POSIX hosts launch directly.
    pub fn defaults_for(dialect: ScriptDialect) -> Vec<Self> {
        match dialect {
            ScriptDialect::Batch => vec![Self::ScheduledTask, Self::DesktopScript],
            ScriptDialect::Posix => vec![Self::Direct, Self::DesktopScript],
        }
    }

    pub fn into_strategy(self) -> Box<dyn LaunchStrategy> {
        match self {
            LaunchStrategyKind::Direct => Box::new(DirectLaunch),
            LaunchStrategyKind::ScheduledTask => Box::new(ScheduledTaskLaunch),
            LaunchStrategyKind::DesktopScript => Box::new(DesktopScriptLaunch),
        }
    }
}

/// Build the strategy chain for the configured kinds, in order.
pub fn strategies_for(kinds: &[LaunchStrategyKind]) -> Vec<Box<dyn LaunchStrategy>> {
    kinds.iter().map(|k| k.into_strategy()).collect()
}

/// Everything a strategy needs to start the host.
pub struct LaunchContext<'a> {
    pub config: &'a Config,
    pub runner: &'a dyn CommandRunner,
    /// Rendered launch script (see [`render_launch_script`]).
    pub script: &'a str,
}

impl LaunchContext<'_> {
    fn dialect(&self) -> ScriptDialect {
        self.config.process.dialect
    }

    fn write_temp_script(&self) -> Result<PathBuf> {
        write_script(
            &self.config.process.script_dir(),
            &self.dialect().file_name("start_maya"),
            self.script,
        )
    }
}

/// One way of starting the host. Returns the script that was used.
#[async_trait]
pub trait LaunchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn launch(&self, ctx: &LaunchContext<'_>) -> Result<PathBuf>;
}

/// Script that exports the host environment and starts the binary detached.
pub fn render_launch_script(dialect: ScriptDialect, host: &HostConfig) -> String {
    let mut script = String::from(dialect.header());
    script.push_str("echo Starting Maya...\n");
    script.push_str(&dialect.set_env("MAYA_APP_DIR", &host.app_dir));
    script.push_str(&dialect.set_env("MAYA_SCRIPT_PATH", &host.script_path()));
    script.push_str(&dialect.set_env("MAYA_PLUG_IN_PATH", &host.plugin_path()));
    script.push_str(&dialect.start_detached(&host.binary_path()));
    script
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DirectLaunch;

#[async_trait]
impl LaunchStrategy for DirectLaunch {
    fn name(&self) -> &'static str {
        "direct"
    }

    async fn launch(&self, ctx: &LaunchContext<'_>) -> Result<PathBuf> {
        let script = ctx.write_temp_script()?;
        let output = ctx
            .runner
            .run(&ctx.dialect().interpreter_argv(&script))
            .await?;
        if !output.success() {
            return Err(HarnessError::ProcessControl(format!(
                "launch script exited with {}: {}",
                output.exit_code,
                output.stderr.trim()
            )));
        }
        Ok(script)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ScheduledTaskLaunch;

impl ScheduledTaskLaunch {
    pub fn delete_argv(task: &str) -> Vec<String> {
        crate::command::argv(["schtasks", "/delete", "/tn", task, "/f"])
    }

    pub fn create_argv(task: &str, script: &str, user: &str) -> Vec<String> {
        crate::command::argv([
            "schtasks", "/create", "/tn", task, "/tr", script, "/sc", "once", "/st", "00:00",
            "/ru", user, "/f",
        ])
    }

    pub fn run_argv(task: &str) -> Vec<String> {
        crate::command::argv(["schtasks", "/run", "/tn", task])
    }
}

#[async_trait]
impl LaunchStrategy for ScheduledTaskLaunch {
    fn name(&self) -> &'static str {
        "scheduled_task"
    }

    async fn launch(&self, ctx: &LaunchContext<'_>) -> Result<PathBuf> {
        let script = ctx.write_temp_script()?;
        let task = &ctx.config.process.task_name;
        let script_arg = script.display().to_string();
        info!(task = %task, script = %script_arg, "Creating scheduled task to launch Maya");

        // A stale task with the same name would make /create prompt or fail.
        if let Err(e) = ctx.runner.run(&Self::delete_argv(task)).await {
            warn!(task = %task, error = %e, "Could not delete previous scheduled task");
        }

        let created = ctx
            .runner
            .run(&Self::create_argv(task, &script_arg, &ctx.config.host.user))
            .await?;
        if !created.success() {
            return Err(HarnessError::ProcessControl(format!(
                "failed to create scheduled task {}: {}",
                task,
                created.stderr.trim()
            )));
        }

        let ran = ctx.runner.run(&Self::run_argv(task)).await?;
        if !ran.success() {
            return Err(HarnessError::ProcessControl(format!(
                "failed to run scheduled task {}: {}; check Task Scheduler or run {} manually",
                task,
                ran.stderr.trim(),
                script_arg
            )));
        }

        info!(task = %task, "Maya launch task scheduled; Maya should start shortly");
        Ok(script)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopScriptLaunch;

#[async_trait]
impl LaunchStrategy for DesktopScriptLaunch {
    fn name(&self) -> &'static str {
        "desktop_script"
    }

    /// Never starts the host: the script is left for the operator.
    async fn launch(&self, ctx: &LaunchContext<'_>) -> Result<PathBuf> {
        let script = write_script(
            &ctx.config.host.desktop_dir,
            &ctx.dialect().file_name("StartMaya"),
            ctx.script,
        )?;
        warn!(
            script = %script.display(),
            "Created desktop launch script; run it manually on the host machine"
        );
        Err(HarnessError::ManualLaunchRequired { script })
    }
}
