//! Host process control: detect, stop and relaunch Maya.
//!
//! # Modules
//!
//! - [`controller`]: `ProcessController`, the `HostControl` seam used by the sequencer
//! - [`launch`]: `LaunchStrategy` fallback chain (direct, scheduled task, desktop script)
//!
//! Process detection and termination run through the [`CommandRunner`] so
//! the controller can be exercised with scripted output.

pub mod controller;
pub mod launch;

pub use controller::{HostControl, LaunchReport, ProcessController, StopReport};
pub use launch::{
    render_launch_script, strategies_for, DesktopScriptLaunch, DirectLaunch, LaunchContext,
    LaunchStrategy, LaunchStrategyKind, ScheduledTaskLaunch,
};

use crate::command::{sh_quote, CommandRunner, ScriptDialect};
use crate::error::Result;

/// Handle to a running host process.
///
/// Only valid while the process is known to exist; waiting for exit consumes it.
#[derive(Debug, PartialEq, Eq)]
pub struct HostProcess {
    image: String,
    pid: u32,
}

impl HostProcess {
    pub fn new(image: impl Into<String>, pid: u32) -> Self {
        Self {
            image: image.into(),
            pid,
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// Command line listing processes whose image name is `image`.
pub fn process_query_argv(dialect: ScriptDialect, image: &str) -> Vec<String> {
    match dialect {
        ScriptDialect::Batch => vec![
            "tasklist".to_string(),
            "/FI".to_string(),
            format!("IMAGENAME eq {}", image),
            "/FO".to_string(),
            "CSV".to_string(),
            "/NH".to_string(),
        ],
        ScriptDialect::Posix => vec!["pgrep".to_string(), "-x".to_string(), image.to_string()],
    }
}

/// Parse the output of [`process_query_argv`] into the first matching process.
pub fn parse_process_list(dialect: ScriptDialect, image: &str, stdout: &str) -> Option<HostProcess> {
    match dialect {
        // "maya.exe","11408","Console","1","1,204,332 K"
        ScriptDialect::Batch => stdout.lines().find_map(|line| {
            let line = line.trim();
            let inner = line.strip_prefix('"')?.strip_suffix('"')?;
            let mut fields = inner.split("\",\"");
            let name = fields.next()?;
            let pid = fields.next()?.parse().ok()?;
            name.eq_ignore_ascii_case(image)
                .then(|| HostProcess::new(name, pid))
        }),
        ScriptDialect::Posix => stdout
            .lines()
            .find_map(|line| line.trim().parse().ok())
            .map(|pid| HostProcess::new(image, pid)),
    }
}

/// Look for a running host process. A query that finds nothing (including
/// `pgrep`'s exit code 1) is `Ok(None)`.
pub async fn find_process(
    runner: &dyn CommandRunner,
    dialect: ScriptDialect,
    image: &str,
) -> Result<Option<HostProcess>> {
    let output = runner.run(&process_query_argv(dialect, image)).await?;
    if !output.success() {
        return Ok(None);
    }
    Ok(parse_process_list(dialect, image, &output.stdout))
}

/// Kill script that succeeds whether or not the host was running.
pub fn render_kill_script(dialect: ScriptDialect, image: &str) -> String {
    let mut script = String::from(dialect.header());
    match dialect {
        ScriptDialect::Batch => {
            script.push_str("echo Checking Maya process...\n");
            script.push_str(&format!("taskkill /F /IM {} 2>nul\n", image));
            script.push_str("if %ERRORLEVEL% EQU 0 (\n");
            script.push_str("    echo Maya closed\n");
            script.push_str(") else (\n");
            script.push_str("    echo Maya not running\n");
            script.push_str(")\n");
            script.push_str("exit /b 0\n");
        }
        ScriptDialect::Posix => {
            script.push_str(&format!(
                "if pkill -x {}; then\n    echo 'Maya closed'\nelse\n    echo 'Maya not running'\nfi\n",
                sh_quote(image)
            ));
            script.push_str("exit 0\n");
        }
    }
    script
}
