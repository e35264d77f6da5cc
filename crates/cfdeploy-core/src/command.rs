//! Command execution capability.
//!
//! Every subprocess the harness starts goes through a [`CommandRunner`], so
//! the builder and the process controller can be driven by scripted fakes in
//! tests. Control scripts are written to disk and handed to the dialect's
//! interpreter (`cmd.exe /c` or `sh`).

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a command line (`argv[0]` is the program) to completion.
///
/// Returns `Err` only when the program cannot be started; a non-zero exit is a
/// normal [`CommandOutput`].
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput>;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Default, Clone)]
pub struct ShellCommandRunner;

impl ShellCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for ShellCommandRunner {
    async fn run(&self, argv: &[String]) -> Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| HarnessError::InvalidConfig("empty command line".to_string()))?;

        debug!(program = %program, args = ?args, "Running command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| HarnessError::Spawn {
                program: program.clone(),
                source,
            })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Shell flavour of generated control scripts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDialect {
    /// Windows batch, executed with `cmd.exe /c`.
    Batch,
    /// POSIX shell, executed with `sh`.
    Posix,
}

impl ScriptDialect {
    /// Dialect of the platform the harness was built for.
    pub fn native() -> Self {
        if cfg!(windows) {
            ScriptDialect::Batch
        } else {
            ScriptDialect::Posix
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ScriptDialect::Batch => "bat",
            ScriptDialect::Posix => "sh",
        }
    }

    /// Script file name for `stem`, e.g. `close_maya.bat`.
    pub fn file_name(&self, stem: &str) -> String {
        format!("{}.{}", stem, self.extension())
    }

    pub fn header(&self) -> &'static str {
        match self {
            ScriptDialect::Batch => "@echo off\n",
            ScriptDialect::Posix => "#!/bin/sh\n",
        }
    }

    /// Line exporting `key` into the script's environment.
    pub fn set_env(&self, key: &str, value: &Path) -> String {
        match self {
            ScriptDialect::Batch => format!("set {}={}\n", key, value.display()),
            ScriptDialect::Posix => {
                format!("export {}={}\n", key, sh_quote(&value.display().to_string()))
            }
        }
    }

    /// Line starting `binary` detached from the script.
    pub fn start_detached(&self, binary: &Path) -> String {
        match self {
            ScriptDialect::Batch => format!("start \"\" \"{}\"\n", binary.display()),
            ScriptDialect::Posix => format!(
                "nohup {} >/dev/null 2>&1 &\n",
                sh_quote(&binary.display().to_string())
            ),
        }
    }

    /// Command line that executes `script` with this dialect's interpreter.
    pub fn interpreter_argv(&self, script: &Path) -> Vec<String> {
        let script = script.display().to_string();
        match self {
            ScriptDialect::Batch => vec!["cmd.exe".to_string(), "/c".to_string(), script],
            ScriptDialect::Posix => vec!["sh".to_string(), script],
        }
    }
}

/// Single-quote `value` for `sh`; embedded quotes become `'\''`.
pub fn sh_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Write `body` to `<dir>/<file_name>`, creating `dir` if needed.
pub fn write_script(dir: &Path, file_name: &str, body: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name);
    std::fs::write(&path, body)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(path)
}

/// Write a control script and run it through the dialect's interpreter.
pub async fn run_script(
    runner: &dyn CommandRunner,
    dialect: ScriptDialect,
    dir: &Path,
    stem: &str,
    body: &str,
) -> Result<CommandOutput> {
    let path = write_script(dir, &dialect.file_name(stem), body)?;
    runner.run(&dialect.interpreter_argv(&path)).await
}

/// Convenience for building an argv from string slices.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}
