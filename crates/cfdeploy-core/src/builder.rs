//! Native plugin build through CMake.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::command::{CommandOutput, CommandRunner};
use crate::config::Config;
use crate::error::HarnessError;

/// Cache file removed before every configure.
pub const CMAKE_CACHE_FILE: &str = "CMakeCache.txt";

/// Stages of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStep {
    Prepare,
    Configure,
    Build,
}

impl fmt::Display for BuildStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildStep::Prepare => "prepare",
            BuildStep::Configure => "configure",
            BuildStep::Build => "build",
        })
    }
}

/// Outcome of a build. Never an error: failures carry their diagnostics.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub success: bool,
    /// Step that failed, if any.
    pub failed_step: Option<BuildStep>,
    /// Captured stdout of the last step run.
    pub stdout: String,
    /// Captured stderr of the last step run (or the error text).
    pub stderr: String,
    pub duration_ms: u64,
}

impl BuildResult {
    fn succeeded(output: CommandOutput, start: Instant) -> Self {
        Self {
            success: true,
            failed_step: None,
            stdout: output.stdout,
            stderr: output.stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn failed(step: BuildStep, stdout: String, stderr: String, start: Instant) -> Self {
        Self {
            success: false,
            failed_step: Some(step),
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    /// Convert into the error taxonomy.
    pub fn into_result(self) -> crate::Result<Self> {
        match self.failed_step {
            Some(step) if !self.success => Err(HarnessError::BuildFailure {
                step: step.to_string(),
                detail: if self.stderr.trim().is_empty() {
                    self.stdout
                } else {
                    self.stderr
                },
            }),
            _ => Ok(self),
        }
    }
}

/// Something that produces the plugin artifact.
#[async_trait]
pub trait PluginBuilder: Send + Sync {
    async fn build(&self) -> BuildResult;
}

/// Inputs of a CMake build.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildRequest {
    pub cmake: PathBuf,
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    /// Passed as `-DMAYA_VERSION`.
    pub host_version: String,
    /// Passed as `-DCMAKE_PREFIX_PATH`.
    pub host_sdk: PathBuf,
    pub configuration: String,
}

impl BuildRequest {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cmake: config.build.cmake.clone(),
            source_dir: config.source_dir(),
            build_dir: config.build_dir(),
            host_version: config.host.version.clone(),
            host_sdk: config.host.install_dir.clone(),
            configuration: config.build.configuration.clone(),
        }
    }

    pub fn configure_argv(&self) -> Vec<String> {
        vec![
            self.cmake.display().to_string(),
            "-S".to_string(),
            self.source_dir.display().to_string(),
            "-B".to_string(),
            self.build_dir.display().to_string(),
            format!("-DMAYA_VERSION={}", self.host_version),
            format!("-DCMAKE_PREFIX_PATH={}", self.host_sdk.display()),
        ]
    }

    pub fn build_argv(&self) -> Vec<String> {
        vec![
            self.cmake.display().to_string(),
            "--build".to_string(),
            self.build_dir.display().to_string(),
            "--config".to_string(),
            self.configuration.clone(),
        ]
    }
}

/// CMake configure + build.
pub struct CmakeBuilder {
    request: BuildRequest,
    runner: Arc<dyn CommandRunner>,
}

impl CmakeBuilder {
    pub fn new(request: BuildRequest, runner: Arc<dyn CommandRunner>) -> Self {
        Self { request, runner }
    }

    fn prepare_build_dir(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.request.build_dir)?;
        let cache = self.request.build_dir.join(CMAKE_CACHE_FILE);
        if cache.exists() {
            info!(path = %cache.display(), "Removing stale CMake cache");
            std::fs::remove_file(&cache)?;
        }
        Ok(())
    }

    /// `Err` carries the failed step's output; a spawn failure becomes exit
    /// code -1 with the error text on stderr.
    async fn run_step(
        &self,
        step: BuildStep,
        argv: &[String],
    ) -> std::result::Result<CommandOutput, CommandOutput> {
        info!(step = %step, "Running CMake");
        match self.runner.run(argv).await {
            Ok(output) if output.success() => Ok(output),
            Ok(output) => {
                warn!(
                    step = %step,
                    exit_code = output.exit_code,
                    stderr = %output.stderr,
                    stdout = %output.stdout,
                    "CMake step failed"
                );
                Err(output)
            }
            Err(e) => {
                warn!(step = %step, error = %e, "CMake could not be started");
                Err(CommandOutput::failed(-1, e.to_string()))
            }
        }
    }
}

#[async_trait]
impl PluginBuilder for CmakeBuilder {
    async fn build(&self) -> BuildResult {
        let start = Instant::now();
        info!(
            source = %self.request.source_dir.display(),
            build_dir = %self.request.build_dir.display(),
            "Building plugin"
        );

        if let Err(e) = self.prepare_build_dir() {
            warn!(error = %e, "Could not prepare build directory");
            return BuildResult::failed(BuildStep::Prepare, String::new(), e.to_string(), start);
        }

        let steps = [
            (BuildStep::Configure, self.request.configure_argv()),
            (BuildStep::Build, self.request.build_argv()),
        ];
        let mut last = CommandOutput::default();
        for (step, argv) in steps {
            match self.run_step(step, &argv).await {
                Ok(output) => last = output,
                Err(output) => {
                    return BuildResult::failed(step, output.stdout, output.stderr, start);
                }
            }
        }

        info!(duration_ms = start.elapsed().as_millis() as u64, "Plugin build succeeded");
        BuildResult::succeeded(last, start)
    }
}
