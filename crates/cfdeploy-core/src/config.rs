//! Harness configuration.
//!
//! Loaded once at startup from an optional TOML file and shared as
//! `Arc<Config>`. Every key has a default matching the workstation the
//! plugin is developed on, so an empty file is a valid configuration.
//! Relative paths are resolved against [`Config::project_root`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::ScriptDialect;
use crate::error::{HarnessError, Result};
use crate::process::LaunchStrategyKind;

/// Top-level configuration record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Root of the plugin project (contains `api/` and `third_party/`).
    pub project_root: PathBuf,
    pub host: HostConfig,
    pub build: BuildConfig,
    pub deploy: DeployConfig,
    pub process: ProcessConfig,
    pub clean: CleanConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_root: PathBuf::from("."),
            host: HostConfig::default(),
            build: BuildConfig::default(),
            deploy: DeployConfig::default(),
            process: ProcessConfig::default(),
            clean: CleanConfig::default(),
        }
    }
}

/// The Maya installation and user environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HostConfig {
    /// Maya version, passed to CMake as `MAYA_VERSION`.
    pub version: String,
    /// Maya install directory, passed to CMake as `CMAKE_PREFIX_PATH`.
    pub install_dir: PathBuf,
    /// Host executable; defaults to `<install_dir>/bin/maya.exe`.
    pub binary: Option<PathBuf>,
    /// Image name matched against the process list.
    pub process_name: String,
    /// Account the scheduled launch task runs as.
    pub user: String,
    /// `MAYA_APP_DIR` for the launched host.
    pub app_dir: PathBuf,
    /// `MAYA_SCRIPT_PATH`; defaults to `<app_dir>/scripts`.
    pub script_path: Option<PathBuf>,
    /// `MAYA_PLUG_IN_PATH`; defaults to `<app_dir>/<version>/plug-ins`.
    pub plugin_path: Option<PathBuf>,
    /// Where the manual launch script is dropped when scheduling fails.
    pub desktop_dir: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: "2022".to_string(),
            install_dir: PathBuf::from(r"C:\Program Files\Autodesk\Maya2022"),
            binary: None,
            process_name: "maya.exe".to_string(),
            user: "midlig".to_string(),
            app_dir: PathBuf::from(r"C:\Users\midlig\Documents\maya"),
            script_path: None,
            plugin_path: None,
            desktop_dir: PathBuf::from(r"C:\Users\midlig\Desktop"),
        }
    }
}

impl HostConfig {
    pub fn binary_path(&self) -> PathBuf {
        self.binary
            .clone()
            .unwrap_or_else(|| self.install_dir.join("bin").join("maya.exe"))
    }

    pub fn script_path(&self) -> PathBuf {
        self.script_path
            .clone()
            .unwrap_or_else(|| self.app_dir.join("scripts"))
    }

    pub fn plugin_path(&self) -> PathBuf {
        self.plugin_path
            .clone()
            .unwrap_or_else(|| self.app_dir.join(&self.version).join("plug-ins"))
    }
}

/// CMake invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildConfig {
    /// CMake executable.
    pub cmake: PathBuf,
    /// Plugin source tree (the directory holding `CMakeLists.txt`).
    pub source_dir: PathBuf,
    /// CMake binary directory.
    pub build_dir: PathBuf,
    /// Multi-config generator configuration; also the artifact subdirectory.
    pub configuration: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            cmake: PathBuf::from(
                r"C:\Program Files\Microsoft Visual Studio\2022\Community\Common7\IDE\CommonExtensions\Microsoft\CMake\CMake\bin\cmake.exe",
            ),
            source_dir: PathBuf::from("api"),
            build_dir: PathBuf::from("api").join("build"),
            configuration: "Release".to_string(),
        }
    }
}

/// Where and how the built plugin is copied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeployConfig {
    /// File name of the built plugin.
    pub plugin_name: String,
    /// Candidate plug-in directories, in preference order. `~` expands to the
    /// user's home directory.
    pub plugin_dirs: Vec<PathBuf>,
    /// Shared library the plugin links against; copied next to it when present.
    pub dependency: Option<PathBuf>,
    /// Copy attempts per file.
    pub retries: u32,
    /// Delay between copy attempts.
    pub retry_delay_secs: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            plugin_name: "CharacterFactory.mll".to_string(),
            plugin_dirs: vec![
                PathBuf::from("~/Documents/maya/2022/plug-ins"),
                PathBuf::from("plug-ins"),
            ],
            dependency: Some(
                ["third_party", "FbxSdk", "2020.3.7", "lib", "x64", "release", "libfbxsdk.dll"]
                    .iter()
                    .collect(),
            ),
            retries: 3,
            retry_delay_secs: 5,
        }
    }
}

/// Host process control.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessConfig {
    /// Name of the one-shot scheduled task used to launch the host.
    pub task_name: String,
    /// How long to wait for the host to disappear from the process list.
    pub stop_timeout_secs: u64,
    /// Process list polling interval while waiting for exit.
    pub poll_interval_ms: u64,
    /// Wait after termination so the OS releases the plugin's file lock.
    pub settle_delay_secs: u64,
    /// Launch strategies, tried in order until one succeeds.
    pub launch_strategies: Vec<LaunchStrategyKind>,
    /// Shell dialect of generated control scripts.
    pub dialect: ScriptDialect,
    /// Directory for generated scripts; defaults to the system temp dir.
    pub script_dir: Option<PathBuf>,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            task_name: "StartMayaTask".to_string(),
            stop_timeout_secs: 30,
            poll_interval_ms: 500,
            settle_delay_secs: 5,
            launch_strategies: LaunchStrategyKind::defaults_for(ScriptDialect::native()),
            dialect: ScriptDialect::native(),
            script_dir: None,
        }
    }
}

impl ProcessConfig {
    pub fn script_dir(&self) -> PathBuf {
        self.script_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

/// What `cfdeploy clean` removes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CleanConfig {
    /// Directory names removed wherever they occur.
    pub dirs: Vec<String>,
    /// File extensions (with leading dot) removed wherever they occur.
    pub extensions: Vec<String>,
}

impl Default for CleanConfig {
    fn default() -> Self {
        Self {
            dirs: ["build", "__pycache__", ".pytest_cache"]
                .map(String::from)
                .to_vec(),
            extensions: [".pyc", ".pyo", ".pyd", ".obj", ".ilk", ".pdb", ".exp"]
                .map(String::from)
                .to_vec(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or defaults rooted at the current
    /// directory when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(HarnessError::ConfigurationMissing {
                        what: "config file",
                        path: path.to_path_buf(),
                    });
                }
                let text = std::fs::read_to_string(path)?;
                let base = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                Self::from_toml_str(&text, &base)
            }
            None => {
                let mut config = Self::default();
                config.project_root = std::env::current_dir()?;
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Parse a TOML document; a relative `project_root` is taken relative to `base`.
    pub fn from_toml_str(text: &str, base: &Path) -> Result<Self> {
        let mut config: Config = toml::from_str(text)?;
        if config.project_root.is_relative() {
            config.project_root = base.join(&config.project_root);
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.deploy.retries == 0 {
            return Err(HarnessError::InvalidConfig(
                "deploy.retries must be at least 1".to_string(),
            ));
        }
        if self.deploy.plugin_dirs.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "deploy.plugin_dirs must name at least one directory".to_string(),
            ));
        }
        if self.process.launch_strategies.is_empty() {
            return Err(HarnessError::InvalidConfig(
                "process.launch_strategies must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve a configured path: `~` expands to home, relative paths join
    /// the project root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        let expanded = expand_home(path);
        if expanded.is_absolute() {
            expanded
        } else {
            self.project_root.join(expanded)
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.resolve(&self.build.source_dir)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve(&self.build.build_dir)
    }

    /// `<build_dir>/<configuration>/<plugin_name>`.
    pub fn artifact_path(&self) -> PathBuf {
        self.build_dir()
            .join(&self.build.configuration)
            .join(&self.deploy.plugin_name)
    }

    pub fn dependency_path(&self) -> Option<PathBuf> {
        self.deploy.dependency.as_deref().map(|p| self.resolve(p))
    }

    pub fn plugin_dirs(&self) -> Vec<PathBuf> {
        self.deploy
            .plugin_dirs
            .iter()
            .map(|p| self.resolve(p))
            .collect()
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
