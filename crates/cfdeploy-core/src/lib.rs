//! cfdeploy core library
//!
//! Builds the CharacterFactory Maya plugin, swaps it into the host's
//! plug-in path while Maya is stopped, and relaunches Maya. Also exposes the
//! host-side call-through for the plugin's FBX merge command.
//!
//! The deployment cycle is strictly sequential:
//! [`builder`] → [`process`] stop (which runs [`deployer`]) → [`process`] start,
//! driven by [`sequencer::Sequencer`].

pub mod builder;
pub mod clean;
pub mod command;
pub mod config;
pub mod deployer;
pub mod error;
pub mod fakes;
pub mod host;
pub mod process;
pub mod sequencer;
pub mod telemetry;

pub use builder::{BuildRequest, BuildResult, BuildStep, CmakeBuilder, PluginBuilder};
pub use clean::{clean_tree, CleanReport};
pub use command::{CommandOutput, CommandRunner, ScriptDialect, ShellCommandRunner};
pub use config::Config;
pub use deployer::{ArtifactDeployer, CandidateAttempt, DeployReport, Deployer, RetryPolicy};
pub use error::{HarnessError, Result};
pub use host::{invoke_asset_merge, render_merge_script, HostSession, COMMAND_NAME, PLUGIN_NAME};
pub use process::{
    HostControl, HostProcess, LaunchReport, LaunchStrategy, LaunchStrategyKind, ProcessController,
    StopReport,
};
pub use sequencer::{CycleOutcome, Sequencer};
pub use telemetry::init_tracing;

/// cfdeploy version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
