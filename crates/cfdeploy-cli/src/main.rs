//! cfdeploy - CharacterFactory plugin deploy harness CLI
//!
//! The `cfdeploy` command builds the plugin, swaps it into Maya's plug-in
//! path while Maya is stopped, and starts Maya again.
//!
//! ## Commands
//!
//! - `cycle`: build, stop (and deploy), start
//! - `build` / `deploy` / `stop` / `start`: a single stage
//! - `status`: report whether Maya is running
//! - `clean`: remove build outputs and caches
//! - `merge-script`: print a host snippet calling the merge command
//! - `config`: print the effective configuration

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, Level};

use cfdeploy_core::{
    clean_tree, render_merge_script, ArtifactDeployer, BuildRequest, CmakeBuilder, CommandRunner,
    Config, CycleOutcome, Deployer, HarnessError, HostControl, PluginBuilder, ProcessController,
    Sequencer, ShellCommandRunner,
};

#[derive(Parser)]
#[command(name = "cfdeploy")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Build, deploy and relaunch harness for the CharacterFactory Maya plugin",
    long_about = None
)]
struct Cli {
    /// Configuration file (TOML); defaults apply when omitted
    #[arg(short, long, global = true, env = "CFDEPLOY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the plugin, stop Maya, deploy, and start Maya again
    Cycle,

    /// Configure and build the plugin with CMake
    Build,

    /// Copy the built plugin into the first writable plug-in directory
    Deploy,

    /// Close Maya (if running) and deploy the plugin
    Stop,

    /// Launch Maya through the configured strategies
    Start,

    /// Report whether Maya is running
    Status,

    /// Remove build directories, Python caches and MSVC intermediates
    Clean {
        /// Directory to clean (default: project root)
        path: Option<PathBuf>,
    },

    /// Print a Python snippet that runs the merge command inside Maya
    MergeScript {
        /// Input FBX files, in merge order
        #[arg(short, long, required = true, num_args = 1.., value_delimiter = ';')]
        files: Vec<String>,

        /// Merged FBX output path
        #[arg(short, long)]
        output: String,

        /// Skin weight JSON output path
        #[arg(long)]
        json_path: Option<String>,

        /// Write the snippet to this file instead of stdout
        #[arg(short, long)]
        write: Option<PathBuf>,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    cfdeploy_core::init_tracing(cli.json, level);

    let config = Arc::new(
        Config::load(cli.config.as_deref()).context("Failed to load cfdeploy configuration")?,
    );
    let runner: Arc<dyn CommandRunner> = Arc::new(ShellCommandRunner::new());

    match cli.command {
        Commands::Cycle => cmd_cycle(config, runner).await,
        Commands::Build => cmd_build(&config, runner).await,
        Commands::Deploy => cmd_deploy(&config).await,
        Commands::Stop => cmd_stop(config, runner).await,
        Commands::Start => cmd_start(config, runner).await,
        Commands::Status => cmd_status(config, runner).await,
        Commands::Clean { path } => cmd_clean(&config, path.as_deref()),
        Commands::MergeScript {
            files,
            output,
            json_path,
            write,
        } => cmd_merge_script(&files, &output, json_path.as_deref(), write.as_deref()),
        Commands::Config => cmd_config(&config),
    }
}

fn controller(config: Arc<Config>, runner: Arc<dyn CommandRunner>) -> ProcessController {
    let deployer = Arc::new(Deployer::from_config(&config));
    ProcessController::new(config, runner, deployer)
}

/// Run the full build → stop → start cycle
async fn cmd_cycle(config: Arc<Config>, runner: Arc<dyn CommandRunner>) -> Result<()> {
    let builder = CmakeBuilder::new(BuildRequest::from_config(&config), runner.clone());
    let host = controller(config, runner);

    let outcome = Sequencer::new(&builder, &host).run_cycle().await;
    match outcome {
        CycleOutcome::Completed { build, stop, launch } => {
            println!("Build succeeded in {} ms", build.duration_ms);
            print_deployment(&stop.deployment);
            println!("Maya launched via {} ({})", launch.strategy, launch.script.display());
            Ok(())
        }
        CycleOutcome::BuildFailed(build) => {
            build.into_result().context("Plugin build failed")?;
            bail!("Plugin build failed")
        }
        CycleOutcome::StopFailed(e) => {
            Err(e).context("Could not close Maya; close it manually and run the cycle again")
        }
        CycleOutcome::StartFailed { stop, error } => {
            print_deployment(&stop.deployment);
            report_start_failure(error)
        }
    }
}

async fn cmd_build(config: &Config, runner: Arc<dyn CommandRunner>) -> Result<()> {
    let builder = CmakeBuilder::new(BuildRequest::from_config(config), runner);
    let result = builder
        .build()
        .await
        .into_result()
        .context("Plugin build failed")?;
    println!("Build succeeded in {} ms", result.duration_ms);
    println!("Artifact: {}", config.artifact_path().display());
    Ok(())
}

async fn cmd_deploy(config: &Config) -> Result<()> {
    let report = Deployer::from_config(config).deploy().await;
    print_deployment(&report);
    report.into_result().context("Plugin deployment failed")?;
    Ok(())
}

async fn cmd_stop(config: Arc<Config>, runner: Arc<dyn CommandRunner>) -> Result<()> {
    let report = controller(config, runner)
        .stop()
        .await
        .context("Could not close Maya; close it manually and retry")?;
    match report.stopped_pid {
        Some(pid) => println!("Stopped Maya (pid {})", pid),
        None => println!("Maya was not running"),
    }
    print_deployment(&report.deployment);
    Ok(())
}

async fn cmd_start(config: Arc<Config>, runner: Arc<dyn CommandRunner>) -> Result<()> {
    match controller(config, runner).start().await {
        Ok(launch) => {
            println!("Maya launched via {} ({})", launch.strategy, launch.script.display());
            Ok(())
        }
        Err(e) => report_start_failure(e),
    }
}

async fn cmd_status(config: Arc<Config>, runner: Arc<dyn CommandRunner>) -> Result<()> {
    let process_name = config.host.process_name.clone();
    let found = controller(config, runner)
        .is_running()
        .await
        .context("Failed to query the process list")?;
    match found {
        Some(process) => println!("{} is running (pid {})", process.image(), process.pid()),
        None => println!("{} is not running", process_name),
    }
    Ok(())
}

fn cmd_clean(config: &Config, path: Option<&Path>) -> Result<()> {
    let root = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.project_root.clone());
    let report = clean_tree(&root, &config.clean)
        .with_context(|| format!("Failed to clean {}", root.display()))?;

    println!(
        "Removed {} directories and {} files under {}",
        report.removed_dirs.len(),
        report.removed_files.len(),
        root.display()
    );
    if !report.is_clean() {
        for (path, error) in &report.failures {
            eprintln!("  could not remove {}: {}", path.display(), error);
        }
        bail!("{} entries could not be removed", report.failures.len());
    }
    Ok(())
}

fn cmd_merge_script(
    files: &[String],
    output: &str,
    json_path: Option<&str>,
    write: Option<&Path>,
) -> Result<()> {
    let script = render_merge_script(files, output, json_path)
        .context("Failed to render merge script")?;
    match write {
        Some(path) => {
            std::fs::write(path, &script)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), "Merge script written");
            println!("Wrote merge script to {}", path.display());
        }
        None => print!("{}", script),
    }
    Ok(())
}

fn cmd_config(config: &Config) -> Result<()> {
    let text = toml::to_string_pretty(config).context("Failed to serialize configuration")?;
    print!("{}", text);
    Ok(())
}

fn print_deployment(report: &cfdeploy_core::DeployReport) {
    match report.deployed_to() {
        Some(dir) => {
            let digest = report
                .attempts
                .iter()
                .find_map(|a| a.digest.as_deref())
                .unwrap_or("-");
            println!(
                "Deployed {} to {} (sha256 {})",
                report.artifact.display(),
                dir.display(),
                digest
            );
        }
        None if !report.artifact_found => {
            println!("Plugin artifact not found: {}", report.artifact.display())
        }
        None => println!("Plugin was not deployed to any plug-in directory"),
    }
}

fn report_start_failure(error: HarnessError) -> Result<()> {
    if let HarnessError::ManualLaunchRequired { script } = &error {
        println!("Maya was not started. Run this script on the host machine:");
        println!("  {}", script.display());
    }
    Err(error).context("Maya was not started")
}
