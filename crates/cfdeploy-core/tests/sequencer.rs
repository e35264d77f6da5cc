//! Ordering and short-circuiting of the deployment cycle.

use std::sync::Arc;

use cfdeploy_core::fakes::{FakeBuilder, FakeHostControl, ScriptedCommandRunner};
use cfdeploy_core::{
    BuildRequest, CmakeBuilder, CommandOutput, Config, CycleOutcome, Deployer, LaunchStrategyKind,
    ProcessController, ScriptDialect, Sequencer,
};
use tempfile::TempDir;

#[tokio::test]
async fn build_failure_never_touches_the_host() {
    let builder = FakeBuilder::failing();
    let host = FakeHostControl::new();

    let outcome = Sequencer::new(&builder, &host).run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::BuildFailed(_)));
    assert_eq!(outcome.stage(), "build");
    assert_eq!(builder.calls(), 1);
    assert_eq!(host.stop_calls(), 0);
    assert_eq!(host.start_calls(), 0);
}

#[tokio::test]
async fn stop_failure_skips_start() {
    let builder = FakeBuilder::succeeding();
    let host = FakeHostControl::new().failing_stop();

    let outcome = Sequencer::new(&builder, &host).run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::StopFailed(_)));
    assert_eq!(host.stop_calls(), 1);
    assert_eq!(host.start_calls(), 0);
}

#[tokio::test]
async fn start_failure_keeps_stop_report() {
    let builder = FakeBuilder::succeeding();
    let host = FakeHostControl::new().failing_start();

    let outcome = Sequencer::new(&builder, &host).run_cycle().await;

    match outcome {
        CycleOutcome::StartFailed { stop, error } => {
            assert_eq!(stop.stopped_pid, None);
            assert!(error.to_string().contains("fake start failure"));
        }
        other => panic!("expected StartFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn successful_cycle_runs_each_stage_once() {
    let builder = FakeBuilder::succeeding();
    let host = FakeHostControl::new();

    let outcome = Sequencer::new(&builder, &host).run_cycle().await;

    assert!(outcome.is_completed());
    assert_eq!(outcome.stage(), "completed");
    assert_eq!(builder.calls(), 1);
    assert_eq!(host.stop_calls(), 1);
    assert_eq!(host.start_calls(), 1);
}

/// Real builder, deployer and controller over a scripted command runner.
#[tokio::test]
async fn full_cycle_deploys_freshly_built_plugin() {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.project_root = dir.path().to_path_buf();
    config.host.process_name = "maya".to_string();
    config.host.binary = Some(dir.path().join("maya/bin/maya"));
    config.host.desktop_dir = dir.path().join("Desktop");
    config.deploy.plugin_dirs = vec!["home-plug-ins".into(), "plug-ins".into()];
    config.deploy.retry_delay_secs = 0;
    config.process.dialect = ScriptDialect::Posix;
    config.process.script_dir = Some(dir.path().join("scripts"));
    config.process.settle_delay_secs = 0;
    config.process.launch_strategies = vec![
        LaunchStrategyKind::ScheduledTask,
        LaunchStrategyKind::DesktopScript,
    ];
    let config = Arc::new(config);

    // Stand in for CMake's output and an installed Maya.
    let artifact = config.artifact_path();
    std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
    std::fs::write(&artifact, b"fresh build").unwrap();
    std::fs::create_dir_all(dir.path().join("maya/bin")).unwrap();
    std::fs::write(config.host.binary_path(), b"").unwrap();

    let runner = Arc::new(ScriptedCommandRunner::new().on("pgrep", CommandOutput::failed(1, "")));
    let builder = CmakeBuilder::new(BuildRequest::from_config(&config), runner.clone());
    let host = ProcessController::new(
        config.clone(),
        runner.clone(),
        Arc::new(Deployer::from_config(&config)),
    );

    let outcome = Sequencer::new(&builder, &host).run_cycle().await;

    let (stop, launch) = match outcome {
        CycleOutcome::Completed { stop, launch, .. } => (stop, launch),
        other => panic!("cycle did not complete: {other:?}"),
    };
    assert_eq!(launch.strategy, "scheduled_task");
    assert_eq!(
        stop.deployment.deployed_to(),
        Some(dir.path().join("home-plug-ins").as_path())
    );
    assert_eq!(
        std::fs::read(dir.path().join("home-plug-ins/CharacterFactory.mll")).unwrap(),
        b"fresh build"
    );

    let lines: Vec<String> = runner.calls().iter().map(|c| c.join(" ")).collect();
    let position = |needle: &str| {
        lines
            .iter()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("{needle} never ran: {lines:?}"))
    };
    assert!(position("--build") < position("close_maya"));
    assert!(position("close_maya") < position("schtasks /run"));
}
