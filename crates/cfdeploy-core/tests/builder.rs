//! CMake builder driven through a scripted command runner.

use std::path::PathBuf;
use std::sync::Arc;

use cfdeploy_core::builder::CMAKE_CACHE_FILE;
use cfdeploy_core::fakes::ScriptedCommandRunner;
use cfdeploy_core::{BuildRequest, BuildStep, CmakeBuilder, CommandOutput, PluginBuilder};
use tempfile::TempDir;

fn request(dir: &TempDir) -> BuildRequest {
    BuildRequest {
        cmake: PathBuf::from("cmake"),
        source_dir: dir.path().join("api"),
        build_dir: dir.path().join("api/build"),
        host_version: "2022".to_string(),
        host_sdk: PathBuf::from("/opt/autodesk/maya2022"),
        configuration: "Release".to_string(),
    }
}

#[tokio::test]
async fn successful_build_configures_then_builds() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(
        ScriptedCommandRunner::new().on("--build", CommandOutput::ok("Build succeeded.")),
    );

    let result = CmakeBuilder::new(request(&dir), runner.clone()).build().await;

    assert!(result.success);
    assert_eq!(result.failed_step, None);
    assert_eq!(result.stdout, "Build succeeded.");
    let calls = runner.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].contains(&"-DMAYA_VERSION=2022".to_string()));
    assert!(calls[1].contains(&"--build".to_string()));
    assert!(dir.path().join("api/build").is_dir());
}

#[tokio::test]
async fn stale_cache_is_removed_before_configure() {
    let dir = TempDir::new().unwrap();
    let build_dir = dir.path().join("api/build");
    std::fs::create_dir_all(&build_dir).unwrap();
    std::fs::write(build_dir.join(CMAKE_CACHE_FILE), "MAYA_VERSION:STRING=2020").unwrap();
    std::fs::write(build_dir.join("keep.txt"), "other artifacts stay").unwrap();

    let runner = Arc::new(ScriptedCommandRunner::new());
    let result = CmakeBuilder::new(request(&dir), runner).build().await;

    assert!(result.success);
    assert!(!build_dir.join(CMAKE_CACHE_FILE).exists());
    assert!(build_dir.join("keep.txt").exists());
}

#[tokio::test]
async fn configure_failure_stops_before_build() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedCommandRunner::new().on(
        "-DMAYA_VERSION",
        CommandOutput::failed(1, "Could not find Maya SDK"),
    ));

    let result = CmakeBuilder::new(request(&dir), runner.clone()).build().await;

    assert!(!result.success);
    assert_eq!(result.failed_step, Some(BuildStep::Configure));
    assert!(result.stderr.contains("Could not find Maya SDK"));
    assert_eq!(runner.count("--build"), 0);
    assert!(result.into_result().is_err());
}

#[tokio::test]
async fn compile_failure_surfaces_compiler_output() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedCommandRunner::new().on(
        "--build",
        CommandOutput {
            exit_code: 1,
            stdout: "fbxhandle.cpp(42): error C2065".to_string(),
            stderr: String::new(),
        },
    ));

    let result = CmakeBuilder::new(request(&dir), runner).build().await;

    assert_eq!(result.failed_step, Some(BuildStep::Build));
    assert!(result.stdout.contains("error C2065"));
}

#[tokio::test]
async fn missing_cmake_is_a_failed_build() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(ScriptedCommandRunner::new().spawn_error("cmake"));

    let result = CmakeBuilder::new(request(&dir), runner).build().await;

    assert!(!result.success);
    assert_eq!(result.failed_step, Some(BuildStep::Configure));
    assert!(result.stderr.contains("cmake"));
}
