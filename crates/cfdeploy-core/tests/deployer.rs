//! Deployment into candidate plug-in directories.

use std::io;
use std::path::Path;
use std::time::Duration;

use cfdeploy_core::deployer::with_retry;
use cfdeploy_core::{ArtifactDeployer, Deployer, RetryPolicy};
use tempfile::TempDir;

const PLUGIN: &str = "CharacterFactory.mll";

fn no_wait() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        delay: Duration::ZERO,
    }
}

/// Build tree with `<root>/api/build/Release/CharacterFactory.mll`.
fn built_artifact(root: &Path) -> std::path::PathBuf {
    let release = root.join("api/build/Release");
    std::fs::create_dir_all(&release).unwrap();
    let artifact = release.join(PLUGIN);
    std::fs::write(&artifact, b"plugin v2").unwrap();
    artifact
}

/// A candidate whose parent is a regular file, so it can never be created.
fn unwritable_candidate(root: &Path, name: &str) -> std::path::PathBuf {
    let blocker = root.join(format!("{name}-blocker"));
    std::fs::write(&blocker, b"not a directory").unwrap();
    blocker.join("plug-ins")
}

#[tokio::test]
async fn missing_artifact_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let candidate = dir.path().join("maya/2022/plug-ins");
    let deployer = Deployer::new(
        dir.path().join("api/build/Release").join(PLUGIN),
        vec![candidate.clone()],
    )
    .with_policy(no_wait());

    let report = deployer.deploy().await;

    assert!(!report.succeeded());
    assert!(!report.artifact_found);
    assert!(report.attempts.is_empty());
    assert!(!candidate.exists(), "candidate must not be created");
}

#[tokio::test]
async fn first_writable_candidate_wins() {
    let dir = TempDir::new().unwrap();
    let artifact = built_artifact(dir.path());
    let bad_a = unwritable_candidate(dir.path(), "a");
    let bad_b = unwritable_candidate(dir.path(), "b");
    let good = dir.path().join("project/plug-ins");
    let later = dir.path().join("never/plug-ins");

    let deployer = Deployer::new(
        artifact,
        vec![bad_a.clone(), bad_b.clone(), good.clone(), later.clone()],
    )
    .with_policy(no_wait());
    let report = deployer.deploy().await;

    assert!(report.succeeded());
    assert_eq!(report.deployed_to(), Some(good.as_path()));
    assert_eq!(report.attempts.len(), 3);
    assert!(report.attempts[0].error.is_some());
    assert!(report.attempts[1].error.is_some());
    assert_eq!(std::fs::read(good.join(PLUGIN)).unwrap(), b"plugin v2");
    assert!(!bad_a.exists());
    assert!(!bad_b.exists());
    assert!(!later.exists(), "directories after the winner are not touched");
}

#[tokio::test]
async fn all_candidates_failing_reports_failure() {
    let dir = TempDir::new().unwrap();
    let artifact = built_artifact(dir.path());
    let deployer = Deployer::new(
        artifact,
        vec![
            unwritable_candidate(dir.path(), "a"),
            unwritable_candidate(dir.path(), "b"),
        ],
    )
    .with_policy(no_wait());

    let report = deployer.deploy().await;

    assert!(!report.succeeded());
    assert_eq!(report.attempts.len(), 2);
    let err = report.into_result().unwrap_err();
    assert!(err.to_string().contains("no plug-in directory accepted the plugin"));
}

#[tokio::test]
async fn existing_plugin_is_replaced_and_hashed() {
    let dir = TempDir::new().unwrap();
    let artifact = built_artifact(dir.path());
    let target = dir.path().join("plug-ins");
    std::fs::create_dir_all(&target).unwrap();
    std::fs::write(target.join(PLUGIN), b"plugin v1").unwrap();

    let report = Deployer::new(artifact.clone(), vec![target.clone()])
        .with_policy(no_wait())
        .deploy()
        .await;

    assert!(report.succeeded());
    assert_eq!(std::fs::read(target.join(PLUGIN)).unwrap(), b"plugin v2");
    let expected = cfdeploy_core::deployer::file_digest(&artifact).unwrap();
    assert_eq!(report.attempts[0].digest.as_deref(), Some(expected.as_str()));
}

#[tokio::test]
async fn dependency_library_copied_alongside() {
    let dir = TempDir::new().unwrap();
    let artifact = built_artifact(dir.path());
    let dll_dir = dir.path().join("third_party/FbxSdk/2020.3.7/lib/x64/release");
    std::fs::create_dir_all(&dll_dir).unwrap();
    std::fs::write(dll_dir.join("libfbxsdk.dll"), b"fbx").unwrap();
    let target = dir.path().join("plug-ins");

    let report = Deployer::new(artifact, vec![target.clone()])
        .with_dependency(Some(dll_dir.join("libfbxsdk.dll")))
        .with_policy(no_wait())
        .deploy()
        .await;

    assert!(report.succeeded());
    assert!(report.attempts[0].dependency_copied);
    assert_eq!(std::fs::read(target.join("libfbxsdk.dll")).unwrap(), b"fbx");
}

#[tokio::test]
async fn missing_dependency_does_not_fail_candidate() {
    let dir = TempDir::new().unwrap();
    let artifact = built_artifact(dir.path());
    let target = dir.path().join("plug-ins");

    let report = Deployer::new(artifact, vec![target.clone()])
        .with_dependency(Some(dir.path().join("third_party/missing/libfbxsdk.dll")))
        .with_policy(no_wait())
        .deploy()
        .await;

    assert!(report.succeeded());
    assert!(!report.attempts[0].dependency_copied);
    assert!(target.join(PLUGIN).exists());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_advance_to_next_candidate() {
    let dir = TempDir::new().unwrap();
    let artifact = built_artifact(dir.path());
    // A directory squatting on the plugin's file name cannot be removed with
    // remove_file, so every copy attempt into `locked` fails.
    let locked = dir.path().join("locked");
    std::fs::create_dir_all(locked.join(PLUGIN).join("inner")).unwrap();
    let fallback = dir.path().join("fallback");

    let report = Deployer::new(artifact, vec![locked.clone(), fallback.clone()])
        .with_policy(RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(5),
        })
        .deploy()
        .await;

    assert_eq!(report.deployed_to(), Some(fallback.as_path()));
    assert!(report.attempts[0].error.is_some());
    assert!(fallback.join(PLUGIN).is_file());
}

#[tokio::test(start_paused = true)]
async fn deploy_succeeds_once_lock_is_released() {
    let dir = TempDir::new().unwrap();
    let artifact = built_artifact(dir.path());
    let target = dir.path().join("plug-ins");
    // Held open by a closing Maya: the destination cannot be replaced until
    // the squatting directory goes away between the second and third attempt.
    let lock = target.join(PLUGIN);
    std::fs::create_dir_all(lock.join("inner")).unwrap();
    let release = tokio::spawn({
        let lock = lock.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            std::fs::remove_dir_all(&lock).unwrap();
        }
    });
    let start = tokio::time::Instant::now();

    let report = Deployer::new(artifact, vec![target.clone()])
        .with_policy(RetryPolicy {
            attempts: 3,
            delay: Duration::from_secs(5),
        })
        .deploy()
        .await;
    release.await.unwrap();

    assert!(report.succeeded());
    assert_eq!(report.deployed_to(), Some(target.as_path()));
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(std::fs::read(target.join(PLUGIN)).unwrap(), b"plugin v2");
    assert!(start.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_absorbed_with_delay() {
    let policy = RetryPolicy {
        attempts: 3,
        delay: Duration::from_secs(5),
    };
    let start = tokio::time::Instant::now();
    let mut attempts = 0;

    let result = with_retry(&policy, "CharacterFactory.mll", || {
        attempts += 1;
        if attempts < policy.attempts {
            Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "The process cannot access the file because it is being used by another process",
            ))
        } else {
            Ok(42u64)
        }
    })
    .await;

    assert_eq!(result.unwrap(), 42);
    assert_eq!(attempts, 3);
    assert!(
        start.elapsed() >= Duration::from_secs(10),
        "two retries must wait the configured delay each, waited {:?}",
        start.elapsed()
    );
}

#[tokio::test(start_paused = true)]
async fn first_try_success_does_not_wait() {
    let policy = RetryPolicy::default();
    let start = tokio::time::Instant::now();
    let result = with_retry(&policy, "x", || Ok::<_, io::Error>(())).await;
    assert!(result.is_ok());
    assert_eq!(start.elapsed(), Duration::ZERO);
}
