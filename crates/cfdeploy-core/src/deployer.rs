//! Plugin deployment into the host's plug-in search path.
//!
//! The built artifact is copied into the first candidate directory that
//! accepts it. Copies are retried with a fixed delay because the host may
//! still hold the old plugin open while it shuts down.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{HarnessError, Result};

/// Fixed-delay retry for file operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts (1 = no retry).
    pub attempts: u32,
    /// Delay between consecutive attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(5),
        }
    }
}

/// Run `op` until it succeeds or `policy.attempts` is exhausted, sleeping
/// `policy.delay` between attempts. Returns the last error on exhaustion.
pub async fn with_retry<T, F>(policy: &RetryPolicy, label: &str, mut op: F) -> io::Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(
                    target_file = %label,
                    attempt,
                    delay_secs = policy.delay.as_secs_f64(),
                    error = %e,
                    "Copy failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) => {
                warn!(target_file = %label, attempts, error = %e, "Copy failed, giving up");
                return Err(e);
            }
        }
    }
}

/// Copy `src` over `dst`, removing `dst` first if it exists.
pub fn copy_replacing(src: &Path, dst: &Path) -> io::Result<u64> {
    if dst.exists() {
        std::fs::remove_file(dst)?;
    }
    std::fs::copy(src, dst)
}

/// SHA-256 hex digest of a file's contents.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(hex::encode(hasher.finalize()))
}

/// One candidate directory tried during a deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateAttempt {
    pub dir: PathBuf,
    /// Why the candidate was rejected; `None` when the plugin landed here.
    pub error: Option<String>,
    /// Whether the dependency library was copied alongside.
    pub dependency_copied: bool,
    /// Digest of the deployed plugin.
    pub digest: Option<String>,
}

impl CandidateAttempt {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Result of one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployReport {
    pub artifact: PathBuf,
    /// False when the artifact did not exist and nothing was attempted.
    pub artifact_found: bool,
    pub attempts: Vec<CandidateAttempt>,
}

impl DeployReport {
    pub fn succeeded(&self) -> bool {
        self.deployed_to().is_some()
    }

    /// Directory the plugin was deployed to.
    pub fn deployed_to(&self) -> Option<&Path> {
        self.attempts
            .iter()
            .find(|a| a.succeeded())
            .map(|a| a.dir.as_path())
    }

    pub fn into_result(self) -> Result<Self> {
        if self.succeeded() {
            return Ok(self);
        }
        let reason = if !self.artifact_found {
            format!("plugin artifact not found: {}", self.artifact.display())
        } else {
            let tried: Vec<String> = self
                .attempts
                .iter()
                .map(|a| {
                    format!(
                        "{} ({})",
                        a.dir.display(),
                        a.error.as_deref().unwrap_or("unknown")
                    )
                })
                .collect();
            format!("no plug-in directory accepted the plugin: {}", tried.join(", "))
        };
        Err(HarnessError::DeploymentFailure(reason))
    }
}

/// Something that installs the built plugin for the host.
#[async_trait]
pub trait ArtifactDeployer: Send + Sync {
    async fn deploy(&self) -> DeployReport;
}

/// Copies the artifact (and its dependency) into candidate plug-in dirs.
#[derive(Debug, Clone)]
pub struct Deployer {
    artifact: PathBuf,
    dependency: Option<PathBuf>,
    candidates: Vec<PathBuf>,
    policy: RetryPolicy,
}

impl Deployer {
    pub fn new(artifact: PathBuf, candidates: Vec<PathBuf>) -> Self {
        Self {
            artifact,
            dependency: None,
            candidates,
            policy: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.artifact_path(), config.plugin_dirs())
            .with_dependency(config.dependency_path())
            .with_policy(RetryPolicy {
                attempts: config.deploy.retries,
                delay: Duration::from_secs(config.deploy.retry_delay_secs),
            })
    }

    pub fn with_dependency(mut self, dependency: Option<PathBuf>) -> Self {
        self.dependency = dependency;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    async fn deploy_into(&self, dir: &Path) -> io::Result<CandidateAttempt> {
        std::fs::create_dir_all(dir)?;

        let file_name = self
            .artifact
            .file_name()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "artifact has no file name"))?;
        let dest = dir.join(file_name);
        info!(dest = %dest.display(), "Copying plugin");
        with_retry(&self.policy, &dest.display().to_string(), || {
            copy_replacing(&self.artifact, &dest)
        })
        .await?;

        let digest = match file_digest(&dest) {
            Ok(d) => Some(d),
            Err(e) => {
                warn!(dest = %dest.display(), error = %e, "Could not hash deployed plugin");
                None
            }
        };

        let dependency_copied = self.copy_dependency(dir).await;

        Ok(CandidateAttempt {
            dir: dir.to_path_buf(),
            error: None,
            dependency_copied,
            digest,
        })
    }

    /// Best effort; a missing or locked dependency never fails the candidate.
    async fn copy_dependency(&self, dir: &Path) -> bool {
        let Some(src) = self.dependency.as_deref() else {
            return false;
        };
        if !src.exists() {
            return false;
        }
        let Some(name) = src.file_name() else {
            return false;
        };
        let dest = dir.join(name);
        info!(dest = %dest.display(), "Copying dependency library");
        match with_retry(&self.policy, &dest.display().to_string(), || {
            copy_replacing(src, &dest)
        })
        .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!(dest = %dest.display(), error = %e, "Dependency library not copied");
                false
            }
        }
    }
}

#[async_trait]
impl ArtifactDeployer for Deployer {
    async fn deploy(&self) -> DeployReport {
        if !self.artifact.exists() {
            warn!(artifact = %self.artifact.display(), "Plugin artifact not found");
            return DeployReport {
                artifact: self.artifact.clone(),
                artifact_found: false,
                attempts: Vec::new(),
            };
        }

        let mut attempts = Vec::new();
        for dir in &self.candidates {
            match self.deploy_into(dir).await {
                Ok(attempt) => {
                    info!(
                        dir = %dir.display(),
                        digest = attempt.digest.as_deref().unwrap_or("-"),
                        dependency = attempt.dependency_copied,
                        "Plugin deployed"
                    );
                    attempts.push(attempt);
                    break;
                }
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Could not deploy to directory");
                    attempts.push(CandidateAttempt {
                        dir: dir.clone(),
                        error: Some(e.to_string()),
                        dependency_copied: false,
                        digest: None,
                    });
                }
            }
        }

        if !attempts.iter().any(CandidateAttempt::succeeded) {
            warn!("Plugin was not copied to any plug-in directory");
        }

        DeployReport {
            artifact: self.artifact.clone(),
            artifact_found: true,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_replacing_overwrites_destination() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.mll");
        let dst = dir.path().join("b.mll");
        std::fs::write(&src, b"new").unwrap();
        std::fs::write(&dst, b"old plugin").unwrap();

        copy_replacing(&src, &dst).unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"new");
    }

    #[test]
    fn file_digest_is_sha256_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.mll");
        std::fs::write(&path, b"").unwrap();
        assert_eq!(
            file_digest(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn with_retry_gives_up_after_attempts() {
        let policy = RetryPolicy {
            attempts: 2,
            delay: Duration::from_secs(1),
        };
        let mut calls = 0;
        let result: io::Result<()> = with_retry(&policy, "x", || {
            calls += 1;
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "in use"))
        })
        .await;
        assert_eq!(calls, 2);
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn report_without_artifact_explains_itself() {
        let report = DeployReport {
            artifact: PathBuf::from("/b/Release/CharacterFactory.mll"),
            artifact_found: false,
            attempts: Vec::new(),
        };
        assert!(!report.succeeded());
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("plugin artifact not found"));
    }
}
