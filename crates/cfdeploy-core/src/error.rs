//! Error taxonomy for the deploy harness.

use std::path::PathBuf;

/// Harness errors, one variant per failing stage plus the plumbing below them.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("{what} not found: {}", path.display())]
    ConfigurationMissing { what: &'static str, path: PathBuf },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("build failed during {step}: {detail}")]
    BuildFailure { step: String, detail: String },

    #[error("deployment failed: {0}")]
    DeploymentFailure(String),

    #[error("process control failed: {0}")]
    ProcessControl(String),

    #[error("host not started; run {} manually", script.display())]
    ManualLaunchRequired { script: PathBuf },

    #[error("host command failed: {0}")]
    HostCommand(String),

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_missing_names_the_path() {
        let err = HarnessError::ConfigurationMissing {
            what: "host binary",
            path: PathBuf::from("/opt/maya/bin/maya"),
        };
        let msg = err.to_string();
        assert!(msg.contains("host binary"));
        assert!(msg.contains("/opt/maya/bin/maya"));
    }

    #[test]
    fn manual_launch_points_at_script() {
        let err = HarnessError::ManualLaunchRequired {
            script: PathBuf::from("StartMaya.bat"),
        };
        assert!(err.to_string().contains("StartMaya.bat"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let err: HarnessError = io.into();
        assert!(matches!(err, HarnessError::Io(_)));
        assert!(err.to_string().contains("locked"));
    }
}
