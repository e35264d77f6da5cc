//! Tracing initialisation for the `cfdeploy` binary.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Filter used when `RUST_LOG` is unset: harness crates at `level`,
/// everything else at `warn`.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    format!("warn,cfdeploy_core={level},cfdeploy={level}")
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `level`. With `json` set, log lines are
/// newline-delimited JSON. Only the first call installs a subscriber.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let verbose = level >= Level::DEBUG;

    let json_layer = json.then(|| fmt::layer().with_target(verbose).json());
    let text_layer = (!json).then(|| fmt::layer().with_target(verbose).compact());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_scope_harness_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,cfdeploy_core=debug,cfdeploy=debug"
        );
    }

    #[test]
    fn init_twice_is_harmless() {
        init_tracing(false, Level::INFO);
        init_tracing(true, Level::DEBUG);
    }
}
