use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt};

use crate::ScoutError;
use crate::config::LoggingConfig;

static TELEMETRY_GUARD: OnceLock<()> = OnceLock::new();

/// HTTP and database internals log at `info` on every request; keep them
/// out of the per-candidate agent output unless asked for explicitly.
const QUIET_DEPENDENCIES: &[&str] = &["hyper=warn", "reqwest=warn", "rustls=warn", "sqlx=warn"];

/// Configuration options when initialising telemetry.
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    /// Base level or filter directive; falls back to `RUST_LOG`, then `info`.
    pub env_filter: Option<String>,
    pub with_ansi: bool,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            env_filter: None,
            with_ansi: true,
        }
    }
}

impl TelemetryOptions {
    pub fn from_logging(logging: &LoggingConfig) -> Self {
        Self {
            env_filter: logging.level.clone(),
            ..Self::default()
        }
    }

    /// Full directive string: the requested filter plus quiet defaults for
    /// dependencies the filter does not mention.
    fn directives(&self) -> String {
        let base = self
            .env_filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "info".to_string());

        let mut directives = vec![base.trim().to_string()];
        for quiet in QUIET_DEPENDENCIES {
            let target = quiet.split('=').next().unwrap_or_default();
            if !base.contains(target) {
                directives.push((*quiet).to_string());
            }
        }
        directives.join(",")
    }
}

/// Initialise the global tracing subscriber.
///
/// Safe to call multiple times; only the first invocation installs the subscriber.
pub fn init_telemetry(options: TelemetryOptions) -> Result<(), ScoutError> {
    if TELEMETRY_GUARD.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_new(options.directives()).map_err(|err| {
        ScoutError::InvalidConfiguration(format!("logging.level is not a valid filter: {err}"))
    })?;

    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_ansi(options.with_ansi)
        .with_target(false)
        .try_init()
        .map_err(|err| ScoutError::InvalidConfiguration(format!("telemetry init failed: {err}")))?;

    TELEMETRY_GUARD.get_or_init(|| ());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_level_gets_quiet_dependency_defaults() {
        let options = TelemetryOptions::from_logging(&LoggingConfig {
            level: Some("debug".into()),
        });
        assert_eq!(
            options.directives(),
            "debug,hyper=warn,reqwest=warn,rustls=warn,sqlx=warn"
        );
    }

    #[test]
    fn explicit_dependency_directive_wins() {
        let options = TelemetryOptions {
            env_filter: Some("info,sqlx=debug".into()),
            with_ansi: false,
        };
        let directives = options.directives();
        assert!(directives.contains("sqlx=debug"));
        assert!(!directives.contains("sqlx=warn"));
        assert!(directives.contains("reqwest=warn"));
    }
}
