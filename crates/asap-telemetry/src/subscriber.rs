//! `tracing_subscriber` setup driven by [`asap_config::AsapConfig`].

use asap_config::{AsapConfig, LogFormat};
use tracing_subscriber::EnvFilter;

/// Per-module targets enabled at `debug` level when [`AsapConfig::debug`]
/// is set, matching the module layout of the runtime crates.
const DEBUG_TARGETS: &str = "asap=debug,asap.server=debug,asap.client=debug,asap.ws=debug,\
asap.auth=debug,asap.webhook=debug,asap.delegation=debug,asap.snapshot=debug";

const INFO_TARGETS: &str = "asap=info";

/// Failure initializing the global subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG`, when set, takes precedence over the debug/info target
/// lists derived from `config.debug`. The output format (JSON lines vs.
/// human-readable console) follows `config.log_format`.
pub fn init_tracing(config: &AsapConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if config.debug { DEBUG_TARGETS } else { INFO_TARGETS })
    });

    let result = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
        LogFormat::Console => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };

    result.map_err(|_| TelemetryError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_targets_mention_every_module() {
        for module in ["server", "client", "ws", "auth", "webhook", "delegation", "snapshot"] {
            assert!(DEBUG_TARGETS.contains(&format!("asap.{module}")));
        }
    }
}
