//! Log output setup.

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use crate::config::Logging;

/// Build the log filter. `RUST_LOG` takes precedence over the config file.
fn filter(config: &Logging) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => parse_filter(&config.level),
    }
}

fn parse_filter(level: &str) -> anyhow::Result<EnvFilter> {
    EnvFilter::try_new(level).context(format!("Invalid log level {:?}", level))
}

/// Install the global log subscriber.
pub fn init_logging(config: &Logging) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(config)?)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
