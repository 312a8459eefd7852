// 日志系统模块

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "optstore=info";

/// Install a global `tracing` subscriber. `RUST_LOG` takes precedence over
/// the default filter.
pub fn init_logging() -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    install(filter)
}

/// Same as `init_logging` with an explicit filter directive, ignoring
/// `RUST_LOG`.
pub fn init_logging_with_filter(directive: &str) -> Result<(), String> {
    let filter = EnvFilter::try_new(directive)
        .map_err(|e| format!("invalid log filter {:?}: {}", directive, e))?;
    install(filter)
}

fn install(filter: EnvFilter) -> Result<(), String> {
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .try_init()
        .map_err(|e| format!("failed to initialize logging: {}", e))?;

    info!("logging initialized");
    Ok(())
}
