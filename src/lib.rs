pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod shared;

pub use application::SyncEngine;
pub use shared::{AppConfig, AppError};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "todo_sync=debug,info";

/// Installs the global subscriber. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str, json: bool) -> Result<(), AppError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let fmt_layer = if json {
        fmt::layer().json().with_current_span(false).boxed()
    } else {
        fmt::layer()
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| AppError::ConfigurationError(format!("logging already initialised: {err}")))
}
