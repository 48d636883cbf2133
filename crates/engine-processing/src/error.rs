use engine_config::ConfigError;
use thiserror::Error;

/// Run-level failures. Per-item failures are recorded as outcomes instead.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("No targets could be processed ({attempted} attempted): {last_error}")]
    NoTargetsProcessed { attempted: usize, last_error: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Coordinator resources have been cleaned up")]
    ResourcesShutDown,
}
