use engine_config::ConfigError;
use engine_processing::RunError;
use model::core::strategy::UnknownStrategy;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read input file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to parse the targets file '{path}': {source}")]
    TargetsParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid target '{0}': expected owner/name")]
    InvalidTarget(String),

    #[error(transparent)]
    InvalidStrategy(#[from] UnknownStrategy),

    #[error("Failed to run the batch: {0}")]
    Run(#[from] RunError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
