use thiserror::Error;

/// Errors raised while loading or validating a batch configuration.
///
/// All of these are fatal: nothing is dispatched with an invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more fields violated their constraints.
    #[error("Invalid batch configuration: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    /// The configuration document could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Individual constraint violations, if this is a validation failure.
    pub fn issues(&self) -> &[String] {
        match self {
            ConfigError::ValidationFailed(issues) => issues,
            _ => &[],
        }
    }
}
