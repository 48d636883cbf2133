use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// How a run schedules its batches.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStrategy {
    /// One item at a time. Meant for diagnosis, not throughput.
    Sequential,
    /// Full concurrency up to the configured caps.
    Parallel,
    /// Re-evaluates batch size and concurrency after every batch.
    #[default]
    Adaptive,
    /// Most cautious fixed bounds.
    Conservative,
}

impl ExecutionStrategy {
    pub const ALL: [ExecutionStrategy; 4] = [
        ExecutionStrategy::Sequential,
        ExecutionStrategy::Parallel,
        ExecutionStrategy::Adaptive,
        ExecutionStrategy::Conservative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStrategy::Sequential => "sequential",
            ExecutionStrategy::Parallel => "parallel",
            ExecutionStrategy::Adaptive => "adaptive",
            ExecutionStrategy::Conservative => "conservative",
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, ExecutionStrategy::Adaptive)
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown execution strategy: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for ExecutionStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionStrategy::Sequential),
            "parallel" => Ok(ExecutionStrategy::Parallel),
            "adaptive" => Ok(ExecutionStrategy::Adaptive),
            "conservative" => Ok(ExecutionStrategy::Conservative),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_case_insensitively() {
        for strategy in ExecutionStrategy::ALL {
            let upper = strategy.as_str().to_uppercase();
            assert_eq!(upper.parse::<ExecutionStrategy>().unwrap(), strategy);
        }
        assert!("turbo".parse::<ExecutionStrategy>().is_err());
    }

    #[test]
    fn serializes_as_snake_case() {
        let json = serde_json::to_string(&ExecutionStrategy::Conservative).unwrap();
        assert_eq!(json, "\"conservative\"");
    }
}
