use serde::{Deserialize, Serialize};

/// A group of targets that all request the same manifest paths.
///
/// Derived per submitted target set and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossTargetOpportunity {
    /// Target keys, sorted.
    pub targets: Vec<String>,
    /// Shared file paths, sorted.
    pub shared_paths: Vec<String>,
    /// Fraction of requests saved, in `[0, 1)`.
    pub estimated_savings: f64,
}

impl CrossTargetOpportunity {
    /// Requests a naive plan would issue for this group.
    pub fn naive_requests(&self) -> usize {
        self.targets.len() * self.shared_paths.len()
    }

    /// Requests avoided if each shared path were fetched once.
    pub fn requests_saved(&self) -> usize {
        self.naive_requests() - self.shared_paths.len()
    }
}
