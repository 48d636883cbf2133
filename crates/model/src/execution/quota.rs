use serde::{Deserialize, Serialize};

/// Remaining request budget as reported by the transport after a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub remaining: u32,
    /// Unix epoch seconds at which the budget replenishes.
    pub reset_epoch: i64,
    /// Total budget per window, when the transport knows it.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl QuotaSnapshot {
    pub fn new(remaining: u32, reset_epoch: i64) -> Self {
        Self {
            remaining,
            reset_epoch,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn seconds_until_reset(&self, now_epoch: i64) -> u64 {
        self.reset_epoch.saturating_sub(now_epoch).max(0) as u64
    }
}
