use chrono::Utc;
use engine_config::settings::batch::BatchConfig;
use model::execution::quota::QuotaSnapshot;
use std::{
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::{debug, info};

pub const CRITICAL_REMAINING: u32 = 3;
pub const VERY_LOW_REMAINING: u32 = 10;
pub const LOW_REMAINING: u32 = 25;
pub const MODERATE_REMAINING: u32 = 50;

const CRITICAL_MIN_DELAY: Duration = Duration::from_secs(10);
const CRITICAL_MAX_DELAY: Duration = Duration::from_secs(300);
const VERY_LOW_DELAY: Duration = Duration::from_secs(5);
const LOW_DELAY: Duration = Duration::from_secs(2);
const MODERATE_DELAY: Duration = Duration::from_millis(500);

const MULTIPLIER_STEP: f64 = 0.25;
const MAX_MULTIPLIER: f64 = 3.0;
const RECOVERY_STREAK: u32 = 5;

#[derive(Debug, Default)]
struct Streaks {
    low: u32,
    healthy: u32,
}

/// Paces dispatch from the quota signals of previous responses.
///
/// The base delay is a step function of `remaining`. A multiplier learned
/// from sustained low-quota periods scales every step. Updates serialize on
/// a mutex; the multiplier itself is published through an atomic so readers
/// never block.
#[derive(Debug)]
pub struct RateLimiter {
    buffer: f64,
    safety_margin: u32,
    multiplier: AtomicU64,
    streaks: Mutex<Streaks>,
    last_quota: Mutex<Option<QuotaSnapshot>>,
}

impl RateLimiter {
    pub fn new(buffer: f64, safety_margin: u32) -> Self {
        Self {
            buffer,
            safety_margin,
            multiplier: AtomicU64::new(1.0f64.to_bits()),
            streaks: Mutex::new(Streaks::default()),
            last_quota: Mutex::new(None),
        }
    }

    pub fn from_config(config: &BatchConfig) -> Self {
        Self::new(config.rate_limit_buffer(), config.rate_limit_safety_margin())
    }

    pub fn multiplier(&self) -> f64 {
        f64::from_bits(self.multiplier.load(Ordering::Acquire))
    }

    pub fn last_quota(&self) -> Option<QuotaSnapshot> {
        self.last_quota.lock().ok().and_then(|q| *q)
    }

    /// Base tier delay before the learned multiplier is applied.
    pub fn base_delay(remaining: u32, seconds_until_reset: u64) -> Duration {
        if remaining <= CRITICAL_REMAINING {
            Duration::from_secs(seconds_until_reset)
                .min(CRITICAL_MAX_DELAY)
                .max(CRITICAL_MIN_DELAY)
        } else if remaining <= VERY_LOW_REMAINING {
            VERY_LOW_DELAY
        } else if remaining <= LOW_REMAINING {
            LOW_DELAY
        } else if remaining <= MODERATE_REMAINING {
            MODERATE_DELAY
        } else {
            Duration::ZERO
        }
    }

    pub fn recommended_delay(&self, remaining: u32, reset_epoch: i64) -> Duration {
        self.recommended_delay_at(remaining, reset_epoch, Utc::now().timestamp())
    }

    /// Non-increasing in `remaining` for a fixed reset time.
    pub fn recommended_delay_at(&self, remaining: u32, reset_epoch: i64, now_epoch: i64) -> Duration {
        let until_reset = reset_epoch.saturating_sub(now_epoch).max(0) as u64;
        Self::base_delay(remaining, until_reset).mul_f64(self.multiplier())
    }

    /// Requests usable before touching the reserved share of the quota.
    pub fn usable_remaining(&self, quota: &QuotaSnapshot) -> u32 {
        let buffer_reserve = quota
            .limit
            .map(|limit| (limit as f64 * (1.0 - self.buffer)).ceil() as u32)
            .unwrap_or(0);
        let reserve = self.safety_margin.max(buffer_reserve);
        quota.remaining.saturating_sub(reserve)
    }

    /// Delay before the next batch given the latest observed quota.
    pub fn pacing_delay(&self, quota: &QuotaSnapshot) -> Duration {
        self.recommended_delay(self.usable_remaining(quota), quota.reset_epoch)
    }

    /// Delay for the last observed quota, zero when nothing has been observed.
    pub fn current_delay(&self) -> Duration {
        self.last_quota()
            .map(|q| self.pacing_delay(&q))
            .unwrap_or(Duration::ZERO)
    }

    /// Whether the last observed quota sits at or below the moderate tier.
    pub fn is_constrained(&self) -> bool {
        self.last_quota()
            .is_some_and(|q| self.usable_remaining(&q) <= MODERATE_REMAINING)
    }

    /// Feeds a quota signal from the transport into the adaptive state.
    pub fn observe(&self, quota: QuotaSnapshot) {
        if let Ok(mut last) = self.last_quota.lock() {
            *last = Some(quota);
        }

        let Ok(mut streaks) = self.streaks.lock() else {
            return;
        };
        let remaining = self.usable_remaining(&quota);
        let current = self.multiplier();

        if remaining <= LOW_REMAINING {
            streaks.low += 1;
            streaks.healthy = 0;
            let next = (current + MULTIPLIER_STEP).min(MAX_MULTIPLIER);
            if next != current {
                self.multiplier.store(next.to_bits(), Ordering::Release);
                info!(
                    remaining = quota.remaining,
                    low_streak = streaks.low,
                    multiplier = next,
                    "Quota running low, slowing dispatch"
                );
            }
        } else if remaining > MODERATE_REMAINING {
            streaks.low = 0;
            streaks.healthy += 1;
            if streaks.healthy > RECOVERY_STREAK && current > 1.0 {
                let next = 1.0 + (current - 1.0) / 2.0;
                let next = if next - 1.0 < 0.01 { 1.0 } else { next };
                self.multiplier.store(next.to_bits(), Ordering::Release);
                streaks.healthy = 0;
                debug!(multiplier = next, "Quota recovered, relaxing pacing");
            }
        } else {
            streaks.low = 0;
            streaks.healthy = 0;
        }
    }
}
