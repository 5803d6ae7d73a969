//! Crash-recovery restart policy.
//!
//! The supervisor observes execution-unit exits and applies this policy:
//! exponential backoff between consecutive restart attempts, and a terminal
//! `disabled` state once the restart budget is exhausted. `restart_count`
//! never resets on success, so infrequent repeated crashes still accumulate
//! toward the disable threshold.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

fn default_max_restarts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_cap_delay_ms() -> u64 {
    30_000
}

/// Backoff-restart policy for crashing execution units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Restarts allowed beyond the initial start before the module is
    /// disabled.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    /// Delay before the first restart attempt.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Ceiling on the backoff delay.
    #[serde(default = "default_cap_delay_ms")]
    pub cap_delay_ms: u64,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            max_restarts: default_max_restarts(),
            base_delay_ms: default_base_delay_ms(),
            cap_delay_ms: default_cap_delay_ms(),
        }
    }
}

impl RestartPolicy {
    /// Delay before restart attempt number `restart_count` (1-based):
    /// `min(base · 2^(n−1), cap)`.
    pub fn delay_for(&self, restart_count: u32) -> Duration {
        let exp = restart_count.saturating_sub(1).min(63);
        let ms = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(exp).unwrap_or(u64::MAX))
            .min(self.cap_delay_ms);
        Duration::from_millis(ms)
    }

    /// Returns `true` once `restart_count` has exceeded the budget.
    pub fn exhausted(&self, restart_count: u32) -> bool {
        restart_count > self.max_restarts
    }
}

#[cfg(test)]
#[path = "health.test.rs"]
mod tests;
