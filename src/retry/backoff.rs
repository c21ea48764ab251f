use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay growth function applied between retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    None,
    /// base * 2^(attempt-1)
    Exponential,
    /// base * attempt
    Linear,
    /// base * 3 * attempt
    Extended,
    /// min(base * attempt, cap)
    NetworkShort,
}

impl BackoffKind {
    /// Delay after the given (1-based) failed attempt.
    ///
    /// Saturates instead of overflowing so the sequence stays non-decreasing.
    pub fn delay(&self, base: Duration, attempt: u32, network_cap: Duration) -> Duration {
        let attempt = attempt.max(1);
        match self {
            BackoffKind::None => Duration::ZERO,
            BackoffKind::Exponential => {
                let factor = 2u32.checked_pow(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor)
            }
            BackoffKind::Linear => base.saturating_mul(attempt),
            BackoffKind::Extended => base.saturating_mul(3).saturating_mul(attempt),
            BackoffKind::NetworkShort => base.saturating_mul(attempt).min(network_cap),
        }
    }
}
