//! Retry backoff computation.

use std::time::Duration;

use crate::config::BackoffStrategy;

/// Delay to apply before the given retry attempt.
///
/// `attempt` is zero-based; attempt 0 (the first attempt) never waits.
/// Formulas are exact, with no jitter and no cap:
///
/// - exponential: `base_ms * 2^(attempt - 1)`
/// - linear: `base_ms * attempt`
/// - none: 0
pub fn backoff_delay(base_delay_ms: u64, attempt: u32, strategy: BackoffStrategy) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    match strategy {
        BackoffStrategy::Exponential => {
            let multiplier = 1u64.checked_shl(attempt - 1).unwrap_or(u64::MAX);
            Duration::from_millis(base_delay_ms.saturating_mul(multiplier))
        }
        BackoffStrategy::Linear => {
            Duration::from_millis(base_delay_ms.saturating_mul(attempt as u64))
        }
        BackoffStrategy::None => Duration::ZERO,
    }
}
