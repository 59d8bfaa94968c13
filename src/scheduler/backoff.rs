//! Exponential retry backoff.

use std::time::Duration;

/// Largest exponent applied; keeps the shift and multiplication in range.
const MAX_EXPONENT: u32 = 20;

/// Delay before the retry that follows the `failures`-th failure (1-based):
/// `base × 2^(failures − 1)`.
pub fn backoff_delay(base_secs: u64, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(MAX_EXPONENT);
    Duration::from_secs(base_secs.saturating_mul(1u64 << exponent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_from_the_base() {
        let delays: Vec<u64> = (1..=4).map(|n| backoff_delay(60, n).as_secs()).collect();
        assert_eq!(delays, vec![60, 120, 240, 480]);
    }

    #[test]
    fn zero_failures_is_the_base_delay() {
        assert_eq!(backoff_delay(60, 0), Duration::from_secs(60));
    }

    #[test]
    fn saturates_instead_of_overflowing() {
        assert_eq!(backoff_delay(u64::MAX, 5).as_secs(), u64::MAX);
        assert_eq!(backoff_delay(1, 1000), Duration::from_secs(1 << MAX_EXPONENT));
    }
}
