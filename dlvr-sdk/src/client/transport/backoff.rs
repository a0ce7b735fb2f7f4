use std::time::Duration;

/// Delay before reconnect attempt number `attempt` (zero-based).
///
/// `min(base * 2^attempt, cap)`, saturating instead of overflowing for
/// large attempt counts.
pub fn backoff_delay(base: Duration, cap: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt);
    base.saturating_mul(factor).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_cap() {
        let base = Duration::from_secs(1);
        let cap = Duration::from_secs(30);
        assert_eq!(backoff_delay(base, cap, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(base, cap, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, cap, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, cap, 4), Duration::from_secs(16));
        assert_eq!(backoff_delay(base, cap, 5), cap);
    }

    #[test]
    fn test_backoff_never_exceeds_cap() {
        let base = Duration::from_millis(250);
        let cap = Duration::from_secs(10);
        for attempt in 0..=200 {
            assert!(backoff_delay(base, cap, attempt) <= cap);
        }
        assert_eq!(backoff_delay(base, cap, u32::MAX), cap);
    }
}
