//! Reconnect delay computation.

use std::time::Duration;

use rand::Rng;

use swarmlink_core::ReconnectConfig;

/// Delay before reconnect cycle `attempt` (0-based).
///
/// `min(base * 2^attempt, max_delay)`, then uniform jitter of
/// ±`jitter` of the capped value, floored at `min_delay`. Kept pure so the
/// growth and jitter bounds are testable without time.
#[must_use]
pub fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let base_ms = config.base_delay.as_millis() as u64;
    let max_ms = config.max_delay.as_millis() as u64;
    let min_ms = config.min_delay.as_millis() as u64;

    let raw = base_ms.saturating_mul(2u64.saturating_pow(attempt.min(31)));
    let capped = raw.min(max_ms);

    let span = (capped as f64 * config.jitter) as i64;
    let jittered = if span > 0 {
        let offset = rand::thread_rng().gen_range(-span..=span);
        (capped as i64 + offset).max(0) as u64
    } else {
        capped
    };

    Duration::from_millis(jittered.max(min_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jitter: f64) -> ReconnectConfig {
        ReconnectConfig {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(60_000),
            min_delay: Duration::from_millis(1000),
            max_attempts: 10,
            jitter,
        }
    }

    #[test]
    fn test_doubles_without_jitter() {
        let config = config(0.0);
        let delays: Vec<u64> = (0..5)
            .map(|attempt| backoff_delay(attempt, &config).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
    }

    #[test]
    fn test_caps_at_max_delay() {
        let config = config(0.0);
        assert_eq!(backoff_delay(10, &config), Duration::from_millis(60_000));
        // Large attempt counts do not overflow.
        assert_eq!(backoff_delay(63, &config), Duration::from_millis(60_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let config = config(0.25);
        for attempt in 0..5u32 {
            let formula = (1000u64 * 2u64.pow(attempt)).min(60_000);
            let low = formula - formula / 4;
            let high = formula + formula / 4;
            for _ in 0..100 {
                let delay = backoff_delay(attempt, &config).as_millis() as u64;
                assert!(
                    (low..=high).contains(&delay),
                    "attempt {attempt}: {delay} outside [{low}, {high}]"
                );
            }
        }
    }

    #[test]
    fn test_growth_is_nondecreasing_in_expectation() {
        // With jitter off, 5 consecutive failures produce non-decreasing
        // delays up to the cap.
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(4000),
            min_delay: Duration::from_millis(1000),
            max_attempts: 10,
            jitter: 0.0,
        };
        let delays: Vec<Duration> = (0..5).map(|a| backoff_delay(a, &config)).collect();
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(*delays.last().unwrap(), Duration::from_millis(4000));
    }

    #[test]
    fn test_floored_at_min_delay() {
        let config = ReconnectConfig {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(60_000),
            min_delay: Duration::from_millis(500),
            max_attempts: 10,
            jitter: 0.25,
        };
        assert!(backoff_delay(0, &config) >= Duration::from_millis(500));
    }
}
