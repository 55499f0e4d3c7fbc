use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;

/// A connection that stayed up this long starts the backoff from scratch.
pub const RECONNECT_RESET_AFTER: Duration = Duration::from_secs(60 * 5);

/// Exponential delay for `attempt` (1-based), before jitter.
pub fn backoff_delay(attempt: u32, min: Duration, max: Duration) -> Duration {
	let base_ms = u64::try_from(min.as_millis()).unwrap_or(u64::MAX).max(1);
	let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX).max(base_ms);
	let pow = 2u64.saturating_pow(attempt.saturating_sub(1).min(16));
	Duration::from_millis(base_ms.saturating_mul(pow).min(max_ms))
}

/// Deadline for the next attempt, with +/-10% jitter.
pub fn schedule_reconnect(attempt: u32, min: Duration, max: Duration) -> (Instant, u64) {
	let delay_ms = u64::try_from(backoff_delay(attempt, min, max).as_millis()).unwrap_or(u64::MAX);
	let jitter_window = (delay_ms / 10).max(1);
	let mut rng = rand::rng();
	let jitter_offset = rng.random_range(0..=(jitter_window * 2));
	let final_ms = delay_ms.saturating_sub(jitter_window).saturating_add(jitter_offset);
	(Instant::now() + Duration::from_millis(final_ms), final_ms)
}

/// Next attempt number given when the last connection came up.
pub fn next_attempt(current: u32, last_connected: Option<Instant>, now: Instant) -> u32 {
	match last_connected {
		Some(last) if now.saturating_duration_since(last) > RECONNECT_RESET_AFTER => 1,
		_ => current.saturating_add(1).max(1),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const MIN: Duration = Duration::from_millis(500);
	const MAX: Duration = Duration::from_secs(30);

	#[test]
	fn delay_doubles_until_the_cap() {
		assert_eq!(backoff_delay(1, MIN, MAX), Duration::from_millis(500));
		assert_eq!(backoff_delay(2, MIN, MAX), Duration::from_millis(1000));
		assert_eq!(backoff_delay(4, MIN, MAX), Duration::from_millis(4000));
		assert_eq!(backoff_delay(20, MIN, MAX), MAX);
		assert_eq!(backoff_delay(u32::MAX, MIN, MAX), MAX);
	}

	#[tokio::test]
	async fn jitter_stays_within_ten_percent() {
		for attempt in 1..8 {
			let base = backoff_delay(attempt, MIN, MAX).as_millis() as u64;
			let (_, ms) = schedule_reconnect(attempt, MIN, MAX);
			let window = (base / 10).max(1);
			assert!(ms >= base - window && ms <= base + window, "attempt {attempt}: {ms} vs {base}");
		}
	}

	#[tokio::test]
	async fn attempts_reset_after_a_stable_connection() {
		let now = Instant::now();
		assert_eq!(next_attempt(0, None, now), 1);
		assert_eq!(next_attempt(3, Some(now), now), 4);
		let long_ago = now.checked_sub(RECONNECT_RESET_AFTER + Duration::from_secs(1));
		if let Some(long_ago) = long_ago {
			assert_eq!(next_attempt(7, Some(long_ago), now), 1);
		}
	}
}
