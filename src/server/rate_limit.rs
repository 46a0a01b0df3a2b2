//! Fixed-window rate limiting for the salt endpoint.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Bucket {
	count: u32,
	window_start: Instant,
}

/// In-memory, per-key fixed-window rate limiter. Buckets expire and reset
/// once their window elapses, so memory use stays bounded by the number of
/// distinct keys seen within one window.
pub struct RateLimiter {
	max_attempts: u32,
	window: Duration,
	buckets: Mutex<HashMap<String, Bucket>>,
}

impl RateLimiter {
	pub fn new(max_attempts: u32, window: Duration) -> Self {
		RateLimiter { max_attempts, window, buckets: Mutex::new(HashMap::new()) }
	}

	/// Default policy: 10 attempts per 15 minutes.
	pub fn default_salt_policy() -> Self {
		RateLimiter::new(10, Duration::from_secs(15 * 60))
	}

	/// Record one attempt for `key` and report whether it's within the
	/// allowed rate. Expired windows reset the counter to 1 (this call
	/// counts as the first attempt of the new window).
	pub fn check(&self, key: &str) -> bool {
		let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
		let now = Instant::now();
		let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket { count: 0, window_start: now });
		if now.duration_since(bucket.window_start) >= self.window {
			bucket.count = 0;
			bucket.window_start = now;
		}
		bucket.count += 1;
		bucket.count <= self.max_attempts
	}

	/// Drop buckets whose window has fully elapsed, bounding memory growth
	/// under a long-lived server process.
	pub fn sweep_expired(&self) {
		let mut buckets = self.buckets.lock().expect("rate limiter mutex poisoned");
		let now = Instant::now();
		let window = self.window;
		buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < window);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn allows_up_to_max_attempts_then_rejects() {
		let limiter = RateLimiter::new(3, Duration::from_secs(60));
		assert!(limiter.check("ip1"));
		assert!(limiter.check("ip1"));
		assert!(limiter.check("ip1"));
		assert!(!limiter.check("ip1"));
	}

	#[test]
	fn keys_are_independent() {
		let limiter = RateLimiter::new(1, Duration::from_secs(60));
		assert!(limiter.check("ip1"));
		assert!(limiter.check("ip2"));
		assert!(!limiter.check("ip1"));
	}

	#[test]
	fn window_resets_bucket() {
		let limiter = RateLimiter::new(1, Duration::from_millis(10));
		assert!(limiter.check("ip1"));
		std::thread::sleep(Duration::from_millis(20));
		assert!(limiter.check("ip1"));
	}
}

// vim: ts=4
