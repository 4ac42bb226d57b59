use fnews_core::config::RateLimit;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct Window {
    minute_start: Instant,
    minute_count: u32,
    day_start: Instant,
    day_count: u32,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self {
            minute_start: now,
            minute_count: 0,
            day_start: now,
            day_count: 0,
        }
    }

    fn roll(&mut self, now: Instant, minute: Duration, day: Duration) {
        if now.duration_since(self.minute_start) >= minute {
            self.minute_start = now;
            self.minute_count = 0;
        }
        if now.duration_since(self.day_start) >= day {
            self.day_start = now;
            self.day_count = 0;
        }
    }

    fn has_room(&self, limit: &RateLimit) -> bool {
        limit.per_minute.map_or(true, |max| self.minute_count < max)
            && limit.per_day.map_or(true, |max| self.day_count < max)
    }

    fn bump(&mut self) {
        self.minute_count += 1;
        self.day_count += 1;
    }
}

/// Per-source request quotas shared by every adapter in a run. Sources with
/// no configured limit are never throttled.
#[derive(Debug)]
pub struct RateLimiter {
    limits: HashMap<String, RateLimit>,
    windows: Mutex<HashMap<String, Window>>,
    minute: Duration,
    day: Duration,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl RateLimiter {
    pub fn new(limits: HashMap<String, RateLimit>) -> Self {
        Self::with_windows(limits, MINUTE, DAY)
    }

    pub fn with_windows(limits: HashMap<String, RateLimit>, minute: Duration, day: Duration) -> Self {
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
            minute,
            day,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Window>> {
        // counters stay meaningful even if a holder panicked
        self.windows.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn allow(&self, source: &str) -> bool {
        let Some(limit) = self.limits.get(source) else {
            return true;
        };
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows.entry(source.to_string()).or_insert_with(|| Window::new(now));
        window.roll(now, self.minute, self.day);
        window.has_room(limit)
    }

    pub fn record(&self, source: &str) {
        if !self.limits.contains_key(source) {
            return;
        }
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows.entry(source.to_string()).or_insert_with(|| Window::new(now));
        window.roll(now, self.minute, self.day);
        window.bump();
    }

    /// `allow` and `record` under a single lock, so two tasks cannot both
    /// take the last slot.
    pub fn try_acquire(&self, source: &str) -> bool {
        let Some(limit) = self.limits.get(source) else {
            return true;
        };
        let now = Instant::now();
        let mut windows = self.lock();
        let window = windows.entry(source.to_string()).or_insert_with(|| Window::new(now));
        window.roll(now, self.minute, self.day);
        if window.has_room(limit) {
            window.bump();
            true
        } else {
            debug!(
                "⏳ {} is at its quota ({} this minute, {} today)",
                source, window.minute_count, window.day_count
            );
            false
        }
    }

    #[cfg(test)]
    fn usage(&self, source: &str) -> Option<(u32, u32)> {
        self.lock()
            .get(source)
            .map(|w| (w.minute_count, w.day_count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(per_minute: Option<u32>, per_day: Option<u32>) -> RateLimiter {
        let limits = HashMap::from([("vendor".to_string(), RateLimit::new(per_minute, per_day))]);
        RateLimiter::new(limits)
    }

    #[test]
    fn test_unknown_source_is_unlimited() {
        let limiter = limiter(Some(1), None);
        for _ in 0..100 {
            assert!(limiter.try_acquire("somewhere-else"));
        }
        assert!(limiter.allow("somewhere-else"));
        assert!(limiter.usage("somewhere-else").is_none());
    }

    #[test]
    fn test_minute_ceiling() {
        let limiter = limiter(Some(3), None);
        for _ in 0..3 {
            assert!(limiter.allow("vendor"));
            limiter.record("vendor");
        }
        assert!(!limiter.allow("vendor"));
        assert_eq!(limiter.usage("vendor"), Some((3, 3)));
    }

    #[test]
    fn test_day_ceiling() {
        let limiter = limiter(None, Some(2));
        assert!(limiter.try_acquire("vendor"));
        assert!(limiter.try_acquire("vendor"));
        assert!(!limiter.try_acquire("vendor"));
    }

    #[test]
    fn test_windows_reset() {
        let limits = HashMap::from([("vendor".to_string(), RateLimit::new(Some(1), Some(2)))]);
        let limiter = RateLimiter::with_windows(limits, Duration::from_millis(20), Duration::from_millis(200));
        assert!(limiter.try_acquire("vendor"));
        assert!(!limiter.try_acquire("vendor"));

        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.try_acquire("vendor"));

        // minute window reset again but the day ceiling of 2 is spent
        std::thread::sleep(Duration::from_millis(30));
        assert!(!limiter.try_acquire("vendor"));
    }

    #[tokio::test]
    async fn test_concurrent_acquire_never_overshoots() {
        let limiter = Arc::new(limiter(Some(25), None));
        let handles: Vec<_> = (0..100)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.try_acquire("vendor") })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 25);
    }
}
