//! Rate limiting for outbound network calls.
//!
//! Fixed-window counter per key (remote host or tool name). Protects this
//! process's own outbound budget; it is advisory backpressure, not abuse
//! prevention for the remote side.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::types::RateLimitConfig;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Window is full; the caller may retry after `retry_after`.
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Counting window for one key.
#[derive(Debug)]
struct FixedWindow {
    started: Instant,
    count: u32,
}

impl FixedWindow {
    fn new(now: Instant) -> Self {
        Self {
            started: now,
            count: 0,
        }
    }

    /// Check if a call is allowed and count it if so. Rejected calls are
    /// not counted.
    fn check_and_record(&mut self, now: Instant, length: Duration, max_calls: u32) -> Admission {
        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= length {
            self.started = now;
            self.count = 0;
        }

        let elapsed = now.saturating_duration_since(self.started);
        if self.count < max_calls {
            self.count += 1;
            Admission::Admitted
        } else {
            Admission::Rejected {
                retry_after: length.saturating_sub(elapsed).max(Duration::from_millis(1)),
            }
        }
    }

    fn is_expired(&self, now: Instant, length: Duration) -> bool {
        now.saturating_duration_since(self.started) >= length
    }
}

/// Per-key windows plus the time of the last sweep over them.
#[derive(Debug, Default)]
struct WindowTable {
    windows: HashMap<String, FixedWindow>,
    last_sweep: Option<Instant>,
}

impl WindowTable {
    fn purge(&mut self, now: Instant, length: Duration) -> usize {
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_expired(now, length));
        self.last_sweep = Some(now);
        before - self.windows.len()
    }

    /// Sweep expired windows at most once per window length, so the table
    /// holds only keys seen within roughly the last two windows.
    fn sweep_if_due(&mut self, now: Instant, length: Duration) {
        let due = match self.last_sweep {
            Some(last) => now.saturating_duration_since(last) >= length,
            None => {
                self.last_sweep = Some(now);
                false
            }
        };
        if due {
            let removed = self.purge(now, length);
            if removed > 0 {
                tracing::trace!(removed, "expired rate limit windows dropped");
            }
        }
    }
}

/// Rate limiter - one fixed window per key.
///
/// Shared by reference across concurrent dispatches. All window updates go
/// through a single mutex and never hold it across an await point. Expired
/// windows are evicted during admission.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_calls: u32,
    table: Mutex<WindowTable>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            window: config.window,
            max_calls: config.max_calls,
            table: Mutex::new(WindowTable::default()),
        }
    }

    /// Check the limit for `key` and record the call if admitted.
    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Same as [`RateLimiter::admit`] with an explicit clock reading.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table.sweep_if_due(now, self.window);
        let window = table
            .windows
            .entry(key.to_string())
            .or_insert_with(|| FixedWindow::new(now));

        let admission = window.check_and_record(now, self.window, self.max_calls);
        if let Admission::Rejected { retry_after } = admission {
            tracing::debug!(key, ?retry_after, "rate limit window full");
        }
        admission
    }

    /// Calls counted in the current window for `key`.
    pub fn current_count(&self, key: &str) -> u32 {
        let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        table
            .windows
            .get(key)
            .filter(|w| !w.is_expired(Instant::now(), self.window))
            .map_or(0, |w| w.count)
    }

    /// Clear the window for a key.
    pub fn clear(&self, key: &str) {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .windows
            .remove(key);
    }

    /// Drop windows that have elapsed. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .purge(now, self.window)
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .windows
            .len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(&RateLimitConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RateLimitKey;

    fn limiter(max_calls: u32, window: Duration) -> RateLimiter {
        RateLimiter::new(&RateLimitConfig {
            window,
            max_calls,
            key_by: RateLimitKey::Host,
        })
    }

    #[test]
    fn test_three_per_second() {
        let limiter = limiter(3, Duration::from_secs(1));
        let t0 = Instant::now();

        for i in 0..3 {
            let now = t0 + Duration::from_millis(i * 100);
            assert_eq!(limiter.admit_at("api.example.com", now), Admission::Admitted);
        }

        match limiter.admit_at("api.example.com", t0 + Duration::from_millis(400)) {
            Admission::Rejected { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert_eq!(retry_after, Duration::from_millis(600));
            }
            Admission::Admitted => panic!("fourth call should be rejected"),
        }

        // Window elapsed: admitted again.
        assert!(limiter
            .admit_at("api.example.com", t0 + Duration::from_millis(1000))
            .is_admitted());
    }

    #[test]
    fn test_keys_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60));
        let now = Instant::now();

        assert!(limiter.admit_at("a", now).is_admitted());
        assert!(!limiter.admit_at("a", now).is_admitted());
        assert!(limiter.admit_at("b", now).is_admitted());
    }

    #[test]
    fn test_rejections_are_not_counted() {
        let limiter = limiter(2, Duration::from_secs(60));
        let now = Instant::now();

        limiter.admit_at("k", now);
        limiter.admit_at("k", now);
        for _ in 0..5 {
            assert!(!limiter.admit_at("k", now).is_admitted());
        }
        assert_eq!(limiter.current_count("k"), 2);
    }

    #[test]
    fn test_zero_budget_rejects() {
        let limiter = limiter(0, Duration::from_secs(1));
        assert!(!limiter.admit("k").is_admitted());
    }

    #[test]
    fn test_clear_and_purge() {
        let limiter = limiter(1, Duration::from_millis(100));
        let t0 = Instant::now();

        limiter.admit_at("a", t0);
        limiter.admit_at("b", t0);
        limiter.clear("a");
        assert!(limiter.admit_at("a", t0).is_admitted());

        assert_eq!(limiter.purge_expired(t0 + Duration::from_millis(50)), 0);
        assert_eq!(limiter.purge_expired(t0 + Duration::from_millis(150)), 2);
        assert_eq!(limiter.current_count("a"), 0);
    }

    #[test]
    fn test_stale_hosts_are_evicted_during_admission() {
        let limiter = limiter(3, Duration::from_secs(1));
        let t0 = Instant::now();

        for i in 0..5000 {
            assert!(limiter.admit_at(&format!("host:h{i}.example"), t0).is_admitted());
        }
        assert_eq!(limiter.tracked_keys(), 5000);

        let later = t0 + Duration::from_secs(3600);
        assert!(limiter.admit_at("host:fresh.example", later).is_admitted());
        assert_eq!(limiter.tracked_keys(), 1);
        assert_eq!(limiter.purge_expired(later), 0);
    }

    #[test]
    fn test_live_windows_survive_sweep() {
        let limiter = limiter(1, Duration::from_secs(1));
        let t0 = Instant::now();

        limiter.admit_at("old", t0);
        limiter.admit_at("recent", t0 + Duration::from_millis(900));
        // Sweep runs here: "old" expired, "recent" still counting.
        limiter.admit_at("other", t0 + Duration::from_millis(1100));

        assert_eq!(limiter.tracked_keys(), 2);
        assert!(!limiter
            .admit_at("recent", t0 + Duration::from_millis(1200))
            .is_admitted());
    }

    #[test]
    fn test_concurrent_admissions_never_exceed_budget() {
        let limiter = std::sync::Arc::new(limiter(50, Duration::from_secs(60)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..20).filter(|_| limiter.admit("shared").is_admitted()).count()
                })
            })
            .collect();

        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
