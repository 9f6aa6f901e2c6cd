//! Sliding-window admission control per user identity.
//!
//! A burst of R requests is fully re-admitted as soon as the oldest
//! timestamps age out of the window, rather than waiting for a fixed
//! window boundary. Rejection never records the attempt and never reaches
//! the backend.

use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tutorbot_core::turn::UserId;

/// Default admission threshold per window.
pub const DEFAULT_MAX_REQUESTS: usize = 10;
/// Default trailing window in seconds.
pub const DEFAULT_WINDOW_SECS: i64 = 60;

/// A per-user sliding-window rate limiter.
///
/// Pure and non-blocking; this component never fails. The caller injects
/// `now` so tests do not have to sleep.
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    windows: Mutex<HashMap<UserId, VecDeque<DateTime<Utc>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window_secs: i64) -> Self {
        Self {
            max_requests,
            window: Duration::seconds(window_secs),
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Decide whether a request at `now` is admitted.
    ///
    /// On admission, `now` is recorded into the user's window. On
    /// rejection the window is left unmodified apart from pruning.
    pub fn admit(&self, user: &UserId, now: DateTime<Utc>) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = now - self.window;

        // Users whose whole window has aged out no longer need an entry.
        windows.retain(|_, w| w.back().is_some_and(|&t| t > cutoff));

        let window = windows.entry(user.clone()).or_default();
        while window.front().is_some_and(|&t| t <= cutoff) {
            window.pop_front();
        }

        if window.len() >= self.max_requests {
            return false;
        }

        window.push_back(now);
        true
    }

    /// Number of users with a live window (for diagnostics).
    pub fn tracked_users(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Requests currently recorded for a user (after pruning at `now`).
    pub fn in_window(&self, user: &UserId, now: DateTime<Utc>) -> usize {
        let windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
        let cutoff = now - self.window;
        windows
            .get(user)
            .map(|w| w.iter().filter(|&&t| t > cutoff).count())
            .unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUESTS, DEFAULT_WINDOW_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::from("student-1")
    }

    #[test]
    fn admits_under_threshold() {
        let limiter = RateLimiter::new(10, 60);
        let now = Utc::now();
        for i in 0..10 {
            assert!(
                limiter.admit(&user(), now + Duration::seconds(i)),
                "request {i} should be admitted"
            );
        }
    }

    #[test]
    fn rejects_exactly_the_r_plus_first() {
        let limiter = RateLimiter::new(10, 60);
        let now = Utc::now();
        for _ in 0..10 {
            assert!(limiter.admit(&user(), now));
        }
        assert!(!limiter.admit(&user(), now));
        // Rejection did not record the attempt
        assert_eq!(limiter.in_window(&user(), now), 10);
    }

    #[test]
    fn readmits_once_oldest_ages_out() {
        let limiter = RateLimiter::new(3, 60);
        let start = Utc::now();
        assert!(limiter.admit(&user(), start));
        assert!(limiter.admit(&user(), start + Duration::seconds(10)));
        assert!(limiter.admit(&user(), start + Duration::seconds(20)));
        assert!(!limiter.admit(&user(), start + Duration::seconds(30)));

        // 61s after the first request, only it has aged out — sliding, not
        // a fixed bucket reset.
        let later = start + Duration::seconds(61);
        assert!(limiter.admit(&user(), later));
        assert!(!limiter.admit(&user(), later));
    }

    #[test]
    fn users_are_isolated() {
        let limiter = RateLimiter::new(1, 60);
        let now = Utc::now();
        assert!(limiter.admit(&user(), now));
        assert!(!limiter.admit(&user(), now));
        assert!(limiter.admit(&UserId::from("student-2"), now));
    }

    #[test]
    fn stale_windows_are_dropped() {
        let limiter = RateLimiter::new(3, 60);
        let start = Utc::now();
        assert!(limiter.admit(&user(), start));
        assert_eq!(limiter.tracked_users(), 1);

        // By the time another user shows up, the first window has fully
        // aged out and its entry goes with it.
        let other = UserId::from("student-2");
        assert!(limiter.admit(&other, start + Duration::seconds(120)));
        assert_eq!(limiter.tracked_users(), 1);
    }

    #[test]
    fn burst_fully_readmitted_after_gap() {
        let limiter = RateLimiter::new(5, 60);
        let start = Utc::now();
        for _ in 0..5 {
            assert!(limiter.admit(&user(), start));
        }
        let after_gap = start + Duration::seconds(120);
        for _ in 0..5 {
            assert!(limiter.admit(&user(), after_gap));
        }
    }
}
