//! Fixed-window rate limiting
//!
//! - `FixedWindowLimiter`: counts hits per key inside a window that opens
//!   at the key's first hit and closes `window` later
//! - `LoginRateLimiter`: login attempts counted per client id and per
//!   account; either one over the limit blocks the attempt. An attempt is
//!   counted before its password is checked, so concurrent requests
//!   cannot slip past the limit
//!
//! Counters live in process memory. Several server processes each keep
//! their own counts.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy)]
struct Window {
    started: DateTime<Utc>,
    count: u32,
}

impl Window {
    fn is_expired(&self, now: DateTime<Utc>, length: Duration) -> bool {
        now >= self.started + length
    }

    /// Whole seconds until the window closes, at least 1
    fn retry_after(&self, now: DateTime<Utc>, length: Duration) -> u64 {
        let remaining = (self.started + length - now).num_milliseconds().max(0) as u64;
        remaining.div_ceil(1000).max(1)
    }
}

/// The live window for `key`, restarted if it has closed
fn open_window<'a>(
    windows: &'a mut HashMap<String, Window>,
    key: &str,
    now: DateTime<Utc>,
    length: Duration,
) -> &'a mut Window {
    let entry = windows.entry(key.to_string()).or_insert(Window {
        started: now,
        count: 0,
    });
    if entry.is_expired(now, length) {
        *entry = Window {
            started: now,
            count: 0,
        };
    }
    entry
}

/// Fixed-window counter keyed by string
#[derive(Debug)]
pub struct FixedWindowLimiter {
    max_hits: u32,
    window: Duration,
    windows: RwLock<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(max_hits: u32, window: std::time::Duration) -> Self {
        Self {
            max_hits,
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(60)),
            windows: RwLock::new(HashMap::new()),
        }
    }

    /// Check and count in one step; a rejected hit is not counted
    pub async fn hit(&self, key: &str) -> Result<(), u64> {
        self.hit_at(key, Utc::now()).await
    }

    pub async fn hit_at(&self, key: &str, now: DateTime<Utc>) -> Result<(), u64> {
        let mut windows = self.windows.write().await;
        let entry = open_window(&mut windows, key, now, self.window);
        if entry.count >= self.max_hits {
            return Err(entry.retry_after(now, self.window));
        }
        entry.count += 1;
        Ok(())
    }

    pub async fn reset(&self, key: &str) {
        self.windows.write().await.remove(key);
    }

    /// Drop closed windows; returns how many were removed
    pub async fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now()).await
    }

    pub async fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, w| !w.is_expired(now, self.window));
        before - windows.len()
    }

    pub async fn len(&self) -> usize {
        self.windows.read().await.len()
    }
}

/// Login throttling by client id and account
#[derive(Debug)]
pub struct LoginRateLimiter {
    by_client: FixedWindowLimiter,
    by_account: FixedWindowLimiter,
}

impl LoginRateLimiter {
    pub fn new(max_attempts: u32, window: std::time::Duration) -> Self {
        Self {
            by_client: FixedWindowLimiter::new(max_attempts, window),
            by_account: FixedWindowLimiter::new(max_attempts, window),
        }
    }

    fn account_key(account: &str) -> String {
        account.trim().to_lowercase()
    }

    /// Count one attempt for `client` and `account`, or
    /// `Err(retry_after_secs)` if either has used up its window. A
    /// rejected attempt is not counted.
    ///
    /// Both windows are checked and bumped under their write locks, taken
    /// client first.
    pub async fn try_acquire(&self, client: &str, account: &str) -> Result<(), u64> {
        self.try_acquire_at(client, account, Utc::now()).await
    }

    pub async fn try_acquire_at(&self, client: &str, account: &str, now: DateTime<Utc>) -> Result<(), u64> {
        let account = Self::account_key(account);
        let mut clients = self.by_client.windows.write().await;
        let mut accounts = self.by_account.windows.write().await;

        let client_window = open_window(&mut clients, client, now, self.by_client.window);
        let account_window = open_window(&mut accounts, &account, now, self.by_account.window);

        let client_full = client_window.count >= self.by_client.max_hits;
        let account_full = account_window.count >= self.by_account.max_hits;
        match (client_full, account_full) {
            (false, false) => {
                client_window.count += 1;
                account_window.count += 1;
                Ok(())
            }
            (true, true) => Err(client_window
                .retry_after(now, self.by_client.window)
                .max(account_window.retry_after(now, self.by_account.window))),
            (true, false) => Err(client_window.retry_after(now, self.by_client.window)),
            (false, true) => Err(account_window.retry_after(now, self.by_account.window)),
        }
    }

    /// Clear both counters after a successful login
    pub async fn reset(&self, client: &str, account: &str) {
        self.by_client.reset(client).await;
        self.by_account.reset(&Self::account_key(account)).await;
    }

    pub async fn cleanup(&self) -> usize {
        self.by_client.cleanup().await + self.by_account.cleanup().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn limiter(max: u32, secs: u64) -> LoginRateLimiter {
        LoginRateLimiter::new(max, StdDuration::from_secs(secs))
    }

    #[tokio::test]
    async fn test_blocks_after_max_attempts() {
        let limiter = limiter(3, 60);
        let now = Utc::now();

        for _ in 0..3 {
            assert!(limiter.try_acquire_at("10.0.0.1", "admin", now).await.is_ok());
        }
        let retry = limiter.try_acquire_at("10.0.0.1", "admin", now).await.unwrap_err();
        assert_eq!(retry, 60);
    }

    #[tokio::test]
    async fn test_account_limit_applies_across_clients() {
        let limiter = limiter(2, 60);
        let now = Utc::now();
        limiter.try_acquire_at("10.0.0.1", "Admin", now).await.unwrap();
        limiter.try_acquire_at("10.0.0.2", "admin ", now).await.unwrap();

        assert!(limiter.try_acquire_at("10.0.0.3", "ADMIN", now).await.is_err());
        assert!(limiter.try_acquire_at("10.0.0.3", "someone", now).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_attempt_is_not_counted() {
        let limiter = limiter(2, 60);
        let now = Utc::now();
        limiter.try_acquire_at("10.0.0.1", "admin", now).await.unwrap();
        limiter.try_acquire_at("10.0.0.2", "admin", now).await.unwrap();

        // the account is full, so this client must not be charged
        assert!(limiter.try_acquire_at("10.0.0.3", "admin", now).await.is_err());
        assert!(limiter.try_acquire_at("10.0.0.3", "editor", now).await.is_ok());
        assert!(limiter.try_acquire_at("10.0.0.3", "author", now).await.is_ok());
        assert!(limiter.try_acquire_at("10.0.0.3", "guest", now).await.is_err());
    }

    #[tokio::test]
    async fn test_window_is_aligned_to_first_attempt() {
        let limiter = limiter(2, 60);
        let start = Utc::now();
        limiter.try_acquire_at("c", "u", start).await.unwrap();
        limiter
            .try_acquire_at("c", "u", start + Duration::seconds(50))
            .await
            .unwrap();

        let retry = limiter
            .try_acquire_at("c", "u", start + Duration::seconds(50))
            .await
            .unwrap_err();
        assert_eq!(retry, 10);
        assert!(limiter
            .try_acquire_at("c", "u", start + Duration::seconds(60))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_reset_on_success() {
        let limiter = limiter(1, 60);
        limiter.try_acquire("c", "u").await.unwrap();
        assert!(limiter.try_acquire("c", "u").await.is_err());

        limiter.reset("c", "u").await;
        assert!(limiter.try_acquire("c", "u").await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_attempts_respect_limit() {
        let limiter = Arc::new(limiter(3, 900));

        let handles: Vec<_> = (0..30)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.try_acquire("10.0.0.9", "admin").await.is_ok() })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 3);
    }

    #[tokio::test]
    async fn test_cleanup_removes_closed_windows() {
        let windows = FixedWindowLimiter::new(5, StdDuration::from_secs(60));
        let start = Utc::now();
        windows.hit_at("old", start - Duration::seconds(120)).await.unwrap();
        windows.hit_at("fresh", start).await.unwrap();

        assert_eq!(windows.cleanup_at(start).await, 1);
        assert_eq!(windows.len().await, 1);
    }

    #[tokio::test]
    async fn test_expired_window_restarts_count() {
        let windows = FixedWindowLimiter::new(2, StdDuration::from_secs(60));
        let start = Utc::now();
        windows.hit_at("c", start).await.unwrap();
        windows.hit_at("c", start).await.unwrap();
        assert!(windows.hit_at("c", start).await.is_err());

        let later = start + Duration::seconds(61);
        assert!(windows.hit_at("c", later).await.is_ok());
    }

    #[tokio::test]
    async fn test_hit_counts_only_accepted_requests() {
        let windows = FixedWindowLimiter::new(2, StdDuration::from_secs(3600));
        let now = Utc::now();
        assert!(windows.hit_at("ip", now).await.is_ok());
        assert!(windows.hit_at("ip", now).await.is_ok());
        assert_eq!(windows.hit_at("ip", now).await, Err(3600));
        assert!(windows.hit_at("other", now).await.is_ok());
    }

    proptest! {
        #[test]
        fn never_blocks_below_threshold(max in 1u32..20, attempts in 0u32..40) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let limiter = limiter(max, 300);
                let now = Utc::now();
                let mut accepted = 0u32;
                for _ in 0..attempts {
                    if limiter.try_acquire_at("client", "user", now).await.is_ok() {
                        accepted += 1;
                    }
                }
                prop_assert_eq!(accepted, attempts.min(max));
                Ok(())
            })?;
        }

        #[test]
        fn retry_after_stays_within_window(window in 1u64..3600, elapsed in 0i64..3600) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let limiter = limiter(1, window);
                let start = Utc::now();
                limiter.try_acquire_at("c", "u", start).await.unwrap();
                let at = start + Duration::seconds(elapsed);
                match limiter.try_acquire_at("c", "u", at).await {
                    Ok(()) => prop_assert!(elapsed as u64 >= window),
                    Err(retry) => {
                        prop_assert!(retry >= 1 && retry <= window);
                        prop_assert!((elapsed as u64) < window);
                    }
                }
                Ok(())
            })?;
        }
    }
}
