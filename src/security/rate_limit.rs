//! Fixed-window rate limiting for sensitive endpoints.
//!
//! Counters are keyed by `(client IP, path)`. A window opens on the first
//! request for a key and lasts `window`; once it has passed, the next
//! request starts a fresh window at count 1. Requests beyond
//! `max_requests` inside a window are limited and do not increment.
//!
//! Limitations that come with a fixed window held in process memory:
//! - a client can send `max_requests` just before expiry and again just
//!   after (boundary burst);
//! - counters reset on restart and are not shared between instances.
//!
//! [`CounterStore`] is the seam for a shared store; the external contract
//! (status, `Retry-After`, threshold semantics) does not change with it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::RateLimitConfig;
use crate::observability::metrics;
use crate::security::clock::{Clock, SystemClock};

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests counted in the current window (≥ 1).
    pub count: u32,
    /// End of the current window.
    pub reset_at: Instant,
}

/// Result of counting one request against a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitOutcome {
    pub entry: RateLimitEntry,
    pub limited: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum CounterStoreError {
    #[error("counter store unavailable: {0}")]
    Unavailable(String),

    #[error("window of {0:?} overflows the clock")]
    WindowOverflow(Duration),
}

/// Storage for fixed-window counters.
///
/// `hit` must update a key atomically with respect to concurrent hits on
/// the same key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn hit(
        &self,
        client_ip: &str,
        path: &str,
        now: Instant,
        window: Duration,
        max_requests: u32,
    ) -> Result<HitOutcome, CounterStoreError>;

    /// Remove entries whose window has passed. Returns how many were removed.
    fn sweep(&self, now: Instant) -> usize;

    fn len(&self) -> usize;
}

/// Process-local counter table.
///
/// Each hit goes through the map's entry API, so the read-modify-write of
/// one key runs under that key's shard lock and concurrent hits cannot
/// lose updates.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    entries: DashMap<(String, String), RateLimitEntry>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, client_ip: &str, path: &str) -> Option<RateLimitEntry> {
        self.entries
            .get(&(client_ip.to_string(), path.to_string()))
            .map(|e| *e.value())
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn hit(
        &self,
        client_ip: &str,
        path: &str,
        now: Instant,
        window: Duration,
        max_requests: u32,
    ) -> Result<HitOutcome, CounterStoreError> {
        let reset_at = now
            .checked_add(window)
            .ok_or(CounterStoreError::WindowOverflow(window))?;
        let fresh = RateLimitEntry { count: 1, reset_at };

        let key = (client_ip.to_string(), path.to_string());
        let mut slot = match self.entries.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                return Ok(HitOutcome { entry: fresh, limited: false });
            }
            Entry::Occupied(occupied) => occupied,
        };
        let entry = slot.get_mut();

        if now > entry.reset_at {
            *entry = fresh;
            return Ok(HitOutcome { entry: fresh, limited: false });
        }

        if entry.count >= max_requests {
            return Ok(HitOutcome {
                entry: *entry,
                limited: true,
            });
        }

        entry.count += 1;
        Ok(HitOutcome {
            entry: *entry,
            limited: false,
        })
    }

    fn sweep(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| now <= entry.reset_at);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Which requests are limited and how hard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub enabled: bool,
    pub window: Duration,
    pub max_requests: u32,
    pub sensitive_prefixes: Vec<String>,
}

impl RateLimitPolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
            sensitive_prefixes: config.sensitive_prefixes.clone(),
        }
    }

    /// Whether `path` is subject to limiting.
    pub fn applies_to(&self, path: &str) -> bool {
        self.enabled && self.sensitive_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { count: u32 },
    Limited { count: u32, retry_after: Duration },
}

impl RateLimitDecision {
    pub fn is_limited(&self) -> bool {
        matches!(self, Self::Limited { .. })
    }
}

/// The process-wide limiter. Construct once and share via `Arc`.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Limiter over an in-memory table and the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self::with_store(Arc::new(InMemoryCounterStore::new()), clock)
    }

    pub fn with_store(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Count one request from `client_ip` to `path`.
    pub async fn check(
        &self,
        client_ip: &str,
        path: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision, CounterStoreError> {
        let now = self.clock.now();
        let outcome = self
            .store
            .hit(client_ip, path, now, policy.window, policy.max_requests)
            .await?;

        if outcome.limited {
            Ok(RateLimitDecision::Limited {
                count: outcome.entry.count,
                retry_after: policy.window,
            })
        } else {
            Ok(RateLimitDecision::Allowed {
                count: outcome.entry.count,
            })
        }
    }

    /// Drop expired entries.
    pub fn sweep(&self) -> usize {
        let removed = self.store.sweep(self.clock.now());
        metrics::record_rate_limit_entries(self.store.len());
        removed
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.len() == 0
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

/// Sweep `limiter` every `interval` until shutdown.
pub fn spawn_sweeper(
    limiter: Arc<RateLimiter>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = limiter.sweep();
                    if removed > 0 {
                        tracing::debug!(removed, remaining = limiter.len(), "Swept expired rate limit entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate limit sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::clock::ManualClock;

    fn policy(max_requests: u32) -> RateLimitPolicy {
        RateLimitPolicy {
            max_requests,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_limits_after_threshold() {
        let limiter = RateLimiter::with_clock(Arc::new(ManualClock::new()));
        let policy = policy(3);

        for expected in 1..=3 {
            let d = limiter.check("1.2.3.4", "/login", &policy).await.unwrap();
            assert_eq!(d, RateLimitDecision::Allowed { count: expected });
        }

        let d = limiter.check("1.2.3.4", "/login", &policy).await.unwrap();
        assert_eq!(
            d,
            RateLimitDecision::Limited {
                count: 3,
                retry_after: Duration::from_secs(900)
            }
        );

        // Limited requests do not increment.
        let d = limiter.check("1.2.3.4", "/login", &policy).await.unwrap();
        assert_eq!(d, RateLimitDecision::Limited { count: 3, retry_after: Duration::from_secs(900) });
    }

    #[tokio::test]
    async fn test_overflowing_window_is_an_error() {
        let limiter = RateLimiter::with_clock(Arc::new(ManualClock::new()));
        let policy = RateLimitPolicy {
            window: Duration::MAX,
            ..policy(3)
        };

        let err = limiter.check("1.2.3.4", "/login", &policy).await.unwrap_err();
        assert!(matches!(err, CounterStoreError::WindowOverflow(_)));
        assert!(limiter.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = RateLimiter::with_clock(Arc::new(ManualClock::new()));
        let policy = policy(1);

        assert!(!limiter.check("1.2.3.4", "/login", &policy).await.unwrap().is_limited());
        assert!(limiter.check("1.2.3.4", "/login", &policy).await.unwrap().is_limited());
        assert!(!limiter.check("1.2.3.4", "/signup", &policy).await.unwrap().is_limited());
        assert!(!limiter.check("5.6.7.8", "/login", &policy).await.unwrap().is_limited());
    }

    #[tokio::test]
    async fn test_window_expiry_restarts_count() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(clock.clone());
        let policy = policy(2);

        limiter.check("1.2.3.4", "/login", &policy).await.unwrap();
        limiter.check("1.2.3.4", "/login", &policy).await.unwrap();
        assert!(limiter.check("1.2.3.4", "/login", &policy).await.unwrap().is_limited());

        // Exactly at reset_at the window is still open.
        clock.advance(Duration::from_secs(900));
        assert!(limiter.check("1.2.3.4", "/login", &policy).await.unwrap().is_limited());

        clock.advance(Duration::from_millis(1));
        let d = limiter.check("1.2.3.4", "/login", &policy).await.unwrap();
        assert_eq!(d, RateLimitDecision::Allowed { count: 1 });
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let clock = Arc::new(ManualClock::new());
        let limiter = RateLimiter::with_clock(clock.clone());
        let policy = policy(10);

        limiter.check("1.1.1.1", "/login", &policy).await.unwrap();
        clock.advance(Duration::from_secs(600));
        limiter.check("2.2.2.2", "/login", &policy).await.unwrap();
        assert_eq!(limiter.len(), 2);

        clock.advance(Duration::from_secs(301));
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_hits_are_not_lost() {
        let limiter = Arc::new(RateLimiter::with_clock(Arc::new(ManualClock::new())));
        let policy = Arc::new(policy(1000));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let limiter = limiter.clone();
            let policy = policy.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    limiter.check("1.2.3.4", "/api/auth/login", &policy).await.unwrap();
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let d = limiter.check("1.2.3.4", "/api/auth/login", &policy).await.unwrap();
        assert_eq!(d, RateLimitDecision::Allowed { count: 401 });
    }

    #[test]
    fn test_policy_applies_to_sensitive_prefixes() {
        let policy = RateLimitPolicy::default();
        assert!(policy.applies_to("/login"));
        assert!(policy.applies_to("/api/auth/callback"));
        assert!(policy.applies_to("/api/collaboration/rooms/3"));
        assert!(!policy.applies_to("/dashboard"));
        assert!(!policy.applies_to("/api/goals"));

        let disabled = RateLimitPolicy {
            enabled: false,
            ..Default::default()
        };
        assert!(!disabled.applies_to("/login"));
    }

    #[tokio::test]
    async fn test_sweeper_stops_on_shutdown() {
        let limiter = Arc::new(RateLimiter::new());
        let (tx, rx) = broadcast::channel(1);
        let handle = spawn_sweeper(limiter, Duration::from_secs(300), rx);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }
}
