//! Sliding-window rate limiting per user.
//!
//! The window is kept in the backing store as a set of admission timestamps.
//! Admission is decided and recorded in one atomic step per user, so concurrent
//! messages from the same user can never exceed `max_calls` inside any trailing
//! window. Store failures fail open: availability wins over strict quotas.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::store::{KeySpace, KeyValueStore};

/// Estado visible para el usuario
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Peticiones dentro de la ventana actual
    pub calls: u64,
    /// Segundos hasta que la petición más antigua salga de la ventana
    pub remaining_secs: u64,
}

/// Rate limiter de ventana deslizante
pub struct RateLimiter {
    store: Option<Arc<dyn KeyValueStore>>,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
    max_calls: u64,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(
        store: Option<Arc<dyn KeyValueStore>>,
        keys: KeySpace,
        clock: Arc<dyn Clock>,
        max_calls: u64,
        window_secs: u64,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            max_calls,
            window_secs,
        }
    }

    pub fn max_calls(&self) -> u64 {
        self.max_calls
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    /// Decide si se admite una nueva acción del usuario y la registra
    pub async fn admit(&self, user_id: u64) -> bool {
        // Sin store: todo se admite
        let Some(store) = &self.store else {
            return true;
        };

        let key = self.keys.rate_limit(user_id);
        let now = self.clock.now();

        match store.window_admit(&key, now, self.window_secs, self.max_calls).await {
            Ok(admitted) => {
                if !admitted {
                    debug!("⏰ Usuario {} alcanzó el límite de {} peticiones", user_id, self.max_calls);
                }
                admitted
            }
            Err(e) => {
                warn!("Error comprobando rate limit para usuario {}, se permite: {}", user_id, e);
                true
            }
        }
    }

    /// Consulta el estado de la ventana sin modificarla
    pub async fn status(&self, user_id: u64) -> RateLimitStatus {
        let Some(store) = &self.store else {
            return RateLimitStatus::default();
        };

        let key = self.keys.rate_limit(user_id);
        let now = self.clock.now();

        match store.window_status(&key, now, self.window_secs).await {
            Ok(window) => {
                let remaining_secs = window
                    .oldest
                    .map(|oldest| self.window_secs.saturating_sub(now.saturating_sub(oldest)))
                    .unwrap_or(0);
                RateLimitStatus {
                    calls: window.calls,
                    remaining_secs,
                }
            }
            Err(e) => {
                warn!("Error obteniendo estado de rate limit para usuario {}: {}", user_id, e);
                RateLimitStatus::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use crate::store::{MemoryStore, MockKeyValueStore};
    use pretty_assertions::assert_eq;

    fn limiter(max_calls: u64, window_secs: u64) -> (Arc<ManualClock>, RateLimiter) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(clock.clone()));
        let limiter = RateLimiter::new(Some(store), KeySpace::new("test"), clock.clone(), max_calls, window_secs);
        (clock, limiter)
    }

    #[tokio::test]
    async fn eleventh_call_is_denied_until_window_passes() {
        let (clock, limiter) = limiter(10, 60);

        for _ in 0..10 {
            assert!(limiter.admit(42).await);
        }
        assert!(!limiter.admit(42).await);

        clock.advance(61);
        assert!(limiter.admit(42).await);
        assert_eq!(limiter.status(42).await.calls, 1);
    }

    #[tokio::test]
    async fn users_do_not_share_windows() {
        let (_, limiter) = limiter(1, 60);
        assert!(limiter.admit(1).await);
        assert!(!limiter.admit(1).await);
        assert!(limiter.admit(2).await);
    }

    #[tokio::test]
    async fn status_counts_and_counts_down() {
        let (clock, limiter) = limiter(10, 60);
        for _ in 0..3 {
            limiter.admit(42).await;
            clock.advance(5);
        }

        // Más antigua en t0, ahora t0 + 15
        let status = limiter.status(42).await;
        assert_eq!(status, RateLimitStatus { calls: 3, remaining_secs: 45 });

        let mut previous = status.remaining_secs;
        for _ in 0..8 {
            clock.advance(5);
            let current = limiter.status(42).await.remaining_secs;
            assert!(current <= previous);
            previous = current;
        }

        // t0 + 55: la más antigua sigue dentro
        assert_eq!(limiter.status(42).await, RateLimitStatus { calls: 3, remaining_secs: 5 });

        clock.advance(5);
        assert_eq!(limiter.status(42).await, RateLimitStatus { calls: 2, remaining_secs: 5 });
    }

    #[tokio::test]
    async fn admitted_calls_never_exceed_limit_in_any_window() {
        let (clock, limiter) = limiter(5, 10);
        let mut admitted_at = Vec::new();

        // Una petición por segundo durante 40 segundos, dos en los segundos pares
        for second in 0..40u64 {
            let per_second = if second % 2 == 0 { 2 } else { 1 };
            for _ in 0..per_second {
                if limiter.admit(9).await {
                    admitted_at.push(clock.now());
                }
            }
            clock.advance(1);
        }

        for &end in &admitted_at {
            let in_window = admitted_at.iter().filter(|&&t| t > end - 10 && t <= end).count();
            assert!(in_window <= 5, "{} admitted in window ending at {}", in_window, end);
        }
    }

    #[tokio::test]
    async fn concurrent_admissions_respect_limit() {
        let (_, limiter) = limiter(5, 60);
        let limiter = Arc::new(limiter);

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.admit(42).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }

    #[tokio::test]
    async fn degraded_mode_admits_everything() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::new(None, KeySpace::new("test"), clock, 1, 60);

        for _ in 0..100 {
            assert!(limiter.admit(42).await);
        }
        assert_eq!(limiter.status(42).await, RateLimitStatus::default());
    }

    #[tokio::test]
    async fn store_failure_fails_open() {
        let mut store = MockKeyValueStore::new();
        store.expect_window_admit().returning(|_, _, _, _| Err(StoreError::Closed));
        store.expect_window_status().returning(|_, _, _| Err(StoreError::Closed));

        let clock = Arc::new(ManualClock::new(0));
        let limiter = RateLimiter::new(Some(Arc::new(store)), KeySpace::new("test"), clock, 1, 60);

        assert!(limiter.admit(42).await);
        assert_eq!(limiter.status(42).await, RateLimitStatus::default());
    }
}
