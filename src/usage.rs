use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::store::{KeySpace, KeyValueStore};

/// Los contadores diarios se conservan 7 días
const DAILY_TTL_SECS: u64 = 86400 * 7;
/// Los contadores por usuario se conservan 30 días
const USER_TTL_SECS: u64 = 86400 * 30;

/// Contadores de uso para estadísticas
pub struct UsageCounter {
    store: Option<Arc<dyn KeyValueStore>>,
    keys: KeySpace,
    clock: Arc<dyn Clock>,
}

impl UsageCounter {
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, keys: KeySpace, clock: Arc<dyn Clock>) -> Self {
        Self { store, keys, clock }
    }

    /// Fecha UTC del reloj inyectado, `YYYY-MM-DD`
    fn today(&self) -> String {
        let now = i64::try_from(self.clock.now()).ok().and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        now.unwrap_or_else(Utc::now).format("%Y-%m-%d").to_string()
    }

    /// Incrementa el contador global, el diario y, si hay usuario, el del usuario
    pub async fn increment(&self, metric: &str, user_id: Option<u64>) {
        let Some(store) = &self.store else {
            return;
        };

        let today = self.today();
        let global_key = self.keys.key(&format!("stats:{}", metric));
        let daily_key = self.keys.key(&format!("stats:{}:{}", metric, today));

        let result = async {
            store.incr(&global_key).await?;

            store.incr(&daily_key).await?;
            store.expire(&daily_key, DAILY_TTL_SECS).await?;

            if let Some(user_id) = user_id {
                let user_key = self.keys.key(&format!("stats:user:{}:{}", user_id, metric));
                store.incr(&user_key).await?;
                store.expire(&user_key, USER_TTL_SECS).await?;
            }
            Ok::<(), crate::error::StoreError>(())
        }
        .await;

        match result {
            Ok(()) => debug!("📊 {} incrementado", metric),
            Err(e) => warn!("Error incrementando contador {}: {}", metric, e),
        }
    }

    /// Contadores globales por métrica
    pub async fn stats(&self) -> BTreeMap<String, i64> {
        let Some(store) = &self.store else {
            return BTreeMap::new();
        };

        let prefix = self.keys.stats_prefix();
        let keys = match store.keys(&format!("{}*", prefix)).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Error obteniendo estadísticas de uso: {}", e);
                return BTreeMap::new();
            }
        };

        let mut stats = BTreeMap::new();
        for key in keys {
            // Solo claves globales: nada después de la métrica
            let Some(metric) = key.strip_prefix(&prefix) else {
                continue;
            };
            if metric.contains(':') || metric.is_empty() {
                continue;
            }

            match store.get(&key).await {
                Ok(value) => {
                    let count = value.and_then(|v| v.parse().ok()).unwrap_or(0);
                    stats.insert(metric.to_string(), count);
                }
                Err(e) => warn!("Error leyendo contador {}: {}", key, e),
            }
        }

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use crate::store::{MemoryStore, MockKeyValueStore};
    use pretty_assertions::assert_eq;

    fn counter() -> (Arc<ManualClock>, Arc<dyn KeyValueStore>, UsageCounter) {
        // 2023-11-14 22:13:20 UTC
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new(clock.clone()));
        let usage = UsageCounter::new(Some(store.clone()), KeySpace::new("test"), clock.clone());
        (clock, store, usage)
    }

    #[tokio::test]
    async fn increments_global_daily_and_user_counters() {
        let (_, store, usage) = counter();
        usage.increment("tts_generation", Some(42)).await;
        usage.increment("tts_generation", Some(42)).await;
        usage.increment("characters_processed", None).await;

        assert_eq!(store.get("test:stats:tts_generation").await.unwrap(), Some("2".to_string()));
        assert_eq!(store.get("test:stats:tts_generation:2023-11-14").await.unwrap(), Some("2".to_string()));
        assert_eq!(store.get("test:stats:user:42:tts_generation").await.unwrap(), Some("2".to_string()));
        assert_eq!(store.keys("test:stats:user:*").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn daily_key_follows_the_injected_clock() {
        let (clock, store, usage) = counter();
        usage.increment("tts_generation", None).await;

        // Dos horas después ya es otro día en UTC
        clock.advance(7200);
        usage.increment("tts_generation", None).await;
        usage.increment("tts_generation", None).await;

        assert_eq!(store.get("test:stats:tts_generation:2023-11-14").await.unwrap(), Some("1".to_string()));
        assert_eq!(store.get("test:stats:tts_generation:2023-11-15").await.unwrap(), Some("2".to_string()));
        assert_eq!(store.get("test:stats:tts_generation").await.unwrap(), Some("3".to_string()));
    }

    #[tokio::test]
    async fn stats_only_report_global_counters() {
        let (_, _, usage) = counter();
        usage.increment("tts_generation", Some(42)).await;
        usage.increment("help_command", Some(7)).await;
        usage.increment("help_command", None).await;

        let stats = usage.stats().await;
        let expected: BTreeMap<String, i64> =
            [("help_command".to_string(), 2), ("tts_generation".to_string(), 1)].into_iter().collect();
        assert_eq!(stats, expected);
    }

    #[tokio::test]
    async fn degraded_mode_is_silent() {
        let usage = UsageCounter::new(None, KeySpace::new("test"), Arc::new(ManualClock::new(0)));
        usage.increment("tts_generation", Some(42)).await;
        assert!(usage.stats().await.is_empty());
    }

    #[tokio::test]
    async fn store_errors_are_swallowed() {
        let mut store = MockKeyValueStore::new();
        store.expect_incr().times(1).returning(|_| Err(StoreError::Closed));
        store.expect_keys().returning(|_| Err(StoreError::Closed));

        let usage = UsageCounter::new(Some(Arc::new(store)), KeySpace::new("test"), Arc::new(ManualClock::new(0)));
        usage.increment("errors", None).await;
        assert!(usage.stats().await.is_empty());
    }
}
