use async_trait::async_trait;
use dashmap::DashMap;
use regex::Regex;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, info};

use super::{KeyValueStore, WindowStatus};
use crate::clock::Clock;
use crate::error::{StoreError, StoreResult};

/// Longitud máxima de un patrón de `keys`
const MAX_PATTERN_LEN: usize = 1024;

#[derive(Debug, Clone)]
enum StoredValue {
    Text(String),
    Window(Vec<u64>),
}

/// Entrada con expiración absoluta opcional
#[derive(Debug, Clone)]
struct StoredEntry {
    value: StoredValue,
    expires_at: Option<u64>,
}

impl StoredEntry {
    fn new(value: StoredValue, ttl_secs: Option<u64>, now: u64) -> Self {
        Self {
            value,
            expires_at: ttl_secs.map(|ttl| now + ttl),
        }
    }

    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Store embebido con semántica de TTL y ventanas equivalente a Redis.
///
/// Cada clave vive en un shard de [`DashMap`]; la operación de ventana toma el
/// lock de la entrada, así que es atómica por usuario.
pub struct MemoryStore {
    data: Arc<DashMap<String, StoredEntry>>,
    clock: Arc<dyn Clock>,
    closed: AtomicBool,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        info!("🗄️ Store embebido inicializado (sin persistencia entre reinicios)");
        Self {
            data: Arc::new(DashMap::new()),
            clock,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Limpia entradas expiradas y retorna el número de elementos removidos
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.data.len();
        self.data.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.data.len());

        if removed > 0 {
            debug!("Limpiadas {} entradas expiradas del store", removed);
        }
        removed
    }

    fn glob_to_regex(pattern: &str) -> StoreResult<Regex> {
        if pattern.len() > MAX_PATTERN_LEN {
            return Err(StoreError::InvalidPattern(format!("{} bytes", pattern.len())));
        }
        let escaped = regex::escape(pattern).replace(r"\*", ".*");
        Regex::new(&format!("^{}$", escaped)).map_err(|e| StoreError::InvalidPattern(e.to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        self.ensure_open()
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.data.clear();
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.ensure_open()?;
        let now = self.clock.now();

        if let Some(entry) = self.data.get(key) {
            if entry.is_expired(now) {
                drop(entry);
                self.data.remove(key);
                return Ok(None);
            }
            return match &entry.value {
                StoredValue::Text(text) => Ok(Some(text.clone())),
                StoredValue::Window(_) => Err(StoreError::WrongType(key.to_string())),
            };
        }
        Ok(None)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.ensure_open()?;
        let entry = StoredEntry::new(StoredValue::Text(value.to_string()), Some(ttl_secs), self.clock.now());
        self.data.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.ensure_open()?;
        self.data.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.ensure_open()?;
        let now = self.clock.now();

        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| StoredEntry::new(StoredValue::Text("0".to_string()), None, now));
        if entry.is_expired(now) {
            *entry = StoredEntry::new(StoredValue::Text("0".to_string()), None, now);
        }

        // INCR conserva la expiración existente
        let next = match &entry.value {
            StoredValue::Text(text) => text
                .parse::<i64>()
                .map_err(|_| StoreError::WrongType(key.to_string()))?
                + 1,
            StoredValue::Window(_) => return Err(StoreError::WrongType(key.to_string())),
        };
        entry.value = StoredValue::Text(next.to_string());
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()> {
        self.ensure_open()?;
        let now = self.clock.now();
        if let Some(mut entry) = self.data.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = Some(now + ttl_secs);
            }
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.ensure_open()?;
        self.cleanup_expired();

        let matcher = Self::glob_to_regex(pattern)?;
        let mut keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| matcher.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn window_admit(
        &self,
        key: &str,
        now: u64,
        window_secs: u64,
        max_calls: u64,
    ) -> StoreResult<bool> {
        self.ensure_open()?;
        let clock_now = self.clock.now();

        // El RefMut retiene el lock del shard durante toda la operación
        let mut entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| StoredEntry::new(StoredValue::Window(Vec::new()), None, clock_now));
        if entry.is_expired(clock_now) {
            *entry = StoredEntry::new(StoredValue::Window(Vec::new()), None, clock_now);
        }

        let admitted = match &mut entry.value {
            StoredValue::Window(stamps) => {
                let cutoff = now.saturating_sub(window_secs);
                stamps.retain(|&t| t > cutoff);

                if (stamps.len() as u64) < max_calls {
                    stamps.push(now);
                    stamps.sort_unstable();
                    true
                } else {
                    false
                }
            }
            StoredValue::Text(_) => return Err(StoreError::WrongType(key.to_string())),
        };

        if admitted {
            entry.expires_at = Some(clock_now + window_secs);
        }
        Ok(admitted)
    }

    async fn window_status(&self, key: &str, now: u64, window_secs: u64) -> StoreResult<WindowStatus> {
        self.ensure_open()?;
        let Some(entry) = self.data.get(key) else {
            return Ok(WindowStatus::default());
        };
        if entry.is_expired(self.clock.now()) {
            return Ok(WindowStatus::default());
        }

        match &entry.value {
            StoredValue::Window(stamps) => {
                let cutoff = now.saturating_sub(window_secs);
                let in_window: Vec<u64> = stamps.iter().copied().filter(|&t| t > cutoff && t <= now).collect();
                Ok(WindowStatus {
                    calls: in_window.len() as u64,
                    oldest: in_window.first().copied(),
                })
            }
            StoredValue::Text(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }
}
