//! # Store Module
//!
//! Optional key-value backing store shared by the settings store, the rate
//! limiter, the voice directory cache and the usage counters.
//!
//! Two backends implement [`KeyValueStore`]:
//!
//! - **Redis** ([`RedisStore`]): durable and shared between restarts.
//! - **Embedded** ([`MemoryStore`]): same TTL and window semantics, kept in
//!   process memory. Selected with `REDIS_URL=memory://`.
//!
//! When no store is configured, or the connection fails at startup, the
//! application runs in degraded mode and never touches this module again.
//!
//! ## Key Patterns
//!
//! ```text
//! {prefix}:user:{user_id}                 → UserSettings JSON (TTL)
//! {prefix}:rate_limit:{user_id}           → Sorted set of admission timestamps
//! {prefix}:voices_cache                   → Voice list JSON (TTL)
//! {prefix}:stats:{metric}                 → Global counter
//! {prefix}:stats:{metric}:{YYYY-MM-DD}    → Daily counter (7 days)
//! {prefix}:stats:user:{user_id}:{metric}  → Per-user counter (30 days)
//! ```

pub mod memory;
pub mod redis_store;

use async_trait::async_trait;

use crate::error::StoreResult;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

/// Estado de la ventana deslizante de un usuario
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStatus {
    /// Acciones registradas dentro de la ventana
    pub calls: u64,
    /// Timestamp más antiguo dentro de la ventana
    pub oldest: Option<u64>,
}

/// Operaciones que el núcleo necesita del backing store.
///
/// Una entrada cuenta dentro de la ventana si `now - window < t <= now`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Nombre del backend, para logs
    fn backend_name(&self) -> &'static str;

    /// Verifica la conexión
    async fn ping(&self) -> StoreResult<()>;

    /// Cierra la conexión; las operaciones posteriores fallan
    async fn close(&self);

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Guarda un valor con expiración en segundos
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Incrementa un contador, creándolo en 0 si no existe
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    async fn expire(&self, key: &str, ttl_secs: u64) -> StoreResult<()>;

    /// Claves que coinciden con un patrón glob (`*`)
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Purga entradas viejas, cuenta y registra `now` si hay cupo.
    ///
    /// Atómico por clave. Al admitir, la clave expira `window_secs` después.
    async fn window_admit(
        &self,
        key: &str,
        now: u64,
        window_secs: u64,
        max_calls: u64,
    ) -> StoreResult<bool>;

    /// Cuenta y entrada más antigua de la ventana, sin modificarla
    async fn window_status(&self, key: &str, now: u64, window_secs: u64) -> StoreResult<WindowStatus>;
}

/// Construye claves con el prefijo de la instancia
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }

    pub fn user_settings(&self, user_id: u64) -> String {
        self.key(&format!("user:{}", user_id))
    }

    pub fn rate_limit(&self, user_id: u64) -> String {
        self.key(&format!("rate_limit:{}", user_id))
    }

    pub fn voices_cache(&self) -> String {
        self.key("voices_cache")
    }

    pub fn stats_prefix(&self) -> String {
        self.key("stats:")
    }
}
