//! # Application Context
//!
//! Explicit owner of everything the request handler needs: configuration, the
//! optional backing store and the components built on top of it.
//!
//! The storage mode is decided once in [`AppContext::start`] and never changes
//! afterwards. A store that cannot be reached at startup puts the whole process
//! in degraded mode until the next restart.

use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, MEMORY_STORE_URL};
use crate::error::SynthesisError;
use crate::rate_limit::{RateLimitStatus, RateLimiter};
use crate::settings::{SettingsStore, UserSettings, DEFAULT_VOICE_NAME};
use crate::store::{KeySpace, KeyValueStore, MemoryStore, RedisStore};
use crate::synthesis::{ElevenLabsApi, SpeechApi, SpeechSynthesizer};
use crate::usage::UsageCounter;
use crate::voices::{Voice, VoiceDirectory};

/// Intervalo de limpieza del store embebido
const MEMORY_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

/// Modo de almacenamiento del proceso
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Hay backing store (Redis o embebido)
    Persistent,
    /// Modo degradado: todo en memoria del proceso
    InMemory,
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageMode::Persistent => write!(f, "persistent"),
            StorageMode::InMemory => write!(f, "in-memory"),
        }
    }
}

pub struct AppContext {
    config: Config,
    store: Option<Arc<dyn KeyValueStore>>,
    settings: SettingsStore,
    rate_limiter: RateLimiter,
    usage: UsageCounter,
    voices: VoiceDirectory,
    synthesizer: Arc<SpeechSynthesizer>,
    closed: AtomicBool,
}

impl AppContext {
    /// Conecta el store configurado y construye todos los componentes
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Self::connect_store(&config, clock.clone()).await;

        let api = ElevenLabsApi::new(
            config.elevenlabs_api_key.clone(),
            &config.elevenlabs_base_url,
            config.request_timeout(),
        )?;

        let context = Self::from_parts(config, store, Arc::new(api), clock);
        info!("🗄️ Modo de almacenamiento: {}", context.storage_mode());
        info!("🗣️ Modelo de síntesis: {}", context.synthesizer.model_id());
        Ok(context)
    }

    /// Ensambla el contexto con piezas ya construidas
    pub fn from_parts(
        config: Config,
        store: Option<Arc<dyn KeyValueStore>>,
        api: Arc<dyn SpeechApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let keys = KeySpace::new(config.redis_key_prefix.clone());
        let synthesizer = Arc::new(SpeechSynthesizer::new(api, config.default_model.clone(), config.retry_config()));

        Self {
            settings: SettingsStore::new(store.clone(), keys.clone()),
            rate_limiter: RateLimiter::new(
                store.clone(),
                keys.clone(),
                clock.clone(),
                config.rate_limit_calls,
                config.rate_limit_window_secs,
            ),
            usage: UsageCounter::new(store.clone(), keys.clone(), clock),
            voices: VoiceDirectory::new(
                store.clone(),
                keys,
                synthesizer.clone(),
                config.voice_cache_policy,
                config.voice_cache_ttl_secs,
            ),
            synthesizer,
            store,
            config,
            closed: AtomicBool::new(false),
        }
    }

    async fn connect_store(config: &Config, clock: Arc<dyn Clock>) -> Option<Arc<dyn KeyValueStore>> {
        let Some(url) = config.redis_url.as_deref() else {
            info!("ℹ️ REDIS_URL no configurado, usando almacenamiento en memoria");
            return None;
        };

        if url == MEMORY_STORE_URL {
            let store = Arc::new(MemoryStore::new(clock));
            Self::spawn_memory_cleanup(&store);
            return Some(store);
        }

        match RedisStore::connect(url).await {
            Ok(store) => {
                info!("✅ Conectado a Redis");
                Some(Arc::new(store))
            }
            Err(e) => {
                warn!("⚠️ No se pudo conectar a Redis, usando almacenamiento en memoria: {}", e);
                None
            }
        }
    }

    /// Limpieza periódica de claves expiradas del store embebido
    fn spawn_memory_cleanup(store: &Arc<MemoryStore>) {
        let store = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(MEMORY_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                match store.upgrade() {
                    Some(store) => {
                        store.cleanup_expired();
                    }
                    None => break,
                }
            }
        });
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn storage_mode(&self) -> StorageMode {
        if self.store.is_some() {
            StorageMode::Persistent
        } else {
            StorageMode::InMemory
        }
    }

    /// Nombre del backend activo
    pub fn backend_name(&self) -> &'static str {
        self.store.as_ref().map_or("in-process", |store| store.backend_name())
    }

    /// `true` si el store responde; en modo degradado siempre `false`
    pub async fn health_check(&self) -> bool {
        let Some(store) = &self.store else {
            return false;
        };

        match store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("❌ Health check del store falló: {}", e);
                false
            }
        }
    }

    /// Cierra la conexión con el store. Solo la primera llamada tiene efecto.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(store) = &self.store {
            store.close().await;
            info!("🔌 Conexión con el store cerrada");
        }
    }

    pub async fn admit(&self, user_id: u64) -> bool {
        self.rate_limiter.admit(user_id).await
    }

    pub async fn rate_limit_status(&self, user_id: u64) -> RateLimitStatus {
        self.rate_limiter.status(user_id).await
    }

    pub fn rate_limit(&self) -> (u64, u64) {
        (self.rate_limiter.max_calls(), self.rate_limiter.window_secs())
    }

    pub async fn get_settings(&self, user_id: u64) -> Option<UserSettings> {
        self.settings.get(user_id).await
    }

    /// Guarda las preferencias con el TTL configurado
    pub async fn set_settings(&self, user_id: u64, settings: UserSettings) {
        self.settings.set(user_id, settings, self.config.settings_ttl_secs).await
    }

    pub async fn reset_settings(&self, user_id: u64) {
        self.settings.delete(user_id).await
    }

    /// Voz del usuario como `(voice_id, voice_name)`, o la voz por defecto
    pub async fn voice_for(&self, user_id: u64) -> (String, String) {
        match self.settings.get(user_id).await {
            Some(settings) => (settings.voice_id, settings.voice_name),
            None => (self.config.default_voice_id.clone(), DEFAULT_VOICE_NAME.to_string()),
        }
    }

    pub async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError> {
        self.synthesizer.synthesize(text, voice_id).await
    }

    /// Voces a través de la caché
    pub async fn voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        self.voices.get_voices().await
    }

    pub async fn find_voice(&self, name: &str) -> Result<Option<Voice>, SynthesisError> {
        self.voices.find_voice(name).await
    }

    /// Voces en vivo, sin caché; un fallo devuelve lista vacía
    pub async fn list_voices(&self) -> Vec<Voice> {
        self.synthesizer.list_voices().await
    }

    pub async fn increment_counter(&self, metric: &str, user_id: Option<u64>) {
        self.usage.increment(metric, user_id).await
    }

    pub async fn usage_stats(&self) -> BTreeMap<String, i64> {
        self.usage.stats().await
    }
}
