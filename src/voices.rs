//! # Voice Directory
//!
//! Cached list of the voices offered by the speech provider.
//!
//! The whole list is stored as one JSON snapshot under a single key, so a
//! reader sees either no cache at all or a complete list fetched at one point
//! in time.
//!
//! ## Policies
//!
//! - **ReadThrough**: serve the cached snapshot; on miss fetch live and refill.
//! - **AlwaysRefresh**: fetch live every time and refill the cache afterwards.
//!
//! With either policy a failed live fetch serves the cached snapshot if one is
//! still present. Without a backing store the cache is bypassed entirely.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::SynthesisError;
use crate::store::{KeySpace, KeyValueStore};
use crate::synthesis::SpeechSynthesizer;

/// Voz disponible en el proveedor de síntesis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub preview_url: Option<String>,
}

impl Voice {
    pub fn new(voice_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            voice_id: voice_id.into(),
            name: name.into(),
            category: None,
            description: None,
            labels: BTreeMap::new(),
            preview_url: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// Política de lectura de la caché de voces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoiceCachePolicy {
    #[default]
    ReadThrough,
    AlwaysRefresh,
}

impl FromStr for VoiceCachePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read_through" | "read-through" => Ok(Self::ReadThrough),
            "refresh" | "always_refresh" => Ok(Self::AlwaysRefresh),
            other => anyhow::bail!("Unknown voice cache policy: {}", other),
        }
    }
}

/// Directorio de voces con caché TTL
pub struct VoiceDirectory {
    store: Option<Arc<dyn KeyValueStore>>,
    keys: KeySpace,
    synthesizer: Arc<SpeechSynthesizer>,
    policy: VoiceCachePolicy,
    ttl_secs: u64,
}

impl VoiceDirectory {
    pub fn new(
        store: Option<Arc<dyn KeyValueStore>>,
        keys: KeySpace,
        synthesizer: Arc<SpeechSynthesizer>,
        policy: VoiceCachePolicy,
        ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            keys,
            synthesizer,
            policy,
            ttl_secs,
        }
    }

    /// Obtiene la lista de voces según la política configurada
    pub async fn get_voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        if self.store.is_none() {
            return self.synthesizer.fetch_voices().await;
        }

        if self.policy == VoiceCachePolicy::ReadThrough {
            if let Some(cached) = self.cached().await {
                debug!("✅ Cache hit para lista de voces ({} voces)", cached.len());
                return Ok(cached);
            }
            debug!("❌ Cache miss para lista de voces");
        }

        match self.synthesizer.fetch_voices().await {
            Ok(voices) => {
                self.put_cache(&voices).await;
                Ok(voices)
            }
            Err(e) => match self.cached().await {
                Some(stale) => {
                    warn!("⚠️ Error obteniendo voces ({}), sirviendo caché", e);
                    Ok(stale)
                }
                None => Err(e),
            },
        }
    }

    /// Busca una voz por nombre, sin distinguir mayúsculas
    pub async fn find_voice(&self, name: &str) -> Result<Option<Voice>, SynthesisError> {
        let wanted = name.trim().to_lowercase();
        let voices = self.get_voices().await?;
        Ok(voices.into_iter().find(|voice| voice.name.to_lowercase() == wanted))
    }

    /// Descarta la lista cacheada
    pub async fn invalidate(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.delete(&self.keys.voices_cache()).await {
                warn!("Error invalidando caché de voces: {}", e);
            }
        }
    }

    async fn cached(&self) -> Option<Vec<Voice>> {
        let store = self.store.as_ref()?;
        match store.get(&self.keys.voices_cache()).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(voices) => Some(voices),
                Err(e) => {
                    warn!("Caché de voces corrupta: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Error leyendo caché de voces: {}", e);
                None
            }
        }
    }

    async fn put_cache(&self, voices: &[Voice]) {
        // Una lista vacía no se cachea
        if voices.is_empty() {
            return;
        }
        let Some(store) = &self.store else {
            return;
        };

        let result = match serde_json::to_string(voices) {
            Ok(data) => store
                .set_ex(&self.keys.voices_cache(), &data, self.ttl_secs)
                .await
                .map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(()) => info!("💾 {} voces almacenadas en caché ({}s)", voices.len(), self.ttl_secs),
            Err(e) => warn!("Error guardando caché de voces: {}", e),
        }
    }
}
