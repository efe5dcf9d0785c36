use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::store::{KeySpace, KeyValueStore};

/// Nombre mostrado cuando el usuario no eligió voz
pub const DEFAULT_VOICE_NAME: &str = "George (Default)";

/// Preferencias de un usuario, almacenadas en JSON
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    pub voice_id: String,
    pub voice_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_category: Option<String>,
}

/// Almacén de preferencias por usuario.
///
/// Con backing store las preferencias se guardan con TTL. Sin él, o cuando una
/// escritura falla, se guardan en memoria del proceso y nunca expiran.
pub struct SettingsStore {
    store: Option<Arc<dyn KeyValueStore>>,
    keys: KeySpace,
    fallback: DashMap<u64, UserSettings>,
}

impl SettingsStore {
    pub fn new(store: Option<Arc<dyn KeyValueStore>>, keys: KeySpace) -> Self {
        Self {
            store,
            keys,
            fallback: DashMap::new(),
        }
    }

    /// Obtiene las preferencias de un usuario. Nunca falla.
    pub async fn get(&self, user_id: u64) -> Option<UserSettings> {
        if let Some(store) = &self.store {
            let key = self.keys.user_settings(user_id);
            match store.get(&key).await {
                Ok(Some(data)) => match serde_json::from_str::<UserSettings>(&data) {
                    Ok(settings) => return Some(settings),
                    Err(e) => warn!("Preferencias corruptas para usuario {}: {}", user_id, e),
                },
                Ok(None) => {}
                Err(e) => warn!("Error leyendo preferencias de usuario {}: {}", user_id, e),
            }
        }

        self.fallback.get(&user_id).map(|entry| entry.value().clone())
    }

    /// Guarda las preferencias de un usuario con TTL
    pub async fn set(&self, user_id: u64, settings: UserSettings, ttl_secs: u64) {
        if let Some(store) = &self.store {
            let key = self.keys.user_settings(user_id);
            let saved = match serde_json::to_string(&settings) {
                Ok(data) => store.set_ex(&key, &data, ttl_secs).await.map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            };

            match saved {
                Ok(()) => {
                    // Una copia vieja en memoria ocultaría la expiración
                    self.fallback.remove(&user_id);
                    debug!("💾 Preferencias guardadas para usuario {}", user_id);
                    return;
                }
                Err(e) => {
                    warn!("Error guardando preferencias de usuario {}, usando memoria: {}", user_id, e);
                }
            }
        }

        self.fallback.insert(user_id, settings);
    }

    /// Elimina las preferencias de un usuario
    pub async fn delete(&self, user_id: u64) {
        if let Some(store) = &self.store {
            let key = self.keys.user_settings(user_id);
            if let Err(e) = store.delete(&key).await {
                warn!("Error eliminando preferencias de usuario {}: {}", user_id, e);
            }
        }
        self.fallback.remove(&user_id);
    }
}
