use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::synthesis::RetryConfig;
use crate::voices::VoiceCachePolicy;

/// Esquema del backend embebido
pub const MEMORY_STORE_URL: &str = "memory://";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // ElevenLabs
    pub elevenlabs_api_key: String,
    pub elevenlabs_base_url: String,
    pub default_voice_id: String,
    pub default_model: String,

    // Persistencia
    pub redis_url: Option<String>,
    pub redis_key_prefix: String,
    pub settings_ttl_secs: u64,
    pub voice_cache_ttl_secs: u64,
    pub voice_cache_policy: VoiceCachePolicy,

    // Límites
    pub max_message_length: usize,
    pub rate_limit_calls: u64,
    pub rate_limit_window_secs: u64, // En segundos

    // Reintentos
    pub tts_max_retries: u32,
    pub tts_retry_delay_ms: u64,
    pub tts_timeout_secs: u64,

    // Entorno
    pub log_level: String,
    pub environment: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración a partir de una función de búsqueda de variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Variables vacías cuentan como ausentes
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{} is required", key));

        Ok(Self {
            // Discord
            discord_token: required("DISCORD_TOKEN")?,
            guild_id: var("GUILD_ID").and_then(|s| s.parse().ok()),

            // ElevenLabs
            elevenlabs_api_key: required("ELEVENLABS_API_KEY")?,
            elevenlabs_base_url: var("ELEVENLABS_BASE_URL").unwrap_or(defaults.elevenlabs_base_url),
            default_voice_id: var("DEFAULT_VOICE").unwrap_or(defaults.default_voice_id),
            default_model: var("DEFAULT_MODEL").unwrap_or(defaults.default_model),

            // Persistencia
            redis_url: var("REDIS_URL"),
            redis_key_prefix: var("REDIS_KEY_PREFIX").unwrap_or(defaults.redis_key_prefix),
            settings_ttl_secs: parse_or(var("REDIS_USER_SETTINGS_TTL"), defaults.settings_ttl_secs, "REDIS_USER_SETTINGS_TTL")?,
            voice_cache_ttl_secs: parse_or(var("VOICE_CACHE_TTL"), defaults.voice_cache_ttl_secs, "VOICE_CACHE_TTL")?,
            voice_cache_policy: match var("VOICE_CACHE_POLICY") {
                Some(value) => value.parse()?,
                None => defaults.voice_cache_policy,
            },

            // Límites
            max_message_length: parse_or(var("MAX_MESSAGE_LENGTH"), defaults.max_message_length, "MAX_MESSAGE_LENGTH")?,
            rate_limit_calls: parse_or(var("RATE_LIMIT_CALLS"), defaults.rate_limit_calls, "RATE_LIMIT_CALLS")?,
            rate_limit_window_secs: parse_or(var("RATE_LIMIT_WINDOW"), defaults.rate_limit_window_secs, "RATE_LIMIT_WINDOW")?,

            // Reintentos
            tts_max_retries: parse_or(var("TTS_MAX_RETRIES"), defaults.tts_max_retries, "TTS_MAX_RETRIES")?,
            tts_retry_delay_ms: parse_or(var("TTS_RETRY_DELAY_MS"), defaults.tts_retry_delay_ms, "TTS_RETRY_DELAY_MS")?,
            tts_timeout_secs: parse_or(var("TTS_TIMEOUT_SECS"), defaults.tts_timeout_secs, "TTS_TIMEOUT_SECS")?,

            // Entorno
            log_level: var("LOG_LEVEL").map(|s| s.to_lowercase()).unwrap_or(defaults.log_level),
            environment: var("ENVIRONMENT").map(|s| s.to_lowercase()).unwrap_or(defaults.environment),
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Tokens must be present
    /// - The provider base URL must be an absolute http(s) URL
    /// - `REDIS_URL` must be `memory://` or a `redis://` / `rediss://` URL
    /// - Limits, TTLs and retry counts must be greater than 0
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use open_voice::config::Config;
    /// # fn main() -> anyhow::Result<()> {
    /// let config = Config::load()?;
    /// config.validate()?;  // Ensure config is valid
    /// # Ok(())
    /// # }
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN is required");
        }

        if self.elevenlabs_api_key.trim().is_empty() {
            anyhow::bail!("ELEVENLABS_API_KEY is required");
        }

        let base_url = url::Url::parse(&self.elevenlabs_base_url)
            .with_context(|| format!("Invalid ELEVENLABS_BASE_URL: {}", self.elevenlabs_base_url))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            anyhow::bail!("ELEVENLABS_BASE_URL must use http or https, got: {}", base_url.scheme());
        }

        if let Some(redis_url) = &self.redis_url {
            if redis_url != MEMORY_STORE_URL {
                let parsed = url::Url::parse(redis_url).context("Invalid REDIS_URL")?;
                if !matches!(parsed.scheme(), "redis" | "rediss" | "redis+unix" | "unix") {
                    anyhow::bail!("REDIS_URL must use redis:// or rediss://, got: {}", parsed.scheme());
                }
            }
        }

        // Validate limits
        if self.max_message_length == 0 {
            anyhow::bail!("Max message length must be greater than 0");
        }

        if self.rate_limit_calls == 0 || self.rate_limit_window_secs == 0 {
            anyhow::bail!(
                "Rate limit must allow at least 1 call in a window of at least 1s, got: {}/{}s",
                self.rate_limit_calls,
                self.rate_limit_window_secs
            );
        }

        if self.settings_ttl_secs == 0 || self.voice_cache_ttl_secs == 0 {
            anyhow::bail!("TTLs must be greater than 0");
        }

        if self.tts_max_retries == 0 {
            anyhow::bail!("TTS max retries must be at least 1");
        }

        if self.tts_timeout_secs == 0 {
            anyhow::bail!("TTS timeout must be greater than 0");
        }

        Ok(())
    }

    /// Política de reintentos de síntesis
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.tts_max_retries,
            base_delay: Duration::from_millis(self.tts_retry_delay_ms),
            timeout: self.request_timeout(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.tts_timeout_secs)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Directivas de `EnvFilter` para el crate y serenity
    pub fn log_directives(&self) -> [String; 2] {
        let serenity = if self.is_production() { "serenity=error" } else { "serenity=warn" };
        [format!("open_voice={}", self.log_level), serenity.to_string()]
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and credentials in `REDIS_URL` are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Speech: {} (model {}, default voice {})\n  \
            Store: {} (prefix '{}', voice cache {} for {})\n  \
            Limits: {} chars, {} calls per {}\n  \
            Retries: {} attempts, {}ms base delay, {} timeout\n  \
            Environment: {} (log level {})",
            self.guild_id.map_or("global".to_string(), |id| format!("guild {}", id)),
            self.elevenlabs_base_url,
            self.default_model,
            self.default_voice_id,
            self.redis_url.as_deref().map_or("none".to_string(), redact_url),
            self.redis_key_prefix,
            match self.voice_cache_policy {
                VoiceCachePolicy::ReadThrough => "read-through",
                VoiceCachePolicy::AlwaysRefresh => "refresh",
            },
            humantime::format_duration(Duration::from_secs(self.voice_cache_ttl_secs)),
            self.max_message_length,
            self.rate_limit_calls,
            humantime::format_duration(Duration::from_secs(self.rate_limit_window_secs)),
            self.tts_max_retries,
            self.tts_retry_delay_ms,
            humantime::format_duration(self.request_timeout()),
            self.environment,
            self.log_level
        )
    }
}

fn parse_or<T>(value: Option<String>, default: T, key: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        None => Ok(default),
    }
}

/// Oculta usuario y contraseña de una URL
fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if !parsed.username().is_empty() || parsed.password().is_some() => {
            let _ = parsed.set_username("");
            let _ = parsed.set_password(None);
            parsed.to_string()
        }
        Ok(parsed) => parsed.to_string(),
        Err(_) => "<invalid url>".to_string(),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            // ElevenLabs
            elevenlabs_api_key: String::new(),
            elevenlabs_base_url: "https://api.elevenlabs.io".to_string(),
            default_voice_id: "JBFqnCBsd6RMkjVDRZzb".to_string(), // George
            default_model: "eleven_multilingual_v2".to_string(),

            // Persistencia
            redis_url: None,
            redis_key_prefix: "tts_bot".to_string(),
            settings_ttl_secs: 86400 * 30, // 30 días
            voice_cache_ttl_secs: 3600,    // 1 hora
            voice_cache_policy: VoiceCachePolicy::ReadThrough,

            // Límites
            max_message_length: 2500,
            rate_limit_calls: 10,
            rate_limit_window_secs: 60,

            // Reintentos
            tts_max_retries: 3,
            tts_retry_delay_ms: 1000,
            tts_timeout_secs: 30,

            // Entorno
            log_level: "info".to_string(),
            environment: "development".to_string(),
        }
    }
}
