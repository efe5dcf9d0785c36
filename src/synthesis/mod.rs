//! # Synthesis Module
//!
//! Resilient client around the external text-to-speech provider.
//!
//! [`SpeechApi`] performs exactly one request and classifies any failure into
//! a [`SynthesisError`]. [`SpeechSynthesizer`] adds the retry policy on top:
//!
//! - `Authentication` / `QuotaExceeded`: fail immediately.
//! - `RateLimited`: exponential backoff (`1s, 2s, 4s, ...`).
//! - `Network` / `Unknown`: fixed delay.
//! - Every attempt is bounded by a timeout; elapsing counts as `Network`.
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use open_voice::synthesis::{ElevenLabsApi, RetryConfig, SpeechSynthesizer};
//! # async fn example() -> anyhow::Result<()> {
//! let api = ElevenLabsApi::new("xi-key".to_string(), "https://api.elevenlabs.io", RetryConfig::default().timeout)?;
//! let synthesizer = SpeechSynthesizer::new(Arc::new(api), "eleven_multilingual_v2", RetryConfig::default());
//!
//! let audio = synthesizer.synthesize("Hola mundo", "JBFqnCBsd6RMkjVDRZzb").await?;
//! println!("{} bytes de audio", audio.len());
//! # Ok(())
//! # }
//! ```

pub mod elevenlabs;

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::error::SynthesisError;
use crate::voices::Voice;

pub use elevenlabs::{classify, ElevenLabsApi};

/// Un único intento contra el proveedor de síntesis
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechApi: Send + Sync {
    /// Genera audio para el texto con la voz y modelo indicados
    async fn text_to_speech(&self, text: &str, voice_id: &str, model_id: &str) -> Result<Bytes, SynthesisError>;

    /// Lista las voces disponibles
    async fn voices(&self) -> Result<Vec<Voice>, SynthesisError>;
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Intentos totales, incluido el primero
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Cliente de síntesis con reintentos y clasificación de errores
pub struct SpeechSynthesizer {
    api: Arc<dyn SpeechApi>,
    model_id: String,
    retry_config: RetryConfig,
}

impl SpeechSynthesizer {
    pub fn new(api: Arc<dyn SpeechApi>, model_id: impl Into<String>, retry_config: RetryConfig) -> Self {
        Self {
            api,
            model_id: model_id.into(),
            retry_config,
        }
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Genera audio con reintentos automáticos.
    ///
    /// Devuelve el audio del primer intento exitoso, o el último error
    /// clasificado cuando se agotan los intentos.
    pub async fn synthesize(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError> {
        let max_attempts = self.retry_config.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match self.attempt_synthesis(text, voice_id).await {
                Ok(audio) => {
                    info!("✅ Audio generado en intento {} ({} bytes)", attempt + 1, audio.len());
                    return Ok(audio);
                }
                Err(e) if !e.is_retryable() => {
                    error!("❌ Error no recuperable en síntesis: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    if attempt + 1 >= max_attempts {
                        error!("❌ Todos los intentos de síntesis fallaron: {}", e);
                        return Err(e);
                    }

                    let delay = e.backoff(attempt, self.retry_config.base_delay);
                    warn!(
                        "⚠️ Intento {} falló ({}), reintentando en {:?}",
                        attempt + 1,
                        e.kind(),
                        delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Intento individual con timeout
    async fn attempt_synthesis(&self, text: &str, voice_id: &str) -> Result<Bytes, SynthesisError> {
        debug!("🎤 Sintetizando {} caracteres con voz {}", text.chars().count(), voice_id);

        match timeout(
            self.retry_config.timeout,
            self.api.text_to_speech(text, voice_id, &self.model_id),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!("⏰ Timeout en síntesis después de {:?}", self.retry_config.timeout);
                Err(SynthesisError::Network(format!(
                    "request timed out after {:?}",
                    self.retry_config.timeout
                )))
            }
        }
    }

    /// Obtiene las voces con una sola petición, sin reintentos
    pub async fn fetch_voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        match timeout(self.retry_config.timeout, self.api.voices()).await {
            Ok(result) => result,
            Err(_) => Err(SynthesisError::Network(format!(
                "request timed out after {:?}",
                self.retry_config.timeout
            ))),
        }
    }

    /// Lista de voces; un fallo se reporta como lista vacía.
    ///
    /// Una lista vacía puede significar "sin voces" o "fallo al obtenerlas".
    pub async fn list_voices(&self) -> Vec<Voice> {
        match self.fetch_voices().await {
            Ok(voices) => voices,
            Err(e) => {
                error!("Error obteniendo voces: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::time::Instant;

    fn synthesizer(api: MockSpeechApi) -> SpeechSynthesizer {
        SpeechSynthesizer::new(Arc::new(api), "eleven_multilingual_v2", RetryConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limits_with_exponential_backoff() {
        let mut api = MockSpeechApi::new();
        let mut calls = 0;
        api.expect_text_to_speech().times(3).returning(move |_, _, _| {
            calls += 1;
            if calls < 3 {
                Err(SynthesisError::RateLimited("429 too many requests".into()))
            } else {
                Ok(Bytes::from_static(b"ID3-audio"))
            }
        });

        let start = Instant::now();
        let audio = synthesizer(api).synthesize("hola", "voice").await.unwrap();

        assert_eq!(audio, Bytes::from_static(b"ID3-audio"));
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_error_fails_after_one_call() {
        let mut api = MockSpeechApi::new();
        api.expect_text_to_speech()
            .times(1)
            .returning(|_, _, _| Err(SynthesisError::Authentication("invalid api key".into())));

        let start = Instant::now();
        let result = synthesizer(api).synthesize("hola", "voice").await;

        assert_eq!(result, Err(SynthesisError::Authentication("invalid api key".into())));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_error_is_not_retried() {
        let mut api = MockSpeechApi::new();
        api.expect_text_to_speech()
            .times(1)
            .returning(|_, _, _| Err(SynthesisError::QuotaExceeded("not enough credits".into())));

        let result = synthesizer(api).synthesize("hola", "voice").await;
        assert!(matches!(result, Err(SynthesisError::QuotaExceeded(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn network_errors_use_fixed_delay_and_surface_last_error() {
        let mut api = MockSpeechApi::new();
        let mut calls = 0;
        api.expect_text_to_speech().times(3).returning(move |_, _, _| {
            calls += 1;
            Err(SynthesisError::Network(format!("connection reset #{}", calls)))
        });

        let start = Instant::now();
        let result = synthesizer(api).synthesize("hola", "voice").await;

        assert_eq!(result, Err(SynthesisError::Network("connection reset #3".into())));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_rate_limit_surfaces_rate_limited() {
        let mut api = MockSpeechApi::new();
        api.expect_text_to_speech()
            .times(3)
            .returning(|_, _, _| Err(SynthesisError::RateLimited("429".into())));

        let start = Instant::now();
        let result = synthesizer(api).synthesize("hola", "voice").await;

        assert!(matches!(result, Err(SynthesisError::RateLimited(_))));
        // Sin espera después del último intento
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    struct StalledApi;

    #[async_trait]
    impl SpeechApi for StalledApi {
        async fn text_to_speech(&self, _: &str, _: &str, _: &str) -> Result<Bytes, SynthesisError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(Bytes::new())
        }

        async fn voices(&self) -> Result<Vec<Voice>, SynthesisError> {
            sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_are_network_errors_and_retried() {
        let synthesizer = SpeechSynthesizer::new(Arc::new(StalledApi), "model", RetryConfig::default());

        let start = Instant::now();
        let result = synthesizer.synthesize("hola", "voice").await;

        assert!(matches!(result, Err(SynthesisError::Network(_))));
        // 3 timeouts de 30s + 2 esperas de 1s
        assert_eq!(start.elapsed(), Duration::from_secs(92));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_voice_listing_times_out_once() {
        let synthesizer = SpeechSynthesizer::new(Arc::new(StalledApi), "model", RetryConfig::default());

        let start = Instant::now();
        let result = synthesizer.fetch_voices().await;

        assert!(matches!(result, Err(SynthesisError::Network(ref msg)) if msg.contains("timed out")));
        // Una sola petición, sin reintentos
        assert_eq!(start.elapsed(), Duration::from_secs(30));

        let start = Instant::now();
        assert!(synthesizer.list_voices().await.is_empty());
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn list_voices_hides_failures_as_empty() {
        let mut api = MockSpeechApi::new();
        api.expect_voices()
            .times(1)
            .returning(|| Err(SynthesisError::Network("dns failure".into())));

        assert!(synthesizer(api).list_voices().await.is_empty());
    }

    #[tokio::test]
    async fn passes_configured_model() {
        let mut api = MockSpeechApi::new();
        api.expect_text_to_speech()
            .withf(|text, voice, model| text == "hola" && voice == "v1" && model == "eleven_multilingual_v2")
            .times(1)
            .returning(|_, _, _| Ok(Bytes::from_static(b"audio")));

        let synthesizer = synthesizer(api);
        assert_eq!(synthesizer.model_id(), "eleven_multilingual_v2");
        synthesizer.synthesize("hola", "v1").await.unwrap();
    }
}
