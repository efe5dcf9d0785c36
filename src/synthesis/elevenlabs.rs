use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

use super::SpeechApi;
use crate::error::SynthesisError;
use crate::voices::Voice;

// Patrones del cuerpo de error. La cuota se evalúa primero: el proveedor la
// reporta con 401.
const QUOTA_PATTERNS: &[&str] = &["quota", "billing", "credits", "insufficient", "payment"];
const AUTH_PATTERNS: &[&str] = &["unauthorized", "unauthorised", "invalid api key", "invalid_api_key", "authentication"];
const RATE_LIMIT_PATTERNS: &[&str] = &["rate limit", "rate_limit", "too many requests", "too_many_concurrent"];

const MAX_ERROR_BODY_CHARS: usize = 200;

/// Cliente HTTP de ElevenLabs
pub struct ElevenLabsApi {
    client: Client,
    api_key: String,
    base_url: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum VoicesPayload {
    Wrapped { voices: Vec<ApiVoice> },
    Bare(Vec<ApiVoice>),
}

#[derive(Deserialize)]
struct ApiVoice {
    voice_id: String,
    name: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    labels: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    preview_url: Option<String>,
}

impl From<ApiVoice> for Voice {
    fn from(api: ApiVoice) -> Self {
        let labels = api
            .labels
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| match value {
                serde_json::Value::String(s) => Some((key, s)),
                serde_json::Value::Null => None,
                other => Some((key, other.to_string())),
            })
            .collect();

        Voice {
            voice_id: api.voice_id,
            name: api.name,
            category: api.category,
            description: api.description,
            labels,
            preview_url: api.preview_url,
        }
    }
}

impl ElevenLabsApi {
    pub fn new(api_key: String, base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("open-voice/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn error_from_response(response: reqwest::Response) -> SynthesisError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let error = classify(status.as_u16(), &body);
        warn!("❌ ElevenLabs respondió {}: {}", status, error.kind());
        error
    }
}

#[async_trait]
impl SpeechApi for ElevenLabsApi {
    async fn text_to_speech(&self, text: &str, voice_id: &str, model_id: &str) -> Result<Bytes, SynthesisError> {
        let url = format!("{}/v1/text-to-speech/{}", self.base_url, urlencoding::encode(voice_id));
        let request = SpeechRequest {
            text,
            model_id,
            voice_settings: VoiceSettings::default(),
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .header(header::ACCEPT, "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(Self::error_from_response(response).await);
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(SynthesisError::Unknown("provider returned an empty audio payload".to_string()));
        }

        debug!("🎵 Recibidos {} bytes de audio", audio.len());
        Ok(audio)
    }

    async fn voices(&self) -> Result<Vec<Voice>, SynthesisError> {
        let url = format!("{}/v1/voices", self.base_url);

        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let payload: VoicesPayload = response.json().await?;
        let voices: Vec<Voice> = match payload {
            VoicesPayload::Wrapped { voices } | VoicesPayload::Bare(voices) => {
                voices.into_iter().map(Voice::from).collect()
            }
        };

        debug!("🗣️ {} voces disponibles", voices.len());
        Ok(voices)
    }
}

/// Clasifica una respuesta fallida del proveedor.
///
/// El texto del cuerpo manda sobre el código: cuota, luego autenticación,
/// luego rate limit. Sin coincidencias, 401 es autenticación y 429 rate limit.
pub fn classify(status: u16, body: &str) -> SynthesisError {
    let message = if body.trim().is_empty() {
        format!("HTTP {}", status)
    } else {
        let snippet: String = body.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("HTTP {}: {}", status, snippet)
    };

    let lowered = body.to_lowercase();
    let mentions = |patterns: &[&str]| patterns.iter().any(|p| lowered.contains(p));

    if mentions(QUOTA_PATTERNS) {
        SynthesisError::QuotaExceeded(message)
    } else if status == 401 || mentions(AUTH_PATTERNS) {
        SynthesisError::Authentication(message)
    } else if status == 429 || mentions(RATE_LIMIT_PATTERNS) {
        SynthesisError::RateLimited(message)
    } else {
        SynthesisError::Unknown(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api(server: &MockServer) -> ElevenLabsApi {
        ElevenLabsApi::new("test-key".to_string(), &server.uri(), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn quota_text_wins_over_unauthorized_status() {
        let body = r#"{"detail":{"status":"quota_exceeded","message":"This request exceeds your quota"}}"#;
        assert!(matches!(classify(401, body), SynthesisError::QuotaExceeded(_)));
    }

    #[test]
    fn classifies_by_status_and_text() {
        assert!(matches!(classify(401, ""), SynthesisError::Authentication(_)));
        assert!(matches!(classify(400, "Invalid API key"), SynthesisError::Authentication(_)));
        assert!(matches!(classify(429, ""), SynthesisError::RateLimited(_)));
        assert!(matches!(classify(503, "Too many requests"), SynthesisError::RateLimited(_)));
        assert!(matches!(classify(500, "boom"), SynthesisError::Unknown(_)));
    }

    #[test]
    fn unknown_keeps_message_truncated() {
        let body = "x".repeat(1000);
        let SynthesisError::Unknown(message) = classify(500, &body) else {
            panic!("expected unknown");
        };
        assert!(message.starts_with("HTTP 500: xxx"));
        assert!(message.len() < 300);
    }

    #[tokio::test]
    async fn text_to_speech_posts_json_and_returns_audio() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/text-to-speech/JBFqnCBsd6RMkjVDRZzb"))
            .and(header("xi-api-key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "text": "Hola",
                "model_id": "eleven_multilingual_v2"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ID3audio".to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let audio = api(&server)
            .text_to_speech("Hola", "JBFqnCBsd6RMkjVDRZzb", "eleven_multilingual_v2")
            .await
            .unwrap();
        assert_eq!(audio, Bytes::from_static(b"ID3audio"));
    }

    #[tokio::test]
    async fn text_to_speech_classifies_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Too many requests"))
            .mount(&server)
            .await;

        let result = api(&server).text_to_speech("Hola", "voice", "model").await;
        assert!(matches!(result, Err(SynthesisError::RateLimited(_))));
    }

    #[tokio::test]
    async fn empty_audio_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let result = api(&server).text_to_speech("Hola", "voice", "model").await;
        assert!(matches!(result, Err(SynthesisError::Unknown(_))));
    }

    #[tokio::test]
    async fn connection_failure_is_network() {
        let api = ElevenLabsApi::new("key".to_string(), "http://127.0.0.1:1", Duration::from_secs(2)).unwrap();
        let result = api.text_to_speech("Hola", "voice", "model").await;
        assert!(matches!(result, Err(SynthesisError::Network(_))));
    }

    #[tokio::test]
    async fn voices_parses_wrapped_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/voices"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "voices": [
                    {
                        "voice_id": "JBFqnCBsd6RMkjVDRZzb",
                        "name": "George",
                        "category": "premade",
                        "labels": {"accent": "british", "age": null}
                    },
                    {"voice_id": "21m00Tcm4TlvDq8ikWAM", "name": "Rachel"}
                ]
            })))
            .mount(&server)
            .await;

        let voices = api(&server).voices().await.unwrap();
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0].category.as_deref(), Some("premade"));
        assert_eq!(voices[0].labels.get("accent").map(String::as_str), Some("british"));
        assert!(!voices[0].labels.contains_key("age"));
        assert_eq!(voices[1].category, None);
    }

    #[tokio::test]
    async fn voices_accepts_bare_array() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/voices"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([{"voice_id": "a", "name": "Alice"}])),
            )
            .mount(&server)
            .await;

        let voices = api(&server).voices().await.unwrap();
        assert_eq!(voices, vec![Voice::new("a", "Alice")]);
    }

    #[tokio::test]
    async fn voices_with_bad_key_is_authentication() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"detail":"Unauthorized"}"#))
            .mount(&server)
            .await;

        let result = api(&server).voices().await;
        assert!(matches!(result, Err(SynthesisError::Authentication(_))));
    }
}
