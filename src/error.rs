//! Typed errors of the relay core.
//!
//! Synthesis failures are classified once, at the provider boundary, into a
//! fixed taxonomy. The retry loop and the request handler only ever look at the
//! variant, never at the message text.

use std::time::Duration;
use thiserror::Error;

/// Error clasificado de la API de síntesis
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    /// Credenciales inválidas. Requiere intervención del operador.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Cuota o facturación agotada en el proveedor.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// El proveedor está limitando las peticiones.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Fallo de conexión, timeout o lectura del cuerpo.
    #[error("Network error: {0}")]
    Network(String),

    /// Cualquier otro fallo; conserva el mensaje original.
    #[error("Audio generation failed: {0}")]
    Unknown(String),
}

impl SynthesisError {
    /// Solo los errores transitorios se reintentan
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SynthesisError::RateLimited(_) | SynthesisError::Network(_) | SynthesisError::Unknown(_)
        )
    }

    /// Espera antes del siguiente intento (`attempt` empieza en 0).
    ///
    /// Rate limit: exponencial `base * 2^attempt`. Resto: `base` fijo.
    pub fn backoff(&self, attempt: u32, base: Duration) -> Duration {
        match self {
            SynthesisError::RateLimited(_) => base * 2_u32.saturating_pow(attempt),
            _ => base,
        }
    }

    /// Nombre corto del tipo de error, para logs y métricas
    pub fn kind(&self) -> &'static str {
        match self {
            SynthesisError::Authentication(_) => "authentication",
            SynthesisError::QuotaExceeded(_) => "quota_exceeded",
            SynthesisError::RateLimited(_) => "rate_limited",
            SynthesisError::Network(_) => "network",
            SynthesisError::Unknown(_) => "unknown",
        }
    }
}

impl From<reqwest::Error> for SynthesisError {
    fn from(err: reqwest::Error) -> Self {
        // Timeouts, conexión y lectura del cuerpo son fallos de red
        if err.is_decode() {
            SynthesisError::Unknown(format!("invalid response payload: {}", err))
        } else {
            SynthesisError::Network(err.to_string())
        }
    }
}

/// Errores del backing store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Value at {0} has the wrong type")]
    WrongType(String),

    #[error("Invalid key pattern: {0}")]
    InvalidPattern(String),

    #[error("Store connection closed")]
    Closed,
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
