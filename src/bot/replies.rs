//! Textos de respuesta del bot.
//!
//! Funciones puras: reciben datos del núcleo y devuelven el texto mostrado al
//! usuario, sin tocar Discord.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::context::StorageMode;
use crate::error::SynthesisError;
use crate::rate_limit::RateLimitStatus;
use crate::voices::Voice;

/// Máximo de voces mostradas en `/voices`
pub const MAX_LISTED_VOICES: usize = 15;

pub fn help_text(max_message_length: usize, max_calls: u64, window_secs: u64) -> String {
    format!(
        "Envíame un mensaje directo, o menciónme en un canal, y te responderé con el audio.\n\n\
        • `/voices` - Lista las voces disponibles\n\
        • `/setvoice <nombre>` - Cambia tu voz\n\
        • `/resetvoice` - Vuelve a la voz por defecto\n\
        • `/settings` - Muestra tu configuración\n\
        • `/stats` - Estadísticas de uso\n\n\
        Límites: {} caracteres por mensaje, {} mensajes cada {}.",
        max_message_length,
        max_calls,
        format_secs(window_secs)
    )
}

/// Respuesta cuando el rate limiter rechaza la petición
pub fn rate_limited(status: RateLimitStatus) -> String {
    format!(
        "⏰ Has alcanzado el límite de peticiones ({} en la ventana actual). Inténtalo de nuevo en {}.",
        status.calls,
        format_secs(status.remaining_secs.max(1))
    )
}

pub fn message_too_long(length: usize, max_length: usize) -> String {
    format!(
        "📏 Tu mensaje tiene {} caracteres; el máximo es {}. Divídelo en partes más cortas.",
        length, max_length
    )
}

pub fn generating(voice_name: &str) -> String {
    format!("🎙️ Generando audio con la voz **{}**...", voice_name)
}

pub fn speech_ready(voice_name: &str, characters: usize) -> String {
    format!("🔊 Voz: **{}** · {} caracteres", voice_name, characters)
}

/// Mensaje para el usuario según el tipo de error de síntesis
pub fn synthesis_error(error: &SynthesisError) -> String {
    match error {
        SynthesisError::Authentication(_) | SynthesisError::QuotaExceeded(_) => {
            "🔒 El servicio de voz no está disponible ahora mismo. Contacta con un administrador.".to_string()
        }
        SynthesisError::RateLimited(_) => {
            "⏳ El servicio de voz está recibiendo demasiadas peticiones. Espera un momento y vuelve a intentarlo."
                .to_string()
        }
        SynthesisError::Network(_) | SynthesisError::Unknown(_) => {
            "⚠️ No se pudo generar el audio. Inténtalo de nuevo.".to_string()
        }
    }
}

/// Lista de voces, marcando la actual del usuario
pub fn voices_list(voices: &[Voice], current_voice_id: &str) -> String {
    if voices.is_empty() {
        return "No hay voces disponibles en este momento. Inténtalo más tarde.".to_string();
    }

    let mut lines: Vec<String> = voices
        .iter()
        .take(MAX_LISTED_VOICES)
        .map(|voice| {
            let marker = if voice.voice_id == current_voice_id { "▶️" } else { "•" };
            match &voice.category {
                Some(category) => format!("{} **{}** ({})", marker, voice.name, category),
                None => format!("{} **{}**", marker, voice.name),
            }
        })
        .collect();

    if voices.len() > MAX_LISTED_VOICES {
        lines.push(format!("... y {} más", voices.len() - MAX_LISTED_VOICES));
    }

    lines.push(String::new());
    lines.push("Usa `/setvoice <nombre>` para cambiar tu voz.".to_string());
    lines.join("\n")
}

pub fn voice_changed(voice_name: &str) -> String {
    format!("Tu voz ahora es **{}**.", voice_name)
}

pub fn voice_reset(default_voice_name: &str) -> String {
    format!("Volviste a la voz por defecto: **{}**.", default_voice_name)
}

pub fn voice_not_found(name: &str) -> String {
    format!("No encontré ninguna voz llamada **{}**. Usa `/voices` para ver la lista.", name)
}

pub fn settings_text(
    voice_name: &str,
    voice_id: &str,
    mode: StorageMode,
    max_calls: u64,
    window_secs: u64,
    status: RateLimitStatus,
) -> String {
    let storage = match mode {
        StorageMode::Persistent => "persistente",
        StorageMode::InMemory => "en memoria (se pierde al reiniciar)",
    };

    let mut text = format!(
        "🗣️ Voz: **{}** (`{}`)\n💾 Almacenamiento: {}\n⏱️ Límite: {} mensajes cada {}",
        voice_name,
        voice_id,
        storage,
        max_calls,
        format_secs(window_secs)
    );

    if status.calls > 0 {
        text.push_str(&format!(
            "\n📈 Usados: {}/{} (se libera uno en {})",
            status.calls,
            max_calls,
            format_secs(status.remaining_secs)
        ));
    }

    text
}

pub fn stats_text(stats: &BTreeMap<String, i64>, mode: StorageMode) -> String {
    if stats.is_empty() {
        return match mode {
            StorageMode::Persistent => "Todavía no hay estadísticas registradas.".to_string(),
            StorageMode::InMemory => "Las estadísticas no están disponibles sin almacenamiento persistente.".to_string(),
        };
    }

    stats
        .iter()
        .map(|(metric, count)| format!("• {}: **{}**", metric_label(metric), count))
        .collect::<Vec<_>>()
        .join("\n")
}

fn metric_label(metric: &str) -> &str {
    match metric {
        "tts_generation" => "Audios generados",
        "characters_processed" => "Caracteres procesados",
        "help_command" => "Consultas de ayuda",
        "voices_command" => "Consultas de voces",
        "voice_change" => "Cambios de voz",
        "settings_command" => "Consultas de configuración",
        "errors" => "Errores",
        other => other,
    }
}

fn format_secs(secs: u64) -> String {
    humantime::format_duration(Duration::from_secs(secs)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rate_limited_mentions_wait_time() {
        let text = rate_limited(RateLimitStatus { calls: 10, remaining_secs: 45 });
        assert!(text.contains("45s"));

        // Nunca "0s"
        let text = rate_limited(RateLimitStatus { calls: 10, remaining_secs: 0 });
        assert!(text.contains("1s"));
    }

    #[test]
    fn error_messages_depend_on_kind() {
        let admin = synthesis_error(&SynthesisError::QuotaExceeded("x".into()));
        assert_eq!(admin, synthesis_error(&SynthesisError::Authentication("y".into())));
        assert!(admin.contains("administrador"));

        assert!(synthesis_error(&SynthesisError::RateLimited("x".into())).contains("Espera"));
        assert!(synthesis_error(&SynthesisError::Network("x".into())).contains("de nuevo"));
        // El detalle técnico no llega al usuario
        assert!(!synthesis_error(&SynthesisError::Unknown("HTTP 500: boom".into())).contains("boom"));
    }

    #[test]
    fn voices_list_is_truncated_and_marks_current() {
        let voices: Vec<Voice> = (0..20).map(|i| Voice::new(format!("id{}", i), format!("Voz {}", i))).collect();
        let text = voices_list(&voices, "id3");

        assert!(text.contains("▶️ **Voz 3**"));
        assert!(text.contains("• **Voz 14**"));
        assert!(!text.contains("Voz 15"));
        assert!(text.contains("... y 5 más"));
    }

    #[test]
    fn voices_list_shows_category() {
        let voices = vec![Voice::new("a", "George").with_category("premade")];
        assert!(voices_list(&voices, "").starts_with("• **George** (premade)"));
        assert!(voices_list(&[], "").contains("No hay voces"));
    }

    #[test]
    fn settings_show_storage_mode_and_usage() {
        let idle = settings_text("George (Default)", "JBF", StorageMode::InMemory, 10, 60, RateLimitStatus::default());
        assert!(idle.contains("en memoria"));
        assert!(idle.contains("10 mensajes cada 1m"));
        assert!(!idle.contains("Usados"));

        let busy = settings_text(
            "Rachel",
            "21m",
            StorageMode::Persistent,
            10,
            60,
            RateLimitStatus { calls: 3, remaining_secs: 20 },
        );
        assert!(busy.contains("persistente"));
        assert!(busy.contains("3/10"));
        assert!(busy.contains("20s"));
    }

    #[test]
    fn stats_use_readable_labels() {
        let stats: BTreeMap<String, i64> =
            [("tts_generation".to_string(), 4), ("custom".to_string(), 1)].into_iter().collect();
        assert_eq!(stats_text(&stats, StorageMode::Persistent), "• custom: **1**\n• Audios generados: **4**");
        assert!(stats_text(&BTreeMap::new(), StorageMode::InMemory).contains("no están disponibles"));
    }

    #[test]
    fn too_long_reports_both_lengths() {
        assert!(message_too_long(3000, 2500).contains("3000 caracteres; el máximo es 2500"));
    }
}
