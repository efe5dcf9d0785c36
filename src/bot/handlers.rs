use anyhow::Result;
use serenity::{
    builder::{
        CreateAttachment, CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage, CreateMessage,
        EditInteractionResponse,
    },
    model::{application::CommandInteraction, channel::Message},
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    bot::{commands, replies, OpenVoiceBot},
    settings::{UserSettings, DEFAULT_VOICE_NAME},
    ui::embeds,
};

/// Nombre del adjunto de audio
const AUDIO_FILENAME: &str = "speech.mp3";

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &OpenVoiceBot) -> Result<()> {
    info!("📝 Comando /{} usado por {}", command.data.name, command.user.name);

    match command.data.name.as_str() {
        commands::HELP => handle_help(ctx, command, bot).await?,
        commands::VOICES => handle_voices(ctx, command, bot).await?,
        commands::SET_VOICE => handle_setvoice(ctx, command, bot).await?,
        commands::RESET_VOICE => handle_resetvoice(ctx, command, bot).await?,
        commands::SETTINGS => handle_settings(ctx, command, bot).await?,
        commands::STATS => handle_stats(ctx, command, bot).await?,
        _ => {
            respond(ctx, &command, embeds::create_error_embed("Comando no reconocido", "Usa `/help`.")).await?;
        }
    }

    Ok(())
}

/// Convierte un mensaje de texto en audio
pub async fn handle_message(ctx: &Context, msg: &Message, text: &str, bot: &OpenVoiceBot) -> Result<()> {
    let context = &bot.context;
    let user_id = msg.author.id.get();

    if !context.admit(user_id).await {
        let status = context.rate_limit_status(user_id).await;
        info!("⏰ Usuario {} limitado ({} peticiones)", user_id, status.calls);
        msg.reply(&ctx.http, replies::rate_limited(status)).await?;
        return Ok(());
    }

    let length = text.chars().count();
    let max_length = context.config().max_message_length;
    if length > max_length {
        msg.reply(&ctx.http, replies::message_too_long(length, max_length)).await?;
        return Ok(());
    }

    let (voice_id, voice_name) = context.voice_for(user_id).await;
    let status_message = msg.reply(&ctx.http, replies::generating(&voice_name)).await?;
    let _ = msg.channel_id.broadcast_typing(&ctx.http).await;

    let result = context.synthesize(text, &voice_id).await;

    // El mensaje de estado sobra en ambos casos
    if let Err(e) = status_message.delete(&ctx.http).await {
        warn!("No se pudo borrar el mensaje de estado: {:?}", e);
    }

    match result {
        Ok(audio) => {
            let attachment = CreateAttachment::bytes(audio.to_vec(), AUDIO_FILENAME);
            msg.channel_id
                .send_message(
                    &ctx.http,
                    CreateMessage::new()
                        .content(replies::speech_ready(&voice_name, length))
                        .add_file(attachment)
                        .reference_message(msg),
                )
                .await?;

            context.increment_counter("tts_generation", Some(user_id)).await;
            context.increment_counter("characters_processed", None).await;
            info!("🔊 Audio enviado a {} ({} caracteres)", msg.author.name, length);
        }
        Err(e) => {
            warn!("❌ Síntesis fallida para usuario {}: {}", user_id, e);
            context.increment_counter("errors", Some(user_id)).await;
            msg.reply(&ctx.http, replies::synthesis_error(&e)).await?;
        }
    }

    Ok(())
}

/// Texto a sintetizar: el contenido sin las menciones al bot
pub fn speech_text(content: &str, bot_id: u64) -> String {
    content
        .replace(&format!("<@{}>", bot_id), "")
        .replace(&format!("<@!{}>", bot_id), "")
        .trim()
        .to_string()
}

async fn handle_help(ctx: &Context, command: CommandInteraction, bot: &OpenVoiceBot) -> Result<()> {
    let context = &bot.context;
    let (max_calls, window_secs) = context.rate_limit();
    let text = replies::help_text(context.config().max_message_length, max_calls, window_secs);

    respond(ctx, &command, embeds::create_help_embed(text)).await?;
    context.increment_counter("help_command", Some(command.user.id.get())).await;

    Ok(())
}

async fn handle_voices(ctx: &Context, command: CommandInteraction, bot: &OpenVoiceBot) -> Result<()> {
    let context = &bot.context;
    let user_id = command.user.id.get();

    // La API puede tardar: respuesta diferida
    command.defer_ephemeral(&ctx.http).await?;

    let embed = match context.voices().await {
        Ok(voices) => {
            let (current_voice_id, _) = context.voice_for(user_id).await;
            embeds::create_voices_embed(replies::voices_list(&voices, &current_voice_id), voices.len())
        }
        Err(e) => {
            warn!("Error listando voces: {}", e);
            embeds::create_error_embed("No se pudieron obtener las voces", replies::synthesis_error(&e))
        }
    };

    command.edit_response(&ctx.http, EditInteractionResponse::new().embed(embed)).await?;
    context.increment_counter("voices_command", Some(user_id)).await;

    Ok(())
}

async fn handle_setvoice(ctx: &Context, command: CommandInteraction, bot: &OpenVoiceBot) -> Result<()> {
    let context = &bot.context;
    let user_id = command.user.id.get();

    let name = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == commands::VOICE_NAME_OPTION)
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Nombre de voz no proporcionado"))?
        .to_string();

    command.defer_ephemeral(&ctx.http).await?;

    let embed = match context.find_voice(&name).await {
        Ok(Some(voice)) => {
            let settings = UserSettings {
                voice_id: voice.voice_id.clone(),
                voice_name: voice.name.clone(),
                voice_category: voice.category.clone(),
            };
            context.set_settings(user_id, settings).await;
            context.increment_counter("voice_change", Some(user_id)).await;
            info!("🗣️ Usuario {} cambió su voz a {}", user_id, voice.name);
            embeds::create_success_embed("Voz actualizada", replies::voice_changed(&voice.name))
        }
        Ok(None) => embeds::create_warning_embed("Voz no encontrada", replies::voice_not_found(&name)),
        Err(e) => embeds::create_error_embed("No se pudieron obtener las voces", replies::synthesis_error(&e)),
    };

    command.edit_response(&ctx.http, EditInteractionResponse::new().embed(embed)).await?;

    Ok(())
}

async fn handle_resetvoice(ctx: &Context, command: CommandInteraction, bot: &OpenVoiceBot) -> Result<()> {
    let context = &bot.context;
    context.reset_settings(command.user.id.get()).await;

    respond(ctx, &command, embeds::create_success_embed("Voz restablecida", replies::voice_reset(DEFAULT_VOICE_NAME))).await
}

async fn handle_settings(ctx: &Context, command: CommandInteraction, bot: &OpenVoiceBot) -> Result<()> {
    let context = &bot.context;
    let user_id = command.user.id.get();

    let (voice_id, voice_name) = context.voice_for(user_id).await;
    let (max_calls, window_secs) = context.rate_limit();
    let status = context.rate_limit_status(user_id).await;
    let text = replies::settings_text(&voice_name, &voice_id, context.storage_mode(), max_calls, window_secs, status);

    respond(ctx, &command, embeds::create_info_embed("Tu configuración", text)).await?;
    context.increment_counter("settings_command", Some(user_id)).await;

    Ok(())
}

async fn handle_stats(ctx: &Context, command: CommandInteraction, bot: &OpenVoiceBot) -> Result<()> {
    let context = &bot.context;
    let stats = context.usage_stats().await;
    let text = replies::stats_text(&stats, context.storage_mode());

    respond(ctx, &command, embeds::create_info_embed("Estadísticas de uso", text)).await
}

/// Respuesta efímera con un embed
async fn respond(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed).ephemeral(true)),
        )
        .await?;

    Ok(())
}
