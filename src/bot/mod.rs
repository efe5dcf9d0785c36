//! # Bot Module
//!
//! Discord front end of Open Voice.
//!
//! This module is thin glue between the gateway and [`AppContext`]:
//! - Slash command registration and dispatch (`/help`, `/voices`, ...)
//! - Text messages in DMs, or mentioning the bot, are answered with audio
//! - Reply text lives in [`replies`] as pure functions
//!
//! ## Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use open_voice::{bot::OpenVoiceBot, config::Config, context::AppContext};
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let context = Arc::new(AppContext::start(config).await?);
//! let bot = OpenVoiceBot::new(context);
//! # Ok(())
//! # }
//! ```

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Message, Ready},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;
pub mod replies;

use crate::context::AppContext;

/// Handler de eventos de Discord
pub struct OpenVoiceBot {
    pub context: Arc<AppContext>,
}

impl OpenVoiceBot {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands are registered per guild when `GUILD_ID` is set (fast
    /// propagation, useful for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.context.config().guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for OpenVoiceBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            let user_id = command.user.id.get();
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
                self.context.increment_counter("errors", Some(user_id)).await;
            }
        }
    }

    /// Mensajes directos, o menciones en canales, se convierten en audio
    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let bot_id = ctx.cache.current_user().id;
        let is_direct = msg.guild_id.is_none();
        if !is_direct && !msg.mentions_user_id(bot_id) {
            return;
        }

        let text = handlers::speech_text(&msg.content, bot_id.get());
        if text.is_empty() {
            debug!("Mensaje vacío de {}, ignorado", msg.author.name);
            return;
        }

        if let Err(e) = handlers::handle_message(&ctx, &msg, &text, self).await {
            error!("Error procesando mensaje de {}: {:?}", msg.author.name, e);
            self.context.increment_counter("errors", Some(msg.author.id.get())).await;
        }
    }
}
