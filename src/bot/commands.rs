use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Nombres de los comandos slash
pub const HELP: &str = "help";
pub const VOICES: &str = "voices";
pub const SET_VOICE: &str = "setvoice";
pub const RESET_VOICE: &str = "resetvoice";
pub const SETTINGS: &str = "settings";
pub const STATS: &str = "stats";

/// Opción de `/setvoice`
pub const VOICE_NAME_OPTION: &str = "name";

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        help_command(),
        voices_command(),
        setvoice_command(),
        resetvoice_command(),
        settings_command(),
        stats_command(),
    ]
}

fn help_command() -> CreateCommand {
    CreateCommand::new(HELP).description("Muestra cómo usar el bot")
}

// Comandos de voz

fn voices_command() -> CreateCommand {
    CreateCommand::new(VOICES).description("Lista las voces disponibles")
}

fn setvoice_command() -> CreateCommand {
    CreateCommand::new(SET_VOICE)
        .description("Cambia la voz usada para tus mensajes")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, VOICE_NAME_OPTION, "Nombre de la voz (ver /voices)")
                .required(true),
        )
}

fn resetvoice_command() -> CreateCommand {
    CreateCommand::new(RESET_VOICE).description("Vuelve a la voz por defecto")
}

// Comandos de información

fn settings_command() -> CreateCommand {
    CreateCommand::new(SETTINGS).description("Muestra tu configuración actual")
}

fn stats_command() -> CreateCommand {
    CreateCommand::new(STATS).description("Muestra estadísticas de uso del bot")
}
