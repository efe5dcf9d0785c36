use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use std::sync::Arc;
use tracing::{error, info, warn};

use open_voice::bot::OpenVoiceBot;
use open_voice::config::Config;
use open_voice::context::{AppContext, StorageMode};

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar configuración (incluye .env)
    let config = Config::load()?;

    // Inicializar logging
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in config.log_directives() {
        filter = filter.add_directive(directive.parse()?);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(!config.is_production())
        .init();

    info!("🎙️ Iniciando Open Voice v{} ({})", env!("CARGO_PKG_VERSION"), config.environment);
    info!("{}", config.summary());

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(config).await;
    }

    let context = Arc::new(AppContext::start(config.clone()).await?);
    if context.storage_mode() == StorageMode::InMemory {
        warn!("⚠️ Modo degradado: preferencias en memoria y sin rate limiting");
    }

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = OpenVoiceBot::new(context.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let shutdown_context = context.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown_context.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    context.shutdown().await;
    info!("👋 Open Voice detenido");

    Ok(())
}

async fn health_check(config: Config) -> Result<()> {
    let store_required = config.redis_url.is_some();
    let context = AppContext::start(config).await?;

    let healthy = context.health_check().await;
    context.shutdown().await;

    if healthy {
        println!("OK ({})", context.backend_name());
        Ok(())
    } else if !store_required {
        println!("OK (sin store)");
        Ok(())
    } else {
        anyhow::bail!("Store no disponible");
    }
}
