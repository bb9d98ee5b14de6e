use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod error;
mod sources;

use crate::audio::{QueueStore, Sequencer, SongbirdSink};
use crate::bot::CadenceBot;
use crate::config::Config;
use crate::sources::YtDlpResolver;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("cadence_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Cadence v{}", env!("CARGO_PKG_VERSION"));

    // Cargar configuración
    let config = Config::load()?;

    let resolver = Arc::new(YtDlpResolver::new(
        config.ytdlp_bin.clone(),
        config.resolve_timeout(),
    ));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        resolver.verify_available().await?;
        println!("OK");
        return Ok(());
    }

    if let Err(e) = resolver.verify_available().await {
        warn!("⚠️ yt-dlp no disponible al arrancar: {:?}", e);
    }

    // Núcleo de reproducción
    let songbird = Songbird::serenity();
    let http = reqwest::Client::new();
    let sink = Arc::new(SongbirdSink::new(
        songbird.clone(),
        http,
        config.default_volume,
    ));
    let store = Arc::new(QueueStore::new());
    let sequencer = Arc::new(Sequencer::new(
        store,
        resolver,
        sink,
        config.max_queue_size,
    ));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    // Crear handler del bot
    let handler = CadenceBot::new(config.clone(), sequencer, songbird.clone());

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        std::process::exit(0);
    });

    // Iniciar bot
    info!("🚀 Bot iniciado");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
