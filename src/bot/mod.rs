//! # Bot Module
//!
//! Capa de pegamento con Discord: registro de comandos slash, despacho de
//! interacciones y gestión de la conexión de voz. Toda la lógica de cola y
//! reproducción vive en [`crate::audio`]; aquí solo se traducen comandos a
//! operaciones del sequencer y resultados a texto plano.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{audio::Sequencer, config::Config, error::PlaybackError};

/// Handler principal del bot.
///
/// Implementa [`EventHandler`] de Serenity. Mantiene el sequencer
/// compartido y el manager de Songbird para unirse y salir de canales de
/// voz; el estado de reproducción por guild es propiedad del sequencer.
pub struct CadenceBot {
    config: Arc<Config>,
    pub sequencer: Arc<Sequencer>,
    manager: Arc<Songbird>,
}

impl CadenceBot {
    pub fn new(config: Config, sequencer: Arc<Sequencer>, manager: Arc<Songbird>) -> Self {
        Self {
            config: Arc::new(config),
            sequencer,
            manager,
        }
    }

    /// Registra los comandos slash, globales o por guild según configuración.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::from(guild_id);
                info!("🏠 Registrando comandos para guild de desarrollo: {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await?;
            }
        }

        Ok(())
    }

    /// Conecta el bot a un canal de voz del guild.
    pub async fn join_voice_channel(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<(), PlaybackError> {
        match self.manager.join(guild_id, channel_id).await {
            Ok(_call) => {
                info!("🔊 Conectado al canal de voz en guild {}", guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al conectar al canal de voz en {}: {:?}", guild_id, e);
                Err(PlaybackError::NotConnected)
            }
        }
    }

    /// Hay una sesión de voz activa para el guild.
    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.manager.get(guild_id).is_some()
    }
}

#[async_trait]
impl EventHandler for CadenceBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Si el bot es desconectado del canal de voz desde fuera (kick, cierre
    /// del canal), el estado de reproducción del guild se limpia para no
    /// dejar la cola colgada.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        if old.is_some() && new.channel_id.is_none() {
            if let Some(guild_id) = new.guild_id {
                warn!("🔌 Bot desconectado del canal de voz en guild {}", guild_id);
                self.sequencer.stop(guild_id).await;
            }
        }
    }
}
