use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::GuildId;
use songbird::{
    input::{HttpRequest, Input},
    tracks::TrackHandle,
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::{sequencer::CompletionSender, track::Track},
    error::PlaybackError,
};

/// Seam de salida de audio por guild.
///
/// El contrato de finalización es estricto: por cada `start` exitoso, `done`
/// se dispara exactamente una vez cuando el track termina, ya sea de forma
/// natural, por `stop` o por error de transporte.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Inicia la reproducción de un track en la sesión de voz del guild.
    async fn start(
        &self,
        guild_id: GuildId,
        track: &Track,
        done: CompletionSender,
    ) -> Result<(), PlaybackError>;

    /// Pausa el track activo. Sin efecto si no hay ninguno.
    async fn pause(&self, guild_id: GuildId);

    /// Reanuda el track pausado. Sin efecto si no hay ninguno.
    async fn resume(&self, guild_id: GuildId);

    /// Detiene el track activo; la señal de fin sigue llegando por `done`.
    async fn stop(&self, guild_id: GuildId);

    /// Libera la sesión de voz del guild. Idempotente.
    async fn release(&self, guild_id: GuildId);
}

/// Implementación de producción sobre Songbird.
///
/// El input se construye desde la URL de stream ya resuelta, con un cliente
/// reqwest compartido. Los eventos de fin y error del track reenvían la
/// señal de finalización al mailbox del sequencer.
pub struct SongbirdSink {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    current: DashMap<GuildId, TrackHandle>,
    default_volume: f32,
}

impl SongbirdSink {
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, default_volume: f32) -> Self {
        Self {
            manager,
            http,
            current: DashMap::new(),
            default_volume,
        }
    }
}

#[async_trait]
impl PlaybackSink for SongbirdSink {
    async fn start(
        &self,
        guild_id: GuildId,
        track: &Track,
        done: CompletionSender,
    ) -> Result<(), PlaybackError> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or(PlaybackError::NotConnected)?;

        let input = Input::from(HttpRequest::new(
            self.http.clone(),
            track.stream_url.clone(),
        ));

        let mut call_lock = call.lock().await;
        let handle = call_lock.play_input(input);
        let _ = handle.set_volume(self.default_volume);

        handle
            .add_event(
                Event::Track(TrackEvent::End),
                TrackEndNotifier {
                    done: done.clone(),
                    title: track.title.clone(),
                },
            )
            .map_err(|e| PlaybackError::Sink(format!("track end event: {e}")))?;

        handle
            .add_event(
                Event::Track(TrackEvent::Error),
                TrackErrorNotifier {
                    done,
                    title: track.title.clone(),
                },
            )
            .map_err(|e| PlaybackError::Sink(format!("track error event: {e}")))?;

        self.current.insert(guild_id, handle);
        info!("🎵 Track iniciado en guild {}: {}", guild_id, track.title);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) {
        if let Some(handle) = self.current.get(&guild_id) {
            let _ = handle.pause();
            info!("⏸️ Reproducción pausada en guild {}", guild_id);
        }
    }

    async fn resume(&self, guild_id: GuildId) {
        if let Some(handle) = self.current.get(&guild_id) {
            let _ = handle.play();
            info!("▶️ Reproducción reanudada en guild {}", guild_id);
        }
    }

    async fn stop(&self, guild_id: GuildId) {
        if let Some((_, handle)) = self.current.remove(&guild_id) {
            let _ = handle.stop();
            debug!("⏹️ Track activo detenido en guild {}", guild_id);
        }
    }

    async fn release(&self, guild_id: GuildId) {
        self.current.remove(&guild_id);

        if self.manager.get(guild_id).is_some() {
            if let Err(e) = self.manager.remove(guild_id).await {
                warn!("Error al liberar sesión de voz en {}: {:?}", guild_id, e);
            } else {
                info!("👋 Sesión de voz liberada en guild {}", guild_id);
            }
        }
    }
}

/// Reenvía el fin natural del track al mailbox del guild.
struct TrackEndNotifier {
    done: CompletionSender,
    title: String,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        debug!("🎵 Track terminó: {}", self.title);
        self.done.notify(None);
        None
    }
}

/// Reenvía un error de transporte como señal de fin con detalle.
struct TrackErrorNotifier {
    done: CompletionSender,
    title: String,
}

#[async_trait]
impl VoiceEventHandler for TrackErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut detail = String::from("transport error");
        if let EventContext::Track(track_list) = ctx {
            if let Some((state, _)) = track_list.first() {
                detail = format!("transport error, state: {:?}", state.playing);
            }
        }
        warn!("❌ Error en track '{}': {}", self.title, detail);
        self.done.notify(Some(detail));
        None
    }
}
