use chrono::{DateTime, Utc};
use serenity::model::id::UserId;

/// Un track resuelto y listo para reproducir.
///
/// Inmutable una vez creado: lo produce el resolver y lo consume el sink.
#[derive(Debug, Clone)]
pub struct Track {
    /// URL directa del stream de audio.
    pub stream_url: String,
    /// Título para mostrar al usuario.
    pub title: String,
    /// URL de la página original (YouTube, etc.).
    pub source_url: Option<String>,
    /// Usuario que pidió el track.
    pub requested_by: UserId,
    #[allow(dead_code)]
    pub enqueued_at: DateTime<Utc>,
}

impl Track {
    pub fn new(stream_url: impl Into<String>, title: impl Into<String>, requested_by: UserId) -> Self {
        Self {
            stream_url: stream_url.into(),
            title: title.into(),
            source_url: None,
            requested_by,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_source_url(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = Some(source_url.into());
        self
    }
}
