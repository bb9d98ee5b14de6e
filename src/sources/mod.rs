pub mod ytdlp;

pub use ytdlp::YtDlpResolver;

use anyhow::Result;
use async_trait::async_trait;

/// Track devuelto por el resolver, todavía sin solicitante ni timestamp.
#[derive(Debug, Clone)]
pub struct ResolvedTrack {
    /// URL directa del stream de audio.
    pub stream_url: String,
    pub title: String,
    /// URL de la página original, si la fuente la expone.
    pub source_url: Option<String>,
}

/// Seam del buscador/extractor externo de tracks.
///
/// `Ok(None)` significa búsqueda sin resultados; `Err` es un fallo de
/// transporte o extracción. Ninguno de los dos muta la cola del guild.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Resuelve una búsqueda libre o una URL a cero o un track reproducible.
    async fn resolve(&self, query: &str) -> Result<Option<ResolvedTrack>>;
}
