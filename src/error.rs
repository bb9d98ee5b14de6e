use thiserror::Error;

/// Errores de reproducción visibles para el usuario.
///
/// Cada variante es terminal solo para la petición que la provocó: se
/// reporta como texto al solicitante y nunca tumba el sequencer del guild.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// El resolver no encontró ningún track para la búsqueda.
    #[error("No results found.")]
    NoResults,

    /// Fallo de transporte/extracción en el resolver.
    #[error("Failed to resolve track: {0}")]
    Resolver(String),

    /// El usuario que invocó el comando no está en un canal de voz.
    #[error("You need to be in a voice channel to use this command.")]
    NotInVoiceChannel,

    /// La operación requiere un track activo o pendiente y no hay ninguno.
    #[error("No audio is currently playing.")]
    EmptyQueue,

    /// La operación requiere una sesión de voz existente.
    #[error("Not connected to a voice channel.")]
    NotConnected,

    /// El sink de audio no pudo iniciar el track.
    #[error("Failed to start playback: {0}")]
    Sink(String),
}

impl PlaybackError {
    /// Texto de respuesta para el solicitante.
    pub fn user_message(&self) -> String {
        self.to_string()
    }
}
