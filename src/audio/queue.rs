use dashmap::DashMap;
use parking_lot::RwLock;
use serenity::model::id::GuildId;
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, info};

use crate::audio::track::Track;

/// Almacén de colas de reproducción por guild.
///
/// Dueño exclusivo de todas las colas pendientes: ningún otro componente
/// las muta directamente. Una entrada ausente se comporta igual que una
/// cola vacía. Las mutaciones sobre la cola de un mismo guild son atómicas
/// entre sí; las de guilds distintos no se bloquean mutuamente.
#[derive(Debug, Default)]
pub struct QueueStore {
    queues: DashMap<GuildId, Arc<RwLock<VecDeque<Track>>>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    /// Agrega un track al final de la cola del guild.
    ///
    /// Crea la cola si no existe. Devuelve la longitud resultante.
    pub fn enqueue(&self, guild_id: GuildId, track: Track) -> usize {
        let queue = self.get_or_create(guild_id);
        let mut q = queue.write();
        info!("➕ Agregado a la cola de {}: {}", guild_id, track.title);
        q.push_back(track);
        q.len()
    }

    /// Quita y devuelve el primer track de la cola (estricto FIFO).
    pub fn dequeue_next(&self, guild_id: GuildId) -> Option<Track> {
        let queue = self.queues.get(&guild_id)?;
        let mut q = queue.write();
        let next = q.pop_front();
        match &next {
            Some(track) => info!("➡️ Siguiente en cola de {}: {}", guild_id, track.title),
            None => debug!("📭 Cola vacía para guild {}", guild_id),
        }
        next
    }

    /// Vacía la cola del guild. Idempotente.
    pub fn clear(&self, guild_id: GuildId) {
        if let Some(queue) = self.queues.get(&guild_id) {
            let mut q = queue.write();
            if !q.is_empty() {
                info!("🗑️ Cola de {} limpiada ({} tracks)", guild_id, q.len());
            }
            q.clear();
        }
    }

    /// Elimina la entrada del guild por completo (desconexión).
    pub fn remove_guild(&self, guild_id: GuildId) {
        self.queues.remove(&guild_id);
    }

    #[allow(dead_code)]
    pub fn is_empty(&self, guild_id: GuildId) -> bool {
        self.queues
            .get(&guild_id)
            .map(|queue| queue.read().is_empty())
            .unwrap_or(true)
    }

    pub fn len(&self, guild_id: GuildId) -> usize {
        self.queues
            .get(&guild_id)
            .map(|queue| queue.read().len())
            .unwrap_or(0)
    }

    /// Copia del contenido pendiente, en orden, para el comando /queue.
    pub fn snapshot(&self, guild_id: GuildId) -> Vec<Track> {
        self.queues
            .get(&guild_id)
            .map(|queue| queue.read().iter().cloned().collect())
            .unwrap_or_default()
    }

    fn get_or_create(&self, guild_id: GuildId) -> Arc<RwLock<VecDeque<Track>>> {
        self.queues
            .entry(guild_id)
            .or_insert_with(|| Arc::new(RwLock::new(VecDeque::new())))
            .clone()
    }
}
