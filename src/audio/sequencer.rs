use dashmap::DashMap;
use serenity::model::id::{GuildId, UserId};
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::{
    audio::{queue::QueueStore, sink::PlaybackSink, track::Track},
    error::PlaybackError,
    sources::TrackResolver,
};

/// Estado de reproducción explícito por guild.
///
/// La fase de resolución es transitoria y vive dentro de la petición de
/// play, fuera del mailbox; el estado del guild solo distingue si hay un
/// track activo y si está pausado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing { session: u64 },
    Paused { session: u64 },
}

/// Resultado de una petición de play, para el texto de respuesta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayOutcome {
    /// No había nada sonando: el track arrancó de inmediato.
    Started { title: String },
    /// Ya había un track activo: quedó en cola en la posición dada.
    Queued { title: String, position: usize },
    /// La cola alcanzó su tamaño máximo.
    QueueFull { max: usize },
    /// La resolución terminó después de un stop; el resultado se descarta.
    Discarded,
}

/// Evento serializado en el mailbox de un guild.
///
/// Todo lo que muta la cola o el estado de un guild entra por aquí,
/// incluida la señal de fin del sink: nunca hay dos mutaciones en carrera
/// para el mismo guild.
enum GuildEvent {
    Enqueue {
        track: Track,
        epoch: u64,
        reply: oneshot::Sender<Result<PlayOutcome, PlaybackError>>,
    },
    TrackEnded {
        session: u64,
        error: Option<String>,
    },
    Skip {
        reply: oneshot::Sender<bool>,
    },
    Pause {
        reply: oneshot::Sender<bool>,
    },
    Resume {
        reply: oneshot::Sender<bool>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    QueryNowPlaying {
        reply: oneshot::Sender<Option<Track>>,
    },
    QueryState {
        reply: oneshot::Sender<PlaybackState>,
    },
}

/// Canal de finalización que el sink dispara al terminar un track.
///
/// Garantiza como máximo una notificación aunque el sink emita fin y error
/// para el mismo track; la señal entra al mailbox del guild como un evento
/// más, nunca como mutación directa.
#[derive(Debug, Clone)]
pub struct CompletionSender {
    tx: mpsc::UnboundedSender<GuildEvent>,
    session: u64,
    fired: Arc<AtomicBool>,
}

impl CompletionSender {
    fn new(tx: mpsc::UnboundedSender<GuildEvent>, session: u64) -> Self {
        Self {
            tx,
            session,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Notifica el fin del track. Solo la primera llamada tiene efecto.
    pub fn notify(&self, error: Option<String>) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(GuildEvent::TrackEnded {
            session: self.session,
            error,
        });
    }
}

#[derive(Clone)]
struct GuildMailbox {
    tx: mpsc::UnboundedSender<GuildEvent>,
    epoch: Arc<AtomicU64>,
}

/// Sequencer de reproducción: un worker serializado por guild.
///
/// Cada guild tiene un task propio que consume su mailbox en orden de
/// llegada, de modo que enqueue, skip, stop y las señales de fin nunca se
/// entrelazan para el mismo guild. Guilds distintos avanzan en paralelo.
pub struct Sequencer {
    store: Arc<QueueStore>,
    resolver: Arc<dyn TrackResolver>,
    sink: Arc<dyn PlaybackSink>,
    guilds: DashMap<GuildId, GuildMailbox>,
    max_queue_size: usize,
}

impl Sequencer {
    pub fn new(
        store: Arc<QueueStore>,
        resolver: Arc<dyn TrackResolver>,
        sink: Arc<dyn PlaybackSink>,
        max_queue_size: usize,
    ) -> Self {
        Self {
            store,
            resolver,
            sink,
            guilds: DashMap::new(),
            max_queue_size,
        }
    }

    /// Resuelve una búsqueda y la encola en el guild.
    ///
    /// La resolución corre fuera del mailbox y no bloquea los eventos del
    /// guild ni los de otros guilds; el resultado se reincorpora a la
    /// serialización como un evento `Enqueue`. Un fallo del resolver no
    /// muta la cola.
    pub async fn play(
        &self,
        guild_id: GuildId,
        query: &str,
        requested_by: UserId,
    ) -> Result<PlayOutcome, PlaybackError> {
        let mailbox = self.mailbox(guild_id);
        let epoch = mailbox.epoch.load(Ordering::SeqCst);

        let resolved = self
            .resolver
            .resolve(query)
            .await
            .map_err(|e| PlaybackError::Resolver(e.to_string()))?
            .ok_or(PlaybackError::NoResults)?;

        let mut track = Track::new(resolved.stream_url, resolved.title, requested_by);
        if let Some(source_url) = resolved.source_url {
            track = track.with_source_url(source_url);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        mailbox
            .tx
            .send(GuildEvent::Enqueue {
                track,
                epoch,
                reply: reply_tx,
            })
            .map_err(|_| PlaybackError::Sink("sequencer mailbox closed".into()))?;

        reply_rx
            .await
            .map_err(|_| PlaybackError::Sink("sequencer dropped the request".into()))?
    }

    /// Salta el track activo. Devuelve `false` si no había nada sonando.
    pub async fn skip(&self, guild_id: GuildId) -> bool {
        let Some(mailbox) = self.existing_mailbox(guild_id) else {
            return false;
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if mailbox
            .tx
            .send(GuildEvent::Skip { reply: reply_tx })
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Pausa el track activo. Devuelve `false` si no había nada sonando.
    pub async fn pause(&self, guild_id: GuildId) -> bool {
        let Some(mailbox) = self.existing_mailbox(guild_id) else {
            return false;
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if mailbox
            .tx
            .send(GuildEvent::Pause { reply: reply_tx })
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Reanuda el track pausado. Devuelve `false` si no había nada pausado.
    pub async fn resume(&self, guild_id: GuildId) -> bool {
        let Some(mailbox) = self.existing_mailbox(guild_id) else {
            return false;
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if mailbox
            .tx
            .send(GuildEvent::Resume { reply: reply_tx })
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Limpia la cola, detiene la reproducción y libera la sesión de voz.
    /// Idempotente, válido desde cualquier estado.
    pub async fn stop(&self, guild_id: GuildId) {
        let Some(mailbox) = self.existing_mailbox(guild_id) else {
            // Sin worker no hay estado que limpiar, solo la cola por si acaso
            self.store.clear(guild_id);
            return;
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if mailbox
            .tx
            .send(GuildEvent::Stop { reply: reply_tx })
            .is_ok()
        {
            let _ = reply_rx.await;
        }
    }

    /// Track activo del guild, si hay alguno.
    pub async fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        let mailbox = self.existing_mailbox(guild_id)?;
        let (reply_tx, reply_rx) = oneshot::channel();
        mailbox
            .tx
            .send(GuildEvent::QueryNowPlaying { reply: reply_tx })
            .ok()?;
        reply_rx.await.ok().flatten()
    }

    /// Estado de reproducción actual del guild.
    #[allow(dead_code)]
    pub async fn state(&self, guild_id: GuildId) -> PlaybackState {
        let Some(mailbox) = self.existing_mailbox(guild_id) else {
            return PlaybackState::Idle;
        };
        let (reply_tx, reply_rx) = oneshot::channel();
        if mailbox
            .tx
            .send(GuildEvent::QueryState { reply: reply_tx })
            .is_err()
        {
            return PlaybackState::Idle;
        }
        reply_rx.await.unwrap_or(PlaybackState::Idle)
    }

    /// Copia de la cola pendiente, para el comando /queue.
    pub fn queue_snapshot(&self, guild_id: GuildId) -> Vec<Track> {
        self.store.snapshot(guild_id)
    }

    fn mailbox(&self, guild_id: GuildId) -> GuildMailbox {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                let epoch = Arc::new(AtomicU64::new(0));
                let worker = GuildWorker {
                    guild_id,
                    store: self.store.clone(),
                    sink: self.sink.clone(),
                    tx: tx.clone(),
                    epoch: epoch.clone(),
                    max_queue_size: self.max_queue_size,
                    state: PlaybackState::Idle,
                    current: None,
                    next_session: 0,
                };
                tokio::spawn(worker.run(rx));
                debug!("Worker de sequencer creado para guild {}", guild_id);
                GuildMailbox { tx, epoch }
            })
            .clone()
    }

    fn existing_mailbox(&self, guild_id: GuildId) -> Option<GuildMailbox> {
        self.guilds.get(&guild_id).map(|m| m.clone())
    }
}

/// Worker serializado de un guild: dueño transitorio del estado activo.
struct GuildWorker {
    guild_id: GuildId,
    store: Arc<QueueStore>,
    sink: Arc<dyn PlaybackSink>,
    tx: mpsc::UnboundedSender<GuildEvent>,
    epoch: Arc<AtomicU64>,
    max_queue_size: usize,
    state: PlaybackState,
    current: Option<Track>,
    next_session: u64,
}

impl GuildWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<GuildEvent>) {
        while let Some(event) = rx.recv().await {
            self.handle(event).await;
        }
        debug!("Mailbox cerrado, worker de {} termina", self.guild_id);
    }

    async fn handle(&mut self, event: GuildEvent) {
        match event {
            GuildEvent::Enqueue {
                track,
                epoch,
                reply,
            } => {
                if epoch != self.epoch.load(Ordering::SeqCst) {
                    // La cola fue limpiada mientras se resolvía: descartar
                    debug!(
                        "🗑️ Resultado de resolver descartado tras stop en {}: {}",
                        self.guild_id, track.title
                    );
                    let _ = reply.send(Ok(PlayOutcome::Discarded));
                    return;
                }

                if self.store.len(self.guild_id) >= self.max_queue_size {
                    let _ = reply.send(Ok(PlayOutcome::QueueFull {
                        max: self.max_queue_size,
                    }));
                    return;
                }

                let title = track.title.clone();
                let position = self.store.enqueue(self.guild_id, track);

                let outcome = if self.state == PlaybackState::Idle {
                    match self.start_next().await {
                        Some(started) => Ok(PlayOutcome::Started {
                            title: started.title,
                        }),
                        None => Err(PlaybackError::Sink(
                            "no pending track could be started".into(),
                        )),
                    }
                } else {
                    Ok(PlayOutcome::Queued { title, position })
                };
                let _ = reply.send(outcome);
            }

            GuildEvent::TrackEnded { session, error } => {
                let active = match self.state {
                    PlaybackState::Playing { session } | PlaybackState::Paused { session } => {
                        Some(session)
                    }
                    PlaybackState::Idle => None,
                };
                if active != Some(session) {
                    // Señal de un track ya reemplazado o detenido
                    debug!(
                        "Señal de fin obsoleta ignorada en {} (sesión {})",
                        self.guild_id, session
                    );
                    return;
                }

                match error {
                    Some(e) => warn!(
                        "⚠️ Track terminó con error en {}: {} — avanzando",
                        self.guild_id, e
                    ),
                    None => debug!("Track terminó en {}", self.guild_id),
                }

                self.current = None;
                self.start_next().await;
            }

            GuildEvent::Skip { reply } => {
                let applied = self.state != PlaybackState::Idle;
                if applied {
                    info!("⏭️ Saltando track en {}", self.guild_id);
                    // El avance llega por la señal de fin del sink
                    self.sink.stop(self.guild_id).await;
                }
                let _ = reply.send(applied);
            }

            GuildEvent::Pause { reply } => {
                let applied = match self.state {
                    PlaybackState::Playing { session } => {
                        self.sink.pause(self.guild_id).await;
                        self.state = PlaybackState::Paused { session };
                        true
                    }
                    _ => false,
                };
                let _ = reply.send(applied);
            }

            GuildEvent::Resume { reply } => {
                let applied = match self.state {
                    PlaybackState::Paused { session } => {
                        self.sink.resume(self.guild_id).await;
                        self.state = PlaybackState::Playing { session };
                        true
                    }
                    _ => false,
                };
                let _ = reply.send(applied);
            }

            GuildEvent::Stop { reply } => {
                // Invalida cualquier resolución en vuelo para este guild
                self.epoch.fetch_add(1, Ordering::SeqCst);
                self.store.remove_guild(self.guild_id);

                if self.state != PlaybackState::Idle {
                    self.sink.stop(self.guild_id).await;
                }
                self.state = PlaybackState::Idle;
                self.current = None;
                self.sink.release(self.guild_id).await;

                info!("⏹️ Reproducción detenida en {}", self.guild_id);
                let _ = reply.send(());
            }

            GuildEvent::QueryNowPlaying { reply } => {
                let _ = reply.send(self.current.clone());
            }

            GuildEvent::QueryState { reply } => {
                let _ = reply.send(self.state);
            }
        }
    }

    /// Saca el siguiente track de la cola y lo arranca en el sink.
    ///
    /// Un track que no puede iniciarse se salta con warning y se sigue
    /// avanzando; con la cola vacía el guild vuelve a `Idle` y se libera
    /// la sesión de voz.
    async fn start_next(&mut self) -> Option<Track> {
        loop {
            let Some(track) = self.store.dequeue_next(self.guild_id) else {
                self.state = PlaybackState::Idle;
                self.current = None;
                self.sink.release(self.guild_id).await;
                debug!("📭 Cola agotada en {}, volviendo a Idle", self.guild_id);
                return None;
            };

            let session = self.next_session;
            self.next_session += 1;
            let done = CompletionSender::new(self.tx.clone(), session);

            match self.sink.start(self.guild_id, &track, done).await {
                Ok(()) => {
                    info!("▶️ Reproduciendo en {}: {}", self.guild_id, track.title);
                    self.state = PlaybackState::Playing { session };
                    self.current = Some(track.clone());
                    return Some(track);
                }
                Err(e) => {
                    warn!(
                        "⚠️ No se pudo iniciar '{}' en {}: {} — saltando",
                        track.title, self.guild_id, e
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MockTrackResolver, ResolvedTrack, TrackResolver};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicUsize, Ordering},
    };
    use tokio::sync::Notify;

    const GUILD: GuildId = GuildId::new(99);
    const USER: UserId = UserId::new(7);

    /// Sink de prueba que registra llamadas y deja disparar las señales de
    /// fin a mano, o automáticamente al hacer stop (como songbird).
    #[derive(Default)]
    struct RecordingSink {
        started: Mutex<Vec<(Track, CompletionSender)>>,
        attempts: Mutex<Vec<String>>,
        failing: Mutex<HashSet<String>>,
        stops: AtomicUsize,
        pauses: AtomicUsize,
        resumes: AtomicUsize,
        releases: AtomicUsize,
        complete_on_stop: AtomicBool,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn completing_on_stop() -> Arc<Self> {
            let sink = Self::default();
            sink.complete_on_stop.store(true, Ordering::SeqCst);
            Arc::new(sink)
        }

        fn fail_title(&self, title: &str) {
            self.failing.lock().insert(title.to_string());
        }

        fn started_titles(&self) -> Vec<String> {
            self.started
                .lock()
                .iter()
                .map(|(t, _)| t.title.clone())
                .collect()
        }

        /// Dispara la señal de fin del n-ésimo track iniciado.
        fn complete(&self, index: usize, error: Option<String>) {
            let started = self.started.lock();
            started[index].1.notify(error);
        }
    }

    #[async_trait]
    impl PlaybackSink for RecordingSink {
        async fn start(
            &self,
            _guild_id: GuildId,
            track: &Track,
            done: CompletionSender,
        ) -> Result<(), PlaybackError> {
            self.attempts.lock().push(track.title.clone());
            if self.failing.lock().contains(&track.title) {
                return Err(PlaybackError::Sink("stream rechazado".into()));
            }
            self.started.lock().push((track.clone(), done));
            Ok(())
        }

        async fn pause(&self, _guild_id: GuildId) {
            self.pauses.fetch_add(1, Ordering::SeqCst);
        }

        async fn resume(&self, _guild_id: GuildId) {
            self.resumes.fetch_add(1, Ordering::SeqCst);
        }

        async fn stop(&self, _guild_id: GuildId) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            if self.complete_on_stop.load(Ordering::SeqCst) {
                if let Some((_, done)) = self.started.lock().last() {
                    done.notify(None);
                }
            }
        }

        async fn release(&self, _guild_id: GuildId) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Resolver que no responde hasta que el test lo libera.
    struct GatedResolver {
        entered: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl TrackResolver for GatedResolver {
        async fn resolve(&self, query: &str) -> anyhow::Result<Option<ResolvedTrack>> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Some(ResolvedTrack {
                stream_url: format!("https://cdn.example/{query}"),
                title: query.to_string(),
                source_url: None,
            }))
        }
    }

    fn echo_resolver() -> Arc<MockTrackResolver> {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|query| {
            Ok(Some(ResolvedTrack {
                stream_url: format!("https://cdn.example/{query}"),
                title: query.to_string(),
                source_url: Some(format!("https://video.example/{query}")),
            }))
        });
        Arc::new(resolver)
    }

    fn sequencer(
        resolver: Arc<dyn TrackResolver>,
        sink: Arc<RecordingSink>,
    ) -> (Arc<Sequencer>, Arc<QueueStore>) {
        let store = Arc::new(QueueStore::new());
        let seq = Arc::new(Sequencer::new(store.clone(), resolver, sink, 100));
        (seq, store)
    }

    #[tokio::test]
    async fn test_enqueue_while_idle_starts_immediately_and_queues_second() {
        let sink = RecordingSink::new();
        let (seq, store) = sequencer(echo_resolver(), sink.clone());

        let a = seq.play(GUILD, "track-a", USER).await.unwrap();
        assert_eq!(
            a,
            PlayOutcome::Started {
                title: "track-a".to_string()
            }
        );

        let b = seq.play(GUILD, "track-b", USER).await.unwrap();
        assert_eq!(
            b,
            PlayOutcome::Queued {
                title: "track-b".to_string(),
                position: 1
            }
        );

        // "A" suena, "B" espera en la cola
        assert_eq!(sink.started_titles(), vec!["track-a"]);
        assert_eq!(store.len(GUILD), 1);

        // Al terminar "A", "B" arranca solo
        sink.complete(0, None);
        assert_eq!(seq.now_playing(GUILD).await.unwrap().title, "track-b");
        assert_eq!(sink.started_titles(), vec!["track-a", "track-b"]);
        assert!(store.is_empty(GUILD));

        // Al terminar "B" con la cola vacía: Idle y sesión liberada
        sink.complete(1, None);
        assert_eq!(seq.state(GUILD).await, PlaybackState::Idle);
        assert!(seq.now_playing(GUILD).await.is_none());
        assert_eq!(sink.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_results_leaves_queue_untouched() {
        let mut resolver = MockTrackResolver::new();
        resolver.expect_resolve().returning(|_| Ok(None));
        let sink = RecordingSink::new();
        let (seq, store) = sequencer(Arc::new(resolver), sink.clone());

        let err = seq.play(GUILD, "nada", USER).await.unwrap_err();
        assert!(matches!(err, PlaybackError::NoResults));
        assert!(store.is_empty(GUILD));
        assert_eq!(seq.state(GUILD).await, PlaybackState::Idle);
        assert!(sink.started_titles().is_empty());
    }

    #[tokio::test]
    async fn test_resolver_failure_is_reported_not_fatal() {
        let mut resolver = MockTrackResolver::new();
        resolver
            .expect_resolve()
            .returning(|_| Err(anyhow::anyhow!("extractor caído")));
        let sink = RecordingSink::new();
        let (seq, store) = sequencer(Arc::new(resolver), sink);

        let err = seq.play(GUILD, "x", USER).await.unwrap_err();
        assert!(matches!(err, PlaybackError::Resolver(_)));
        assert!(store.is_empty(GUILD));
    }

    #[tokio::test]
    async fn test_pause_on_idle_is_noop() {
        let sink = RecordingSink::new();
        let (seq, _store) = sequencer(echo_resolver(), sink.clone());

        assert!(!seq.pause(GUILD).await);
        assert_eq!(seq.state(GUILD).await, PlaybackState::Idle);
        assert_eq!(sink.pauses.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_skip_on_idle_is_noop() {
        let sink = RecordingSink::new();
        let (seq, _store) = sequencer(echo_resolver(), sink.clone());

        assert!(!seq.skip(GUILD).await);
        assert_eq!(sink.stops.load(Ordering::SeqCst), 0);

        // Tampoco rompe el worker: un play posterior funciona
        let outcome = seq.play(GUILD, "a", USER).await.unwrap();
        assert_eq!(
            outcome,
            PlayOutcome::Started {
                title: "a".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_pause_resume_toggle() {
        let sink = RecordingSink::new();
        let (seq, _store) = sequencer(echo_resolver(), sink.clone());

        seq.play(GUILD, "a", USER).await.unwrap();

        assert!(seq.pause(GUILD).await);
        assert!(matches!(
            seq.state(GUILD).await,
            PlaybackState::Paused { .. }
        ));

        // Pausar dos veces no aplica; reanudar sí
        assert!(!seq.pause(GUILD).await);
        assert!(seq.resume(GUILD).await);
        assert!(matches!(
            seq.state(GUILD).await,
            PlaybackState::Playing { .. }
        ));
        assert!(!seq.resume(GUILD).await);

        assert_eq!(sink.pauses.load(Ordering::SeqCst), 1);
        assert_eq!(sink.resumes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_skip_advances_via_completion_signal() {
        let sink = RecordingSink::completing_on_stop();
        let (seq, _store) = sequencer(echo_resolver(), sink.clone());

        seq.play(GUILD, "a", USER).await.unwrap();
        seq.play(GUILD, "b", USER).await.unwrap();

        assert!(seq.skip(GUILD).await);
        assert_eq!(seq.now_playing(GUILD).await.unwrap().title, "b");
        assert_eq!(sink.started_titles(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_stop_clears_queue_and_releases_session() {
        let sink = RecordingSink::completing_on_stop();
        let (seq, store) = sequencer(echo_resolver(), sink.clone());

        seq.play(GUILD, "a", USER).await.unwrap();
        seq.play(GUILD, "b", USER).await.unwrap();
        seq.play(GUILD, "c", USER).await.unwrap();

        seq.stop(GUILD).await;

        assert!(store.is_empty(GUILD));
        assert_eq!(seq.state(GUILD).await, PlaybackState::Idle);
        assert!(seq.now_playing(GUILD).await.is_none());
        assert_eq!(sink.releases.load(Ordering::SeqCst), 1);

        // La señal de fin rezagada del track detenido no rearranca nada
        assert_eq!(sink.started_titles(), vec!["a"]);

        // stop repetido es inocuo
        seq.stop(GUILD).await;
        assert!(store.is_empty(GUILD));
    }

    #[tokio::test]
    async fn test_resolution_finished_after_stop_is_discarded() {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let resolver = Arc::new(GatedResolver {
            entered: entered.clone(),
            release: release.clone(),
        });
        let sink = RecordingSink::new();
        let (seq, store) = sequencer(resolver, sink.clone());

        let seq_clone = seq.clone();
        let pending = tokio::spawn(async move { seq_clone.play(GUILD, "tardio", USER).await });

        // Esperar a que la resolución esté en vuelo, limpiar, y soltarla
        entered.notified().await;
        seq.stop(GUILD).await;
        release.notify_one();

        let outcome = pending.await.unwrap().unwrap();
        assert_eq!(outcome, PlayOutcome::Discarded);
        assert!(store.is_empty(GUILD));
        assert!(sink.started_titles().is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_skips_and_advances() {
        let sink = RecordingSink::new();
        sink.fail_title("mala");
        let (seq, store) = sequencer(echo_resolver(), sink.clone());

        seq.play(GUILD, "a", USER).await.unwrap();
        seq.play(GUILD, "mala", USER).await.unwrap();
        seq.play(GUILD, "buena", USER).await.unwrap();

        // Al terminar "a", el worker salta "mala" y arranca "buena"
        sink.complete(0, None);
        assert_eq!(seq.now_playing(GUILD).await.unwrap().title, "buena");
        assert_eq!(
            *sink.attempts.lock(),
            vec!["a", "mala", "buena"],
            "el track defectuoso se intenta y se salta"
        );
        assert!(store.is_empty(GUILD));
    }

    #[tokio::test]
    async fn test_transport_error_advances_like_completion() {
        let sink = RecordingSink::new();
        let (seq, _store) = sequencer(echo_resolver(), sink.clone());

        seq.play(GUILD, "a", USER).await.unwrap();
        seq.play(GUILD, "b", USER).await.unwrap();

        sink.complete(0, Some("conexión perdida".to_string()));
        assert_eq!(seq.now_playing(GUILD).await.unwrap().title, "b");
    }

    #[tokio::test]
    async fn test_only_queue_full_when_at_capacity() {
        let sink = RecordingSink::new();
        let store = Arc::new(QueueStore::new());
        let seq = Arc::new(Sequencer::new(
            store.clone(),
            echo_resolver(),
            sink.clone(),
            2,
        ));

        seq.play(GUILD, "a", USER).await.unwrap(); // suena
        seq.play(GUILD, "b", USER).await.unwrap(); // posición 1
        seq.play(GUILD, "c", USER).await.unwrap(); // posición 2

        let full = seq.play(GUILD, "d", USER).await.unwrap();
        assert_eq!(full, PlayOutcome::QueueFull { max: 2 });
        assert_eq!(store.len(GUILD), 2);
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_with_one_completion() {
        let sink = RecordingSink::new();
        let (seq, store) = sequencer(echo_resolver(), sink.clone());

        let mut handles = Vec::new();
        for i in 0..100 {
            let seq = seq.clone();
            handles.push(tokio::spawn(async move {
                seq.play(GUILD, &format!("track-{i}"), USER).await.unwrap()
            }));
        }

        let mut started = 0;
        let mut queued = 0;
        for handle in handles {
            match handle.await.unwrap() {
                PlayOutcome::Started { .. } => started += 1,
                PlayOutcome::Queued { .. } => queued += 1,
                other => panic!("resultado inesperado: {other:?}"),
            }
        }
        assert_eq!(started, 1);
        assert_eq!(queued, 99);
        assert_eq!(store.len(GUILD), 99);

        // Un fin de track avanza exactamente una posición
        sink.complete(0, None);
        assert!(seq.now_playing(GUILD).await.is_some());
        assert_eq!(store.len(GUILD), 98);
        assert_eq!(sink.started_titles().len(), 2);
    }

    #[tokio::test]
    async fn test_guilds_advance_independently() {
        let sink = RecordingSink::new();
        let (seq, store) = sequencer(echo_resolver(), sink.clone());
        let other = GuildId::new(100);

        seq.play(GUILD, "a", USER).await.unwrap();
        seq.play(other, "x", USER).await.unwrap();
        seq.play(other, "y", USER).await.unwrap();

        seq.stop(GUILD).await;

        // El stop de un guild no toca al otro
        assert_eq!(seq.now_playing(other).await.unwrap().title, "x");
        assert_eq!(store.len(other), 1);
    }
}
