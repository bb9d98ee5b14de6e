//! Núcleo de reproducción: cola por guild, sequencer y seam del sink.
//!
//! El flujo es siempre el mismo: un comando resuelve un track, el track
//! entra al [`QueueStore`] a través del mailbox serializado del
//! [`Sequencer`], y el [`PlaybackSink`] lo reproduce notificando el fin
//! como un evento más del mailbox. Como máximo un track está activo por
//! guild en cualquier instante.

pub mod queue;
pub mod sequencer;
pub mod sink;
pub mod track;

pub use queue::QueueStore;
pub use sequencer::{PlayOutcome, PlaybackState, Sequencer};
pub use sink::{PlaybackSink, SongbirdSink};
pub use track::Track;
