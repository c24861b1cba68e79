//! Interfaces hacia los colaboradores externos: conexión de voz,
//! transcodificador y canal de anuncios.
//!
//! La sesión de reproducción solo conoce estos traits. Las implementaciones
//! reales viven en [`crate::audio::voice`] (songbird + ffmpeg) y en
//! [`crate::bot::announcer`] (serenity).

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use tokio::sync::mpsc;

use crate::{audio::effects::EffectChain, error::PlaybackError, sources::StreamDescriptor};

/// Petición para abrir una fuente de audio
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRequest {
    pub stream_url: String,
    pub chain: EffectChain,
    pub start_offset: f64,
}

/// Cómo terminó una fuente
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndKind {
    /// Fin del stream, detención o error tardío
    Finished,
    /// El stream falló antes de producir audio
    FailedToStart,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackEnd {
    pub generation: u64,
    pub kind: EndKind,
}

/// Avisa a la sesión que la fuente de una generación terminó.
///
/// El aviso viaja por el canal de la sesión con la generación que lo produjo,
/// así la sesión puede descartar los fines provocados por sus propios reinicios.
#[derive(Debug, Clone)]
pub struct EndNotifier {
    generation: u64,
    tx: mpsc::UnboundedSender<TrackEnd>,
}

impl EndNotifier {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TrackEnd>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notify(&self) {
        self.send(EndKind::Finished);
    }

    pub fn notify_failed(&self) {
        self.send(EndKind::FailedToStart);
    }

    fn send(&self, kind: EndKind) {
        // La sesión ya no existe si el receptor se cerró
        let _ = self.tx.send(TrackEnd {
            generation: self.generation,
            kind,
        });
    }
}

/// Fuente de audio activa en el pipeline de voz
pub trait ActiveSource: Send + Sync {
    /// Detiene la fuente; dispara el aviso de fin con su generación
    fn stop(&self);

    fn pause(&self) -> anyhow::Result<()>;

    fn resume(&self) -> anyhow::Result<()>;

    /// Multiplicador aplicado sobre lo que ya trae la cadena de efectos
    fn set_volume(&self, multiplier: f32) -> anyhow::Result<()>;
}

#[async_trait]
pub trait VoiceBackend: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError>;

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), PlaybackError>;

    /// Abre una fuente nueva con la cadena y el offset pedidos
    async fn open_source(
        &self,
        guild_id: GuildId,
        request: SourceRequest,
        on_end: EndNotifier,
    ) -> Result<Box<dyn ActiveSource>, PlaybackError>;
}

/// Mensajes que la sesión publica por su cuenta (sin comando de por medio)
#[derive(Debug, Clone, PartialEq)]
pub enum Announcement {
    NowPlaying {
        track: StreamDescriptor,
        queue_len: usize,
        autoplay: bool,
    },
    QueueEnded,
    PlaybackFailed {
        reason: String,
    },
}

#[async_trait]
pub trait PlaybackAnnouncer: Send + Sync {
    async fn announce(&self, channel_id: ChannelId, announcement: Announcement);
}

