//! Implementación de [`VoiceBackend`] sobre songbird.
//!
//! Cada fuente es un proceso ffmpeg que lee el stream remoto, aplica la
//! cadena de efectos y entrega PCM f32 a 48 kHz estéreo por stdout. El fin
//! del track (o su error) se reporta con la generación de la fuente.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{core::io::ReadOnlySource, ChildContainer, Input, RawAdapter},
    tracks::TrackHandle,
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    path::PathBuf,
    process::{Command, Stdio},
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, error, info, warn};

use crate::{
    audio::backend::{ActiveSource, EndNotifier, SourceRequest, VoiceBackend},
    error::PlaybackError,
};

const SAMPLE_RATE: u32 = 48_000;

/// Un error antes de este plazo cuenta como fallo de arranque
const EARLY_FAILURE_WINDOW: Duration = Duration::from_secs(3);
const CHANNELS: u32 = 2;

/// Reconexión del input HTTP (los streams de YouTube se cortan)
const RECONNECT_ARGS: [&str; 6] = [
    "-reconnect",
    "1",
    "-reconnect_streamed",
    "1",
    "-reconnect_delay_max",
    "5",
];

const OUTPUT_ARGS: [&str; 9] = [
    "-f", "f32le", "-ar", "48000", "-ac", "2", "-loglevel", "error", "pipe:1",
];

/// Argumentos de ffmpeg para una petición.
///
/// Sin filtros, el seek va antes de `-i` (salto en el input, barato). Con
/// filtros va después del grafo para que el offset sea exacto.
pub fn ffmpeg_args(request: &SourceRequest) -> Vec<String> {
    let mut args: Vec<String> = RECONNECT_ARGS.iter().map(|a| a.to_string()).collect();
    let seek = (request.start_offset > 0.0).then(|| format!("{:.3}", request.start_offset));

    match request.chain.to_filter_graph() {
        None => {
            if let Some(seek) = seek {
                args.extend(["-ss".to_string(), seek]);
            }
            args.extend([
                "-i".to_string(),
                request.stream_url.clone(),
                "-vn".to_string(),
            ]);
        }
        Some(graph) => {
            args.extend([
                "-i".to_string(),
                request.stream_url.clone(),
                "-vn".to_string(),
                "-af".to_string(),
                graph,
            ]);
            if let Some(seek) = seek {
                args.extend(["-ss".to_string(), seek]);
            }
        }
    }

    args.extend(OUTPUT_ARGS.iter().map(|a| a.to_string()));
    args
}

pub struct SongbirdBackend {
    manager: Arc<Songbird>,
    ffmpeg_path: PathBuf,
}

impl SongbirdBackend {
    pub fn new(manager: Arc<Songbird>, ffmpeg_path: PathBuf) -> Self {
        Self {
            manager,
            ffmpeg_path,
        }
    }

    fn spawn_ffmpeg(&self, request: &SourceRequest) -> Result<Input, PlaybackError> {
        let args = ffmpeg_args(request);
        debug!("🎚️ ffmpeg {}", args.join(" "));

        let child = Command::new(&self.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                error!("Error al lanzar ffmpeg: {:?}", e);
                PlaybackError::PlaybackStartFailed(format!("ffmpeg: {}", e))
            })?;

        Ok(RawAdapter::new(
            ReadOnlySource::new(ChildContainer::from(child)),
            SAMPLE_RATE,
            CHANNELS,
        ).into())
    }
}

#[async_trait]
impl VoiceBackend for SongbirdBackend {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError> {
        self.manager
            .join(guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| {
                error!("Error al conectar al canal de voz: {:?}", e);
                PlaybackError::ConnectFailed(e.to_string())
            })
    }

    async fn disconnect(&self, guild_id: GuildId) -> Result<(), PlaybackError> {
        if self.manager.get(guild_id).is_none() {
            return Ok(());
        }

        self.manager.remove(guild_id).await.map_err(|e| {
            warn!("Error al desconectar: {:?}", e);
            PlaybackError::NotConnected
        })
    }

    async fn open_source(
        &self,
        guild_id: GuildId,
        request: SourceRequest,
        on_end: EndNotifier,
    ) -> Result<Box<dyn ActiveSource>, PlaybackError> {
        let call = self
            .manager
            .get(guild_id)
            .ok_or(PlaybackError::NotConnected)?;

        let input = self.spawn_ffmpeg(&request)?;
        let generation = on_end.generation();

        let handle = {
            let mut call = call.lock().await;
            call.play_only_input(input)
        };

        let opened_at = Instant::now();
        for event in [TrackEvent::End, TrackEvent::Error] {
            let notifier = TrackEndNotifier {
                notifier: on_end.clone(),
                on_error: event == TrackEvent::Error,
                opened_at,
            };
            if let Err(e) = handle.add_event(Event::Track(event), notifier) {
                // Sin handler nadie avisaría el fin de este track
                let _ = handle.stop();
                return Err(PlaybackError::PlaybackStartFailed(format!(
                    "Error al agregar event handler: {}",
                    e
                )));
            }
        }

        info!(
            "🎧 Fuente abierta (generación {}) en guild {}",
            generation, guild_id
        );
        Ok(Box::new(SongbirdSource(handle)))
    }
}

/// Track de songbird como [`ActiveSource`]
pub struct SongbirdSource(TrackHandle);

impl ActiveSource for SongbirdSource {
    fn stop(&self) {
        // Falla solo si el track ya terminó
        let _ = self.0.stop();
    }

    fn pause(&self) -> anyhow::Result<()> {
        self.0.pause()?;
        Ok(())
    }

    fn resume(&self) -> anyhow::Result<()> {
        self.0.play()?;
        Ok(())
    }

    fn set_volume(&self, multiplier: f32) -> anyhow::Result<()> {
        self.0.set_volume(multiplier)?;
        Ok(())
    }
}

/// Handler para cuando termina (o falla) un track
struct TrackEndNotifier {
    notifier: EndNotifier,
    on_error: bool,
    opened_at: Instant,
}

impl TrackEndNotifier {
    fn failed_to_start(&self, elapsed: Duration) -> bool {
        self.on_error && elapsed < EARLY_FAILURE_WINDOW
    }
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(tracks) = ctx {
            for (state, _) in tracks.iter() {
                debug!(
                    "Track terminado (generación {}): {:?}",
                    self.notifier.generation(),
                    state.playing
                );
            }
        }

        if self.failed_to_start(self.opened_at.elapsed()) {
            self.notifier.notify_failed();
        } else {
            self.notifier.notify();
        }
        None
    }
}
