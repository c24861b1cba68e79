//! Sesión de reproducción por guild.
//!
//! Cada guild tiene exactamente una fuente de audio activa y todas las
//! mutaciones pasan por el mismo lock. El pipeline de voz no puede cambiar
//! efectos ni posición sobre un stream vivo, así que seek, filtros, volumen
//! con filtros y replay usan el mismo protocolo de reinicio: retirar la
//! generación activa, detener la fuente, reconstruir la cadena y abrir una
//! fuente nueva en el offset correcto.
//!
//! Los avisos de fin llegan por un canal con la generación que los produjo.
//! Un aviso de una generación retirada se descarta; solo el fin de la
//! generación activa pasa a la política de [`crate::audio::reconcile`].

use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::{mpsc, Mutex, MutexGuard},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        backend::{
            ActiveSource, Announcement, EndKind, EndNotifier, PlaybackAnnouncer, SourceRequest,
            TrackEnd, VoiceBackend,
        },
        effects::{EffectChain, EffectSettings, MainFilter},
        equalizer::EqPreset,
        position::{format_clock, parse_time_spec, position},
        queue::{History, HistoryEntry, LoopMode, QueuePage, TrackQueue, ITEMS_PER_PAGE},
        reconcile::{autoplay_candidate, next_step, AdvanceCause, NextStep},
        track::Track,
    },
    config::Config,
    error::PlaybackError,
    sources::{MetadataResolver, SearchResult, StreamDescriptor},
};

pub const MIN_VOLUME_PERCENT: i64 = 1;
pub const MAX_VOLUME_PERCENT: i64 = 200;
pub const MIN_BASS_DB: i64 = -20;
pub const MAX_BASS_DB: i64 = 20;
/// Piso de los botones de volumen
pub const MIN_NUDGE_PERCENT: i64 = 5;

/// Ajustes de sesión derivados de la configuración
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub default_volume: f32,
    pub autoplay_default: bool,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub history_display: usize,
    pub search_results: usize,
    pub autoplay_candidates: usize,
    pub volume_step_percent: u16,
    pub lock_timeout: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_volume: config.default_volume,
            autoplay_default: config.enable_autoplay,
            max_queue_size: config.max_queue_size,
            max_playlist_size: config.max_playlist_size,
            history_display: config.history_display,
            search_results: config.search_results,
            autoplay_candidates: config.autoplay_candidates,
            volume_step_percent: config.volume_step_percent,
            lock_timeout: config.session_lock_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

struct ActiveStream {
    source: Box<dyn ActiveSource>,
    generation: u64,
    /// Volumen incluido en la cadena con la que se abrió la fuente
    baked_volume: f32,
}

/// Estado de reproducción de un guild
pub struct GuildPlaybackState {
    voice_channel: Option<ChannelId>,
    current: Option<Track>,
    active: Option<ActiveStream>,
    queue: TrackQueue,
    history: History,
    effects: EffectSettings,
    loop_mode: LoopMode,
    autoplay: bool,
    pending_search: Option<Vec<SearchResult>>,
    announce_channel: Option<ChannelId>,
    generation: u64,
    epoch: u64,
}

impl GuildPlaybackState {
    fn new(settings: &SessionSettings, generation: u64, epoch: u64) -> Self {
        Self {
            voice_channel: None,
            current: None,
            active: None,
            queue: TrackQueue::new(settings.max_queue_size),
            history: History::default(),
            effects: EffectSettings::with_volume(settings.default_volume),
            loop_mode: LoopMode::Off,
            autoplay: settings.autoplay_default,
            pending_search: None,
            announce_channel: None,
            generation,
            epoch,
        }
    }

    fn status(&self) -> PlaybackStatus {
        match (&self.voice_channel, &self.current) {
            (None, _) => PlaybackStatus::Idle,
            (Some(_), None) => PlaybackStatus::ConnectedIdle,
            (Some(_), Some(track)) if track.is_paused() => PlaybackStatus::Paused,
            (Some(_), Some(_)) => PlaybackStatus::Playing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Idle,
    ConnectedIdle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayOutcome {
    Started(StreamDescriptor),
    Queued {
        track: StreamDescriptor,
        position: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaylistOutcome {
    pub started: Option<StreamDescriptor>,
    pub queued: usize,
    pub total: usize,
}

/// Cómo se aplicó un cambio de efectos
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectOutcome {
    /// Aplicado sobre la fuente activa sin reiniciar
    Live,
    Restarted { offset: f64 },
    /// Nada sonando; aplica a la próxima pista
    Deferred,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    Started(StreamDescriptor),
    Replayed(StreamDescriptor),
    Autoplayed(StreamDescriptor),
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseState {
    Paused,
    Resumed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub track: StreamDescriptor,
    pub position: f64,
    pub paused: bool,
    pub effects: EffectSettings,
    pub loop_mode: LoopMode,
    pub autoplay: bool,
    pub queue_len: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueueView {
    pub current: Option<StreamDescriptor>,
    pub page: QueuePage,
    pub loop_mode: LoopMode,
    pub autoplay: bool,
}

pub struct GuildSession {
    guild_id: GuildId,
    state: Mutex<GuildPlaybackState>,
    backend: Arc<dyn VoiceBackend>,
    resolver: Arc<dyn MetadataResolver>,
    announcer: Arc<dyn PlaybackAnnouncer>,
    settings: SessionSettings,
    end_tx: mpsc::UnboundedSender<TrackEnd>,
}

impl GuildSession {
    /// Crea la sesión y lanza la tarea que entrega los avisos de fin
    pub fn spawn(
        guild_id: GuildId,
        backend: Arc<dyn VoiceBackend>,
        resolver: Arc<dyn MetadataResolver>,
        announcer: Arc<dyn PlaybackAnnouncer>,
        settings: SessionSettings,
    ) -> Arc<Self> {
        let (end_tx, mut end_rx) = mpsc::unbounded_channel();

        let session = Arc::new(Self {
            guild_id,
            state: Mutex::new(GuildPlaybackState::new(&settings, 0, 0)),
            backend,
            resolver,
            announcer,
            settings,
            end_tx,
        });

        let weak: Weak<Self> = Arc::downgrade(&session);
        tokio::spawn(async move {
            while let Some(end) = end_rx.recv().await {
                let Some(session) = weak.upgrade() else {
                    break;
                };
                session.handle_track_end(end).await;
            }
            debug!("Bomba de eventos terminada para guild {}", guild_id);
        });

        session
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    // ----- conexión -----

    /// Conecta (o mueve) el bot al canal del usuario
    pub async fn join(&self, caller: Option<ChannelId>) -> Result<ChannelId, PlaybackError> {
        let channel = caller.ok_or(PlaybackError::NotInVoiceChannel)?;
        let mut state = self.lock().await?;

        if state.voice_channel != Some(channel) {
            self.backend.connect(self.guild_id, channel).await?;
            state.voice_channel = Some(channel);
            info!("🔊 Conectado al canal {} en guild {}", channel, self.guild_id);
        }

        Ok(channel)
    }

    /// Desconecta y reinicia la sesión
    pub async fn leave(&self) -> Result<(), PlaybackError> {
        let mut state = self.lock().await?;
        if state.voice_channel.is_none() {
            return Err(PlaybackError::NotConnected);
        }

        self.reset_locked(&mut state);
        drop(state);

        self.disconnect_quietly().await;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }

    /// Detiene todo: fuente, cola, efectos y conexión
    pub async fn stop(&self) -> Result<(), PlaybackError> {
        let mut state = self.lock().await?;
        let was_connected = state.voice_channel.is_some();

        self.reset_locked(&mut state);
        drop(state);

        if was_connected {
            self.disconnect_quietly().await;
        }
        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
        Ok(())
    }

    /// Cambio de estado de voz del propio bot reportado por el gateway
    pub async fn handle_voice_update(&self, channel: Option<ChannelId>) {
        let mut state = self.state.lock().await;
        if state.voice_channel.is_none() {
            return;
        }

        match channel {
            Some(channel) => {
                if state.voice_channel != Some(channel) {
                    info!("🔀 Bot movido al canal {} en guild {}", channel, self.guild_id);
                    state.voice_channel = Some(channel);
                }
            }
            None => {
                warn!(
                    "🔌 Desconectado externamente del canal de voz en guild {}",
                    self.guild_id
                );
                self.reset_locked(&mut state);
                drop(state);
                self.disconnect_quietly().await;
            }
        }
    }

    // ----- reproducción -----

    pub async fn play(
        &self,
        caller: Option<ChannelId>,
        query: &str,
    ) -> Result<PlayOutcome, PlaybackError> {
        let epoch = self.prepare_connected(caller).await?;
        let descriptor = self.resolver.resolve(query).await?;
        self.enqueue_or_play(descriptor, epoch).await
    }

    pub async fn play_playlist(
        &self,
        caller: Option<ChannelId>,
        url: &str,
    ) -> Result<PlaylistOutcome, PlaybackError> {
        let epoch = self.prepare_connected(caller).await?;

        let mut entries = self.resolver.resolve_playlist(url).await;
        if entries.is_empty() {
            return Err(PlaybackError::ResolveFailed(url.to_string()));
        }
        entries.truncate(self.settings.max_playlist_size);
        let total = entries.len();

        let mut state = self.lock().await?;
        if state.epoch != epoch {
            debug!("Playlist descartada: la sesión se reinició durante la resolución");
            return Err(PlaybackError::Superseded);
        }

        let mut entries = entries.into_iter();
        let mut started = None;
        if state.current.is_none() {
            if let Some(first) = entries.next() {
                self.start_locked(&mut state, first.clone(), 0.0).await?;
                started = Some(first);
            }
        }

        let queued = state.queue.extend(entries.collect());
        info!(
            "📃 Playlist en guild {}: {} de {} canciones agregadas",
            self.guild_id,
            queued + usize::from(started.is_some()),
            total
        );

        Ok(PlaylistOutcome {
            started,
            queued,
            total,
        })
    }

    /// Busca y guarda los resultados para un `select` posterior
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, PlaybackError> {
        let results = self
            .resolver
            .search(query, self.settings.search_results)
            .await;
        if results.is_empty() {
            return Err(PlaybackError::ResolveFailed(query.to_string()));
        }

        let mut state = self.lock().await?;
        state.pending_search = Some(results.clone());
        Ok(results)
    }

    /// Reproduce o encola el resultado `index` (1-based) de la última búsqueda
    pub async fn select(
        &self,
        caller: Option<ChannelId>,
        index: usize,
    ) -> Result<PlayOutcome, PlaybackError> {
        let (choice, epoch) = {
            let mut state = self.lock().await?;
            let results = state
                .pending_search
                .as_ref()
                .ok_or(PlaybackError::NoActiveSearch)?;
            let choice = index
                .checked_sub(1)
                .and_then(|i| results.get(i))
                .cloned()
                .ok_or(PlaybackError::IndexOutOfRange {
                    index,
                    len: results.len(),
                })?;

            self.ensure_connected_locked(&mut state, caller).await?;
            (choice, state.epoch)
        };

        let descriptor = self.resolver.resolve(choice.lookup_key()).await?;
        self.enqueue_or_play(descriptor, epoch).await
    }

    pub async fn skip(&self) -> Result<(StreamDescriptor, AdvanceOutcome), PlaybackError> {
        let state = self.lock().await?;
        let skipped = state
            .current
            .as_ref()
            .map(|t| t.descriptor.clone())
            .ok_or(PlaybackError::NothingPlaying)?;

        info!("⏭️ Saltando: {}", skipped.title);
        let outcome = self.advance(state, AdvanceCause::Skip).await?;
        Ok((skipped, outcome))
    }

    /// Pausa; pausar lo ya pausado no hace nada y devuelve `false`
    pub async fn pause(&self) -> Result<bool, PlaybackError> {
        let mut guard = self.lock().await?;
        let state = &mut *guard;
        let track = state
            .current
            .as_mut()
            .ok_or(PlaybackError::NothingPlaying)?;

        if track.is_paused() {
            return Ok(false);
        }

        if let Some(active) = &state.active {
            if let Err(e) = active.source.pause() {
                warn!("Error al pausar la fuente: {:?}", e);
            }
        }
        track.pause(Instant::now());
        info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        Ok(true)
    }

    pub async fn resume(&self) -> Result<(), PlaybackError> {
        let mut guard = self.lock().await?;
        let state = &mut *guard;
        let track = state
            .current
            .as_mut()
            .ok_or(PlaybackError::NothingPlaying)?;

        if !track.is_paused() {
            return Err(PlaybackError::NotPaused);
        }

        if let Some(active) = &state.active {
            if let Err(e) = active.source.resume() {
                warn!("Error al reanudar la fuente: {:?}", e);
            }
        }
        track.resume(Instant::now());
        info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        Ok(())
    }

    pub async fn toggle_pause(&self) -> Result<PauseState, PlaybackError> {
        let paused = {
            let state = self.lock().await?;
            state
                .current
                .as_ref()
                .ok_or(PlaybackError::NothingPlaying)?
                .is_paused()
        };

        if paused {
            self.resume().await?;
            Ok(PauseState::Resumed)
        } else {
            self.pause().await?;
            Ok(PauseState::Paused)
        }
    }

    // ----- efectos -----

    pub async fn set_volume(&self, percent: i64) -> Result<EffectOutcome, PlaybackError> {
        if !(MIN_VOLUME_PERCENT..=MAX_VOLUME_PERCENT).contains(&percent) {
            return Err(PlaybackError::InvalidRange {
                what: "El volumen",
                min: MIN_VOLUME_PERCENT,
                max: MAX_VOLUME_PERCENT,
            });
        }

        let mut state = self.lock().await?;
        self.apply_volume_locked(&mut state, percent as f32 / 100.0)
            .await
    }

    /// Sube o baja el volumen un paso (botones); devuelve el nuevo porcentaje
    pub async fn nudge_volume(&self, up: bool) -> Result<(u16, EffectOutcome), PlaybackError> {
        let mut state = self.lock().await?;
        let step = i64::from(self.settings.volume_step_percent);
        let current = i64::from(state.effects.volume_percent());
        let target = (if up { current + step } else { current - step })
            .clamp(MIN_NUDGE_PERCENT, MAX_VOLUME_PERCENT);

        let outcome = self
            .apply_volume_locked(&mut state, target as f32 / 100.0)
            .await?;
        Ok((target as u16, outcome))
    }

    pub async fn set_bass(&self, gain_db: i64) -> Result<EffectOutcome, PlaybackError> {
        if !(MIN_BASS_DB..=MAX_BASS_DB).contains(&gain_db) {
            return Err(PlaybackError::InvalidRange {
                what: "El bass",
                min: MIN_BASS_DB,
                max: MAX_BASS_DB,
            });
        }

        let mut state = self.lock().await?;
        state.effects.bass_gain_db = Some(gain_db as i32);
        self.apply_effects_locked(&mut state).await
    }

    /// Activa o desactiva un filtro principal; devuelve si quedó activo
    pub async fn toggle_filter(
        &self,
        filter: MainFilter,
    ) -> Result<(bool, EffectOutcome), PlaybackError> {
        let mut state = self.lock().await?;
        let enabled = state.effects.toggle_main(filter);
        info!(
            "🎛️ Filtro {} {} en guild {}",
            filter,
            if enabled { "activado" } else { "desactivado" },
            self.guild_id
        );
        let outcome = self.apply_effects_locked(&mut state).await?;
        Ok((enabled, outcome))
    }

    /// `None` quita el ecualizador si es el filtro activo
    pub async fn set_equalizer(
        &self,
        preset: Option<EqPreset>,
    ) -> Result<EffectOutcome, PlaybackError> {
        let mut state = self.lock().await?;
        match preset {
            Some(preset) => state.effects.main_filter = Some(MainFilter::Equalizer(preset)),
            None => {
                if matches!(state.effects.main_filter, Some(MainFilter::Equalizer(_))) {
                    state.effects.main_filter = None;
                }
            }
        }
        self.apply_effects_locked(&mut state).await
    }

    pub async fn reset_filters(&self) -> Result<EffectOutcome, PlaybackError> {
        let mut state = self.lock().await?;
        state.effects.reset_filters();
        self.apply_effects_locked(&mut state).await
    }

    pub async fn effects(&self) -> Result<EffectSettings, PlaybackError> {
        Ok(self.lock().await?.effects.clone())
    }

    // ----- transporte -----

    /// Salta a la posición indicada; devuelve el offset aplicado
    pub async fn seek(&self, spec: &str) -> Result<f64, PlaybackError> {
        let target = parse_time_spec(spec)?;

        let mut state = self.lock().await?;
        let track = state
            .current
            .as_ref()
            .ok_or(PlaybackError::NothingPlaying)?;

        if let Some(duration) = track.duration_secs() {
            if target > duration {
                return Err(PlaybackError::InvalidRange {
                    what: "La posición",
                    min: 0,
                    max: duration as i64,
                });
            }
        }

        self.restart_locked(&mut state, Some(target)).await
    }

    /// Vuelve a empezar la pista actual
    pub async fn replay(&self) -> Result<StreamDescriptor, PlaybackError> {
        let mut state = self.lock().await?;
        self.restart_locked(&mut state, Some(0.0)).await?;
        state
            .current
            .as_ref()
            .map(|t| t.descriptor.clone())
            .ok_or(PlaybackError::NothingPlaying)
    }

    // ----- políticas -----

    pub async fn set_loop(&self, mode: LoopMode) -> Result<LoopMode, PlaybackError> {
        let mut state = self.lock().await?;
        state.loop_mode = mode;
        info!("🔁 Loop {} en guild {}", mode, self.guild_id);
        Ok(mode)
    }

    pub async fn cycle_loop(&self) -> Result<LoopMode, PlaybackError> {
        let mut state = self.lock().await?;
        state.loop_mode = state.loop_mode.next();
        info!("🔁 Loop {} en guild {}", state.loop_mode, self.guild_id);
        Ok(state.loop_mode)
    }

    pub async fn loop_mode(&self) -> Result<LoopMode, PlaybackError> {
        Ok(self.lock().await?.loop_mode)
    }

    pub async fn set_autoplay(&self, enabled: bool) -> Result<(), PlaybackError> {
        let mut state = self.lock().await?;
        state.autoplay = enabled;
        info!(
            "🎲 Autoplay {} en guild {}",
            if enabled { "activado" } else { "desactivado" },
            self.guild_id
        );
        Ok(())
    }

    pub async fn set_announce_channel(&self, channel: ChannelId) -> Result<(), PlaybackError> {
        self.lock().await?.announce_channel = Some(channel);
        Ok(())
    }

    // ----- cola e historial -----

    pub async fn queue_view(&self, page: usize) -> Result<QueueView, PlaybackError> {
        let state = self.lock().await?;
        Ok(QueueView {
            current: state.current.as_ref().map(|t| t.descriptor.clone()),
            page: state.queue.page(page, ITEMS_PER_PAGE),
            loop_mode: state.loop_mode,
            autoplay: state.autoplay,
        })
    }

    pub async fn remove(&self, index: usize) -> Result<StreamDescriptor, PlaybackError> {
        self.lock().await?.queue.remove_at(index)
    }

    pub async fn clear_queue(&self) -> Result<usize, PlaybackError> {
        Ok(self.lock().await?.queue.clear())
    }

    pub async fn shuffle(&self) -> Result<usize, PlaybackError> {
        let mut state = self.lock().await?;
        state.queue.shuffle();
        Ok(state.queue.len())
    }

    pub async fn history(&self) -> Result<Vec<HistoryEntry>, PlaybackError> {
        let state = self.lock().await?;
        Ok(state
            .history
            .recent(self.settings.history_display)
            .to_vec())
    }

    pub async fn now_playing(&self) -> Result<NowPlaying, PlaybackError> {
        let state = self.lock().await?;
        let track = state
            .current
            .as_ref()
            .ok_or(PlaybackError::NothingPlaying)?;

        Ok(NowPlaying {
            track: track.descriptor.clone(),
            position: position(track, Instant::now()),
            paused: track.is_paused(),
            effects: state.effects.clone(),
            loop_mode: state.loop_mode,
            autoplay: state.autoplay,
            queue_len: state.queue.len(),
        })
    }

    pub async fn status(&self) -> Result<PlaybackStatus, PlaybackError> {
        Ok(self.lock().await?.status())
    }

    pub async fn voice_channel(&self) -> Result<Option<ChannelId>, PlaybackError> {
        Ok(self.lock().await?.voice_channel)
    }

    // ----- eventos -----

    /// Aviso de fin de la fuente de `end.generation`
    pub async fn handle_track_end(&self, end: TrackEnd) {
        let mut state = self.state.lock().await;

        match &state.active {
            Some(active) if active.generation == end.generation => {}
            _ => {
                debug!(
                    "🔇 Fin de la generación {} ignorado en guild {} (retirada)",
                    end.generation, self.guild_id
                );
                return;
            }
        }

        let announce_channel = state.announce_channel;

        // Un stream que falla al arrancar no cuenta como fin natural: con
        // repetición de canción se reabriría en bucle
        let outcome = match end.kind {
            EndKind::Finished => self.advance(state, AdvanceCause::NaturalEnd).await,
            EndKind::FailedToStart => {
                let title = state
                    .current
                    .as_ref()
                    .map(|t| t.descriptor.title.clone())
                    .unwrap_or_default();
                warn!(
                    "❌ '{}' falló al arrancar (generación {}) en guild {}",
                    title, end.generation, self.guild_id
                );
                Self::go_idle(&mut state);
                drop(state);
                Err(PlaybackError::PlaybackStartFailed(title))
            }
        };

        let Some(channel) = announce_channel else {
            return;
        };

        let announcement = match outcome {
            Ok(AdvanceOutcome::Started(track)) | Ok(AdvanceOutcome::Autoplayed(track)) => {
                let (queue_len, autoplay) = {
                    let state = self.state.lock().await;
                    (state.queue.len(), state.autoplay)
                };
                Announcement::NowPlaying {
                    track,
                    queue_len,
                    autoplay,
                }
            }
            Ok(AdvanceOutcome::Replayed(_)) => return,
            Ok(AdvanceOutcome::Idle) => Announcement::QueueEnded,
            Err(e) => Announcement::PlaybackFailed {
                reason: e.to_string(),
            },
        };

        self.announcer.announce(channel, announcement).await;
    }

    // ----- internos -----

    async fn lock(&self) -> Result<MutexGuard<'_, GuildPlaybackState>, PlaybackError> {
        tokio::time::timeout(self.settings.lock_timeout, self.state.lock())
            .await
            .map_err(|_| {
                warn!("⏳ Sesión ocupada en guild {}", self.guild_id);
                PlaybackError::SessionBusy
            })
    }

    /// Asegura la conexión y devuelve la época actual
    async fn prepare_connected(&self, caller: Option<ChannelId>) -> Result<u64, PlaybackError> {
        let mut state = self.lock().await?;
        self.ensure_connected_locked(&mut state, caller).await?;
        Ok(state.epoch)
    }

    async fn ensure_connected_locked(
        &self,
        state: &mut GuildPlaybackState,
        caller: Option<ChannelId>,
    ) -> Result<(), PlaybackError> {
        let caller = caller.ok_or(PlaybackError::NotInVoiceChannel)?;

        match state.voice_channel {
            Some(channel) if channel == caller => Ok(()),
            Some(_) => Err(PlaybackError::NotInSameVoiceChannel),
            None => {
                self.backend.connect(self.guild_id, caller).await?;
                state.voice_channel = Some(caller);
                info!("🔊 Conectado al canal {} en guild {}", caller, self.guild_id);
                Ok(())
            }
        }
    }

    /// Aplica el resultado de una resolución si la sesión no se reinició mientras tanto
    async fn enqueue_or_play(
        &self,
        descriptor: StreamDescriptor,
        epoch: u64,
    ) -> Result<PlayOutcome, PlaybackError> {
        let mut state = self.lock().await?;
        if state.epoch != epoch {
            debug!(
                "Resolución de '{}' descartada: la sesión se reinició",
                descriptor.title
            );
            return Err(PlaybackError::Superseded);
        }

        if state.current.is_some() {
            let position = state.queue.enqueue(descriptor.clone())?;
            return Ok(PlayOutcome::Queued {
                track: descriptor,
                position,
            });
        }

        self.start_locked(&mut state, descriptor.clone(), 0.0)
            .await?;
        Ok(PlayOutcome::Started(descriptor))
    }

    async fn apply_volume_locked(
        &self,
        state: &mut GuildPlaybackState,
        volume: f32,
    ) -> Result<EffectOutcome, PlaybackError> {
        state.effects.volume = volume;
        info!(
            "🔊 Volumen {}% en guild {}",
            state.effects.volume_percent(),
            self.guild_id
        );

        if state.current.is_none() {
            return Ok(EffectOutcome::Deferred);
        }

        if !state.effects.has_filter_stages() {
            if let Some(active) = &state.active {
                match active.source.set_volume(volume / active.baked_volume) {
                    Ok(()) => return Ok(EffectOutcome::Live),
                    Err(e) => warn!("Volumen en vivo falló, reiniciando fuente: {:?}", e),
                }
            }
        }

        let offset = self.restart_locked(state, None).await?;
        Ok(EffectOutcome::Restarted { offset })
    }

    async fn apply_effects_locked(
        &self,
        state: &mut GuildPlaybackState,
    ) -> Result<EffectOutcome, PlaybackError> {
        if state.current.is_none() {
            return Ok(EffectOutcome::Deferred);
        }

        let offset = self.restart_locked(state, None).await?;
        Ok(EffectOutcome::Restarted { offset })
    }

    /// Protocolo de reinicio: misma pista, cadena nueva, offset explícito o actual
    async fn restart_locked(
        &self,
        state: &mut GuildPlaybackState,
        offset: Option<f64>,
    ) -> Result<f64, PlaybackError> {
        let track = state
            .current
            .as_ref()
            .ok_or(PlaybackError::NothingPlaying)?;
        let offset = offset.unwrap_or_else(|| position(track, Instant::now()));
        let descriptor = track.descriptor.clone();

        debug!(
            "🔄 Reiniciando '{}' en {} (guild {})",
            descriptor.title,
            format_clock(offset),
            self.guild_id
        );
        self.start_locked(state, descriptor, offset).await?;
        Ok(offset)
    }

    /// Abre una fuente nueva reemplazando la activa.
    ///
    /// Si falla, la sesión queda conectada sin pista.
    async fn start_locked(
        &self,
        state: &mut GuildPlaybackState,
        descriptor: StreamDescriptor,
        offset: f64,
    ) -> Result<(), PlaybackError> {
        Self::retire_active(state);
        state.current = None;

        state.generation += 1;
        let generation = state.generation;

        let chain = EffectChain::build(&state.effects);
        let baked_volume = chain.baked_volume();
        let request = SourceRequest {
            stream_url: descriptor.stream_url.clone(),
            chain,
            start_offset: offset,
        };
        let notifier = EndNotifier::new(generation, self.end_tx.clone());

        match self
            .backend
            .open_source(self.guild_id, request, notifier)
            .await
        {
            Ok(source) => {
                info!(
                    "🎵 Reproduciendo: {} desde {} (guild {})",
                    descriptor.title,
                    format_clock(offset),
                    self.guild_id
                );
                state.history.record(descriptor.title.clone());
                state.active = Some(ActiveStream {
                    source,
                    generation,
                    baked_volume,
                });
                state.current = Some(Track::begin(descriptor, offset, Instant::now()));
                Ok(())
            }
            Err(e) => {
                warn!("❌ No se pudo iniciar '{}': {}", descriptor.title, e);
                Err(match e {
                    PlaybackError::PlaybackStartFailed(_) => e,
                    other => PlaybackError::PlaybackStartFailed(other.to_string()),
                })
            }
        }
    }

    /// Decide y arranca lo siguiente tras un fin natural o un salto.
    ///
    /// Recibe el guard porque el autoplay suelta el lock mientras busca.
    async fn advance(
        &self,
        mut state: MutexGuard<'_, GuildPlaybackState>,
        cause: AdvanceCause,
    ) -> Result<AdvanceOutcome, PlaybackError> {
        let Some(finished) = state.current.as_ref().map(|t| t.descriptor.clone()) else {
            return Ok(AdvanceOutcome::Idle);
        };

        let step = {
            let state = &mut *state;
            next_step(
                &mut state.queue,
                &finished,
                state.loop_mode,
                state.autoplay,
                cause,
            )
        };

        match step {
            NextStep::Replay => {
                info!("🔂 Repitiendo: {}", finished.title);
                self.start_locked(&mut state, finished.clone(), 0.0).await?;
                Ok(AdvanceOutcome::Replayed(finished))
            }
            NextStep::Play(next) => {
                self.start_locked(&mut state, next.clone(), 0.0).await?;
                Ok(AdvanceOutcome::Started(next))
            }
            NextStep::Autoplay { seed } => {
                Self::go_idle(&mut state);
                let (generation, epoch) = (state.generation, state.epoch);
                drop(state);

                let Some(candidate) = autoplay_candidate(
                    self.resolver.as_ref(),
                    &seed,
                    self.settings.autoplay_candidates,
                )
                .await
                else {
                    return Ok(AdvanceOutcome::Idle);
                };

                let mut state = self.state.lock().await;
                if state.generation != generation
                    || state.epoch != epoch
                    || state.voice_channel.is_none()
                {
                    debug!(
                        "🎲 Autoplay '{}' descartado: la sesión cambió durante la búsqueda",
                        candidate.title
                    );
                    return Ok(AdvanceOutcome::Idle);
                }

                self.start_locked(&mut state, candidate.clone(), 0.0)
                    .await?;
                Ok(AdvanceOutcome::Autoplayed(candidate))
            }
            NextStep::Idle => {
                Self::go_idle(&mut state);
                info!("📭 Cola vacía en guild {}", self.guild_id);
                Ok(AdvanceOutcome::Idle)
            }
        }
    }

    fn retire_active(state: &mut GuildPlaybackState) {
        if let Some(active) = state.active.take() {
            debug!("♻️ Retirando generación {}", active.generation);
            active.source.stop();
        }
    }

    fn go_idle(state: &mut GuildPlaybackState) {
        Self::retire_active(state);
        state.current = None;
    }

    /// Estado nuevo; la época avanza para invalidar resoluciones en curso
    fn reset_locked(&self, state: &mut GuildPlaybackState) {
        Self::retire_active(state);
        *state = GuildPlaybackState::new(&self.settings, state.generation, state.epoch + 1);
    }

    async fn disconnect_quietly(&self) {
        if let Err(e) = self.backend.disconnect(self.guild_id).await {
            warn!("Error al desconectar en guild {}: {}", self.guild_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            effects::FilterDirective,
            testing::{settle, song, FakeBackend, RecordingAnnouncer, StaticResolver},
        },
        sources::SearchResult,
    };
    use pretty_assertions::assert_eq;

    const VOICE: ChannelId = ChannelId::new(10);
    const TEXT: ChannelId = ChannelId::new(20);

    struct Harness {
        session: Arc<GuildSession>,
        backend: FakeBackend,
        announcer: RecordingAnnouncer,
    }

    fn harness(resolver: StaticResolver) -> Harness {
        harness_with(resolver, SessionSettings::default())
    }

    fn harness_with(resolver: StaticResolver, settings: SessionSettings) -> Harness {
        let backend = FakeBackend::default();
        let announcer = RecordingAnnouncer::default();
        let session = GuildSession::spawn(
            GuildId::new(1),
            Arc::new(backend.clone()),
            Arc::new(resolver),
            Arc::new(announcer.clone()),
            settings,
        );
        Harness {
            session,
            backend,
            announcer,
        }
    }

    fn songs(titles: &[&str]) -> StaticResolver {
        titles
            .iter()
            .fold(StaticResolver::default(), |r, t| r.with_song(song(t)))
    }

    async fn current_title(session: &GuildSession) -> Option<String> {
        session.now_playing().await.ok().map(|np| np.track.title)
    }

    async fn queue_titles(session: &GuildSession) -> Vec<String> {
        let view = session.queue_view(1).await.unwrap();
        view.page.items.into_iter().map(|d| d.title).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_queue_skip_scenario() {
        let h = harness(songs(&["song1", "song2"]));

        let outcome = h.session.play(Some(VOICE), "song1").await.unwrap();
        assert_eq!(outcome, PlayOutcome::Started(song("song1")));
        assert_eq!(current_title(&h.session).await.as_deref(), Some("song1"));
        assert!(queue_titles(&h.session).await.is_empty());

        let outcome = h.session.play(Some(VOICE), "song2").await.unwrap();
        assert_eq!(
            outcome,
            PlayOutcome::Queued {
                track: song("song2"),
                position: 1
            }
        );
        assert_eq!(current_title(&h.session).await.as_deref(), Some("song1"));
        assert_eq!(queue_titles(&h.session).await, vec!["song2"]);

        let (skipped, outcome) = h.session.skip().await.unwrap();
        assert_eq!(skipped.title, "song1");
        assert_eq!(outcome, AdvanceOutcome::Started(song("song2")));
        settle().await;

        assert_eq!(current_title(&h.session).await.as_deref(), Some("song2"));
        assert!(queue_titles(&h.session).await.is_empty());
        let history: Vec<String> = h
            .session
            .history()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(history, vec!["song1", "song2"]);
        assert_eq!(h.backend.state().connects, vec![VOICE]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_requires_voice_channel() {
        let h = harness(songs(&["song1"]));

        assert_eq!(
            h.session.play(None, "song1").await,
            Err(PlaybackError::NotInVoiceChannel)
        );
        assert!(h.backend.state().connects.is_empty());
        assert_eq!(h.session.status().await, Ok(PlaybackStatus::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_from_other_channel_is_rejected() {
        let h = harness(songs(&["song1"]));
        h.session.join(Some(VOICE)).await.unwrap();

        assert_eq!(
            h.session.play(Some(ChannelId::new(99)), "song1").await,
            Err(PlaybackError::NotInSameVoiceChannel)
        );
        assert_eq!(h.session.status().await, Ok(PlaybackStatus::ConnectedIdle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_failure_changes_nothing() {
        let h = harness(songs(&[]));
        h.session.join(Some(VOICE)).await.unwrap();

        assert_eq!(
            h.session.play(Some(VOICE), "missing").await,
            Err(PlaybackError::ResolveFailed("missing".to_string()))
        );
        assert!(h.backend.opened().is_empty());
        assert_eq!(h.session.status().await, Ok(PlaybackStatus::ConnectedIdle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarts_use_requested_or_elapsed_offset() {
        let h = harness(songs(&["song1"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(h.session.set_bass(6).await, Ok(EffectOutcome::Restarted { offset: 10.0 }));

        assert_eq!(h.session.seek("1:30").await, Ok(90.0));

        tokio::time::advance(Duration::from_secs(5)).await;
        let (enabled, outcome) = h.session.toggle_filter(MainFilter::Nightcore).await.unwrap();
        assert!(enabled);
        assert_eq!(outcome, EffectOutcome::Restarted { offset: 95.0 });
        settle().await;

        let offsets: Vec<f64> = h.backend.opened().iter().map(|r| r.start_offset).collect();
        assert_eq!(offsets, vec![0.0, 10.0, 90.0, 95.0]);
        assert_eq!(h.session.status().await, Ok(PlaybackStatus::Playing));
        assert_eq!(current_title(&h.session).await.as_deref(), Some("song1"));
        // Cada reinicio retira la generación anterior
        assert_eq!(h.backend.state().stopped, vec![1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_restarts_serialize() {
        let h = harness(songs(&["song1", "song2"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();
        h.session.play(Some(VOICE), "song2").await.unwrap();
        tokio::time::advance(Duration::from_secs(10)).await;

        let (bass, nightcore, seek) = tokio::join!(
            h.session.set_bass(3),
            h.session.toggle_filter(MainFilter::Nightcore),
            h.session.seek("40"),
        );
        assert!(matches!(bass, Ok(EffectOutcome::Restarted { .. })));
        assert!(matches!(nightcore, Ok((true, EffectOutcome::Restarted { .. }))));
        assert_eq!(seek, Ok(40.0));
        settle().await;

        let opened = h.backend.opened();
        assert_eq!(opened.len(), 4);
        let stopped = h.backend.state().stopped.clone();
        assert_eq!(stopped.len(), opened.len() - 1);
        assert!(!stopped.contains(&4));

        let directives = opened[3].chain.directives();
        assert!(directives.contains(&FilterDirective::Bass { gain_db: 3 }));
        assert!(directives
            .iter()
            .any(|d| matches!(d, FilterDirective::Resample { .. })));
        assert_eq!(opened[3].start_offset, 40.0);

        assert_eq!(current_title(&h.session).await.as_deref(), Some("song1"));
        assert_eq!(queue_titles(&h.session).await, vec!["song2"]);
        assert_eq!(h.session.now_playing().await.unwrap().position, 40.0);
        assert_eq!(h.session.status().await, Ok(PlaybackStatus::Playing));
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_then_seek_is_a_single_restart() {
        let h = harness(songs(&["song1"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();

        assert_eq!(h.session.set_volume(150).await, Ok(EffectOutcome::Live));
        assert_eq!(h.session.seek("1:30").await, Ok(90.0));
        settle().await;

        let opened = h.backend.opened();
        assert_eq!(opened.len(), 2);
        let restart = &opened[1];
        assert_eq!(restart.start_offset, 90.0);
        assert_eq!(restart.chain.directives(), &[FilterDirective::Volume(1.5)]);
        assert_eq!(h.backend.state().volumes, vec![1.5]);

        let np = h.session.now_playing().await.unwrap();
        assert_eq!(np.position, 90.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_volume_accounts_for_baked_volume() {
        let mut settings = SessionSettings::default();
        settings.default_volume = 0.5;
        let h = harness_with(songs(&["song1"]), settings);
        h.session.play(Some(VOICE), "song1").await.unwrap();

        assert_eq!(
            h.backend.opened()[0].chain.directives(),
            &[FilterDirective::Volume(0.5)]
        );
        assert_eq!(h.session.set_volume(100).await, Ok(EffectOutcome::Live));
        assert_eq!(h.backend.state().volumes, vec![2.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_with_filter_restarts() {
        let h = harness(songs(&["song1"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();
        h.session.set_bass(4).await.unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(
            h.session.set_volume(80).await,
            Ok(EffectOutcome::Restarted { offset: 3.0 })
        );

        let last = h.backend.opened().pop().unwrap();
        assert_eq!(
            last.chain.to_filter_graph().as_deref(),
            Some("volume=0.8,bass=g=4")
        );
        assert!(h.backend.state().volumes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_effects_are_rejected() {
        let h = harness(songs(&["song1"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();

        for gain in [25, -25] {
            assert!(matches!(
                h.session.set_bass(gain).await,
                Err(PlaybackError::InvalidRange { .. })
            ));
        }
        assert!(matches!(
            h.session.set_volume(0).await,
            Err(PlaybackError::InvalidRange { .. })
        ));
        assert!(matches!(
            h.session.set_volume(201).await,
            Err(PlaybackError::InvalidRange { .. })
        ));

        assert_eq!(h.session.effects().await, Ok(EffectSettings::default()));
        assert_eq!(h.backend.opened().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_stop_does_not_advance_queue() {
        let h = harness(songs(&["song1", "song2"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();
        h.session.play(Some(VOICE), "song2").await.unwrap();

        h.session.seek("30").await.unwrap();
        h.session.replay().await.unwrap();
        settle().await;

        assert_eq!(current_title(&h.session).await.as_deref(), Some("song1"));
        assert_eq!(queue_titles(&h.session).await, vec!["song2"]);
        assert_eq!(h.backend.opened().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_natural_end_advances_and_announces() {
        let h = harness(songs(&["song1", "song2"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();
        h.session.play(Some(VOICE), "song2").await.unwrap();
        h.session.set_announce_channel(TEXT).await.unwrap();

        h.backend.finish_current();
        settle().await;

        assert_eq!(current_title(&h.session).await.as_deref(), Some("song2"));
        assert_eq!(
            h.announcer.sent(),
            vec![(
                TEXT,
                Announcement::NowPlaying {
                    track: song("song2"),
                    queue_len: 0,
                    autoplay: false
                }
            )]
        );

        h.backend.finish_current();
        settle().await;

        assert_eq!(h.session.status().await, Ok(PlaybackStatus::ConnectedIdle));
        assert_eq!(h.announcer.sent().last().map(|(_, a)| a.clone()), Some(Announcement::QueueEnded));
        assert_eq!(h.backend.state().disconnects, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_end_events_advance_once() {
        let h = harness(songs(&["song1", "song2", "song3"]));
        for title in ["song1", "song2", "song3"] {
            h.session.play(Some(VOICE), title).await.unwrap();
        }

        // End + Error del mismo track
        h.backend.finish_current();
        let first = h.backend.state().notifiers[0].clone();
        first.notify();
        settle().await;

        assert_eq!(current_title(&h.session).await.as_deref(), Some("song2"));
        assert_eq!(queue_titles(&h.session).await, vec!["song3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_loop_rotates_playback() {
        let h = harness(songs(&["C", "A", "B"]));
        for title in ["C", "A", "B"] {
            h.session.play(Some(VOICE), title).await.unwrap();
        }
        h.session.set_loop(LoopMode::Queue).await.unwrap();

        h.backend.finish_current();
        settle().await;
        assert_eq!(current_title(&h.session).await.as_deref(), Some("A"));
        assert_eq!(queue_titles(&h.session).await, vec!["B", "C"]);

        h.backend.finish_current();
        settle().await;
        assert_eq!(current_title(&h.session).await.as_deref(), Some("B"));
        assert_eq!(queue_titles(&h.session).await, vec!["C", "A"]);

        h.backend.finish_current();
        settle().await;
        assert_eq!(current_title(&h.session).await.as_deref(), Some("C"));

        let order: Vec<String> = h
            .backend
            .opened()
            .iter()
            .map(|r| r.stream_url.trim_start_matches("https://cdn.example/").to_string())
            .collect();
        assert_eq!(order, vec!["C", "A", "B", "C"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_loop_replays_from_start() {
        let h = harness(songs(&["song1", "song2"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();
        h.session.play(Some(VOICE), "song2").await.unwrap();
        h.session.set_loop(LoopMode::Single).await.unwrap();

        tokio::time::advance(Duration::from_secs(200)).await;
        h.backend.finish_current();
        settle().await;

        let np = h.session.now_playing().await.unwrap();
        assert_eq!(np.track.title, "song1");
        assert_eq!(np.position, 0.0);
        assert_eq!(queue_titles(&h.session).await, vec!["song2"]);
        assert_eq!(h.session.history().await.unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_failing_on_open_does_not_replay() {
        let h = harness(songs(&["song1", "song2"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();
        h.session.play(Some(VOICE), "song2").await.unwrap();
        h.session.set_loop(LoopMode::Single).await.unwrap();
        h.session.set_announce_channel(TEXT).await.unwrap();

        h.backend.fail_current();
        settle().await;

        assert_eq!(h.backend.opened().len(), 1);
        assert_eq!(h.session.status().await, Ok(PlaybackStatus::ConnectedIdle));
        assert_eq!(queue_titles(&h.session).await, vec!["song2"]);
        assert_eq!(
            h.announcer.sent(),
            vec![(
                TEXT,
                Announcement::PlaybackFailed {
                    reason: PlaybackError::PlaybackStartFailed("song1".to_string()).to_string()
                }
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_autoplay_picks_related_track() {
        let resolver = songs(&["seed"])
            .with_search(
                "seed",
                vec![
                    SearchResult::new("seed").with_webpage("https://yt/seed"),
                    SearchResult::new("related").with_webpage("https://yt/related"),
                ],
            )
            .with_track("https://yt/related", song("related"));
        let h = harness(resolver);
        h.session.play(Some(VOICE), "seed").await.unwrap();
        h.session.set_autoplay(true).await.unwrap();

        h.backend.finish_current();
        settle().await;

        assert_eq!(current_title(&h.session).await.as_deref(), Some("related"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_autoplay_failure_goes_idle() {
        let h = harness(songs(&["seed"]));
        h.session.play(Some(VOICE), "seed").await.unwrap();
        h.session.set_autoplay(true).await.unwrap();

        h.backend.finish_current();
        settle().await;

        assert_eq!(h.session.status().await, Ok(PlaybackStatus::ConnectedIdle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_autoplay_result_discarded_when_something_else_started() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let resolver = songs(&["seed", "manual"])
            .with_search(
                "seed",
                vec![SearchResult::new("related").with_webpage("https://yt/related")],
            )
            .with_track("https://yt/related", song("related"))
            .with_gate("https://yt/related", gate.clone());
        let h = harness(resolver);
        h.session.play(Some(VOICE), "seed").await.unwrap();
        h.session.set_autoplay(true).await.unwrap();

        h.backend.finish_current();
        settle().await;

        // El autoplay está esperando la resolución sin el lock
        assert_eq!(
            h.session.play(Some(VOICE), "manual").await,
            Ok(PlayOutcome::Started(song("manual")))
        );

        gate.notify_one();
        settle().await;

        assert_eq!(current_title(&h.session).await.as_deref(), Some("manual"));
        assert_eq!(h.backend.opened().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_leaves_connected_idle() {
        let h = harness(songs(&["song1"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();

        h.backend.fail_next_open();
        assert!(matches!(
            h.session.seek("10").await,
            Err(PlaybackError::PlaybackStartFailed(_))
        ));
        settle().await;

        assert_eq!(h.session.status().await, Ok(PlaybackStatus::ConnectedIdle));
        assert_eq!(
            h.session.now_playing().await,
            Err(PlaybackError::NothingPlaying)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_resets_session() {
        let h = harness(songs(&["song1", "song2"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();
        h.session.play(Some(VOICE), "song2").await.unwrap();
        h.session.set_bass(5).await.unwrap();
        h.session.set_loop(LoopMode::Queue).await.unwrap();

        h.session.stop().await.unwrap();
        settle().await;

        assert_eq!(h.session.status().await, Ok(PlaybackStatus::Idle));
        assert!(queue_titles(&h.session).await.is_empty());
        assert_eq!(h.session.effects().await, Ok(EffectSettings::default()));
        assert_eq!(h.session.loop_mode().await, Ok(LoopMode::Off));
        assert_eq!(h.backend.state().disconnects, 1);

        // Stop sin conexión no falla; leave sí
        assert_eq!(h.session.stop().await, Ok(()));
        assert_eq!(h.session.leave().await, Err(PlaybackError::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_in_flight_is_superseded_by_stop() {
        let gate = Arc::new(tokio::sync::Notify::new());
        let h = harness(songs(&["slow"]).with_gate("slow", gate.clone()));

        let session = h.session.clone();
        let pending = tokio::spawn(async move { session.play(Some(VOICE), "slow").await });
        settle().await;

        h.session.stop().await.unwrap();
        gate.notify_one();

        assert_eq!(pending.await.unwrap(), Err(PlaybackError::Superseded));
        assert!(h.backend.opened().is_empty());
        assert_eq!(h.session.status().await, Ok(PlaybackStatus::Idle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_freezes_position_and_resume_continues() {
        let h = harness(songs(&["song1"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(h.session.pause().await, Ok(true));
        assert_eq!(h.session.pause().await, Ok(false));
        assert_eq!(h.session.status().await, Ok(PlaybackStatus::Paused));

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(h.session.now_playing().await.unwrap().position, 10.0);

        assert_eq!(h.session.toggle_pause().await, Ok(PauseState::Resumed));
        assert_eq!(h.session.resume().await, Err(PlaybackError::NotPaused));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(h.session.now_playing().await.unwrap().position, 15.0);

        let state = h.backend.state();
        assert_eq!((state.pauses, state.resumes), (1, 1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_effects_while_idle_apply_to_next_track() {
        let h = harness(songs(&["song1"]));

        assert_eq!(
            h.session.set_equalizer(Some(EqPreset::Jazz)).await,
            Ok(EffectOutcome::Deferred)
        );
        assert_eq!(h.session.set_bass(-3).await, Ok(EffectOutcome::Deferred));
        assert!(h.backend.opened().is_empty());

        h.session.play(Some(VOICE), "song1").await.unwrap();
        assert_eq!(
            h.backend.opened()[0].chain.to_filter_graph().as_deref(),
            Some("bass=g=-3,equalizer=f=200:width_type=h:width=150:g=2")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_filter_toggles_are_exclusive_and_reversible() {
        let h = harness(songs(&["song1"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();

        h.session.toggle_filter(MainFilter::Nightcore).await.unwrap();
        h.session.toggle_filter(MainFilter::Vaporwave).await.unwrap();
        assert_eq!(
            h.session.effects().await.unwrap().main_filter,
            Some(MainFilter::Vaporwave)
        );
        assert_eq!(
            h.backend.opened().pop().unwrap().chain.to_filter_graph().as_deref(),
            Some("asetrate=44100*0.85,aresample=44100")
        );

        let (enabled, _) = h.session.toggle_filter(MainFilter::Vaporwave).await.unwrap();
        assert!(!enabled);
        assert!(h.backend.opened().pop().unwrap().chain.is_empty());

        h.session.set_equalizer(Some(EqPreset::Rock)).await.unwrap();
        h.session.toggle_filter(MainFilter::Nightcore).await.unwrap();
        h.session.set_equalizer(None).await.unwrap();
        assert_eq!(
            h.session.effects().await.unwrap().main_filter,
            Some(MainFilter::Nightcore)
        );

        h.session.reset_filters().await.unwrap();
        assert_eq!(h.session.effects().await, Ok(EffectSettings::default()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_buttons_clamp() {
        let h = harness(songs(&["song1"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();

        h.session.set_volume(195).await.unwrap();
        assert_eq!(h.session.nudge_volume(true).await.unwrap().0, 200);

        h.session.set_volume(8).await.unwrap();
        assert_eq!(h.session.nudge_volume(false).await.unwrap().0, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_validation() {
        let resolver = StaticResolver::default()
            .with_song(song("short").with_duration(Duration::from_secs(60)));
        let h = harness(resolver);

        assert_eq!(h.session.seek("10").await, Err(PlaybackError::NothingPlaying));

        h.session.play(Some(VOICE), "short").await.unwrap();
        assert!(matches!(
            h.session.seek("2:00").await,
            Err(PlaybackError::InvalidRange { .. })
        ));
        assert!(matches!(
            h.session.seek("soon").await,
            Err(PlaybackError::InvalidTimeSpec(_))
        ));
        assert_eq!(h.backend.opened().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_and_select() {
        let resolver = songs(&[])
            .with_search(
                "lofi",
                vec![
                    SearchResult::new("lofi 1").with_webpage("https://yt/1"),
                    SearchResult::new("lofi 2").with_webpage("https://yt/2"),
                ],
            )
            .with_track("https://yt/2", song("lofi 2"));
        let h = harness(resolver);

        assert_eq!(
            h.session.select(Some(VOICE), 1).await,
            Err(PlaybackError::NoActiveSearch)
        );

        assert_eq!(h.session.search("lofi").await.unwrap().len(), 2);
        assert_eq!(
            h.session.select(Some(VOICE), 3).await,
            Err(PlaybackError::IndexOutOfRange { index: 3, len: 2 })
        );
        assert_eq!(
            h.session.select(Some(VOICE), 2).await,
            Ok(PlayOutcome::Started(song("lofi 2")))
        );
        assert!(matches!(
            h.session.search("nothing").await,
            Err(PlaybackError::ResolveFailed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_playlist_starts_first_and_queues_rest() {
        let mut settings = SessionSettings::default();
        settings.max_playlist_size = 3;
        let entries = vec![song("p1"), song("p2"), song("p3"), song("p4")];
        let h = harness_with(
            StaticResolver::default().with_playlist("https://yt/list", entries),
            settings,
        );

        let outcome = h
            .session
            .play_playlist(Some(VOICE), "https://yt/list")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PlaylistOutcome {
                started: Some(song("p1")),
                queued: 2,
                total: 3
            }
        );
        assert_eq!(queue_titles(&h.session).await, vec!["p2", "p3"]);

        assert!(matches!(
            h.session.play_playlist(Some(VOICE), "https://yt/empty").await,
            Err(PlaybackError::ResolveFailed(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_management() {
        let mut settings = SessionSettings::default();
        settings.max_queue_size = 2;
        let h = harness_with(songs(&["a", "b", "c", "d"]), settings);
        for title in ["a", "b", "c"] {
            h.session.play(Some(VOICE), title).await.unwrap();
        }
        assert_eq!(
            h.session.play(Some(VOICE), "d").await,
            Err(PlaybackError::QueueFull(2))
        );

        assert_eq!(
            h.session.remove(5).await,
            Err(PlaybackError::IndexOutOfRange { index: 5, len: 2 })
        );
        assert_eq!(h.session.remove(1).await, Ok(song("b")));
        assert_eq!(h.session.shuffle().await, Ok(1));
        assert_eq!(h.session.clear_queue().await, Ok(1));
        assert_eq!(current_title(&h.session).await.as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_external_disconnect_resets() {
        let h = harness(songs(&["song1"]));
        h.session.play(Some(VOICE), "song1").await.unwrap();

        let moved = ChannelId::new(11);
        h.session.handle_voice_update(Some(moved)).await;
        assert_eq!(h.session.voice_channel().await, Ok(Some(moved)));

        h.session.handle_voice_update(None).await;
        settle().await;
        assert_eq!(h.session.status().await, Ok(PlaybackStatus::Idle));
        assert_eq!(h.backend.state().stopped, vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_session_times_out() {
        let mut settings = SessionSettings::default();
        settings.lock_timeout = Duration::from_secs(1);
        let h = harness_with(songs(&[]), settings);

        let _held = h.session.state.lock().await;
        assert_eq!(
            h.session.queue_view(1).await,
            Err(PlaybackError::SessionBusy)
        );
    }
}
