//! Colaboradores falsos para las pruebas de la sesión.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};
use tokio::sync::Notify;

use crate::{
    audio::backend::{
        ActiveSource, Announcement, EndNotifier, PlaybackAnnouncer, SourceRequest, VoiceBackend,
    },
    error::PlaybackError,
    sources::{MetadataResolver, SearchResult, StreamDescriptor},
};

#[derive(Default)]
pub struct FakeState {
    pub opened: Vec<SourceRequest>,
    pub notifiers: Vec<EndNotifier>,
    pub stopped: Vec<u64>,
    pub connects: Vec<ChannelId>,
    pub disconnects: usize,
    pub volumes: Vec<f32>,
    pub pauses: usize,
    pub resumes: usize,
    pub fail_next_open: bool,
}

#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBackend {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn fail_next_open(&self) {
        self.state().fail_next_open = true;
    }

    pub fn opened(&self) -> Vec<SourceRequest> {
        self.state().opened.clone()
    }

    /// Simula el fin natural de la fuente abierta más reciente
    pub fn finish_current(&self) {
        let notifier = self.state().notifiers.last().cloned();
        if let Some(notifier) = notifier {
            notifier.notify();
        }
    }

    /// Simula un stream que falla apenas abierto
    pub fn fail_current(&self) {
        let notifier = self.state().notifiers.last().cloned();
        if let Some(notifier) = notifier {
            notifier.notify_failed();
        }
    }
}

struct FakeSource {
    notifier: EndNotifier,
    state: Arc<Mutex<FakeState>>,
}

impl ActiveSource for FakeSource {
    fn stop(&self) {
        self.state
            .lock()
            .unwrap()
            .stopped
            .push(self.notifier.generation());
        self.notifier.notify();
    }

    fn pause(&self) -> anyhow::Result<()> {
        self.state.lock().unwrap().pauses += 1;
        Ok(())
    }

    fn resume(&self) -> anyhow::Result<()> {
        self.state.lock().unwrap().resumes += 1;
        Ok(())
    }

    fn set_volume(&self, multiplier: f32) -> anyhow::Result<()> {
        self.state.lock().unwrap().volumes.push(multiplier);
        Ok(())
    }
}

#[async_trait]
impl VoiceBackend for FakeBackend {
    async fn connect(&self, _guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlaybackError> {
        self.state().connects.push(channel_id);
        Ok(())
    }

    async fn disconnect(&self, _guild_id: GuildId) -> Result<(), PlaybackError> {
        self.state().disconnects += 1;
        Ok(())
    }

    async fn open_source(
        &self,
        _guild_id: GuildId,
        request: SourceRequest,
        on_end: EndNotifier,
    ) -> Result<Box<dyn ActiveSource>, PlaybackError> {
        let mut state = self.state();
        if std::mem::take(&mut state.fail_next_open) {
            return Err(PlaybackError::PlaybackStartFailed(
                "ffmpeg terminó".to_string(),
            ));
        }

        state.opened.push(request);
        state.notifiers.push(on_end.clone());
        Ok(Box::new(FakeSource {
            notifier: on_end,
            state: self.state.clone(),
        }))
    }
}

/// Resolver con respuestas fijas por consulta
#[derive(Default)]
pub struct StaticResolver {
    tracks: HashMap<String, StreamDescriptor>,
    playlists: HashMap<String, Vec<StreamDescriptor>>,
    searches: HashMap<String, Vec<SearchResult>>,
    gate: Option<(String, Arc<Notify>)>,
}

impl StaticResolver {
    pub fn with_track(mut self, query: &str, descriptor: StreamDescriptor) -> Self {
        self.tracks.insert(query.to_string(), descriptor);
        self
    }

    /// Registra una pista que se resuelve por su propio título
    pub fn with_song(self, descriptor: StreamDescriptor) -> Self {
        let title = descriptor.title.clone();
        self.with_track(&title, descriptor)
    }

    pub fn with_playlist(mut self, url: &str, entries: Vec<StreamDescriptor>) -> Self {
        self.playlists.insert(url.to_string(), entries);
        self
    }

    pub fn with_search(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.searches.insert(query.to_string(), results);
        self
    }

    /// `resolve(query)` espera a `gate.notify_one()` antes de responder
    pub fn with_gate(mut self, query: &str, gate: Arc<Notify>) -> Self {
        self.gate = Some((query.to_string(), gate));
        self
    }
}

#[async_trait]
impl MetadataResolver for StaticResolver {
    async fn resolve(&self, query: &str) -> Result<StreamDescriptor, PlaybackError> {
        if let Some((gated, gate)) = &self.gate {
            if gated == query {
                gate.notified().await;
            }
        }

        self.tracks
            .get(query)
            .cloned()
            .ok_or_else(|| PlaybackError::ResolveFailed(query.to_string()))
    }

    async fn resolve_playlist(&self, url: &str) -> Vec<StreamDescriptor> {
        self.playlists.get(url).cloned().unwrap_or_default()
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let mut results = self.searches.get(query).cloned().unwrap_or_default();
        results.truncate(limit);
        results
    }
}

#[derive(Clone, Default)]
pub struct RecordingAnnouncer {
    sent: Arc<Mutex<Vec<(ChannelId, Announcement)>>>,
}

impl RecordingAnnouncer {
    pub fn sent(&self) -> Vec<(ChannelId, Announcement)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaybackAnnouncer for RecordingAnnouncer {
    async fn announce(&self, channel_id: ChannelId, announcement: Announcement) {
        self.sent.lock().unwrap().push((channel_id, announcement));
    }
}

pub fn song(title: &str) -> StreamDescriptor {
    StreamDescriptor::new(format!("https://cdn.example/{}", title), title)
}

/// Deja correr las tareas pendientes (bomba de eventos, tareas lanzadas)
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
