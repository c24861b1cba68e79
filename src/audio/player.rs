use dashmap::DashMap;
use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::debug;

use crate::{
    audio::{
        backend::{PlaybackAnnouncer, VoiceBackend},
        session::{GuildSession, SessionSettings},
    },
    sources::MetadataResolver,
};

/// Contexto de reproducción de la aplicación.
///
/// Registro de sesiones por guild (creadas al primer uso) más los
/// colaboradores compartidos. Se construye en `main` y se pasa al handler.
pub struct AudioPlayer {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
    backend: Arc<dyn VoiceBackend>,
    resolver: Arc<dyn MetadataResolver>,
    announcer: Arc<dyn PlaybackAnnouncer>,
    settings: SessionSettings,
}

impl AudioPlayer {
    pub fn new(
        backend: Arc<dyn VoiceBackend>,
        resolver: Arc<dyn MetadataResolver>,
        announcer: Arc<dyn PlaybackAnnouncer>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            sessions: DashMap::new(),
            backend,
            resolver,
            announcer,
            settings,
        }
    }

    /// Obtiene la sesión del guild, creándola si no existe
    pub fn session(&self, guild_id: GuildId) -> Arc<GuildSession> {
        self.sessions
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("🆕 Nueva sesión de reproducción para guild {}", guild_id);
                GuildSession::spawn(
                    guild_id,
                    self.backend.clone(),
                    self.resolver.clone(),
                    self.announcer.clone(),
                    self.settings.clone(),
                )
            })
            .clone()
    }

    /// Sesión existente, sin crearla
    pub fn existing(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    #[cfg(test)]
    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }
}
