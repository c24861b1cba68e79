use async_trait::async_trait;
use serenity::{builder::CreateMessage, http::Http, model::id::ChannelId};
use std::sync::Arc;
use tracing::{debug, error};

use crate::{
    audio::backend::{Announcement, PlaybackAnnouncer},
    ui::embeds,
};

/// Publica los cambios de pista en el canal de texto del guild
pub struct ChannelAnnouncer {
    http: Arc<Http>,
}

impl ChannelAnnouncer {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

fn render(announcement: &Announcement) -> CreateMessage {
    match announcement {
        Announcement::NowPlaying {
            track,
            queue_len,
            autoplay,
        } => CreateMessage::new().embed(embeds::track_started_embed(track, *queue_len, *autoplay)),
        Announcement::QueueEnded => {
            CreateMessage::new().content("✅ La cola terminó. Usa `/play` para seguir escuchando")
        }
        Announcement::PlaybackFailed { reason } => {
            CreateMessage::new().embed(embeds::error_embed(&format!(
                "No se pudo reproducir la siguiente canción: {}",
                reason
            )))
        }
    }
}

#[async_trait]
impl PlaybackAnnouncer for ChannelAnnouncer {
    async fn announce(&self, channel_id: ChannelId, announcement: Announcement) {
        debug!("📢 Anuncio en canal {}: {:?}", channel_id, announcement);
        if let Err(e) = channel_id
            .send_message(&self.http, render(&announcement))
            .await
        {
            error!("Error al enviar anuncio al canal {}: {:?}", channel_id, e);
        }
    }
}
