//! # Bot Module
//!
//! Superficie de Discord del bot: registro de comandos, despacho de
//! interacciones y seguimiento del estado de voz del propio bot.
//!
//! ## Architecture
//!
//! [`MusicBot`] implementa el [`EventHandler`] de serenity. No guarda
//! estado de reproducción propio: cada interacción se traduce a una
//! operación de la [`GuildSession`](crate::audio::session::GuildSession)
//! del guild a través de [`AudioPlayer`].

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod announcer;
pub mod commands;
pub mod handlers;

use crate::{audio::player::AudioPlayer, config::Config};

/// Main Discord bot handler.
///
/// ## Fields
///
/// - `config`: Bot configuration (tokens, limits, features)
/// - `player`: Registry of per-guild playback sessions
pub struct MusicBot {
    config: Arc<Config>,
    pub player: Arc<AudioPlayer>,
}

impl MusicBot {
    pub fn new(config: Arc<Config>, player: Arc<AudioPlayer>) -> Self {
        Self { config, player }
    }

    /// Registers all slash commands with Discord.
    ///
    /// Commands are registered per-guild when `GUILD_ID` is configured
    /// (instant, for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    /// Called when the bot is connected to Discord; registers commands.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Handles slash commands, buttons and the search select menu.
    ///
    /// Errors are logged but don't crash the bot.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await
                {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Forwards the bot's own voice state changes to its guild session.
    ///
    /// A move keeps playing in the new channel; a disconnect nobody asked
    /// for resets the session.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        match self.player.existing(guild_id) {
            Some(session) => session.handle_voice_update(new.channel_id).await,
            None => debug!("Estado de voz sin sesión en guild {}", guild_id),
        }
    }
}
