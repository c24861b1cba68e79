use anyhow::Result;
use serenity::{
    builder::{
        CreateActionRow, CreateEmbed, CreateInteractionResponse,
        CreateInteractionResponseFollowup, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction, ComponentInteractionDataKind},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::{
        effects::MainFilter,
        equalizer::EqPreset,
        position::format_clock,
        queue::LoopMode,
        session::{AdvanceOutcome, EffectOutcome, GuildSession, PauseState, PlayOutcome},
    },
    bot::{commands::DEFERRED_COMMANDS, MusicBot},
    error::PlaybackError,
    sources::StreamDescriptor,
    ui::{
        buttons::{self, button_ids, ControlAction},
        embeds,
    },
};

/// Respuesta de un comando, antes de convertirla al formato de Discord
pub enum Reply {
    Text(String),
    Embed(CreateEmbed),
    WithComponents(CreateEmbed, Vec<CreateActionRow>),
}

impl Reply {
    fn into_message(self) -> CreateInteractionResponseMessage {
        let message = CreateInteractionResponseMessage::new();
        match self {
            Self::Text(text) => message.content(text),
            Self::Embed(embed) => message.embed(embed),
            Self::WithComponents(embed, rows) => message.embed(embed).components(rows),
        }
    }

    fn into_edit(self) -> EditInteractionResponse {
        let edit = EditInteractionResponse::new();
        match self {
            Self::Text(text) => edit.content(text),
            Self::Embed(embed) => edit.embed(embed),
            Self::WithComponents(embed, rows) => edit.embed(embed).components(rows),
        }
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &MusicBot) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content("❌ Este comando solo funciona en un servidor")
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let session = bot.player.session(guild_id);
    let caller = caller_voice_channel(ctx, guild_id, command.user.id);

    if DEFERRED_COMMANDS.contains(&command.data.name.as_str()) {
        // Defer la respuesta ya que resolver metadatos puede tomar tiempo
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await?;

        let edit = match run_command(&command, &session, caller).await {
            Ok(reply) => reply.into_edit(),
            Err(e) => {
                warn!("⚠️ /{} falló en guild {}: {}", command.data.name, guild_id, e);
                EditInteractionResponse::new().content(e.user_message())
            }
        };
        command.edit_response(&ctx.http, edit).await?;
        return Ok(());
    }

    let message = match run_command(&command, &session, caller).await {
        Ok(reply) => reply.into_message(),
        Err(e) => {
            warn!("⚠️ /{} falló en guild {}: {}", command.data.name, guild_id, e);
            CreateInteractionResponseMessage::new()
                .content(e.user_message())
                .ephemeral(true)
        }
    };

    command
        .create_response(&ctx.http, CreateInteractionResponse::Message(message))
        .await?;

    Ok(())
}

async fn run_command(
    command: &CommandInteraction,
    session: &GuildSession,
    caller: Option<ChannelId>,
) -> Result<Reply, PlaybackError> {
    match command.data.name.as_str() {
        "join" => {
            let channel = session.join(caller).await?;
            Ok(Reply::Text(format!("🔊 Conectado a <#{}>", channel)))
        }
        "leave" => {
            session.leave().await?;
            Ok(Reply::Text("👋 Desconectado del canal de voz".to_string()))
        }
        "play" => {
            let query = string_option(command, "query").unwrap_or_default();
            session.set_announce_channel(command.channel_id).await?;
            let outcome = session.play(caller, query).await?;
            Ok(play_reply(session, outcome).await)
        }
        "playlist" => {
            let url = string_option(command, "url").unwrap_or_default();
            session.set_announce_channel(command.channel_id).await?;
            let outcome = session.play_playlist(caller, url).await?;
            Ok(Reply::Embed(embeds::playlist_embed(&outcome)))
        }
        "search" => {
            let query = string_option(command, "query").unwrap_or_default();
            let results = session.search(query).await?;
            Ok(Reply::WithComponents(
                embeds::search_results_embed(query, &results),
                vec![buttons::search_menu(&results)],
            ))
        }
        "select" => {
            let index = index_option(command, "index");
            session.set_announce_channel(command.channel_id).await?;
            let outcome = session.select(caller, index).await?;
            Ok(play_reply(session, outcome).await)
        }
        "skip" => {
            let (skipped, outcome) = session.skip().await?;
            Ok(Reply::Text(skip_message(&skipped, &outcome)))
        }
        "stop" => {
            session.stop().await?;
            Ok(Reply::Text(
                "⏹️ Reproducción detenida y cola vaciada".to_string(),
            ))
        }
        "pause" => {
            let message = if session.pause().await? {
                "⏸️ Pausado"
            } else {
                "⏸️ Ya estaba en pausa"
            };
            Ok(Reply::Text(message.to_string()))
        }
        "resume" => {
            session.resume().await?;
            Ok(Reply::Text("▶️ Reanudado".to_string()))
        }
        "replay" => {
            let track = session.replay().await?;
            Ok(Reply::Text(format!("⏮️ Reiniciando **{}**", track.title)))
        }
        "volume" => match int_option(command, "level") {
            Some(level) => {
                let outcome = session.set_volume(level).await?;
                effects_reply(session, format!("🔊 Volumen {}%", level), outcome).await
            }
            None => {
                let effects = session.effects().await?;
                Ok(Reply::Text(format!(
                    "🔊 Volumen actual: {}%",
                    effects.volume_percent()
                )))
            }
        },
        "seek" => {
            let spec = string_option(command, "time").unwrap_or_default();
            let offset = session.seek(spec).await?;
            Ok(Reply::Text(format!("⏩ Posición: {}", format_clock(offset))))
        }
        "bass" => match int_option(command, "gain") {
            Some(gain) => {
                let outcome = session.set_bass(gain).await?;
                effects_reply(session, format!("🔈 Bass {:+} dB", gain), outcome).await
            }
            None => {
                let effects = session.effects().await?;
                let current = effects
                    .bass_gain_db
                    .map(|g| format!("{:+} dB", g))
                    .unwrap_or_else(|| "desactivado".to_string());
                Ok(Reply::Text(format!("🔈 Bass actual: {}", current)))
            }
        },
        "nightcore" => toggle_filter_reply(session, MainFilter::Nightcore).await,
        "vaporwave" => toggle_filter_reply(session, MainFilter::Vaporwave).await,
        "equalizer" => {
            let name = string_option(command, "preset").unwrap_or_default();
            let preset = if name.eq_ignore_ascii_case("off") {
                None
            } else {
                Some(EqPreset::from_name(name)?)
            };
            let outcome = session.set_equalizer(preset).await?;
            let title = match preset {
                Some(preset) => format!("🎚️ Ecualizador: {}", preset.name()),
                None => "🎚️ Ecualizador desactivado".to_string(),
            };
            effects_reply(session, title, outcome).await
        }
        "resetfilters" => {
            let outcome = session.reset_filters().await?;
            effects_reply(session, "🧽 Filtros restablecidos".to_string(), outcome).await
        }
        "queue" => {
            let page = int_option(command, "page").unwrap_or(1).max(1) as usize;
            let view = session.queue_view(page).await?;
            Ok(Reply::Embed(embeds::queue_embed(&view)))
        }
        "remove" => {
            let removed = session.remove(index_option(command, "index")).await?;
            Ok(Reply::Text(format!("🗑️ Eliminado **{}**", removed.title)))
        }
        "clear" => {
            let cleared = session.clear_queue().await?;
            Ok(Reply::Text(format!("🧹 Se quitaron {} canciones", cleared)))
        }
        "shuffle" => {
            let len = session.shuffle().await?;
            Ok(Reply::Text(format!("🔀 Cola mezclada ({} canciones)", len)))
        }
        "history" => {
            let entries = session.history().await?;
            Ok(Reply::Embed(embeds::history_embed(&entries)))
        }
        "nowplaying" => {
            let now = session.now_playing().await?;
            Ok(Reply::WithComponents(
                embeds::now_playing_embed(&now),
                buttons::player_controls(now.paused, now.loop_mode),
            ))
        }
        "loop" => {
            let mode = match string_option(command, "mode") {
                Some(value) => session.set_loop(LoopMode::parse(value)?).await?,
                None => session.loop_mode().await?,
            };
            Ok(Reply::Text(format!("🔁 Repetición: {}", mode.label())))
        }
        "autoplay" => {
            let enabled = parse_toggle(string_option(command, "state").unwrap_or_default());
            session.set_autoplay(enabled).await?;
            Ok(Reply::Text(format!(
                "🎲 Autoplay {}",
                if enabled { "activado" } else { "desactivado" }
            )))
        }
        "help" => Ok(Reply::Embed(embeds::help_embed())),
        _ => Ok(Reply::Text("❌ Comando no reconocido".to_string())),
    }
}

/// Maneja interacciones con componentes (botones y menú de búsqueda)
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &MusicBot,
) -> Result<()> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    info!(
        "🔘 Componente {} usado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let session = bot.player.session(guild_id);
    let caller = caller_voice_channel(ctx, guild_id, component.user.id);

    if component.data.custom_id == button_ids::TRACK_SELECTION {
        return handle_track_selection(ctx, &component, &session, caller).await;
    }

    let Some(action) = ControlAction::from_custom_id(&component.data.custom_id) else {
        respond_ephemeral(ctx, &component, "❌ Acción no reconocida").await?;
        return Ok(());
    };

    let acknowledged = action.acknowledges_first();
    if acknowledged {
        component
            .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
            .await?;
    }

    match run_control(&session, caller, action).await {
        Ok(content) => {
            let rows = match session.now_playing().await {
                Ok(now) => buttons::player_controls(now.paused, now.loop_mode),
                Err(_) => Vec::new(),
            };
            if acknowledged {
                component
                    .edit_response(
                        &ctx.http,
                        EditInteractionResponse::new().content(content).components(rows),
                    )
                    .await?;
            } else {
                component
                    .create_response(
                        &ctx.http,
                        CreateInteractionResponse::UpdateMessage(
                            CreateInteractionResponseMessage::new()
                                .content(content)
                                .components(rows),
                        ),
                    )
                    .await?;
            }
        }
        Err(e) if acknowledged => {
            warn!("⚠️ Botón {} falló en guild {}: {}", component.data.custom_id, guild_id, e);
            component
                .create_followup(
                    &ctx.http,
                    CreateInteractionResponseFollowup::new()
                        .content(e.user_message())
                        .ephemeral(true),
                )
                .await?;
        }
        Err(e) => respond_ephemeral(ctx, &component, &e.user_message()).await?,
    }

    Ok(())
}

async fn handle_track_selection(
    ctx: &Context,
    component: &ComponentInteraction,
    session: &GuildSession,
    caller: Option<ChannelId>,
) -> Result<()> {
    let index = match &component.data.kind {
        ComponentInteractionDataKind::StringSelect { values } => {
            values.first().and_then(|v| buttons::parse_selection(v))
        }
        _ => None,
    };
    let Some(index) = index else {
        respond_ephemeral(ctx, component, "❌ Selección inválida").await?;
        return Ok(());
    };

    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let result = async {
        session.set_announce_channel(component.channel_id).await?;
        let outcome = session.select(caller, index).await?;
        Ok::<_, PlaybackError>(play_reply(session, outcome).await)
    }
    .await;

    let edit = match result {
        Ok(reply) => reply.into_edit(),
        Err(e) => EditInteractionResponse::new().content(e.user_message()),
    };
    component.edit_response(&ctx.http, edit).await?;
    Ok(())
}

async fn run_control(
    session: &GuildSession,
    caller: Option<ChannelId>,
    action: ControlAction,
) -> Result<String, PlaybackError> {
    check_same_channel(caller, session.voice_channel().await?)?;

    match action {
        ControlAction::PlayPause => Ok(match session.toggle_pause().await? {
            PauseState::Paused => "⏸️ Pausado".to_string(),
            PauseState::Resumed => "▶️ Reanudado".to_string(),
        }),
        ControlAction::Skip => {
            let (skipped, outcome) = session.skip().await?;
            Ok(skip_message(&skipped, &outcome))
        }
        ControlAction::Replay => {
            let track = session.replay().await?;
            Ok(format!("⏮️ Reiniciando **{}**", track.title))
        }
        ControlAction::Loop => {
            let mode = session.cycle_loop().await?;
            Ok(format!("🔁 Repetición: {}", mode.label()))
        }
        ControlAction::Shuffle => {
            let len = session.shuffle().await?;
            Ok(format!("🔀 Cola mezclada ({} canciones)", len))
        }
        ControlAction::VolumeUp | ControlAction::VolumeDown => {
            let up = action == ControlAction::VolumeUp;
            let (percent, _) = session.nudge_volume(up).await?;
            Ok(format!("🔊 Volumen {}%", percent))
        }
        ControlAction::Stop => {
            session.stop().await?;
            Ok("⏹️ Reproducción detenida".to_string())
        }
    }
}

async fn respond_ephemeral(ctx: &Context, component: &ComponentInteraction, content: &str) -> Result<()> {
    component
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(true),
            ),
        )
        .await?;
    Ok(())
}

async fn play_reply(session: &GuildSession, outcome: PlayOutcome) -> Reply {
    match outcome {
        PlayOutcome::Started(track) => match session.now_playing().await {
            Ok(now) => Reply::WithComponents(
                embeds::now_playing_embed(&now),
                buttons::player_controls(now.paused, now.loop_mode),
            ),
            Err(_) => Reply::Embed(embeds::track_started_embed(&track, 0, false)),
        },
        PlayOutcome::Queued { track, position } => {
            Reply::Embed(embeds::track_queued_embed(&track, position))
        }
    }
}

async fn toggle_filter_reply(session: &GuildSession, filter: MainFilter) -> Result<Reply, PlaybackError> {
    let (enabled, outcome) = session.toggle_filter(filter).await?;
    let title = format!(
        "🎛️ {} {}",
        filter,
        if enabled { "activado" } else { "desactivado" }
    );
    effects_reply(session, title, outcome).await
}

async fn effects_reply(
    session: &GuildSession,
    title: String,
    outcome: EffectOutcome,
) -> Result<Reply, PlaybackError> {
    let effects = session.effects().await?;
    Ok(Reply::Embed(embeds::effects_embed(&title, &effects, outcome)))
}

fn skip_message(skipped: &StreamDescriptor, outcome: &AdvanceOutcome) -> String {
    match outcome {
        AdvanceOutcome::Started(next) | AdvanceOutcome::Replayed(next) => {
            format!("⏭️ Saltado **{}**. Ahora: **{}**", skipped.title, next.title)
        }
        AdvanceOutcome::Autoplayed(next) => {
            format!("⏭️ Saltado **{}**. 🎲 Autoplay: **{}**", skipped.title, next.title)
        }
        AdvanceOutcome::Idle => format!("⏭️ Saltado **{}**. La cola terminó", skipped.title),
    }
}

/// Los botones solo responden a quien está en el canal del bot
fn check_same_channel(
    caller: Option<ChannelId>,
    bot_channel: Option<ChannelId>,
) -> Result<(), PlaybackError> {
    let caller = caller.ok_or(PlaybackError::NotInVoiceChannel)?;
    match bot_channel {
        Some(channel) if channel == caller => Ok(()),
        Some(_) => Err(PlaybackError::NotInSameVoiceChannel),
        None => Err(PlaybackError::NotConnected),
    }
}

fn parse_toggle(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "on" | "true" | "yes" | "si" | "sí"
    )
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

/// Índice 1-based; los negativos pasan como 0 y la sesión los rechaza
fn index_option(command: &CommandInteraction, name: &str) -> usize {
    int_option(command, name).unwrap_or(0).max(0) as usize
}

/// Obtiene el canal de voz del usuario desde la caché
fn caller_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id);
    channel_id
}
