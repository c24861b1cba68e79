use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

use crate::audio::{
    equalizer::EqPreset,
    session::{MAX_BASS_DB, MAX_VOLUME_PERCENT, MIN_BASS_DB, MIN_VOLUME_PERCENT},
};

/// Comandos que usan `defer` porque resuelven metadatos (`skip` puede
/// resolver una pista de autoplay)
pub const DEFERRED_COMMANDS: [&str; 5] = ["play", "playlist", "search", "select", "skip"];

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        play_command(),
        playlist_command(),
        search_command(),
        select_command(),
        simple("skip", "Salta la canción actual"),
        simple("stop", "Detiene la reproducción y limpia la cola"),
        simple("pause", "Pausa la reproducción actual"),
        simple("resume", "Reanuda la reproducción pausada"),
        simple("replay", "Vuelve a empezar la canción actual"),
        volume_command(),
        seek_command(),
        bass_command(),
        simple("nightcore", "Activa o desactiva el filtro nightcore"),
        simple("vaporwave", "Activa o desactiva el filtro vaporwave"),
        equalizer_command(),
        simple("resetfilters", "Quita todos los filtros (conserva el volumen)"),
        queue_command(),
        remove_command(),
        simple("clear", "Vacía la cola"),
        simple("shuffle", "Mezcla la cola"),
        simple("history", "Muestra las últimas canciones reproducidas"),
        simple("nowplaying", "Muestra la canción actual"),
        loop_command(),
        autoplay_command(),
        simple("help", "Muestra la ayuda del bot"),
    ]
}

fn simple(name: &str, description: &str) -> CreateCommand {
    CreateCommand::new(name).description(description)
}

// Conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Conecta el bot a tu canal de voz")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción o la agrega a la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
}

fn playlist_command() -> CreateCommand {
    CreateCommand::new("playlist")
        .description("Carga una playlist completa")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "url", "URL de la playlist")
                .required(true),
        )
}

fn search_command() -> CreateCommand {
    CreateCommand::new("search")
        .description("Busca canciones y muestra resultados")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "query", "Término de búsqueda")
                .required(true),
        )
}

fn select_command() -> CreateCommand {
    CreateCommand::new("select")
        .description("Elige un resultado de la última búsqueda")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "index", "Número del resultado")
                .min_int_value(1)
                .required(true),
        )
}

// Efectos

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta o muestra el volumen")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "level",
                "Volumen en porcentaje",
            )
            .min_int_value(MIN_VOLUME_PERCENT as u64)
            .max_int_value(MAX_VOLUME_PERCENT as u64),
        )
}

fn seek_command() -> CreateCommand {
    CreateCommand::new("seek")
        .description("Salta a una posición de la canción")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "time",
                "Posición: ss, mm:ss o hh:mm:ss",
            )
            .required(true),
        )
}

fn bass_command() -> CreateCommand {
    CreateCommand::new("bass")
        .description("Ajusta o muestra el realce de graves")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "gain",
                format!("Ganancia en dB ({} a {})", MIN_BASS_DB, MAX_BASS_DB),
            ),
        )
}

fn equalizer_command() -> CreateCommand {
    let mut preset =
        CreateCommandOption::new(CommandOptionType::String, "preset", "Preset de ecualizador")
            .required(true);
    for name in EqPreset::list() {
        preset = preset.add_string_choice(name, name);
    }
    preset = preset.add_string_choice("off", "off");

    CreateCommand::new("equalizer")
        .description("Aplica un preset de ecualizador")
        .add_option(preset)
}

// Cola y políticas

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita una canción de la cola")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "index",
                "Posición en la cola",
            )
            .min_int_value(1)
            .required(true),
        )
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Configura o muestra el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Desactivado", "off")
                .add_string_choice("Canción", "single")
                .add_string_choice("Cola", "queue"),
        )
}

fn autoplay_command() -> CreateCommand {
    CreateCommand::new("autoplay")
        .description("Reproduce canciones relacionadas cuando la cola termina")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "state", "on u off")
                .add_string_choice("on", "on")
                .add_string_choice("off", "off")
                .required(true),
        )
}
