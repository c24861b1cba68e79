use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::{
        effects::{EffectSettings, MainFilter},
        equalizer::EqPreset,
        position::{format_clock, progress_bar},
        queue::{HistoryEntry, LoopMode},
        session::{EffectOutcome, NowPlaying, PlaylistOutcome, QueueView},
    },
    sources::{SearchResult, StreamDescriptor},
    ui::buttons::truncate,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Crescendo";

/// Límite de Discord para el valor de un field
const MAX_FIELD_LEN: usize = 1024;

fn linked_title(track: &StreamDescriptor) -> String {
    match &track.webpage_url {
        Some(url) => format!("**[{}]({})**", track.title, url),
        None => format!("**{}**", track.title),
    }
}

fn duration_label(duration: Option<Duration>) -> String {
    duration
        .map(format_duration)
        .unwrap_or_else(|| "🔴 En vivo".to_string())
}

fn loop_emoji(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Off => "▶️",
        LoopMode::Single => "🔂",
        LoopMode::Queue => "🔁",
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "✅ Activado"
    } else {
        "❌ Desactivado"
    }
}

/// Embed para una pista que empieza a sonar (respuesta y anuncio)
pub fn track_started_embed(track: &StreamDescriptor, queue_len: usize, autoplay: bool) -> CreateEmbed {
    let title = if autoplay {
        "🎲 Autoplay"
    } else {
        "🎵 Reproduciendo Ahora"
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(linked_title(track))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", duration_label(track.duration), true)
        .field("📋 En cola", queue_len.to_string(), true);

    if let Some(thumbnail) = &track.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn track_queued_embed(track: &StreamDescriptor, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("{} se ha agregado a la cola", linked_title(track)))
        .color(colors::SUCCESS_GREEN)
        .field("📍 Posición", format!("#{}", position), true)
        .field("⏱️ Duración", duration_label(track.duration), true);

    if let Some(thumbnail) = &track.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }

    embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn playlist_embed(outcome: &PlaylistOutcome) -> CreateEmbed {
    let added = outcome.queued + usize::from(outcome.started.is_some());
    let mut embed = CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(format!(
            "Se agregaron **{}** de **{}** canciones",
            added, outcome.total
        ))
        .color(colors::MUSIC_PURPLE);

    if let Some(started) = &outcome.started {
        embed = embed.field("🎵 Reproduciendo", linked_title(started), false);
    }
    if added < outcome.total {
        embed = embed.field(
            "⚠️ Cola llena",
            format!("{} canciones no cupieron", outcome.total - added),
            false,
        );
    }

    embed
        .footer(CreateEmbedFooter::new(
            "🎵 Usa /queue para ver todas las canciones",
        ))
        .timestamp(Timestamp::now())
}

pub fn now_playing_embed(now: &NowPlaying) -> CreateEmbed {
    let status = if now.paused { "⏸️ En pausa" } else { "🎵 Reproduciendo Ahora" };
    let bar = progress_bar(now.position, now.track.duration_secs());

    let mut embed = CreateEmbed::default()
        .title(status)
        .description(format!("{}\n\n`{}`", linked_title(&now.track), bar))
        .color(if now.paused {
            colors::NEUTRAL_GRAY
        } else {
            colors::SUCCESS_GREEN
        })
        .field("🔊 Volumen", format!("{}%", now.effects.volume_percent()), true)
        .field(
            format!("{} Repetición", loop_emoji(now.loop_mode)),
            now.loop_mode.label(),
            true,
        )
        .field("🎲 Autoplay", on_off(now.autoplay), true)
        .field("🎛️ Efectos", effects_summary(&now.effects), true)
        .field("📋 En cola", now.queue_len.to_string(), true);

    if let Some(thumbnail) = &now.track.thumbnail_url {
        embed = embed.thumbnail(thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar la cola de reproducción
pub fn queue_embed(view: &QueueView) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(current) = &view.current {
        embed = embed.field(
            format!("{} Reproduciendo", loop_emoji(view.loop_mode)),
            linked_title(current),
            false,
        );
    }

    let page = &view.page;
    if page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed
        .field(
            format!("🎶 Próximas ({})", page.total_items),
            truncate(&queue_lines(view), MAX_FIELD_LEN),
            false,
        )
        .field("⏱️ Duración total", format_duration(page.total_duration), true)
        .field("🎲 Autoplay", on_off(view.autoplay), true)
        .footer(CreateEmbedFooter::new(format!(
            "Página {}/{} • {}",
            page.current_page, page.total_pages, STANDARD_FOOTER
        )))
}

fn queue_lines(view: &QueueView) -> String {
    view.page
        .items
        .iter()
        .enumerate()
        .map(|(i, track)| {
            format!(
                "`{}.` {} `[{}]`",
                view.page.first_index + i,
                track.title,
                duration_label(track.duration)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn history_embed(entries: &[HistoryEntry]) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("📜 Historial")
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if entries.is_empty() {
        return embed.description("Todavía no se ha reproducido nada");
    }

    let lines = entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            format!(
                "`{}.` {} • <t:{}:R>",
                i + 1,
                entry.title,
                entry.played_at.timestamp()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    embed.description(lines)
}

pub fn search_results_embed(query: &str, results: &[SearchResult]) -> CreateEmbed {
    let lines = results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            format!(
                "`{}.` **{}** `[{}]`",
                i + 1,
                result.title,
                duration_label(result.duration)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    CreateEmbed::default()
        .title(format!("🔍 Resultados para: {}", truncate(query, 200)))
        .description(lines)
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(
            "Usa /select <número> o elige en el menú",
        ))
}

/// Resumen de la cadena: filtro principal y bass (el volumen va aparte)
pub fn effects_summary(effects: &EffectSettings) -> String {
    let mut parts = Vec::new();
    match effects.main_filter {
        Some(MainFilter::Nightcore) => parts.push("🌙 Nightcore".to_string()),
        Some(MainFilter::Vaporwave) => parts.push("🌊 Vaporwave".to_string()),
        Some(MainFilter::Equalizer(preset)) => parts.push(format!("🎚️ EQ {}", preset.name())),
        None => {}
    }
    if let Some(gain) = effects.bass_gain_db {
        parts.push(format!("🔈 Bass {:+} dB", gain));
    }

    if parts.is_empty() {
        "Ninguno".to_string()
    } else {
        parts.join(" • ")
    }
}

/// Cómo se aplicó un cambio de efectos, para el usuario
pub fn outcome_note(outcome: EffectOutcome) -> String {
    match outcome {
        EffectOutcome::Live => "aplicado al instante".to_string(),
        EffectOutcome::Restarted { offset } => {
            format!("reanudado en {}", format_clock(offset))
        }
        EffectOutcome::Deferred => "se aplicará a la próxima canción".to_string(),
    }
}

pub fn effects_embed(title: &str, effects: &EffectSettings, outcome: EffectOutcome) -> CreateEmbed {
    CreateEmbed::default()
        .title(title)
        .description(format!("_{}_", outcome_note(outcome)))
        .color(colors::MUSIC_PURPLE)
        .field("🔊 Volumen", format!("{}%", effects.volume_percent()), true)
        .field("🎛️ Efectos", effects_summary(effects), true)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(description)
        .color(colors::ERROR_RED)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de ayuda general
pub fn help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Crescendo - Comandos")
        .color(colors::INFO_BLUE)
        .field(
            "🎵 Reproducción",
            "• `/play <canción>` - Reproduce o encola\n\
            • `/playlist <url>` - Carga una playlist\n\
            • `/search <búsqueda>` + `/select <n>` - Elige entre resultados\n\
            • `/pause` `/resume` `/skip` `/stop` `/replay`\n\
            • `/seek <tiempo>` - Salta a ss, mm:ss o hh:mm:ss",
            false,
        )
        .field(
            "📜 Cola",
            "• `/queue [página]` - Muestra la cola\n\
            • `/remove <n>` `/clear` `/shuffle`\n\
            • `/loop [off|single|queue]` - Configura repetición\n\
            • `/autoplay <on|off>` - Canciones relacionadas al terminar\n\
            • `/history` `/nowplaying`",
            false,
        )
        .field(
            "🎛️ Audio",
            format!(
                "• `/volume [1-200]` - Ajusta el volumen\n\
                • `/bass [-20..20]` - Realce de graves\n\
                • `/nightcore` `/vaporwave` - Filtros (uno a la vez)\n\
                • `/equalizer <preset>` - {}\n\
                • `/resetfilters` - Quita todos los filtros",
                EqPreset::list().join(", ")
            ),
            false,
        )
        .field(
            "🔊 Conexión",
            "• `/join` - Conecta al canal de voz\n\
            • `/leave` - Desconecta del canal",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn format_duration(duration: Duration) -> String {
    format_clock(duration.as_secs_f64())
}
