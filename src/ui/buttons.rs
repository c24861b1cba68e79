use serenity::{
    all::ButtonStyle,
    builder::{
        CreateActionRow, CreateButton, CreateSelectMenu, CreateSelectMenuKind,
        CreateSelectMenuOption,
    },
};

use crate::{audio::queue::LoopMode, sources::SearchResult, ui::embeds::format_duration};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PLAY_PAUSE: &str = "music_play_pause";
    pub const SKIP: &str = "music_skip";
    pub const REPLAY: &str = "music_replay";
    pub const LOOP: &str = "music_loop";
    pub const SHUFFLE: &str = "music_shuffle";
    pub const VOLUME_UP: &str = "music_volume_up";
    pub const VOLUME_DOWN: &str = "music_volume_down";
    pub const STOP: &str = "music_stop";

    /// Menú de resultados de `/search`
    pub const TRACK_SELECTION: &str = "track_selection";
}

const SELECTION_PREFIX: &str = "track_";

/// Límite de Discord para etiquetas de opciones
const MAX_LABEL_LEN: usize = 100;

/// Acción de un botón del reproductor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    PlayPause,
    Skip,
    Replay,
    Loop,
    Shuffle,
    VolumeUp,
    VolumeDown,
    Stop,
}

impl ControlAction {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PLAY_PAUSE => Some(Self::PlayPause),
            button_ids::SKIP => Some(Self::Skip),
            button_ids::REPLAY => Some(Self::Replay),
            button_ids::LOOP => Some(Self::Loop),
            button_ids::SHUFFLE => Some(Self::Shuffle),
            button_ids::VOLUME_UP => Some(Self::VolumeUp),
            button_ids::VOLUME_DOWN => Some(Self::VolumeDown),
            button_ids::STOP => Some(Self::Stop),
            _ => None,
        }
    }

    /// Acciones que pueden tardar más que el plazo de 3 s de Discord
    /// (saltar puede buscar una pista de autoplay)
    pub fn acknowledges_first(self) -> bool {
        matches!(self, Self::Skip | Self::Stop)
    }
}

/// Crea los controles principales del reproductor
pub fn player_controls(paused: bool, loop_mode: LoopMode) -> Vec<CreateActionRow> {
    let play_pause_emoji = if paused { '▶' } else { '⏸' };
    let loop_emoji = match loop_mode {
        LoopMode::Single => '🔂',
        _ => '🔁',
    };
    let loop_style = if loop_mode == LoopMode::Off {
        ButtonStyle::Secondary
    } else {
        ButtonStyle::Success
    };

    let row1 = CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::PLAY_PAUSE)
            .emoji(play_pause_emoji)
            .style(ButtonStyle::Primary),
        CreateButton::new(button_ids::SKIP)
            .emoji('⏭')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::REPLAY)
            .emoji('⏮')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::STOP)
            .emoji('⏹')
            .style(ButtonStyle::Danger),
    ]);

    let row2 = CreateActionRow::Buttons(vec![
        CreateButton::new(button_ids::LOOP)
            .emoji(loop_emoji)
            .style(loop_style),
        CreateButton::new(button_ids::SHUFFLE)
            .emoji('🔀')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::VOLUME_DOWN)
            .emoji('🔉')
            .style(ButtonStyle::Secondary),
        CreateButton::new(button_ids::VOLUME_UP)
            .emoji('🔊')
            .style(ButtonStyle::Secondary),
    ]);

    vec![row1, row2]
}

/// Crea menú de selección para los resultados de búsqueda
pub fn search_menu(results: &[SearchResult]) -> CreateActionRow {
    let options = results
        .iter()
        .enumerate()
        .map(|(i, result)| {
            CreateSelectMenuOption::new(option_label(i + 1, result), selection_value(i + 1))
        })
        .collect();

    CreateActionRow::SelectMenu(
        CreateSelectMenu::new(
            button_ids::TRACK_SELECTION,
            CreateSelectMenuKind::String { options },
        )
        .placeholder("🎵 Elige una canción"),
    )
}

/// Valor de la opción `index` (1-based)
pub fn selection_value(index: usize) -> String {
    format!("{}{}", SELECTION_PREFIX, index)
}

/// Índice 1-based de un valor del menú
pub fn parse_selection(value: &str) -> Option<usize> {
    value
        .strip_prefix(SELECTION_PREFIX)?
        .parse::<usize>()
        .ok()
        .filter(|i| *i > 0)
}

fn option_label(index: usize, result: &SearchResult) -> String {
    let duration = result
        .duration
        .map(|d| format!(" [{}]", format_duration(d)))
        .unwrap_or_default();
    truncate(&format!("{}. {}{}", index, result.title, duration), MAX_LABEL_LEN)
}

/// Corta en límite de carácter, no de byte
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}
