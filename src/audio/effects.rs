//! Construcción de la cadena de efectos que se entrega al transcodificador.
//!
//! El pipeline de audio no puede cambiar efectos sobre un stream en vivo,
//! así que cada cambio reconstruye la cadena completa y reabre la fuente
//! (ver [`crate::audio::session`]).

use std::fmt;

use crate::audio::equalizer::{EqBand, EqPreset};

/// Nightcore: remuestrea a 1.25x y vuelve a 48 kHz
pub const NIGHTCORE_RATE: u32 = 48_000;
pub const NIGHTCORE_FACTOR: f32 = 1.25;

/// Vaporwave: remuestrea a 0.85x y vuelve a 44.1 kHz
pub const VAPORWAVE_RATE: u32 = 44_100;
pub const VAPORWAVE_FACTOR: f32 = 0.85;

/// Filtro principal; como mucho uno activo a la vez
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainFilter {
    Nightcore,
    Vaporwave,
    Equalizer(EqPreset),
}

impl fmt::Display for MainFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nightcore => f.write_str("nightcore"),
            Self::Vaporwave => f.write_str("vaporwave"),
            Self::Equalizer(preset) => write!(f, "eq:{}", preset),
        }
    }
}

/// Ajustes de efectos de un guild. Persisten entre canciones.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectSettings {
    pub main_filter: Option<MainFilter>,
    pub bass_gain_db: Option<i32>,
    pub volume: f32,
}

impl EffectSettings {
    pub fn with_volume(volume: f32) -> Self {
        Self {
            main_filter: None,
            bass_gain_db: None,
            volume,
        }
    }

    /// Activa `filter` o lo desactiva si ya estaba activo.
    /// Devuelve `true` si queda activo.
    pub fn toggle_main(&mut self, filter: MainFilter) -> bool {
        if self.main_filter == Some(filter) {
            self.main_filter = None;
            false
        } else {
            self.main_filter = Some(filter);
            true
        }
    }

    /// Quita filtro principal y bass; el volumen se conserva
    pub fn reset_filters(&mut self) {
        self.main_filter = None;
        self.bass_gain_db = None;
    }

    /// Hay etapas además del volumen (bass o filtro principal)
    pub fn has_filter_stages(&self) -> bool {
        self.main_filter.is_some() || self.bass_gain_db.is_some()
    }

    pub fn volume_percent(&self) -> u16 {
        (self.volume * 100.0).round() as u16
    }
}

impl Default for EffectSettings {
    fn default() -> Self {
        Self::with_volume(1.0)
    }
}

/// Directiva individual de filtro de audio
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDirective {
    Volume(f32),
    Bass { gain_db: i32 },
    Resample { sample_rate: u32, factor: f32 },
    Equalizer(EqBand),
}

impl fmt::Display for FilterDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Volume(volume) => write!(f, "volume={}", volume),
            Self::Bass { gain_db } => write!(f, "bass=g={}", gain_db),
            Self::Resample {
                sample_rate,
                factor,
            } => write!(
                f,
                "asetrate={rate}*{factor},aresample={rate}",
                rate = sample_rate,
                factor = factor
            ),
            Self::Equalizer(band) => write!(
                f,
                "equalizer=f={}:width_type=h:width={}:g={}",
                band.frequency, band.width, band.gain_db
            ),
        }
    }
}

/// Cadena ordenada de directivas
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectChain {
    directives: Vec<FilterDirective>,
}

impl EffectChain {
    /// Orden fijo: volumen, bass, filtro principal
    pub fn build(settings: &EffectSettings) -> Self {
        let mut directives = Vec::new();

        if (settings.volume - 1.0).abs() > f32::EPSILON {
            directives.push(FilterDirective::Volume(settings.volume));
        }

        if let Some(gain_db) = settings.bass_gain_db {
            directives.push(FilterDirective::Bass { gain_db });
        }

        match settings.main_filter {
            Some(MainFilter::Nightcore) => directives.push(FilterDirective::Resample {
                sample_rate: NIGHTCORE_RATE,
                factor: NIGHTCORE_FACTOR,
            }),
            Some(MainFilter::Vaporwave) => directives.push(FilterDirective::Resample {
                sample_rate: VAPORWAVE_RATE,
                factor: VAPORWAVE_FACTOR,
            }),
            Some(MainFilter::Equalizer(preset)) => directives.extend(preset.directives()),
            None => {}
        }

        Self { directives }
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn directives(&self) -> &[FilterDirective] {
        &self.directives
    }

    /// Grafo para `-af`, o `None` si la cadena está vacía
    pub fn to_filter_graph(&self) -> Option<String> {
        if self.directives.is_empty() {
            return None;
        }

        Some(
            self.directives
                .iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>()
                .join(","),
        )
    }

    /// Volumen incluido en la cadena (1.0 si no hay etapa de volumen)
    pub fn baked_volume(&self) -> f32 {
        self.directives
            .iter()
            .find_map(|d| match d {
                FilterDirective::Volume(v) => Some(*v),
                _ => None,
            })
            .unwrap_or(1.0)
    }
}
