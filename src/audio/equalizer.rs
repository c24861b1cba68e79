use std::fmt;

use crate::{audio::effects::FilterDirective, error::PlaybackError};

/// Ancho de banda (Hz) de una banda paramétrica
const NARROW_WIDTH: u32 = 100;
const MEDIUM_WIDTH: u32 = 150;
const WIDE_WIDTH: u32 = 200;

/// Ganancia del preset `boost` (se aplica como bass shelf)
const BOOST_BASS_DB: i32 = 8;

/// Banda de ecualizador paramétrico (`width_type=h`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBand {
    pub frequency: u32,
    pub width: u32,
    pub gain_db: f32,
}

impl EqBand {
    const fn new(frequency: u32, width: u32, gain_db: f32) -> Self {
        Self {
            frequency,
            width,
            gain_db,
        }
    }
}

/// Presets de ecualizador disponibles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqPreset {
    Rock,
    Pop,
    Jazz,
    Soft,
    Boost,
}

impl EqPreset {
    pub const ALL: [EqPreset; 5] = [
        EqPreset::Rock,
        EqPreset::Pop,
        EqPreset::Jazz,
        EqPreset::Soft,
        EqPreset::Boost,
    ];

    /// Obtiene un preset por nombre
    pub fn from_name(name: &str) -> Result<Self, PlaybackError> {
        match name.trim().to_lowercase().as_str() {
            "rock" => Ok(Self::Rock),
            "pop" => Ok(Self::Pop),
            "jazz" => Ok(Self::Jazz),
            "soft" => Ok(Self::Soft),
            "boost" => Ok(Self::Boost),
            _ => Err(PlaybackError::UnknownPreset(name.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Rock => "rock",
            Self::Pop => "pop",
            Self::Jazz => "jazz",
            Self::Soft => "soft",
            Self::Boost => "boost",
        }
    }

    /// Lista todos los presets disponibles
    pub fn list() -> Vec<&'static str> {
        Self::ALL.iter().map(|p| p.name()).collect()
    }

    /// Directivas fijas del preset, en orden de aplicación
    pub fn directives(self) -> Vec<FilterDirective> {
        match self {
            Self::Rock => vec![
                FilterDirective::Equalizer(EqBand::new(60, NARROW_WIDTH, 4.0)),
                FilterDirective::Equalizer(EqBand::new(170, NARROW_WIDTH, 3.0)),
            ],
            Self::Pop => vec![
                FilterDirective::Equalizer(EqBand::new(60, NARROW_WIDTH, 3.0)),
                FilterDirective::Equalizer(EqBand::new(1000, WIDE_WIDTH, 2.0)),
            ],
            Self::Jazz => vec![FilterDirective::Equalizer(EqBand::new(
                200,
                MEDIUM_WIDTH,
                2.0,
            ))],
            Self::Soft => vec![FilterDirective::Equalizer(EqBand::new(
                100,
                MEDIUM_WIDTH,
                1.0,
            ))],
            Self::Boost => vec![FilterDirective::Bass {
                gain_db: BOOST_BASS_DB,
            }],
        }
    }
}

impl fmt::Display for EqPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
