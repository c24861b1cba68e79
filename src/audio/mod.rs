//! # Audio Module
//!
//! Coordinación de reproducción por guild.
//!
//! ## Architecture
//!
//! ### [`player`] - Registro de sesiones
//! - Una [`session::GuildSession`] por guild, creada al primer uso
//! - Comparte backend de voz, resolver y anunciador entre sesiones
//!
//! ### [`session`] - Coordinador
//! - Protocolo de reinicio (seek, filtros, replay) con generaciones
//! - Conexión, pausa, volumen y avance de cola
//!
//! ### [`queue`] / [`reconcile`] - Cola y política de avance
//! - Cola acotada, historial y modos de repetición
//! - Qué suena tras el fin de una pista, incluido autoplay
//!
//! ### [`effects`] / [`equalizer`] - Cadena de efectos
//! - Traduce los ajustes del guild a un grafo de filtros de ffmpeg
//!
//! ### [`track`] / [`position`] - Posición
//! - Reloj de reproducción que se congela en pausa
//!
//! ### [`backend`] / [`voice`] - Pipeline de voz
//! - Contratos con el pipeline y su implementación sobre songbird + ffmpeg
//!
//! ## Audio Quality
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Format**: PCM f32 estéreo desde ffmpeg

pub mod backend;
pub mod effects;
pub mod equalizer;
pub mod player;
pub mod position;
pub mod queue;
pub mod reconcile;
pub mod session;
pub mod track;
pub mod voice;

#[cfg(test)]
pub mod testing;
