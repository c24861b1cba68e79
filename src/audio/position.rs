//! Cálculo de la posición de reproducción y formato de tiempos.

use tokio::time::Instant;

use crate::{audio::track::Track, error::PlaybackError};

const PROGRESS_WIDTH: usize = 20;

/// Posición transcurrida en segundos.
///
/// `start_offset + (now - started_at)`, congelada mientras está en pausa y
/// limitada a `[0, duración]` cuando la duración es conocida.
pub fn position(track: &Track, now: Instant) -> f64 {
    let reference = track.paused_at.unwrap_or(now);
    let elapsed = reference
        .saturating_duration_since(track.started_at)
        .as_secs_f64();
    let position = (track.start_offset + elapsed).max(0.0);

    match track.duration_secs() {
        Some(duration) => position.min(duration),
        None => position,
    }
}

/// Interpreta `90`, `1:30`, `1:02:03` o formatos humantime como `1m30s`
pub fn parse_time_spec(spec: &str) -> Result<f64, PlaybackError> {
    let spec = spec.trim();
    let invalid = || PlaybackError::InvalidTimeSpec(spec.to_string());

    if spec.is_empty() {
        return Err(invalid());
    }

    if spec.chars().all(|c| c.is_ascii_digit() || c == ':') {
        let parts = spec
            .split(':')
            .map(|p| p.parse::<u64>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;

        if parts.len() > 3 {
            return Err(invalid());
        }
        let seconds = parts
            .iter()
            .try_fold(0u64, |acc, part| acc.checked_mul(60)?.checked_add(*part))
            .ok_or_else(invalid)?;
        return Ok(seconds as f64);
    }

    humantime::parse_duration(spec)
        .map(|d| d.as_secs_f64())
        .map_err(|_| invalid())
}

/// `m:ss` o `h:mm:ss`
pub fn format_clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{}:{:02}", minutes, secs)
    }
}

/// Barra de progreso de 20 caracteres, o solo la posición si no hay duración
pub fn progress_bar(position: f64, duration: Option<f64>) -> String {
    match duration {
        Some(duration) if duration > 0.0 => {
            let fraction = (position / duration).clamp(0.0, 1.0);
            let filled = (fraction * PROGRESS_WIDTH as f64) as usize;
            format!(
                "[{}{}] {}/{}",
                "█".repeat(filled),
                "░".repeat(PROGRESS_WIDTH - filled),
                format_clock(position),
                format_clock(duration)
            )
        }
        _ => format_clock(position),
    }
}
