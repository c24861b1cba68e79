use tokio::time::Instant;

use crate::sources::StreamDescriptor;

/// Pista cargada en el pipeline de audio.
///
/// Se crea en el momento en que empieza a sonar y se reemplaza entera en
/// cada reinicio (seek, filtro, skip, avance natural).
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub descriptor: StreamDescriptor,
    pub started_at: Instant,
    pub start_offset: f64,
    pub paused_at: Option<Instant>,
}

impl Track {
    pub fn begin(descriptor: StreamDescriptor, start_offset: f64, now: Instant) -> Self {
        Self {
            descriptor,
            started_at: now,
            start_offset,
            paused_at: None,
        }
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.descriptor.duration_secs()
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause(&mut self, now: Instant) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Desplaza el inicio para que el tiempo en pausa no cuente
    pub fn resume(&mut self, now: Instant) {
        if let Some(paused_at) = self.paused_at.take() {
            self.started_at += now.saturating_duration_since(paused_at);
        }
    }
}
