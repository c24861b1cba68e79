use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::{collections::VecDeque, fmt, time::Duration};
use tracing::{debug, info};

use crate::{error::PlaybackError, sources::StreamDescriptor};

pub const ITEMS_PER_PAGE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopMode {
    #[default]
    Off,
    Single,
    Queue,
}

impl LoopMode {
    /// Siguiente modo en el ciclo del botón: off → single → queue → off
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::Single,
            Self::Single => Self::Queue,
            Self::Queue => Self::Off,
        }
    }

    pub fn parse(value: &str) -> Result<Self, PlaybackError> {
        match value.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(Self::Off),
            "single" | "track" | "song" => Ok(Self::Single),
            "queue" | "all" => Ok(Self::Queue),
            _ => Err(PlaybackError::UnknownLoopMode(value.to_string())),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Off => "➡️ Desactivado",
            Self::Single => "🔂 Canción",
            Self::Queue => "🔁 Cola",
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => f.write_str("off"),
            Self::Single => f.write_str("single"),
            Self::Queue => f.write_str("queue"),
        }
    }
}

/// Cola FIFO de pistas pendientes. Nunca contiene la pista en reproducción.
#[derive(Debug, Clone)]
pub struct TrackQueue {
    items: VecDeque<StreamDescriptor>,
    max_size: usize,
}

impl TrackQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_size,
        }
    }

    /// Agrega al final; devuelve la posición (1-based)
    pub fn enqueue(&mut self, descriptor: StreamDescriptor) -> Result<usize, PlaybackError> {
        if self.items.len() >= self.max_size {
            return Err(PlaybackError::QueueFull(self.max_size));
        }

        info!("➕ Agregado a la cola: {}", descriptor.title);
        self.items.push_back(descriptor);
        Ok(self.items.len())
    }

    /// Agrega varias pistas hasta llenar la cola; devuelve cuántas entraron
    pub fn extend(&mut self, descriptors: Vec<StreamDescriptor>) -> usize {
        let available_space = self.max_size.saturating_sub(self.items.len());
        let to_add = descriptors.len().min(available_space);

        self.items.extend(descriptors.into_iter().take(to_add));

        info!("➕ Agregadas {} canciones a la cola", to_add);
        to_add
    }

    /// Reinserta al final la pista que acaba de terminar (loop de cola).
    /// No respeta el límite: la pista ya formaba parte del ciclo.
    pub fn requeue(&mut self, descriptor: StreamDescriptor) {
        debug!("🔁 Reinsertada al final por loop de cola: {}", descriptor.title);
        self.items.push_back(descriptor);
    }

    pub fn dequeue_front(&mut self) -> Option<StreamDescriptor> {
        self.items.pop_front()
    }

    /// Elimina por posición 1-based
    pub fn remove_at(&mut self, index: usize) -> Result<StreamDescriptor, PlaybackError> {
        let len = self.items.len();
        if index == 0 || index > len {
            return Err(PlaybackError::IndexOutOfRange { index, len });
        }

        let removed = self
            .items
            .remove(index - 1)
            .ok_or(PlaybackError::IndexOutOfRange { index, len })?;
        debug!("❌ Track eliminado en posición {}", index);
        Ok(removed)
    }

    pub fn shuffle(&mut self) {
        self.items.make_contiguous().shuffle(&mut rand::thread_rng());
        info!("🔀 Cola mezclada");
    }

    /// Limpia la cola y devuelve cuántas pistas tenía
    pub fn clear(&mut self) -> usize {
        let removed = self.items.len();
        self.items.clear();
        info!("🗑️ Cola limpiada");
        removed
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.items.iter()
    }

    /// Duración conocida de la cola
    pub fn total_duration(&self) -> Duration {
        self.items.iter().filter_map(|item| item.duration).sum()
    }

    /// Obtiene una página específica de la cola (1-based)
    pub fn page(&self, page: usize, items_per_page: usize) -> QueuePage {
        let items_per_page = items_per_page.max(1);
        let total_items = self.items.len();
        let total_pages = total_items.div_ceil(items_per_page).max(1);
        let current_page = page.clamp(1, total_pages);
        let start = (current_page - 1) * items_per_page;

        QueuePage {
            items: self
                .items
                .iter()
                .skip(start)
                .take(items_per_page)
                .cloned()
                .collect(),
            first_index: start + 1,
            current_page,
            total_pages,
            total_items,
            total_duration: self.total_duration(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueuePage {
    pub items: Vec<StreamDescriptor>,
    /// Posición (1-based) del primer item de la página
    pub first_index: usize,
    pub current_page: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub total_duration: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub title: String,
    pub played_at: DateTime<Utc>,
}

/// Registro de títulos que empezaron a sonar (incluye reinicios).
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn record(&mut self, title: impl Into<String>) {
        self.entries.push(HistoryEntry {
            title: title.into(),
            played_at: Utc::now(),
        });
    }

    /// Últimas `n` entradas, de la más antigua a la más reciente
    pub fn recent(&self, n: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

}
