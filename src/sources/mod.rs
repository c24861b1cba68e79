pub mod ytdlp;

use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::error::PlaybackError;

pub use ytdlp::YtDlpClient;

/// Descriptor de un stream reproducible, resuelto por el [`MetadataResolver`]
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    pub stream_url: String,
    pub title: String,
    pub webpage_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration: Option<Duration>,
}

impl StreamDescriptor {
    pub fn new(stream_url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            stream_url: stream_url.into(),
            title: title.into(),
            webpage_url: None,
            thumbnail_url: None,
            duration: None,
        }
    }

    pub fn with_webpage(mut self, webpage_url: impl Into<String>) -> Self {
        self.webpage_url = Some(webpage_url.into());
        self
    }

    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.map(|d| d.as_secs_f64())
    }
}

/// Resultado de búsqueda (aún sin URL de stream)
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub webpage_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration: Option<Duration>,
}

impl SearchResult {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            webpage_url: None,
            thumbnail_url: None,
            duration: None,
        }
    }

    pub fn with_webpage(mut self, webpage_url: impl Into<String>) -> Self {
        self.webpage_url = Some(webpage_url.into());
        self
    }

    /// Clave para resolver este resultado: la página si existe, si no el título
    pub fn lookup_key(&self) -> &str {
        self.webpage_url.as_deref().unwrap_or(&self.title)
    }
}

/// Servicio de resolución de metadatos (compartido, sin estado, reentrante)
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Convierte una búsqueda o URL en un stream reproducible
    async fn resolve(&self, query: &str) -> Result<StreamDescriptor, PlaybackError>;

    /// Entradas de una playlist (vacío si falla)
    async fn resolve_playlist(&self, url: &str) -> Vec<StreamDescriptor>;

    /// Hasta `limit` resultados de búsqueda
    async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult>;
}

/// Verifica si el texto es una URL http(s)
pub fn is_url(query: &str) -> bool {
    Url::parse(query.trim())
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}
