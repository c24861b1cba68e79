use async_trait::async_trait;
use std::{path::PathBuf, process::Stdio, time::Duration};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{is_url, MetadataResolver, SearchResult, StreamDescriptor};
use crate::error::PlaybackError;

/// Separador de campos en las plantillas de `--print`
const FIELD_SEP: char = '\u{1f}';

const STREAM_TEMPLATE: &str =
    "%(url)s\u{1f}%(title)s\u{1f}%(webpage_url)s\u{1f}%(thumbnail)s\u{1f}%(duration)s";
const SEARCH_TEMPLATE: &str =
    "%(title)s\u{1f}%(webpage_url,url)s\u{1f}%(thumbnail)s\u{1f}%(duration)s";

/// Cliente de yt-dlp: resuelve búsquedas y URLs a streams reproducibles
pub struct YtDlpClient {
    binary: PathBuf,
    timeout: Duration,
    playlist_limit: usize,
}

impl YtDlpClient {
    pub fn new(binary: PathBuf, timeout: Duration, playlist_limit: usize) -> Self {
        Self {
            binary,
            timeout,
            playlist_limit,
        }
    }

    /// Ejecuta yt-dlp y devuelve las líneas no vacías de stdout
    async fn run(&self, args: &[String]) -> Result<Vec<String>, String> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| format!("yt-dlp excedió {}s", self.timeout.as_secs()))?
            .map_err(|e| format!("no se pudo ejecutar yt-dlp: {}", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(stderr.trim().to_string());
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn base_args(template: &str) -> Vec<String> {
        [
            "--print",
            template,
            "-f",
            "bestaudio/best",
            "--no-warnings",
            "--socket-timeout",
            "15",
        ]
        .iter()
        .map(|a| a.to_string())
        .collect()
    }
}

#[async_trait]
impl MetadataResolver for YtDlpClient {
    async fn resolve(&self, query: &str) -> Result<StreamDescriptor, PlaybackError> {
        let query = query.trim();
        let target = if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        };

        let mut args = Self::base_args(STREAM_TEMPLATE);
        args.extend(["--no-playlist".to_string(), target]);

        let lines = self.run(&args).await.map_err(|e| {
            warn!("❌ yt-dlp no pudo resolver '{}': {}", query, e);
            PlaybackError::ResolveFailed(query.to_string())
        })?;

        let descriptor = lines
            .iter()
            .find_map(|l| parse_stream_line(l))
            .ok_or_else(|| PlaybackError::ResolveFailed(query.to_string()))?;

        info!("🔍 Resuelto: {}", descriptor.title);
        Ok(descriptor)
    }

    async fn resolve_playlist(&self, url: &str) -> Vec<StreamDescriptor> {
        let mut args = Self::base_args(STREAM_TEMPLATE);
        args.extend([
            "--yes-playlist".to_string(),
            "--ignore-errors".to_string(),
            "--playlist-end".to_string(),
            self.playlist_limit.to_string(),
            url.trim().to_string(),
        ]);

        match self.run(&args).await {
            Ok(lines) => {
                let entries: Vec<_> = lines.iter().filter_map(|l| parse_stream_line(l)).collect();
                info!("📃 Playlist con {} entradas: {}", entries.len(), url);
                entries
            }
            Err(e) => {
                warn!("❌ Error al leer playlist '{}': {}", url, e);
                Vec::new()
            }
        }
    }

    async fn search(&self, query: &str, limit: usize) -> Vec<SearchResult> {
        let mut args = Self::base_args(SEARCH_TEMPLATE);
        args.extend([
            "--flat-playlist".to_string(),
            format!("ytsearch{}:{}", limit, query.trim()),
        ]);

        match self.run(&args).await {
            Ok(lines) => {
                let results: Vec<_> = lines
                    .iter()
                    .filter_map(|l| parse_search_line(l))
                    .take(limit)
                    .collect();
                debug!("🔍 {} resultados para '{}'", results.len(), query);
                results
            }
            Err(e) => {
                warn!("❌ Error en búsqueda '{}': {}", query, e);
                Vec::new()
            }
        }
    }
}

/// Campo de plantilla; yt-dlp imprime `NA` cuando falta
fn field(value: Option<&str>) -> Option<String> {
    match value.map(str::trim) {
        None | Some("") | Some("NA") | Some("None") => None,
        Some(v) => Some(v.to_string()),
    }
}

fn duration_field(value: Option<&str>) -> Option<Duration> {
    field(value)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
        .map(Duration::from_secs_f64)
}

/// `url␟title␟webpage␟thumbnail␟duration`
fn parse_stream_line(line: &str) -> Option<StreamDescriptor> {
    let mut parts = line.split(FIELD_SEP);
    let stream_url = field(parts.next())?;
    let title = field(parts.next()).unwrap_or_else(|| "Unknown".to_string());

    let mut descriptor = StreamDescriptor::new(stream_url, title);
    if let Some(webpage_url) = field(parts.next()) {
        descriptor = descriptor.with_webpage(webpage_url);
    }
    if let Some(thumbnail_url) = field(parts.next()) {
        descriptor = descriptor.with_thumbnail(thumbnail_url);
    }
    if let Some(duration) = duration_field(parts.next()) {
        descriptor = descriptor.with_duration(duration);
    }
    Some(descriptor)
}

/// `title␟webpage␟thumbnail␟duration`
fn parse_search_line(line: &str) -> Option<SearchResult> {
    let mut parts = line.split(FIELD_SEP);
    let title = field(parts.next())?;

    let mut result = SearchResult::new(title);
    if let Some(webpage_url) = field(parts.next()) {
        result = result.with_webpage(webpage_url);
    }
    result.thumbnail_url = field(parts.next());
    result.duration = duration_field(parts.next());
    Some(result)
}
