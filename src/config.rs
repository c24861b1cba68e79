use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: f32,
    pub volume_step_percent: u16,

    // Cola
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub history_display: usize,
    pub search_results: usize,
    pub autoplay_candidates: usize,

    // Tiempos (segundos)
    pub session_lock_timeout_secs: u64,
    pub resolve_timeout_secs: u64,

    // Binarios externos
    pub ytdlp_path: PathBuf,
    pub ffmpeg_path: PathBuf,

    // Features
    pub enable_autoplay: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Construye la configuración a partir de una fuente de variables
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no está definido")?,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID no está definido")?
                .trim()
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: lookup("GUILD_ID")
                .and_then(|s| s.trim().parse().ok())
                .filter(|id| *id != 0),

            // Audio
            default_volume: parse_or(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,
            volume_step_percent: parse_or(
                &lookup,
                "VOLUME_STEP_PERCENT",
                defaults.volume_step_percent,
            )?,

            // Cola
            max_queue_size: parse_or(&lookup, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_playlist_size: parse_or(&lookup, "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,
            history_display: parse_or(&lookup, "HISTORY_DISPLAY", defaults.history_display)?,
            search_results: parse_or(&lookup, "SEARCH_RESULTS", defaults.search_results)?,
            autoplay_candidates: parse_or(
                &lookup,
                "AUTOPLAY_CANDIDATES",
                defaults.autoplay_candidates,
            )?,

            // Tiempos
            session_lock_timeout_secs: parse_or(
                &lookup,
                "SESSION_LOCK_TIMEOUT_SECS",
                defaults.session_lock_timeout_secs,
            )?,
            resolve_timeout_secs: parse_or(
                &lookup,
                "RESOLVE_TIMEOUT_SECS",
                defaults.resolve_timeout_secs,
            )?,

            // Binarios
            ytdlp_path: lookup("YTDLP_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ytdlp_path),
            ffmpeg_path: lookup("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),

            // Features
            enable_autoplay: parse_or(&lookup, "ENABLE_AUTOPLAY", defaults.enable_autoplay)?,
        })
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.01 and 2.0
    /// - Queue, playlist and search limits must be greater than 0
    /// - Timeouts must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if !(0.01..=2.0).contains(&self.default_volume) {
            anyhow::bail!(
                "Default volume must be between 0.01 and 2.0, got: {}",
                self.default_volume
            );
        }

        if self.volume_step_percent == 0 || self.volume_step_percent > 100 {
            anyhow::bail!(
                "Volume step must be between 1 and 100, got: {}",
                self.volume_step_percent
            );
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.search_results == 0 || self.search_results > 25 {
            // Límite de opciones de un select menu de Discord
            anyhow::bail!(
                "Search results must be between 1 and 25, got: {}",
                self.search_results
            );
        }

        if self.autoplay_candidates == 0 {
            anyhow::bail!("Autoplay candidates must be greater than 0");
        }

        if self.session_lock_timeout_secs == 0 || self.resolve_timeout_secs == 0 {
            anyhow::bail!("Timeouts must be greater than 0");
        }

        Ok(())
    }

    pub fn session_lock_timeout(&self) -> Duration {
        Duration::from_secs(self.session_lock_timeout_secs)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes sensitive information like tokens.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, step {}%\n  \
            Limits: {} queue, {} playlist, {} search results\n  \
            Timeouts: lock {}s, resolve {}s\n  \
            Binaries: {} / {}\n  \
            Features: Autoplay={}",
            self.application_id,
            self.guild_id
                .map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0).round() as u32,
            self.volume_step_percent,
            self.max_queue_size,
            self.max_playlist_size,
            self.search_results,
            self.session_lock_timeout_secs,
            self.resolve_timeout_secs,
            self.ytdlp_path.display(),
            self.ffmpeg_path.display(),
            self.enable_autoplay
        )
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{} inválido: {}", key, value)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            default_volume: 1.0,
            volume_step_percent: 10,

            max_queue_size: 1000,
            max_playlist_size: 100,
            history_display: 10,
            search_results: 5,
            autoplay_candidates: 5,

            session_lock_timeout_secs: 15,
            resolve_timeout_secs: 30,

            ytdlp_path: "yt-dlp".into(),
            ffmpeg_path: "ffmpeg".into(),

            enable_autoplay: false,
        }
    }
}
