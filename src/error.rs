use thiserror::Error;

/// Errores de dominio del coordinador de reproducción.
///
/// Todos se recuperan en el límite del comando y se muestran al usuario
/// con [`PlaybackError::user_message`]; ninguno debe propagarse más allá
/// del manejo de un único comando.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("Debes estar en un canal de voz")]
    NotInVoiceChannel,

    #[error("Debes estar en el mismo canal de voz que el bot")]
    NotInSameVoiceChannel,

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("La reproducción no está pausada")]
    NotPaused,

    #[error("No se pudo iniciar la reproducción: {0}")]
    PlaybackStartFailed(String),

    #[error("No se pudo obtener `{0}`")]
    ResolveFailed(String),

    #[error("Número inválido: {index} (rango 1-{len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("{what} debe estar entre {min} y {max}")]
    InvalidRange {
        what: &'static str,
        min: i64,
        max: i64,
    },

    #[error("Tiempo inválido `{0}`: usa segundos, mm:ss o hh:mm:ss")]
    InvalidTimeSpec(String),

    #[error("Preset de ecualizador desconocido `{0}`")]
    UnknownPreset(String),

    #[error("Modo de repetición desconocido `{0}`: usa off, single o queue")]
    UnknownLoopMode(String),

    #[error("No hay una búsqueda activa, usa /search primero")]
    NoActiveSearch,

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("El reproductor está ocupado, inténtalo de nuevo")]
    SessionBusy,

    #[error("El bot no está conectado a un canal de voz")]
    NotConnected,

    #[error("Error al conectar al canal de voz: {0}")]
    ConnectFailed(String),

    #[error("La petición fue reemplazada por un comando más reciente")]
    Superseded,
}

impl PlaybackError {
    /// Mensaje listo para mostrar en Discord
    pub fn user_message(&self) -> String {
        format!("❌ {}", self)
    }
}
