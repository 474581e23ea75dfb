use std::{fmt, path::PathBuf};

/// Error kinds surfaced across the media plane.
///
/// Per-frame hot-path failures (`UnsupportedPixelFormat`, `InvalidBuffer`,
/// `MuxerWriteFailed`, `DecoderFault`, `ReleaseRace`) are logged and absorbed
/// where they occur; they're listed here because callers that want to
/// observe them can do so through `CoreEvent::Log`, not because they
/// propagate as `Result`.
#[derive(Debug)]
pub enum CoreError {
    /// Finder/Receiver used before the native runtime was initialized.
    RuntimeNotInitialized,
    /// Native `create` call returned a null handle.
    HandleCreationFailed { what: &'static str, msg: String },
    /// Exception/failure during `connect()`.
    ConnectionFailed { source: String },
    /// Connection-lost triple guard fired.
    ConnectionLost,
    /// `startRecording` called with no prior frame or an unsupported FourCC.
    UnsupportedRecordingFormat { msg: String },
    /// I/O error reading or writing a file.
    Io { path: PathBuf, source: std::io::Error },
    /// JSON parse error for a config file.
    Json { path: PathBuf, source: serde_json::Error },
    /// The `config/` directory could not be located.
    ConfigNotFound { start_dir: PathBuf },
    /// Config is syntactically valid JSON but semantically invalid.
    InvalidConfig { path: PathBuf, msg: String },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::RuntimeNotInitialized => {
                write!(f, "NDI native runtime has not been initialized")
            }
            CoreError::HandleCreationFailed { what, msg } => {
                write!(f, "failed to create native {what}: {msg}")
            }
            CoreError::ConnectionFailed { source } => {
                write!(f, "connection failed: {source}")
            }
            CoreError::ConnectionLost => write!(f, "connection lost"),
            CoreError::UnsupportedRecordingFormat { msg } => {
                write!(f, "cannot start recording: {msg}")
            }
            CoreError::Io { path, source } => {
                write!(f, "I/O error for {}: {}", path.display(), source)
            }
            CoreError::Json { path, source } => {
                write!(f, "JSON parse error for {}: {}", path.display(), source)
            }
            CoreError::ConfigNotFound { start_dir } => {
                write!(f, "could not locate config/ starting from {}", start_dir.display())
            }
            CoreError::InvalidConfig { path, msg } => {
                write!(f, "invalid config {}: {}", path.display(), msg)
            }
        }
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CoreError::Io { source, .. } => Some(source),
            CoreError::Json { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
