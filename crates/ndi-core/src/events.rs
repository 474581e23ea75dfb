use std::path::PathBuf;

use crate::source::SourceDescriptor;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Receiver connection state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(SourceDescriptor),
    Error(String),
}

/// Recorder state exposed to the embedding UI.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingState {
    Idle,
    Recording { duration_ms: u64 },
    Stopped { file: Option<PathBuf> },
    Error(String),
}

/// Events the core emits on an internal channel so embedders (a UI, this
/// repo's own CLI, tests) can observe state without polling.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// General-purpose log line; `ndi-cli` forwards these to `logi!`/`logw!`/`loge!`.
    Log { level: LogLevel, tag: &'static str, msg: String },

    /// A fresh discovery snapshot.
    DiscoverySnapshot(Vec<SourceDescriptor>),

    /// The receiver's connection state changed.
    ConnectionChanged(ConnectionState),

    /// The recorder's state changed.
    RecordingChanged(RecordingState),

    /// Video-info digest changed: `"{W}x{H} @ {fps} | {label}"`.
    VideoInfoChanged(String),

    /// Bitrate string recomputed every 1000ms.
    BitrateChanged(String),

    /// Receiver performance snapshot.
    Performance {
        total_video_frames: u64,
        dropped_video_frames: u64,
        total_audio_frames: u64,
        dropped_audio_frames: u64,
        total_metadata_frames: u64,
        quality: u8,
    },

    /// Auto-reconnect attempt counter changed.
    ReconnectAttempt { attempt: u32, max_attempts: u32 },
}
