//! External-collaborator traits.
//!
//! Everything this crate consumes but does not itself implement — the
//! native discovery/receive runtime, the display surface, the hardware
//! codec, and the MP4 muxer — is expressed as a trait here. `ndi_backend`
//! is the real implementation behind the `ndi` feature; `fake` is an
//! in-memory test double used by this crate's own test suite and available
//! to embedders building without the proprietary SDK.

pub mod fake;
#[cfg(feature = "ndi")]
pub mod ndi_backend;

use crate::config::ReceiverConfig;
use crate::error::CoreError;
use crate::frame::VideoFrame;

/// A native finder handle, opaque outside this module.
pub type FinderHandle = u64;
/// A native receiver handle, opaque outside this module.
pub type ReceiverHandle = u64;

/// The native discovery/receive runtime.
///
/// One process-wide instance, created via `initialize()` before any finder
/// or receiver operation and torn down via `destroy()` at shutdown.
pub trait NdiRuntime: Send + Sync {
    fn initialize(&self) -> bool;
    fn destroy(&self);
    fn version(&self) -> String;

    fn create_finder(&self, show_local: bool, groups: Option<&str>, extra_ips: Option<&str>) -> Option<FinderHandle>;
    fn destroy_finder(&self, handle: FinderHandle);
    /// Blocks up to `timeout_ms`; returns true if the source set changed.
    fn wait_for_sources(&self, handle: FinderHandle, timeout_ms: u32) -> bool;
    fn current_sources(&self, handle: FinderHandle) -> Vec<String>;

    fn create_receiver(&self, name: &str, cfg: ReceiverConfig) -> Option<ReceiverHandle>;
    fn destroy_receiver(&self, handle: ReceiverHandle);
    fn connect(&self, handle: ReceiverHandle, source_name: &str) -> bool;
    /// Blocks up to `timeout_ms`; `Ok(None)` on timeout.
    fn capture(&self, handle: ReceiverHandle, timeout_ms: u32) -> Result<Option<VideoFrame<'_>>, CoreError>;
    fn performance(&self, handle: ReceiverHandle) -> (u64, u64, u64, u64, u64);
    fn is_connected(&self, handle: ReceiverHandle) -> bool;
}

/// A lockable 2-D drawing surface that is also a sink for hardware decode
/// output.
pub trait Surface: Send + Sync {
    /// Locks the canvas and returns a mutable RGBA8 buffer of `width * height * 4`
    /// bytes, tightly packed. The renderer writes into it and calls `unlock`.
    fn lock_canvas(&self, width: u32, height: u32) -> Option<&mut [u8]>;
    fn unlock(&self);
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// One decoded or to-be-decoded picture handed across the codec boundary.
pub struct CodecFrame {
    pub data: Vec<u8>,
    pub timestamp_us: i64,
    pub is_keyframe: bool,
}

/// A hardware (or software) video decoder targeting a bound surface.
pub trait CodecBackend: Send {
    fn configure(&mut self, mime: &str, width: u32, height: u32) -> Result<(), CoreError>;
    /// Submit one Annex-B compressed frame; returns quickly (bounded by an
    /// internal 10ms input-slot-acquire timeout upstream).
    fn submit(&mut self, data: &[u8], timestamp_us: i64) -> Result<(), CoreError>;
    /// Poll for a decoded output; `None` on timeout, `Some(true)` if the
    /// picture stream signalled a format change the caller should react to.
    fn poll_output(&mut self, timeout_ms: u32) -> Result<Option<bool>, CoreError>;
    fn release(&mut self);
}

/// A hardware (or software) H.264 encoder for the uncompressed-input
/// re-encode branch.
pub trait EncoderBackend: Send {
    fn configure(&mut self, width: u32, height: u32, bitrate_bps: u32, fps: u32) -> Result<(), CoreError>;
    /// `nv12` must be `width * height * 3 / 2` bytes.
    fn submit_nv12(&mut self, nv12: &[u8], timestamp_us: i64) -> Result<(), CoreError>;
    fn submit_eos(&mut self) -> Result<(), CoreError>;
    /// Drains whatever output is ready; returns compressed Annex-B samples.
    fn drain(&mut self) -> Result<Vec<CodecFrame>, CoreError>;
    fn release(&mut self);
}
