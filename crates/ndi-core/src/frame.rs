//! The frame data model.
//!
//! `VideoFrame<'rx>` is the borrowed shape: its byte region is only valid
//! between capture and release on the same receiver. Rather than document
//! that as a rule callers must remember, the lease is modeled as the
//! lifetime `'rx` plus a `Drop` impl that calls back into the owning
//! receiver's release function exactly once, forcing any consumer that
//! outlives that lease to take an owned copy before the scope ends as a
//! compiler-enforced invariant instead of a documented one.

use std::sync::Arc;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Four-character pixel/codec layout code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u32)]
pub enum FourCc {
    Uyvy,
    Bgra,
    Bgrx,
    Rgba,
    Rgbx,
    Nv12,
    I420,
    H264,
    Hevc,
    Unknown,
}

impl FourCc {
    /// True iff this FourCC carries compressed (H264/HEVC) samples.
    pub fn is_compressed(self) -> bool {
        matches!(self, FourCc::H264 | FourCc::Hevc)
    }

    pub fn label(self) -> &'static str {
        match self {
            FourCc::H264 => "H.264",
            FourCc::Hevc => "H.265",
            other => match other {
                FourCc::Uyvy => "Raw UYVY",
                FourCc::Bgra => "Raw BGRA",
                FourCc::Bgrx => "Raw BGRX",
                FourCc::Rgba => "Raw RGBA",
                FourCc::Rgbx => "Raw RGBX",
                FourCc::Nv12 => "Raw NV12",
                FourCc::I420 => "Raw I420",
                _ => "Raw Unknown",
            },
        }
    }
}

/// A native handle used only to release a frame back to the runtime. Opaque
/// to this crate; the concrete backend (`crate::native`) knows how to turn
/// it back into whatever pointer type the native SDK wants.
pub type NativeFrameHandle = u64;

/// The callback a borrowed `VideoFrame` invokes on drop to return its byte
/// region to the runtime. Boxed so `receiver.rs` can bind it to "release on
/// *this* receiver" without `VideoFrame` needing to know the receiver type.
pub type ReleaseFn = Arc<dyn Fn(NativeFrameHandle) + Send + Sync>;

/// One captured video frame, borrowed from the native runtime.
///
/// Dropping a `VideoFrame` releases its native byte region exactly once.
/// Consumers that need the bytes to outlive this frame (the Recorder's
/// passthrough queue) must call `to_owned_copy()` before the frame is
/// dropped.
pub struct VideoFrame<'rx> {
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCc,
    /// Line stride in bytes; zero means tightly packed, negative means
    /// bottom-up. Meaningless (and zero) for compressed frames.
    pub line_stride_bytes: i32,
    pub frame_rate: (u32, u32),
    pub timestamp: i64,
    /// Declared content length for compressed frames (`data_size_in_bytes`).
    pub data_size_bytes: u32,
    data: &'rx [u8],
    handle: NativeFrameHandle,
    release: ReleaseFn,
    released: bool,
    _marker: std::marker::PhantomData<&'rx [u8]>,
}

impl<'rx> VideoFrame<'rx> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        width: u32,
        height: u32,
        fourcc: FourCc,
        line_stride_bytes: i32,
        frame_rate: (u32, u32),
        timestamp: i64,
        data_size_bytes: u32,
        data: &'rx [u8],
        handle: NativeFrameHandle,
        release: ReleaseFn,
    ) -> Self {
        Self {
            width,
            height,
            fourcc,
            line_stride_bytes,
            frame_rate,
            timestamp,
            data_size_bytes,
            data,
            handle,
            release,
            released: false,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn data(&self) -> &[u8] {
        self.data
    }

    pub fn handle(&self) -> NativeFrameHandle {
        self.handle
    }

    /// Minimum bytes a single row needs, ignoring stride padding.
    pub fn min_row_bytes(&self) -> usize {
        bytes_per_row(self.fourcc, self.width)
    }

    /// Deep-copy this frame's bytes into an owned, 'static snapshot
    ///. Safe to call any number of times
    /// before the frame is dropped/released.
    pub fn to_owned_copy(&self) -> VideoFrameCopy {
        VideoFrameCopy {
            width: self.width,
            height: self.height,
            fourcc: self.fourcc,
            line_stride_bytes: self.line_stride_bytes,
            frame_rate: self.frame_rate,
            timestamp: self.timestamp,
            data_size_bytes: self.data_size_bytes,
            data: self.data.to_vec(),
        }
    }

    /// Explicitly release early (e.g. the router dropped the frame without
    /// forwarding it anywhere). Idempotent: a second call, or the `Drop`
    /// impl running afterwards, is a no-op.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            (self.release)(self.handle);
        }
    }
}

impl<'rx> Drop for VideoFrame<'rx> {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// An owned snapshot of a `VideoFrame`'s byte region, used by
/// asynchronous consumers (the Recorder's writer queue) whose lifetime
/// outlives the native capture/release cycle.
#[derive(Debug, Clone)]
pub struct VideoFrameCopy {
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCc,
    pub line_stride_bytes: i32,
    pub frame_rate: (u32, u32),
    pub timestamp: i64,
    pub data_size_bytes: u32,
    pub data: Vec<u8>,
}

/// Bytes needed for one tightly-packed row of `width` pixels in `fourcc`.
/// Zero for compressed formats, where stride/row concepts don't apply.
pub fn bytes_per_row(fourcc: FourCc, width: u32) -> usize {
    let w = width as usize;
    match fourcc {
        FourCc::Bgra | FourCc::Bgrx | FourCc::Rgba | FourCc::Rgbx => w * 4,
        FourCc::Uyvy => w * 2,
        FourCc::Nv12 | FourCc::I420 => w, // luma plane row; chroma handled by callers that care
        FourCc::H264 | FourCc::Hevc | FourCc::Unknown => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn drop_releases_exactly_once() {
        let released = Arc::new(AtomicU32::new(0));
        let released2 = released.clone();
        let release: ReleaseFn = Arc::new(move |_h| {
            released2.fetch_add(1, Ordering::SeqCst);
        });

        let data = [0u8; 16];
        {
            let frame = VideoFrame::new(2, 2, FourCc::Bgra, 8, (30, 1), 0, 0, &data, 1, release);
            drop(frame);
        }
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_release_then_drop_is_still_once() {
        let released = Arc::new(AtomicU32::new(0));
        let released2 = released.clone();
        let release: ReleaseFn = Arc::new(move |_h| {
            released2.fetch_add(1, Ordering::SeqCst);
        });
        let data = [0u8; 16];
        let frame = VideoFrame::new(2, 2, FourCc::Bgra, 8, (30, 1), 0, 0, &data, 1, release);
        frame.release();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn is_compressed_matches_h264_hevc_only() {
        assert!(FourCc::H264.is_compressed());
        assert!(FourCc::Hevc.is_compressed());
        assert!(!FourCc::Bgra.is_compressed());
        assert!(!FourCc::Uyvy.is_compressed());
    }

    #[test]
    fn owned_copy_survives_borrow_drop() {
        let release: ReleaseFn = Arc::new(|_h| {});
        let data = [7u8; 16];
        let frame = VideoFrame::new(2, 2, FourCc::Bgra, 8, (30, 1), 0, 0, &data, 1, release);
        let copy = frame.to_owned_copy();
        drop(frame);
        assert_eq!(copy.data, vec![7u8; 16]);
    }
}
