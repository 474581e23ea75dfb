//! `NdiRuntime` backed by the real NDI SDK via the `grafton-ndi` crate.
//!
//! Follows the same `NDI::new()` / `XOptions::builder(..).build()` /
//! `X::new(&ndi, &opts)` shape an NDI output backend would use on the
//! sender side; here it's the discovery/receive side instead.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use grafton_ndi::{
    Finder, FinderOptions, Receiver as NdiReceiver, ReceiverBandwidth, ReceiverColorFormat,
    ReceiverOptions, FourCCVideoType, NDI,
};

use crate::config::{Bandwidth, ColorFormat, ReceiverConfig};
use crate::error::CoreError;
use crate::frame::{FourCc, ReleaseFn, VideoFrame};

use super::{FinderHandle, NdiRuntime, ReceiverHandle};

fn map_bandwidth(b: Bandwidth) -> ReceiverBandwidth {
    match b {
        Bandwidth::MetadataOnly => ReceiverBandwidth::MetadataOnly,
        Bandwidth::AudioOnly => ReceiverBandwidth::AudioOnly,
        Bandwidth::Lowest => ReceiverBandwidth::Lowest,
        Bandwidth::Highest => ReceiverBandwidth::Highest,
    }
}

fn map_color_format(c: ColorFormat) -> ReceiverColorFormat {
    match c {
        ColorFormat::BgrxBgra => ReceiverColorFormat::BgrxBgra,
        ColorFormat::UyvyBgra => ReceiverColorFormat::UyvyBgra,
        ColorFormat::RgbxRgba => ReceiverColorFormat::RgbxRgba,
        ColorFormat::UyvyRgba => ReceiverColorFormat::UyvyRgba,
        ColorFormat::Fastest => ReceiverColorFormat::Fastest,
        ColorFormat::Best => ReceiverColorFormat::Best,
    }
}

fn map_fourcc(f: FourCCVideoType) -> FourCc {
    match f {
        FourCCVideoType::UYVY => FourCc::Uyvy,
        FourCCVideoType::BGRA => FourCc::Bgra,
        FourCCVideoType::BGRX => FourCc::Bgrx,
        FourCCVideoType::RGBA => FourCc::Rgba,
        FourCCVideoType::RGBX => FourCc::Rgbx,
        FourCCVideoType::NV12 => FourCc::Nv12,
        FourCCVideoType::I420 => FourCc::I420,
        _ => FourCc::Unknown,
    }
}

struct FinderSlot {
    finder: Finder,
}

struct ReceiverSlot {
    receiver: NdiReceiver,
}

/// Process-wide `grafton-ndi` runtime. `NDI::new()` loads and initializes
/// the native library; the handle tables below map our opaque `u64`
/// handles onto the concrete `grafton_ndi` objects, which are not `Copy`.
pub struct NdiBackend {
    ndi: Mutex<Option<NDI>>,
    finders: Mutex<HashMap<FinderHandle, FinderSlot>>,
    receivers: Mutex<HashMap<ReceiverHandle, ReceiverSlot>>,
    next_handle: Mutex<u64>,
}

impl Default for NdiBackend {
    fn default() -> Self {
        Self {
            ndi: Mutex::new(None),
            finders: Mutex::new(HashMap::new()),
            receivers: Mutex::new(HashMap::new()),
            next_handle: Mutex::new(1),
        }
    }
}

impl NdiBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_handle(&self) -> u64 {
        let mut n = self.next_handle.lock().expect("ndi backend handle mutex poisoned");
        let h = *n;
        *n += 1;
        h
    }
}

impl NdiRuntime for NdiBackend {
    fn initialize(&self) -> bool {
        let mut guard = self.ndi.lock().expect("ndi backend mutex poisoned");
        if guard.is_some() {
            return true;
        }
        match NDI::new() {
            Ok(ndi) => {
                *guard = Some(ndi);
                true
            }
            Err(_) => false,
        }
    }

    fn destroy(&self) {
        self.finders.lock().expect("ndi backend mutex poisoned").clear();
        self.receivers.lock().expect("ndi backend mutex poisoned").clear();
        *self.ndi.lock().expect("ndi backend mutex poisoned") = None;
    }

    fn version(&self) -> String {
        "grafton-ndi".to_string()
    }

    fn create_finder(&self, show_local: bool, groups: Option<&str>, extra_ips: Option<&str>) -> Option<FinderHandle> {
        let ndi_guard = self.ndi.lock().expect("ndi backend mutex poisoned");
        let ndi = ndi_guard.as_ref()?;

        let mut builder = FinderOptions::builder().show_local_sources(show_local);
        if let Some(g) = groups {
            builder = builder.groups(g);
        }
        if let Some(ips) = extra_ips {
            builder = builder.extra_ips(ips);
        }
        let opts = builder.build();

        let finder = Finder::new(ndi, &opts).ok()?;
        let handle = self.alloc_handle();
        self.finders
            .lock()
            .expect("ndi backend mutex poisoned")
            .insert(handle, FinderSlot { finder });
        Some(handle)
    }

    fn destroy_finder(&self, handle: FinderHandle) {
        self.finders.lock().expect("ndi backend mutex poisoned").remove(&handle);
    }

    fn wait_for_sources(&self, handle: FinderHandle, timeout_ms: u32) -> bool {
        let finders = self.finders.lock().expect("ndi backend mutex poisoned");
        match finders.get(&handle) {
            Some(slot) => slot.finder.wait_for_sources(timeout_ms),
            None => false,
        }
    }

    fn current_sources(&self, handle: FinderHandle) -> Vec<String> {
        let finders = self.finders.lock().expect("ndi backend mutex poisoned");
        match finders.get(&handle) {
            Some(slot) => slot.finder.current_sources().into_iter().map(|s| s.name).collect(),
            None => Vec::new(),
        }
    }

    fn create_receiver(&self, name: &str, cfg: ReceiverConfig) -> Option<ReceiverHandle> {
        let ndi_guard = self.ndi.lock().expect("ndi backend mutex poisoned");
        let ndi = ndi_guard.as_ref()?;

        let opts = ReceiverOptions::builder(name)
            .bandwidth(map_bandwidth(cfg.bandwidth))
            .color_format(map_color_format(cfg.color_format))
            .allow_video_fields(cfg.allow_video_fields)
            .build();

        let receiver = NdiReceiver::new(ndi, &opts).ok()?;
        let handle = self.alloc_handle();
        self.receivers
            .lock()
            .expect("ndi backend mutex poisoned")
            .insert(handle, ReceiverSlot { receiver });
        Some(handle)
    }

    fn destroy_receiver(&self, handle: ReceiverHandle) {
        self.receivers.lock().expect("ndi backend mutex poisoned").remove(&handle);
    }

    fn connect(&self, handle: ReceiverHandle, source_name: &str) -> bool {
        let receivers = self.receivers.lock().expect("ndi backend mutex poisoned");
        match receivers.get(&handle) {
            Some(slot) => slot.receiver.connect(source_name).is_ok(),
            None => false,
        }
    }

    fn capture(&self, handle: ReceiverHandle, timeout_ms: u32) -> Result<Option<VideoFrame<'_>>, CoreError> {
        let receivers = self.receivers.lock().expect("ndi backend mutex poisoned");
        let slot = match receivers.get(&handle) {
            Some(s) => s,
            None => return Ok(None),
        };

        match slot.receiver.capture_video(timeout_ms) {
            Ok(Some(raw)) => {
                let fourcc = map_fourcc(raw.fourcc);
                let is_compressed = fourcc.is_compressed();
                let data_len = raw.data.len() as u32;
                let data: &[u8] = unsafe { std::slice::from_raw_parts(raw.data.as_ptr(), raw.data.len()) };

                let rx_ptr = &slot.receiver as *const NdiReceiver as usize;
                let release: ReleaseFn = Arc::new(move |native_handle: u64| {
                    let receiver = unsafe { &*(rx_ptr as *const NdiReceiver) };
                    receiver.free_video(native_handle);
                });

                Ok(Some(VideoFrame::new(
                    raw.width as u32,
                    raw.height as u32,
                    fourcc,
                    if is_compressed { 0 } else { raw.line_stride_or_size_bytes() },
                    (raw.frame_rate_n as u32, raw.frame_rate_d.max(1) as u32),
                    raw.timestamp,
                    data_len,
                    data,
                    raw.native_handle(),
                    release,
                )))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(CoreError::ConnectionFailed { source: format!("{e:?}") }),
        }
    }

    fn performance(&self, handle: ReceiverHandle) -> (u64, u64, u64, u64, u64) {
        let receivers = self.receivers.lock().expect("ndi backend mutex poisoned");
        match receivers.get(&handle) {
            Some(slot) => {
                let p = slot.receiver.performance();
                (p.total_video_frames, p.dropped_video_frames, p.total_audio_frames, p.dropped_audio_frames, p.total_metadata_frames)
            }
            None => (0, 0, 0, 0, 0),
        }
    }

    fn is_connected(&self, handle: ReceiverHandle) -> bool {
        let receivers = self.receivers.lock().expect("ndi backend mutex poisoned");
        match receivers.get(&handle) {
            Some(slot) => slot.receiver.connection_count() > 0,
            None => false,
        }
    }
}
