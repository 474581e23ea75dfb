//! Per-frame dispatch to Renderer, Decoder, and Recorder.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use crate::decoder::Decoder;
use crate::frame::{FourCc, VideoFrame};
use crate::native::{CodecBackend, NdiRuntime, Surface};
use crate::recorder::Recorder;
use crate::renderer::Renderer;

const RECORDER_OFFER_DEADLINE: Duration = Duration::from_millis(200);
const BITRATE_WINDOW: Duration = Duration::from_millis(1000);

/// The most recently published video-info digest: written only by the capture thread, read once by
/// `start_recording`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: (u32, u32),
    pub fourcc: FourCc,
}

struct BitrateWindow {
    window_start: Instant,
    bytes_in_window: u64,
}

/// Routes each captured frame to the active consumers under a six-step
/// dispatch algorithm. Holds the shared pieces each consumer needs:
/// the display surface, an on-demand hardware decoder, and the recorder.
pub struct FrameRouter<R: NdiRuntime + 'static> {
    surface: Mutex<Option<Arc<dyn Surface>>>,
    renderer: Mutex<Renderer>,
    decoder: Mutex<Option<Decoder<R>>>,
    decoder_init_mutex: Mutex<()>,
    recorder: Mutex<Option<Arc<Recorder>>>,
    event_tx: Sender<crate::events::CoreEvent>,

    last_fourcc: Mutex<Option<FourCc>>,
    last_video_info: Mutex<Option<VideoInfo>>,
    bitrate: Mutex<BitrateWindow>,
    decoder_backend_factory: Box<dyn Fn() -> Box<dyn CodecBackend> + Send + Sync>,
    runtime: Arc<R>,
}

impl<R: NdiRuntime + 'static> FrameRouter<R> {
    pub fn new(
        runtime: Arc<R>,
        event_tx: Sender<crate::events::CoreEvent>,
        decoder_backend_factory: Box<dyn Fn() -> Box<dyn CodecBackend> + Send + Sync>,
    ) -> Self {
        Self {
            surface: Mutex::new(None),
            renderer: Mutex::new(Renderer::new()),
            decoder: Mutex::new(None),
            decoder_init_mutex: Mutex::new(()),
            recorder: Mutex::new(None),
            event_tx,
            last_fourcc: Mutex::new(None),
            last_video_info: Mutex::new(None),
            bitrate: Mutex::new(BitrateWindow { window_start: Instant::now(), bytes_in_window: 0 }),
            decoder_backend_factory,
            runtime,
        }
    }

    pub fn set_surface(&self, surface: Option<Arc<dyn Surface>>) {
        *self.surface.lock().expect("router surface mutex poisoned") = surface;
    }

    pub fn set_recorder(&self, recorder: Option<Arc<Recorder>>) {
        *self.recorder.lock().expect("router recorder mutex poisoned") = recorder;
    }

    pub fn last_video_info(&self) -> Option<VideoInfo> {
        *self.last_video_info.lock().expect("router video-info mutex poisoned")
    }

    /// Starts recording using the most recently published video-info digest.
    /// Fails if no frame has been routed yet or no recorder is configured.
    pub fn start_recording(&self) -> Result<(), crate::error::CoreError> {
        let info = self
            .last_video_info()
            .ok_or_else(|| crate::error::CoreError::UnsupportedRecordingFormat { msg: "No video stream to record".into() })?;
        let recorder = self
            .recorder
            .lock()
            .expect("router recorder mutex poisoned")
            .clone()
            .ok_or_else(|| crate::error::CoreError::UnsupportedRecordingFormat { msg: "no recorder configured".into() })?;
        recorder.start_recording(info)
    }

    pub fn stop_recording(&self) {
        if let Some(recorder) = self.recorder.lock().expect("router recorder mutex poisoned").clone() {
            recorder.stop_recording();
        }
    }

    /// Runs the full six-step per-frame algorithm. Always releases `frame`
    /// (via its `Drop` impl) no matter which branch is taken.
    pub fn dispatch(&self, frame: VideoFrame<'_>) {
        // Step 1: snapshot the surface; if none, drop (frame still releases via Drop).
        let surface = self.surface.lock().expect("router surface mutex poisoned").clone();
        if surface.is_none() {
            return;
        }
        let surface = surface.unwrap();

        // Step 2: update video-info digest.
        self.update_video_info(&frame);

        // Step 3: hand frame (or a copy) to the recorder if active.
        if let Some(recorder) = self.recorder.lock().expect("router recorder mutex poisoned").clone() {
            if frame.fourcc.is_compressed() {
                if recorder.is_recording() {
                    let copy = frame.to_owned_copy();
                    if !recorder.offer(copy, RECORDER_OFFER_DEADLINE) {
                        self.log_warn("ROUTER", "recorder queue full, dropped frame".to_string());
                    }
                }
            } else {
                recorder.encode_inline(&frame);
            }
        }

        // Step 4/5: uncompressed -> renderer; compressed -> decoder.
        if frame.fourcc.is_compressed() {
            self.dispatch_compressed(&frame, &surface);
        } else {
            // A compressed->uncompressed switch tears down any live decoder.
            let mut decoder_slot = self.decoder.lock().expect("router decoder mutex poisoned");
            if let Some(mut dec) = decoder_slot.take() {
                dec.shutdown();
            }
            drop(decoder_slot);

            let mut renderer = self.renderer.lock().expect("router renderer mutex poisoned");
            if let Err(e) = renderer.render(&frame, surface.as_ref()) {
                self.log_warn("ROUTER", format!("renderer dropped frame: {e}"));
            }
        }

        // Step 6: bitrate accounting.
        self.accumulate_bitrate(frame.data_size_bytes.max((frame.data().len()) as u32) as u64);
    }

    fn dispatch_compressed(&self, frame: &VideoFrame<'_>, surface: &Arc<dyn Surface>) {
        // Double-checked lazy init: outer read, mutex, reread + surface recheck.
        let needs_init = self.decoder.lock().expect("router decoder mutex poisoned").is_none();
        if needs_init {
            let _guard = self.decoder_init_mutex.lock().expect("decoder-init mutex poisoned");
            let mut decoder_slot = self.decoder.lock().expect("router decoder mutex poisoned");
            if decoder_slot.is_none() && self.surface.lock().expect("router surface mutex poisoned").is_some() {
                let backend = (self.decoder_backend_factory)();
                let mut dec = Decoder::new(backend, surface.clone());
                let mime = if frame.fourcc == FourCc::Hevc { "video/hevc" } else { "video/avc" };
                dec.configure(mime, frame.width, frame.height);
                *decoder_slot = Some(dec);
            }
        }

        let mut decoder_slot = self.decoder.lock().expect("router decoder mutex poisoned");
        if let Some(dec) = decoder_slot.as_mut() {
            dec.submit(frame.data(), frame.timestamp);
        }
    }

    fn update_video_info(&self, frame: &VideoFrame<'_>) {
        let mut last = self.last_fourcc.lock().expect("router fourcc mutex poisoned");
        let changed = *last != Some(frame.fourcc);
        *last = Some(frame.fourcc);
        drop(last);

        let info = VideoInfo { width: frame.width, height: frame.height, frame_rate: frame.frame_rate, fourcc: frame.fourcc };
        let mut last_info = self.last_video_info.lock().expect("router video-info mutex poisoned");
        let info_changed = *last_info != Some(info);
        *last_info = Some(info);
        drop(last_info);

        if changed || info_changed {
            let label = frame.fourcc.label();
            let digest = format!("{}x{} @ {}/{} | {}", frame.width, frame.height, frame.frame_rate.0, frame.frame_rate.1, label);
            let _ = self.event_tx.send(crate::events::CoreEvent::VideoInfoChanged(digest));
        }
    }

    fn accumulate_bitrate(&self, bytes: u64) {
        let mut win = self.bitrate.lock().expect("router bitrate mutex poisoned");
        win.bytes_in_window += bytes;
        if win.window_start.elapsed() >= BITRATE_WINDOW {
            let bits = win.bytes_in_window * 8;
            let label = if bits >= 1_000_000 {
                format!("{:.1} Mbps", bits as f64 / 1_000_000.0)
            } else {
                format!("{} Kbps", bits / 1000)
            };
            let _ = self.event_tx.send(crate::events::CoreEvent::BitrateChanged(label));
            win.bytes_in_window = 0;
            win.window_start = Instant::now();
        }
    }

    fn log_warn(&self, tag: &'static str, msg: String) {
        let _ = self.event_tx.send(crate::events::CoreEvent::Log { level: crate::events::LogLevel::Warn, tag, msg });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ReleaseFn;
    use crate::native::fake::FakeRuntime;
    use crossbeam_channel::unbounded;
    use std::sync::atomic::AtomicUsize;

    struct NullSurface {
        w: u32,
        h: u32,
        buf: Mutex<Vec<u8>>,
    }

    impl Surface for NullSurface {
        fn lock_canvas(&self, width: u32, height: u32) -> Option<&mut [u8]> {
            let mut buf = self.buf.lock().unwrap();
            buf.resize((width * height * 4) as usize, 0);
            let ptr = buf.as_mut_ptr();
            let len = buf.len();
            Some(unsafe { std::slice::from_raw_parts_mut(ptr, len) })
        }
        fn unlock(&self) {}
        fn width(&self) -> u32 {
            self.w
        }
        fn height(&self) -> u32 {
            self.h
        }
    }

    fn make_router() -> FrameRouter<FakeRuntime> {
        let runtime = Arc::new(FakeRuntime::new());
        let (tx, _rx) = unbounded();
        FrameRouter::new(runtime, tx, Box::new(|| panic!("no decoder backend wired in this test")))
    }

    #[test]
    fn drops_frame_without_surface_but_still_releases() {
        let router = make_router();
        let released = Arc::new(AtomicUsize::new(0));
        let released2 = released.clone();
        let release: ReleaseFn = Arc::new(move |_h| {
            released2.fetch_add(1, Ordering::SeqCst);
        });
        let data = [0u8; 8];
        let frame = VideoFrame::new(2, 1, FourCc::Bgra, 8, (30, 1), 0, 0, &data, 1, release);
        router.dispatch(frame);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_recording_without_a_prior_frame_fails() {
        let router = make_router();
        let err = router.start_recording().unwrap_err();
        assert!(matches!(err, crate::error::CoreError::UnsupportedRecordingFormat { .. }));
    }

    #[test]
    fn renders_uncompressed_frame_with_surface_bound() {
        let router = make_router();
        router.set_surface(Some(Arc::new(NullSurface { w: 2, h: 1, buf: Mutex::new(Vec::new()) })));

        let release: ReleaseFn = Arc::new(|_h| {});
        let data = [16u8, 128, 16, 128]; // Y=16 U=128 (UYVY single black pixel pair minimal)
        let frame = VideoFrame::new(2, 1, FourCc::Uyvy, 4, (30, 1), 0, 0, &data, 1, release);
        router.dispatch(frame);
        assert!(router.last_video_info().is_some());
    }
}
