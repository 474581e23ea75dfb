//! The Recorder: a single background writer thread, a bounded queue, and
//! an atomic-bool start/stop state machine.
//!
//! Two branches pick a muxing strategy by the recorded stream's `FourCc`:
//! compressed input goes through `passthrough`, uncompressed input is
//! converted to NV12 and re-encoded through `encode`.

pub mod encode;
pub mod mp4_mux;
pub mod nal;
pub mod passthrough;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver as ChanReceiver, RecvTimeoutError, Sender};

use crate::error::CoreError;
use crate::events::{CoreEvent, LogLevel, RecordingState};
use crate::frame::{FourCc, VideoFrame, VideoFrameCopy};
use crate::native::EncoderBackend;
use crate::router::VideoInfo;

use encode::EncodeState;
use passthrough::{recording_filename, PassthroughMuxerState};

const QUEUE_CAPACITY: usize = 30;
const WRITER_POLL_MS: u64 = 100;
const WRITER_JOIN_MS: u64 = 3000;
const RECORDER_OFFER_DEADLINE: Duration = Duration::from_millis(200);

/// Formats the encode branch accepts as uncompressed input.
fn supports_encode_branch(fourcc: FourCc) -> bool {
    matches!(fourcc, FourCc::Uyvy | FourCc::Bgra | FourCc::Bgrx)
}

/// Persists the stream to an MP4 file on a background writer thread
///. Exposed controls (`start_recording`, `stop_recording`,
/// `is_recording`) use an atomic-bool state machine with compare-and-set
/// transitions so two concurrent starts produce exactly one success.
pub struct Recorder {
    event_tx: Sender<CoreEvent>,
    recordings_dir: PathBuf,
    recording: AtomicBool,
    queue_tx: Mutex<Option<Sender<VideoFrameCopy>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    last_file: Mutex<Option<PathBuf>>,
    encoder_factory: Box<dyn Fn() -> Box<dyn EncoderBackend> + Send + Sync>,
}

impl Recorder {
    pub fn new(
        event_tx: Sender<CoreEvent>,
        recordings_dir: PathBuf,
        encoder_factory: Box<dyn Fn() -> Box<dyn EncoderBackend> + Send + Sync>,
    ) -> Self {
        Self {
            event_tx,
            recordings_dir,
            recording: AtomicBool::new(false),
            queue_tx: Mutex::new(None),
            writer: Mutex::new(None),
            last_file: Mutex::new(None),
            encoder_factory,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn last_file(&self) -> Option<PathBuf> {
        self.last_file.lock().expect("recorder last-file mutex poisoned").clone()
    }

    /// Starts recording against `video_info`, the most recently published
    /// video-info digest. Fails with `UnsupportedRecordingFormat` if a
    /// recording is already active or the FourCc has no recording branch.
    pub fn start_recording(&self, video_info: VideoInfo) -> Result<(), CoreError> {
        if self.recording.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Err(CoreError::UnsupportedRecordingFormat { msg: "already recording".into() });
        }

        let is_compressed = video_info.fourcc.is_compressed();
        if !is_compressed && !supports_encode_branch(video_info.fourcc) {
            self.recording.store(false, Ordering::SeqCst);
            return Err(CoreError::UnsupportedRecordingFormat {
                msg: format!("fourcc {:?} has no recording branch", video_info.fourcc),
            });
        }

        let started_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let is_hevc = video_info.fourcc == FourCc::Hevc;
        let filename = recording_filename(started_at, video_info.width, video_info.height, is_hevc);
        let path = self.recordings_dir.join(filename);
        *self.last_file.lock().expect("recorder last-file mutex poisoned") = Some(path.clone());

        let (tx, rx): (Sender<VideoFrameCopy>, ChanReceiver<VideoFrameCopy>) = bounded(QUEUE_CAPACITY);
        *self.queue_tx.lock().expect("recorder queue-tx mutex poisoned") = Some(tx);

        let event_tx = self.event_tx.clone();
        let width = video_info.width;
        let height = video_info.height;
        let encoder_factory = if is_compressed { None } else { Some((self.encoder_factory)()) };

        let join = std::thread::Builder::new()
            .name("ndi-recorder-writer".to_string())
            .spawn(move || {
                run_writer(rx, path, is_compressed, is_hevc, width, height, encoder_factory, event_tx);
            })
            .expect("failed to spawn ndi-recorder-writer thread");

        *self.writer.lock().expect("recorder writer mutex poisoned") = Some(join);
        let _ = self.event_tx.send(CoreEvent::RecordingChanged(RecordingState::Recording { duration_ms: 0 }));
        Ok(())
    }

    /// Idempotent; a call while not recording is a no-op.
    pub fn stop_recording(&self) {
        if self.recording.compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return;
        }

        // Dropping the sender lets the writer drain whatever is already
        // queued, then observe disconnect and finalize.
        let sender = self.queue_tx.lock().expect("recorder queue-tx mutex poisoned").take();
        drop(sender);

        let writer = self.writer.lock().expect("recorder writer mutex poisoned").take();
        if let Some(join) = writer {
            join_with_bound(join, Duration::from_millis(WRITER_JOIN_MS));
        }
    }

    /// Offers `copy` to the writer queue, blocking up to `deadline`; real
    /// time wins over completeness.
    pub fn offer(&self, copy: VideoFrameCopy, deadline: Duration) -> bool {
        let tx = self.queue_tx.lock().expect("recorder queue-tx mutex poisoned").clone();
        match tx {
            Some(tx) => tx.send_timeout(copy, deadline).is_ok(),
            None => false,
        }
    }

    /// Uncompressed branch entry point: takes an owned copy immediately (the
    /// borrowed frame cannot outlive this call) and offers it to the same
    /// bounded queue; the NV12 conversion itself happens on the writer
    /// thread.
    pub fn encode_inline(&self, frame: &VideoFrame<'_>) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.offer(frame.to_owned_copy(), RECORDER_OFFER_DEADLINE)
    }
}

#[allow(clippy::too_many_arguments)]
fn run_writer(
    rx: ChanReceiver<VideoFrameCopy>,
    path: PathBuf,
    is_compressed: bool,
    is_hevc: bool,
    width: u32,
    height: u32,
    encoder_factory: Option<Box<dyn EncoderBackend>>,
    event_tx: Sender<CoreEvent>,
) {
    let mut passthrough_state =
        if is_compressed { Some(PassthroughMuxerState::new(is_hevc, width, height, path.clone())) } else { None };
    let mut encode_state = encoder_factory.map(|backend| EncodeState::new(backend, path.clone(), width, height));

    loop {
        match rx.recv_timeout(Duration::from_millis(WRITER_POLL_MS)) {
            Ok(copy) => {
                let result = if let Some(state) = passthrough_state.as_mut() {
                    state.ingest(&copy)
                } else if let Some(state) = encode_state.as_mut() {
                    state.ingest(&copy)
                } else {
                    Ok(())
                };
                if let Err(e) = result {
                    let _ = event_tx.send(CoreEvent::Log { level: LogLevel::Error, tag: "RECORDER", msg: e.to_string() });
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    if let Some(state) = passthrough_state.as_mut() {
        if let Err(e) = state.finalize() {
            let _ = event_tx.send(CoreEvent::Log { level: LogLevel::Error, tag: "RECORDER", msg: e.to_string() });
        }
    }
    if let Some(state) = encode_state.as_mut() {
        if let Err(e) = state.finalize() {
            let _ = event_tx.send(CoreEvent::Log { level: LogLevel::Error, tag: "RECORDER", msg: e.to_string() });
        }
    }

    let _ = event_tx.send(CoreEvent::RecordingChanged(RecordingState::Stopped { file: Some(path) }));
}

fn join_with_bound(handle: JoinHandle<()>, bound: Duration) {
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while !handle.is_finished() && waited < bound {
        std::thread::sleep(step);
        waited += step;
    }
    if handle.is_finished() {
        let _ = handle.join();
    }
    // else: a thread still draining past the bound is left to finish on its
    // own; Rust has no forced-interrupt primitive.
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop_recording();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::CodecFrame;
    use crossbeam_channel::unbounded;

    struct NullEncoder;
    impl EncoderBackend for NullEncoder {
        fn configure(&mut self, _w: u32, _h: u32, _bitrate: u32, _fps: u32) -> Result<(), CoreError> {
            Ok(())
        }
        fn submit_nv12(&mut self, _nv12: &[u8], _ts: i64) -> Result<(), CoreError> {
            Ok(())
        }
        fn submit_eos(&mut self) -> Result<(), CoreError> {
            Ok(())
        }
        fn drain(&mut self) -> Result<Vec<CodecFrame>, CoreError> {
            Ok(Vec::new())
        }
        fn release(&mut self) {}
    }

    fn make_recorder(dir: &std::path::Path) -> Recorder {
        let (tx, _rx) = unbounded();
        Recorder::new(tx, dir.to_path_buf(), Box::new(|| Box::new(NullEncoder)))
    }

    #[test]
    fn start_twice_only_one_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = make_recorder(dir.path());
        let info = VideoInfo { width: 64, height: 48, frame_rate: (30, 1), fourcc: FourCc::H264 };
        assert!(recorder.start_recording(info).is_ok());
        assert!(recorder.start_recording(info).is_err());
        recorder.stop_recording();
    }

    #[test]
    fn stop_without_start_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = make_recorder(dir.path());
        recorder.stop_recording();
        assert!(!recorder.is_recording());
    }

    #[test]
    fn unsupported_fourcc_rejected_and_resets_state() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = make_recorder(dir.path());
        let info = VideoInfo { width: 64, height: 48, frame_rate: (30, 1), fourcc: FourCc::Nv12 };
        assert!(recorder.start_recording(info).is_err());
        assert!(!recorder.is_recording());
        // A subsequent valid start must still be possible.
        let info2 = VideoInfo { width: 64, height: 48, frame_rate: (30, 1), fourcc: FourCc::H264 };
        assert!(recorder.start_recording(info2).is_ok());
        recorder.stop_recording();
    }

    #[test]
    fn queue_backpressure_drops_after_deadline() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = make_recorder(dir.path());
        let info = VideoInfo { width: 64, height: 48, frame_rate: (30, 1), fourcc: FourCc::H264 };
        recorder.start_recording(info).unwrap();

        // Fill the bounded queue without giving the writer a chance to drain.
        let mut accepted = 0;
        for i in 0..QUEUE_CAPACITY as i64 + 5 {
            let copy = VideoFrameCopy {
                width: 64,
                height: 48,
                fourcc: FourCc::H264,
                line_stride_bytes: 0,
                frame_rate: (30, 1),
                timestamp: i,
                data_size_bytes: 4,
                data: vec![0, 0, 1, 0x41],
            };
            if recorder.offer(copy, Duration::from_millis(5)) {
                accepted += 1;
            }
        }
        assert!(accepted <= QUEUE_CAPACITY + 2); // writer may have drained a couple meanwhile
        recorder.stop_recording();
    }
}
