//! The Receiver state machine and capture loop.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::config::ReceiverConfig;
use crate::error::CoreError;
use crate::events::ConnectionState;
use crate::native::{NdiRuntime, ReceiverHandle};
use crate::router::FrameRouter;
use crate::source::SourceDescriptor;

const NO_HANDLE: u64 = 0;
const CONNECTION_LOST_THRESHOLD: u32 = 5;
const CAPTURE_TIMEOUT_MS: u32 = 100;
const ASYNC_DISCONNECT_JOIN_MS: u64 = 3000;
const SYNC_DISCONNECT_JOIN_MS: u64 = 500;

#[derive(Debug, Clone, Copy, Default)]
pub struct Performance {
    pub total_video_frames: u64,
    pub dropped_video_frames: u64,
    pub total_audio_frames: u64,
    pub dropped_audio_frames: u64,
    pub total_metadata_frames: u64,
}

impl Performance {
    /// `100 · (1 − dropped/total)` clamped; 100 if no frames yet, 0 if no
    /// active connection.
    pub fn quality(&self, connected: bool) -> u8 {
        if !connected {
            return 0;
        }
        if self.total_video_frames == 0 {
            return 100;
        }
        let ratio = self.dropped_video_frames as f64 / self.total_video_frames as f64;
        (100.0 * (1.0 - ratio)).clamp(0.0, 100.0) as u8
    }
}

struct CaptureShared {
    handle: AtomicU64,
    is_receiving: AtomicBool,
    consecutive_nulls: AtomicU32,
    ever_received: AtomicBool,
}

/// Owns exactly one native receiver handle at a time and drives the capture
/// loop that feeds the `FrameRouter`.
pub struct Receiver<R: NdiRuntime + 'static> {
    runtime: Arc<R>,
    cfg: ReceiverConfig,
    state: Mutex<ConnectionState>,
    shared: Arc<CaptureShared>,
    capture_thread: Option<JoinHandle<()>>,
    loss_flag: Option<Arc<AtomicBool>>,
    router: Arc<FrameRouter<R>>,
}

impl<R: NdiRuntime + 'static> Receiver<R> {
    pub fn new(runtime: Arc<R>, cfg: ReceiverConfig, router: Arc<FrameRouter<R>>) -> Self {
        Self {
            runtime,
            cfg,
            state: Mutex::new(ConnectionState::Disconnected),
            shared: Arc::new(CaptureShared {
                handle: AtomicU64::new(NO_HANDLE),
                is_receiving: AtomicBool::new(false),
                consecutive_nulls: AtomicU32::new(0),
                ever_received: AtomicBool::new(false),
            }),
            capture_thread: None,
            loss_flag: None,
            router,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.lock().expect("receiver state mutex poisoned").clone()
    }

    /// Legal from any state; if currently Connected/Connecting, performs an
    /// equivalent `disconnect()` first.
    pub fn connect(&mut self, source: SourceDescriptor) {
        self.disconnect_sync();
        *self.state.lock().unwrap() = ConnectionState::Connecting;

        let handle = match self.runtime.create_receiver("ndi-ingest", self.cfg) {
            Some(h) => h,
            None => {
                let msg = "create_receiver returned null".to_string();
                *self.state.lock().unwrap() = ConnectionState::Error(msg.clone());
                return;
            }
        };

        if !self.runtime.connect(handle, &source.name) {
            self.runtime.destroy_receiver(handle);
            *self.state.lock().unwrap() = ConnectionState::Error(format!("connect({}) failed", source.name));
            return;
        }

        self.shared.handle.store(handle, Ordering::SeqCst);
        self.shared.consecutive_nulls.store(0, Ordering::SeqCst);
        self.shared.ever_received.store(false, Ordering::SeqCst);
        self.shared.is_receiving.store(true, Ordering::SeqCst);
        *self.state.lock().unwrap() = ConnectionState::Connected(source);

        self.spawn_capture_thread(handle);
    }

    fn spawn_capture_thread(&mut self, handle: ReceiverHandle) {
        let runtime = self.runtime.clone();
        let shared = self.shared.clone();
        let router = self.router.clone();

        // The capture thread only needs read access to `shared` and the
        // runtime/router; a connection-lost declaration is relayed back to
        // the owning thread through this flag, polled via `poll_connection_lost`,
        // rather than by reaching into `self.state` from off-thread.
        let lost = Arc::new(AtomicBool::new(false));
        let lost_writer = lost.clone();

        let join = std::thread::Builder::new()
            .name("ndi-capture".to_string())
            .spawn(move || {
                while shared.is_receiving.load(Ordering::SeqCst) {
                    let h = shared.handle.load(Ordering::SeqCst);
                    if h == NO_HANDLE {
                        break;
                    }

                    match runtime.capture(h, CAPTURE_TIMEOUT_MS) {
                        Ok(Some(frame)) => {
                            shared.ever_received.store(true, Ordering::SeqCst);
                            shared.consecutive_nulls.store(0, Ordering::SeqCst);
                            router.dispatch(frame);
                        }
                        Ok(None) => {
                            let nulls = shared.consecutive_nulls.fetch_add(1, Ordering::SeqCst) + 1;
                            let ever = shared.ever_received.load(Ordering::SeqCst);
                            let connected = runtime.is_connected(h);
                            if ever && nulls >= CONNECTION_LOST_THRESHOLD && !connected {
                                lost_writer.store(true, Ordering::SeqCst);
                                break;
                            }
                        }
                        Err(_) => {
                            // Capture exceptions are logged by the caller via router;
                            // loop continues.
                        }
                    }
                }
            })
            .expect("failed to spawn ndi-capture thread");

        self.capture_thread = Some(join);
        self.loss_flag = Some(lost);
    }

    /// Must be polled periodically by the owner (e.g. the health policy) to
    /// observe a connection-lost declaration made on the capture thread.
    pub fn poll_connection_lost(&mut self) -> bool {
        if let Some(flag) = &self.loss_flag {
            if flag.load(Ordering::SeqCst) {
                self.disconnect_sync();
                *self.state.lock().unwrap() = ConnectionState::Error("connection lost".to_string());
                return true;
            }
        }
        false
    }

    /// Asynchronous disconnect: up to 3s join bound.
    pub fn disconnect(&mut self) {
        self.teardown(Duration::from_millis(ASYNC_DISCONNECT_JOIN_MS));
        *self.state.lock().unwrap() = ConnectionState::Disconnected;
    }

    /// Synchronous disconnect: 500ms join bound, never destroys the handle
    /// while the capture thread might still be inside the native call.
    fn disconnect_sync(&mut self) {
        self.teardown(Duration::from_millis(SYNC_DISCONNECT_JOIN_MS));
    }

    fn teardown(&mut self, join_bound: Duration) {
        self.shared.is_receiving.store(false, Ordering::SeqCst);

        if let Some(join) = self.capture_thread.take() {
            let _ = join_with_bound(join, join_bound);
        }

        let handle = self.shared.handle.swap(NO_HANDLE, Ordering::SeqCst);
        if handle != NO_HANDLE {
            self.runtime.destroy_receiver(handle);
        }
        self.loss_flag = None;
    }

    pub fn performance(&self) -> Performance {
        let h = self.shared.handle.load(Ordering::SeqCst);
        if h == NO_HANDLE {
            return Performance::default();
        }
        let (tv, dv, ta, da, tm) = self.runtime.performance(h);
        Performance { total_video_frames: tv, dropped_video_frames: dv, total_audio_frames: ta, dropped_audio_frames: da, total_metadata_frames: tm }
    }
}

/// Joins `handle` within `bound`, polling in short increments since
/// `JoinHandle` has no native timed join. Exceeding the bound abandons the
/// join; the thread is expected to be observing the stop flag and to finish
/// shortly after, and destruction only needs to happen after the bounded
/// join attempt, not an unbounded wait.
fn join_with_bound(handle: JoinHandle<()>, bound: Duration) -> Result<(), CoreError> {
    if handle.is_finished() {
        let _ = handle.join();
        return Ok(());
    }
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    let mut handle = Some(handle);
    while waited < bound {
        if handle.as_ref().map(|h| h.is_finished()).unwrap_or(true) {
            break;
        }
        std::thread::sleep(step);
        waited += step;
    }
    if let Some(h) = handle.take() {
        if h.is_finished() {
            let _ = h.join();
        }
        // else: leaked join handle, thread still observing stop flag.
    }
    Ok(())
}

impl<R: NdiRuntime + 'static> Drop for Receiver<R> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
