//! An in-memory `NdiRuntime` test double.
//!
//! This is what lets Finder/Receiver/Router tests run without the
//! proprietary NDI SDK installed. Tests drive it by pushing sources and
//! frames onto shared queues rather than waiting on a real LAN broadcast.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::ReceiverConfig;
use crate::error::CoreError;
use crate::frame::{FourCc, ReleaseFn, VideoFrame};

use super::{FinderHandle, NdiRuntime, ReceiverHandle};

struct FinderState {
    sources: Vec<String>,
    dirty: bool,
}

struct ReceiverState {
    connected_to: Option<String>,
    queue: VecDeque<FakeFrame>,
    released: Vec<u64>,
    is_connected: bool,
}

/// A frame description queued for a fake receiver to hand back on `capture`.
#[derive(Clone)]
pub struct FakeFrame {
    pub width: u32,
    pub height: u32,
    pub fourcc: FourCc,
    pub line_stride_bytes: i32,
    pub frame_rate: (u32, u32),
    pub timestamp: i64,
    pub data: Vec<u8>,
}

/// In-memory runtime double. Cloning shares the same underlying state.
#[derive(Clone)]
pub struct FakeRuntime {
    inner: Arc<Mutex<Inner>>,
    next_handle: Arc<AtomicU64>,
}

struct Inner {
    finders: std::collections::HashMap<FinderHandle, FinderState>,
    receivers: std::collections::HashMap<ReceiverHandle, ReceiverState>,
}

impl Default for FakeRuntime {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                finders: std::collections::HashMap::new(),
                receivers: std::collections::HashMap::new(),
            })),
            next_handle: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_handle(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::SeqCst)
    }

    /// Replace the current source set seen by every live finder and mark it dirty.
    pub fn set_sources(&self, names: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        for f in inner.finders.values_mut() {
            f.sources = names.iter().map(|s| s.to_string()).collect();
            f.dirty = true;
        }
    }

    /// Push a frame for a connected receiver to return on its next `capture`.
    pub fn push_frame(&self, handle: ReceiverHandle, frame: FakeFrame) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.receivers.get_mut(&handle) {
            r.queue.push_back(frame);
        }
    }

    /// Force the `is-connected` query for a receiver (used to simulate the
    /// connection-lost triple-guard scenario in tests).
    pub fn set_connected_flag(&self, handle: ReceiverHandle, connected: bool) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.receivers.get_mut(&handle) {
            r.is_connected = connected;
        }
    }

    pub fn released_handles(&self, handle: ReceiverHandle) -> Vec<u64> {
        let inner = self.inner.lock().unwrap();
        inner.receivers.get(&handle).map(|r| r.released.clone()).unwrap_or_default()
    }
}

impl NdiRuntime for FakeRuntime {
    fn initialize(&self) -> bool {
        true
    }

    fn destroy(&self) {}

    fn version(&self) -> String {
        "fake-ndi/0.0".to_string()
    }

    fn create_finder(&self, _show_local: bool, _groups: Option<&str>, _extra_ips: Option<&str>) -> Option<FinderHandle> {
        let h = self.alloc_handle();
        self.inner.lock().unwrap().finders.insert(h, FinderState { sources: Vec::new(), dirty: false });
        Some(h)
    }

    fn destroy_finder(&self, handle: FinderHandle) {
        self.inner.lock().unwrap().finders.remove(&handle);
    }

    fn wait_for_sources(&self, handle: FinderHandle, _timeout_ms: u32) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(f) = inner.finders.get_mut(&handle) {
            let was = f.dirty;
            f.dirty = false;
            was
        } else {
            false
        }
    }

    fn current_sources(&self, handle: FinderHandle) -> Vec<String> {
        self.inner.lock().unwrap().finders.get(&handle).map(|f| f.sources.clone()).unwrap_or_default()
    }

    fn create_receiver(&self, _name: &str, _cfg: ReceiverConfig) -> Option<ReceiverHandle> {
        let h = self.alloc_handle();
        self.inner.lock().unwrap().receivers.insert(
            h,
            ReceiverState { connected_to: None, queue: VecDeque::new(), released: Vec::new(), is_connected: false },
        );
        Some(h)
    }

    fn destroy_receiver(&self, handle: ReceiverHandle) {
        self.inner.lock().unwrap().receivers.remove(&handle);
    }

    fn connect(&self, handle: ReceiverHandle, source_name: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if let Some(r) = inner.receivers.get_mut(&handle) {
            r.connected_to = Some(source_name.to_string());
            r.is_connected = true;
            true
        } else {
            false
        }
    }

    fn capture(&self, handle: ReceiverHandle, _timeout_ms: u32) -> Result<Option<VideoFrame<'_>>, CoreError> {
        let mut inner = self.inner.lock().unwrap();
        let r = match inner.receivers.get_mut(&handle) {
            Some(r) => r,
            None => return Ok(None),
        };
        let queued = match r.queue.pop_front() {
            Some(f) => f,
            None => return Ok(None),
        };
        drop(inner);

        let leaked: &'static [u8] = Box::leak(queued.data.into_boxed_slice());
        let inner_arc = self.inner.clone();
        let release: ReleaseFn = Arc::new(move |h: u64| {
            if let Ok(mut inner) = inner_arc.lock() {
                if let Some(r) = inner.receivers.get_mut(&handle) {
                    r.released.push(h);
                }
            }
        });
        let native_handle = self.alloc_handle();
        Ok(Some(VideoFrame::new(
            queued.width,
            queued.height,
            queued.fourcc,
            queued.line_stride_bytes,
            queued.frame_rate,
            queued.timestamp,
            leaked.len() as u32,
            leaked,
            native_handle,
            release,
        )))
    }

    fn performance(&self, _handle: ReceiverHandle) -> (u64, u64, u64, u64, u64) {
        (0, 0, 0, 0, 0)
    }

    fn is_connected(&self, handle: ReceiverHandle) -> bool {
        self.inner.lock().unwrap().receivers.get(&handle).map(|r| r.is_connected).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finder_reports_dirty_once() {
        let rt = FakeRuntime::new();
        let h = rt.create_finder(false, None, None).unwrap();
        assert!(!rt.wait_for_sources(h, 0));
        rt.set_sources(&["CamA"]);
        assert!(rt.wait_for_sources(h, 0));
        assert!(!rt.wait_for_sources(h, 0));
        assert_eq!(rt.current_sources(h), vec!["CamA".to_string()]);
    }

    #[test]
    fn capture_releases_through_drop() {
        let rt = FakeRuntime::new();
        let h = rt.create_receiver("rx", ReceiverConfig::default()).unwrap();
        rt.connect(h, "CamA");
        rt.push_frame(
            h,
            FakeFrame {
                width: 2,
                height: 1,
                fourcc: FourCc::Bgra,
                line_stride_bytes: 8,
                frame_rate: (30, 1),
                timestamp: 0,
                data: vec![0u8; 8],
            },
        );
        {
            let frame = rt.capture(h, 10).unwrap().unwrap();
            assert_eq!(frame.width, 2);
        }
        assert_eq!(rt.released_handles(h).len(), 1);
    }
}
