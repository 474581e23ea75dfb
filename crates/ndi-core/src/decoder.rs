//! Hardware video decoder adapter: queues and threads around a `CodecBackend`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::native::{CodecBackend, NdiRuntime, Surface};

const INPUT_QUEUE_CAPACITY: usize = 5;
const INPUT_QUEUE_POLL_MS: u64 = 100;
const CODEC_SLOT_TIMEOUT_MS: u32 = 10;
const SHUTDOWN_JOIN_MS: u64 = 2000;

struct QueuedFrame {
    data: Vec<u8>,
    timestamp: i64,
}

struct Shared {
    queue: Mutex<VecDeque<QueuedFrame>>,
    running: AtomicBool,
    decoded_count: std::sync::atomic::AtomicU64,
}

/// Feeds a `CodecBackend` from a bounded, drop-oldest input queue on a
/// dedicated input thread, and drains its output on a dedicated output
/// thread that releases decoded pictures straight to the bound surface
/// (surface-mode decoding, no pixel readback).
pub struct Decoder<R: NdiRuntime + 'static> {
    shared: Arc<Shared>,
    backend: Option<Arc<Mutex<Box<dyn CodecBackend>>>>,
    input_thread: Option<JoinHandle<()>>,
    output_thread: Option<JoinHandle<()>>,
    _surface: Arc<dyn Surface>,
    _marker: std::marker::PhantomData<R>,
}

impl<R: NdiRuntime + 'static> Decoder<R> {
    pub fn new(backend: Box<dyn CodecBackend>, surface: Arc<dyn Surface>) -> Self {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::with_capacity(INPUT_QUEUE_CAPACITY)),
            running: AtomicBool::new(true),
            decoded_count: std::sync::atomic::AtomicU64::new(0),
        });

        let backend = Arc::new(Mutex::new(backend));

        let input_shared = shared.clone();
        let input_backend = backend.clone();
        let input_thread = std::thread::Builder::new()
            .name("ndi-decoder-input".to_string())
            .spawn(move || {
                while input_shared.running.load(Ordering::SeqCst) {
                    let next = input_shared.queue.lock().expect("decoder queue mutex poisoned").pop_front();
                    let Some(item) = next else {
                        std::thread::sleep(Duration::from_millis(INPUT_QUEUE_POLL_MS));
                        continue;
                    };
                    let mut backend = input_backend.lock().expect("decoder backend mutex poisoned");
                    let _ = backend.submit(&item.data, item.timestamp);
                }
            })
            .expect("failed to spawn ndi-decoder-input thread");

        let output_shared = shared.clone();
        let output_backend = backend.clone();
        let output_thread = std::thread::Builder::new()
            .name("ndi-decoder-output".to_string())
            .spawn(move || {
                while output_shared.running.load(Ordering::SeqCst) {
                    let mut backend = output_backend.lock().expect("decoder backend mutex poisoned");
                    match backend.poll_output(CODEC_SLOT_TIMEOUT_MS) {
                        Ok(Some(_format_changed)) => {
                            output_shared.decoded_count.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(None) => {}
                        Err(_) => {}
                    }
                }
            })
            .expect("failed to spawn ndi-decoder-output thread");

        Self {
            shared,
            backend: Some(backend),
            input_thread: Some(input_thread),
            output_thread: Some(output_thread),
            _surface: surface,
            _marker: std::marker::PhantomData,
        }
    }

    pub fn configure(&mut self, mime: &str, width: u32, height: u32) {
        if let Some(backend) = &self.backend {
            let _ = backend.lock().expect("decoder backend mutex poisoned").configure(mime, width, height);
        }
    }

    /// Submits compressed bytes, evicting the oldest queued frame if the
    /// bounded queue is full: real-time delivery wins over completeness.
    pub fn submit(&mut self, data: &[u8], timestamp: i64) {
        let mut queue = self.shared.queue.lock().expect("decoder queue mutex poisoned");
        if queue.len() >= INPUT_QUEUE_CAPACITY {
            queue.pop_front();
        }
        queue.push_back(QueuedFrame { data: data.to_vec(), timestamp });
    }

    pub fn decoded_frame_count(&self) -> u64 {
        self.shared.decoded_count.load(Ordering::Relaxed)
    }

    pub fn shutdown(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(join) = self.input_thread.take() {
            let _ = join_with_timeout(join, Duration::from_millis(SHUTDOWN_JOIN_MS));
        }
        if let Some(join) = self.output_thread.take() {
            let _ = join_with_timeout(join, Duration::from_millis(SHUTDOWN_JOIN_MS));
        }
        self.shared.queue.lock().expect("decoder queue mutex poisoned").clear();
        if let Some(backend) = self.backend.take() {
            backend.lock().expect("decoder backend mutex poisoned").release();
        }
    }
}

fn join_with_timeout(handle: JoinHandle<()>, bound: Duration) {
    let step = Duration::from_millis(10);
    let mut waited = Duration::ZERO;
    while !handle.is_finished() && waited < bound {
        std::thread::sleep(step);
        waited += step;
    }
    if handle.is_finished() {
        let _ = handle.join();
    }
}

impl<R: NdiRuntime + 'static> Drop for Decoder<R> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::native::fake::FakeRuntime;
    use std::sync::Mutex as StdMutex;

    struct CountingBackend {
        configured: bool,
        submits: Arc<StdMutex<Vec<i64>>>,
    }

    impl CodecBackend for CountingBackend {
        fn configure(&mut self, _mime: &str, _w: u32, _h: u32) -> Result<(), CoreError> {
            self.configured = true;
            Ok(())
        }
        fn submit(&mut self, _data: &[u8], timestamp_us: i64) -> Result<(), CoreError> {
            self.submits.lock().unwrap().push(timestamp_us);
            Ok(())
        }
        fn poll_output(&mut self, _timeout_ms: u32) -> Result<Option<bool>, CoreError> {
            std::thread::sleep(Duration::from_millis(5));
            Ok(None)
        }
        fn release(&mut self) {}
    }

    struct DummySurface;
    impl Surface for DummySurface {
        fn lock_canvas(&self, _w: u32, _h: u32) -> Option<&mut [u8]> {
            None
        }
        fn unlock(&self) {}
        fn width(&self) -> u32 {
            0
        }
        fn height(&self) -> u32 {
            0
        }
    }

    #[test]
    fn submit_evicts_oldest_when_queue_full() {
        let submits = Arc::new(StdMutex::new(Vec::new()));
        let backend = Box::new(CountingBackend { configured: false, submits: submits.clone() });
        let mut dec: Decoder<FakeRuntime> = Decoder::new(backend, Arc::new(DummySurface));
        dec.configure("video/avc", 640, 480);

        for ts in 0..INPUT_QUEUE_CAPACITY as i64 + 3 {
            dec.submit(&[0u8; 4], ts);
        }
        std::thread::sleep(Duration::from_millis(150));
        dec.shutdown();

        let received = submits.lock().unwrap();
        assert!(!received.is_empty());
        assert!(received.len() <= INPUT_QUEUE_CAPACITY, "queue should never hold more than its capacity: {received:?}");
        assert!(!received.contains(&0), "oldest frame should have been evicted, not submitted: {received:?}");
    }
}
