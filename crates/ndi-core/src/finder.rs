//! Publisher discovery.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver as ChanReceiver};

use crate::error::CoreError;
use crate::native::{FinderHandle, NdiRuntime};
use crate::source::{same_source_set, SourceDescriptor, SourceRepository};

const POLL_TIMEOUT_MS: u32 = 1000;

/// Owns a native finder handle and emits source-set snapshots on a worker
/// thread. `start_discovery` is restartable: it tears down any prior poll
/// loop before starting a new one.
pub struct Finder<R: NdiRuntime + 'static> {
    runtime: Arc<R>,
    repo: SourceRepository,
    handle: Arc<AtomicU64>, // 0 == no native handle
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

const NO_HANDLE: u64 = 0;

impl<R: NdiRuntime + 'static> Finder<R> {
    pub fn new(runtime: Arc<R>, repo: SourceRepository) -> Self {
        Self { runtime, repo, handle: Arc::new(AtomicU64::new(NO_HANDLE)), stop: Arc::new(AtomicBool::new(false)), worker: None }
    }

    /// Starts (or restarts) the discovery poll loop. Returns a channel that
    /// receives every emitted snapshot; the repository is also updated in
    /// lock-step so synchronous readers never need to subscribe.
    pub fn start_discovery(&mut self) -> Result<ChanReceiver<Vec<SourceDescriptor>>, CoreError> {
        self.stop_discovery();

        let native: FinderHandle = self
            .runtime
            .create_finder(false, None, None)
            .ok_or(CoreError::HandleCreationFailed { what: "finder", msg: "create_finder returned null".into() })?;
        self.handle.store(native, Ordering::SeqCst);
        self.stop.store(false, Ordering::SeqCst);

        let (tx, rx) = unbounded();
        let runtime = self.runtime.clone();
        let handle_slot = self.handle.clone();
        let stop = self.stop.clone();
        let repo = self.repo.clone();

        let join = std::thread::Builder::new()
            .name("ndi-finder-poll".to_string())
            .spawn(move || {
                let mut last_emitted: Option<Vec<SourceDescriptor>> = Some(Vec::new());
                loop {
                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let h = handle_slot.load(Ordering::SeqCst);
                    if h == NO_HANDLE {
                        break;
                    }

                    let changed = runtime.wait_for_sources(h, POLL_TIMEOUT_MS);

                    if stop.load(Ordering::SeqCst) {
                        break;
                    }
                    let h = handle_slot.load(Ordering::SeqCst);
                    if h == NO_HANDLE {
                        break;
                    }

                    let names = runtime.current_sources(h);
                    let snapshot: Vec<SourceDescriptor> = names.into_iter().map(|n| SourceDescriptor::new(n, None)).collect();

                    let should_emit = changed
                        || match &last_emitted {
                            Some(prev) => !same_source_set(prev, &snapshot),
                            None => true,
                        };

                    if should_emit {
                        repo.publish(snapshot.clone());
                        let _ = tx.send(snapshot.clone());
                        last_emitted = Some(snapshot);
                    }
                }
            })
            .expect("failed to spawn ndi-finder-poll thread");

        self.worker = Some(join);
        Ok(rx)
    }

    /// Idempotent; safe to call concurrently with stream cancellation and an
    /// explicit caller.
    pub fn stop_discovery(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let h = self.handle.swap(NO_HANDLE, Ordering::SeqCst);

        if let Some(join) = self.worker.take() {
            let _ = join.join();
        }
        if h != NO_HANDLE {
            self.runtime.destroy_finder(h);
        }
    }
}

impl<R: NdiRuntime + 'static> Drop for Finder<R> {
    fn drop(&mut self) {
        self.stop_discovery();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::fake::FakeRuntime;
    use std::time::Duration;

    #[test]
    fn emits_snapshot_only_on_change() {
        let runtime = Arc::new(FakeRuntime::new());
        let repo = SourceRepository::new();
        let mut finder = Finder::new(runtime.clone(), repo.clone());
        let rx = finder.start_discovery().unwrap();

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        runtime.set_sources(&["CamA (HostX)"]);
        let snap = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].name, "CamA (HostX)");

        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        runtime.set_sources(&[]);
        let snap = rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert!(snap.is_empty());

        finder.stop_discovery();
        assert_eq!(repo.snapshot().len(), 0);
    }

    #[test]
    fn stop_discovery_is_idempotent() {
        let runtime = Arc::new(FakeRuntime::new());
        let repo = SourceRepository::new();
        let mut finder = Finder::new(runtime, repo);
        finder.start_discovery().unwrap();
        finder.stop_discovery();
        finder.stop_discovery();
    }

    #[test]
    fn restart_yields_fresh_stream() {
        let runtime = Arc::new(FakeRuntime::new());
        let repo = SourceRepository::new();
        let mut finder = Finder::new(runtime.clone(), repo.clone());
        let rx1 = finder.start_discovery().unwrap();
        finder.stop_discovery();

        let rx2 = finder.start_discovery().unwrap();
        runtime.set_sources(&["CamB"]);
        let snap = rx2.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(snap[0].name, "CamB");
        assert!(rx1.try_recv().is_err());
        finder.stop_discovery();
    }
}
