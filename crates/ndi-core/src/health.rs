//! Connection-health and auto-reconnect policy layered on the Receiver.
//!
//! The Receiver's own state machine has no notion of "retry" — it is driven
//! purely by `connect`/`disconnect` calls and a connection-lost declaration
//! observed via `poll_connection_lost`. This module is the policy that
//! watches for that declaration and schedules reconnect attempts.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::config::Preferences;
use crate::events::{ConnectionState, CoreEvent};
use crate::native::NdiRuntime;
use crate::receiver::Receiver;
use crate::source::SourceDescriptor;

const RECONNECT_DELAY: Duration = Duration::from_millis(3000);
const MAX_ATTEMPTS: u32 = 5;

/// Schedules a reconnect after the Receiver declares a connection lost,
/// up to `MAX_ATTEMPTS` per outage, 3000ms apart.
pub struct HealthPolicy {
    enabled: Arc<AtomicBool>,
    attempts: Arc<AtomicU32>,
    is_reconnecting: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    event_tx: Sender<CoreEvent>,
}

impl HealthPolicy {
    pub fn new(event_tx: Sender<CoreEvent>, auto_reconnect: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(auto_reconnect)),
            attempts: Arc::new(AtomicU32::new(0)),
            is_reconnecting: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            event_tx,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_reconnecting(&self) -> bool {
        self.is_reconnecting.load(Ordering::SeqCst)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// A successful `Connected` transition resets counters.
    pub fn note_connected(&self, prefs: &Mutex<Preferences>, source: &SourceDescriptor) {
        self.attempts.store(0, Ordering::SeqCst);
        self.is_reconnecting.store(false, Ordering::SeqCst);
        self.cancel.store(false, Ordering::SeqCst);
        let mut prefs = prefs.lock().expect("preferences mutex poisoned");
        prefs.record_last_connected(&source.name, source.url.as_deref());
    }

    /// Explicit user cancellation: clears the pending job, sets attempts to
    /// max so no further retries fire for this outage.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.attempts.store(MAX_ATTEMPTS, Ordering::SeqCst);
        self.is_reconnecting.store(false, Ordering::SeqCst);
    }

    /// Called when the Receiver enters `Error` after a prior `Connected`
    /// state. If enabled and attempts remain, spawns a timer thread that
    /// sleeps `RECONNECT_DELAY` then retries `connect(source)` on `receiver`,
    /// repeating on failure until `MAX_ATTEMPTS` is reached, the caller
    /// cancels, or a retry connects. Returns immediately; the timer thread
    /// owns the whole retry loop for this outage.
    pub fn on_connection_error<R: NdiRuntime + 'static>(&self, receiver: Arc<Mutex<Receiver<R>>>, source: SourceDescriptor) {
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }
        self.cancel.store(false, Ordering::SeqCst);
        self.spawn_attempt(receiver, source);
    }

    fn spawn_attempt<R: NdiRuntime + 'static>(&self, receiver: Arc<Mutex<Receiver<R>>>, source: SourceDescriptor) {
        let attempts = self.attempts.clone();
        let is_reconnecting = self.is_reconnecting.clone();
        let cancel = self.cancel.clone();
        let event_tx = self.event_tx.clone();
        let enabled = self.enabled.clone();

        std::thread::Builder::new()
            .name("ndi-reconnect-timer".to_string())
            .spawn(move || loop {
                std::thread::sleep(RECONNECT_DELAY);
                if cancel.load(Ordering::SeqCst) || !enabled.load(Ordering::SeqCst) {
                    return;
                }
                let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if attempt > MAX_ATTEMPTS {
                    return;
                }
                is_reconnecting.store(true, Ordering::SeqCst);
                let _ = event_tx.send(CoreEvent::ReconnectAttempt { attempt, max_attempts: MAX_ATTEMPTS });

                receiver.lock().expect("receiver mutex poisoned").connect(source.clone());

                let connected = matches!(receiver.lock().expect("receiver mutex poisoned").state(), ConnectionState::Connected(_));
                is_reconnecting.store(false, Ordering::SeqCst);

                if connected || cancel.load(Ordering::SeqCst) || attempt >= MAX_ATTEMPTS {
                    return;
                }
                // Loop back around for the next attempt after another RECONNECT_DELAY.
            })
            .expect("failed to spawn ndi-reconnect-timer thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::fake::FakeRuntime;
    use crate::router::FrameRouter;
    use crossbeam_channel::unbounded;

    fn make_receiver() -> Arc<Mutex<Receiver<FakeRuntime>>> {
        let runtime = Arc::new(FakeRuntime::new());
        let (tx, _rx) = unbounded();
        let router = Arc::new(FrameRouter::new(runtime.clone(), tx, Box::new(|| panic!("no decoder in this test"))));
        Arc::new(Mutex::new(Receiver::new(runtime, crate::config::ReceiverConfig::default(), router)))
    }

    #[test]
    fn disabled_policy_never_schedules() {
        let (tx, _rx) = unbounded();
        let policy = HealthPolicy::new(tx, false);
        let receiver = make_receiver();
        policy.on_connection_error(receiver, SourceDescriptor::new("CamA", None));
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(policy.attempts(), 0);
    }

    #[test]
    fn cancel_sets_attempts_to_max() {
        let (tx, _rx) = unbounded();
        let policy = HealthPolicy::new(tx, true);
        policy.cancel();
        assert_eq!(policy.attempts(), MAX_ATTEMPTS);
        assert!(!policy.is_reconnecting());
    }

    #[test]
    fn note_connected_resets_counters_and_persists_source() {
        let (tx, _rx) = unbounded();
        let policy = HealthPolicy::new(tx, true);
        policy.attempts.store(3, Ordering::SeqCst);
        let prefs = Mutex::new(Preferences::default());
        let source = SourceDescriptor::new("CamA (HostX)", Some("ndi://host".into()));
        policy.note_connected(&prefs, &source);
        assert_eq!(policy.attempts(), 0);
        assert_eq!(prefs.lock().unwrap().last_source_name.as_deref(), Some("CamA (HostX)"));
    }
}
