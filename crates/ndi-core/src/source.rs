//! Publisher identity and the process-wide repository of discovered sources.
//!
//! Sources are materialized from the Finder's current-sources snapshot and
//! owned by a process-wide repository: a mutex-guarded snapshot plus a
//! watch channel, with a single writer (the Finder's poll loop) and
//! however many readers want one.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

/// Identifier of a publisher discovered on the LAN.
///
/// Equality is by `name` alone, per spec: two descriptors with the same name
/// but different URLs are still "the same source" for set-equality purposes.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub name: String,
    pub url: Option<String>,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>, url: Option<String>) -> Self {
        Self { name: name.into(), url }
    }
}

impl PartialEq for SourceDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}
impl Eq for SourceDescriptor {}

impl std::hash::Hash for SourceDescriptor {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// True iff `a` and `b` contain the same set of source names, ignoring order and URL.
pub fn same_source_set(a: &[SourceDescriptor], b: &[SourceDescriptor]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let names_a: std::collections::HashSet<&str> = a.iter().map(|s| s.name.as_str()).collect();
    let names_b: std::collections::HashSet<&str> = b.iter().map(|s| s.name.as_str()).collect();
    names_a == names_b
}

/// Process-wide, thread-shared view of the most recent discovery snapshot.
///
/// The Finder's poll loop is the sole writer; any number of readers can take
/// a cheap clone of the current snapshot, or subscribe to be notified of
/// every update via a crossbeam channel.
#[derive(Clone)]
pub struct SourceRepository {
    inner: Arc<Mutex<Vec<SourceDescriptor>>>,
    tx: Sender<Vec<SourceDescriptor>>,
    rx: Receiver<Vec<SourceDescriptor>>,
}

impl Default for SourceRepository {
    fn default() -> Self {
        let (tx, rx) = unbounded();
        Self { inner: Arc::new(Mutex::new(Vec::new())), tx, rx }
    }
}

impl SourceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current snapshot and notify subscribers.
    pub fn publish(&self, sources: Vec<SourceDescriptor>) {
        *self.inner.lock().expect("source repository mutex poisoned") = sources.clone();
        let _ = self.tx.send(sources);
    }

    /// A cheap snapshot of the sources currently known.
    pub fn snapshot(&self) -> Vec<SourceDescriptor> {
        self.inner.lock().expect("source repository mutex poisoned").clone()
    }

    /// A new receiver of every future `publish` call (not the current value).
    pub fn subscribe(&self) -> Receiver<Vec<SourceDescriptor>> {
        self.rx.clone()
    }

    pub fn find(&self, name: &str) -> Option<SourceDescriptor> {
        self.inner
            .lock()
            .expect("source repository mutex poisoned")
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_url() {
        let a = SourceDescriptor::new("CamA", Some("ndi://1".into()));
        let b = SourceDescriptor::new("CamA", Some("ndi://2".into()));
        assert_eq!(a, b);
    }

    #[test]
    fn same_source_set_is_order_independent() {
        let a = vec![SourceDescriptor::new("A", None), SourceDescriptor::new("B", None)];
        let b = vec![SourceDescriptor::new("B", None), SourceDescriptor::new("A", None)];
        assert!(same_source_set(&a, &b));
    }

    #[test]
    fn same_source_set_detects_difference() {
        let a = vec![SourceDescriptor::new("A", None)];
        let b = vec![SourceDescriptor::new("A", None), SourceDescriptor::new("B", None)];
        assert!(!same_source_set(&a, &b));
    }

    #[test]
    fn repository_publishes_and_snapshots() {
        let repo = SourceRepository::new();
        let rx = repo.subscribe();
        repo.publish(vec![SourceDescriptor::new("CamA", None)]);
        assert_eq!(repo.snapshot().len(), 1);
        let got = rx.recv_timeout(std::time::Duration::from_millis(100)).unwrap();
        assert_eq!(got[0].name, "CamA");
    }
}
