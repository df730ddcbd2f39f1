use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{mpsc, watch};

/// Point-in-time view of one in-flight operation.
///
/// `max == 0` marks the operation indeterminate, a negative `value` marks it
/// failed, and `value == max` with a non-zero `max` marks it complete.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub id: u64,
    pub value: i64,
    pub max: i64,
    pub message: Option<String>,
}

impl ProgressSnapshot {
    pub fn is_indeterminate(&self) -> bool {
        self.max == 0
    }

    pub fn is_complete(&self) -> bool {
        self.value == self.max && !self.is_indeterminate()
    }

    pub fn is_failed(&self) -> bool {
        self.value < 0
    }

    pub fn is_finished(&self) -> bool {
        self.is_complete() || self.is_failed()
    }
}

/// Callback registered at `create` time, invoked with every snapshot of that
/// request once the owning event is dispatched on the consumer side.
pub type ProgressObserver = Arc<dyn Fn(&ProgressSnapshot) + Send + Sync>;

/// One marshaled update, delivered in report order through the single
/// consumer channel handed out by [`ProgressService::new`].
pub struct ProgressEvent {
    pub snapshot: ProgressSnapshot,
    observer: Option<ProgressObserver>,
}

impl ProgressEvent {
    /// Runs the observer registered for this request, if any. Must be called
    /// from the channel consumer so observer code never runs concurrently
    /// with other consumer-side work.
    pub fn dispatch(&self) {
        if let Some(observer) = &self.observer {
            observer(&self.snapshot);
        }
    }
}

/// Collaborator notified whenever a request is cancelled or reaches a
/// terminal state, so catalog tags referencing the id can be dropped.
pub trait ProgressCleanup: Send + Sync {
    fn clear_progress(&self, progress_id: u64);
}

struct ProgressEntry {
    value: i64,
    max: i64,
    message: Option<String>,
    observer: Option<ProgressObserver>,
    watch_tx: watch::Sender<ProgressSnapshot>,
}

impl ProgressEntry {
    fn snapshot(&self, id: u64) -> ProgressSnapshot {
        ProgressSnapshot {
            id,
            value: self.value,
            max: self.max,
            message: self.message.clone(),
        }
    }
}

struct Registry {
    entries: HashMap<u64, ProgressEntry>,
    next_id: u64,
}

/// Registry of in-flight operations.
///
/// `report` is the only entry point meant for arbitrary worker threads; the
/// registry mutex is the serialization point, and snapshots leave it through
/// the event channel so the consumer observes per-id updates in report order.
#[derive(Clone)]
pub struct ProgressService {
    registry: Arc<Mutex<Registry>>,
    events: mpsc::UnboundedSender<ProgressEvent>,
    cleanup: Arc<dyn ProgressCleanup>,
}

impl ProgressService {
    /// Builds the service and hands back the sole event receiver. The caller
    /// owns the receiver on its serial context and dispatches each event.
    pub fn new(
        cleanup: Arc<dyn ProgressCleanup>,
    ) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let service = Self {
            registry: Arc::new(Mutex::new(Registry {
                entries: HashMap::new(),
                next_id: 0,
            })),
            events,
            cleanup,
        };
        (service, events_rx)
    }

    /// Registers a new zero-value request and returns its id. Never fails.
    pub fn create(&self, title: &str, silent: bool) -> u64 {
        self.register(title, silent, None)
    }

    /// Same as [`create`](Self::create), with an observer invoked for every
    /// snapshot when the marshaled event is dispatched.
    pub fn create_with_observer(
        &self,
        title: &str,
        silent: bool,
        observer: impl Fn(&ProgressSnapshot) + Send + Sync + 'static,
    ) -> u64 {
        self.register(title, silent, Some(Arc::new(observer)))
    }

    fn register(&self, title: &str, silent: bool, observer: Option<ProgressObserver>) -> u64 {
        let mut registry = self.lock();
        let id = loop {
            let candidate = registry.next_id;
            registry.next_id = registry.next_id.wrapping_add(1);
            if !registry.entries.contains_key(&candidate) {
                break candidate;
            }
            // Only reachable if the counter wrapped all the way around.
            tracing::warn!(
                "progress id {} still registered, retrying allocation",
                candidate
            );
        };

        let initial = ProgressSnapshot {
            id,
            value: 0,
            max: 0,
            message: None,
        };
        let (watch_tx, _) = watch::channel(initial);
        registry.entries.insert(
            id,
            ProgressEntry {
                value: 0,
                max: 0,
                message: None,
                observer,
                watch_tx,
            },
        );
        drop(registry);

        tracing::info!("registered progress request {} ({}, silent={})", id, title, silent);
        id
    }

    /// Applies a worker-side update. Returns `false` when the id is not
    /// registered, which callers must treat as "already finished" rather than
    /// an error. A terminal update removes the entry before returning and
    /// notifies the cleanup collaborator, so a later `report` on the same id
    /// cannot resurrect it.
    pub fn report(&self, id: u64, value: i64, max: i64, message: Option<&str>) -> bool {
        let finished = {
            let mut registry = self.lock();
            let Some(entry) = registry.entries.get_mut(&id) else {
                return false;
            };

            entry.value = value;
            entry.max = max;
            if let Some(message) = message {
                entry.message = Some(message.to_string());
            }

            let snapshot = entry.snapshot(id);
            let observer = entry.observer.clone();
            let _ = entry.watch_tx.send(snapshot.clone());

            let finished = snapshot.is_finished();
            let _ = self.events.send(ProgressEvent { snapshot, observer });
            if finished {
                registry.entries.remove(&id);
            }
            finished
        };

        if finished {
            self.cleanup.clear_progress(id);
        }
        true
    }

    /// Drops the entry if present and always notifies the cleanup
    /// collaborator. Safe to call for ids that already finished.
    pub fn cancel(&self, id: u64) {
        {
            let mut registry = self.lock();
            registry.entries.remove(&id);
        }
        self.cleanup.clear_progress(id);
    }

    pub fn query(&self, id: u64) -> Option<ProgressSnapshot> {
        let registry = self.lock();
        registry.entries.get(&id).map(|entry| entry.snapshot(id))
    }

    /// Latest snapshot plus push updates for one request. The receiver closes
    /// once the request reaches a terminal state and is removed.
    pub fn subscribe(&self, id: u64) -> Option<watch::Receiver<ProgressSnapshot>> {
        let registry = self.lock();
        registry
            .entries
            .get(&id)
            .map(|entry| entry.watch_tx.subscribe())
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        match self.registry.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex as StdMutex;
    use std::thread;

    #[derive(Default)]
    struct RecordingCleanup {
        cleared: StdMutex<Vec<u64>>,
    }

    impl RecordingCleanup {
        fn cleared(&self) -> Vec<u64> {
            self.cleared.lock().expect("cleanup lock").clone()
        }
    }

    impl ProgressCleanup for RecordingCleanup {
        fn clear_progress(&self, progress_id: u64) {
            self.cleared.lock().expect("cleanup lock").push(progress_id);
        }
    }

    fn service() -> (
        ProgressService,
        mpsc::UnboundedReceiver<ProgressEvent>,
        Arc<RecordingCleanup>,
    ) {
        let cleanup = Arc::new(RecordingCleanup::default());
        let (service, events) = ProgressService::new(cleanup.clone());
        (service, events, cleanup)
    }

    #[test]
    fn first_id_in_fresh_registry_is_zero() {
        let (service, _events, _cleanup) = service();
        assert_eq!(service.create("install", false), 0);
        assert_eq!(service.create("install", false), 1);
    }

    #[test]
    fn concurrent_creates_yield_distinct_ids() {
        let (service, _events, _cleanup) = service();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                thread::spawn(move || {
                    (0..50)
                        .map(|_| service.create("worker", true))
                        .collect::<Vec<u64>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("join creator thread") {
                assert!(seen.insert(id), "id {id} allocated twice");
            }
        }
        assert_eq!(seen.len(), 400);
    }

    #[test]
    fn report_updates_and_classifies_state() {
        let (service, _events, _cleanup) = service();
        let id = service.create("install", false);

        assert!(service.report(id, 0, 100, None));
        let snapshot = service.query(id).expect("registered snapshot");
        assert!(!snapshot.is_indeterminate());
        assert!(!snapshot.is_finished());
        assert_eq!(snapshot.value, 0);
        assert_eq!(snapshot.max, 100);
    }

    #[test]
    fn completion_removes_entry_and_rejects_late_reports() {
        let (service, _events, cleanup) = service();
        let id = service.create("install", false);

        assert!(service.report(id, 100, 100, None));
        assert!(service.query(id).is_none());
        assert_eq!(cleanup.cleared(), vec![id]);

        // The worker does not know the entry is gone; its next report must be
        // a no-op that does not recreate the entry.
        assert!(!service.report(id, 100, 100, None));
        assert!(service.query(id).is_none());
    }

    #[test]
    fn failure_report_is_terminal() {
        let (service, _events, cleanup) = service();
        let id = service.create("install", false);

        assert!(service.report(id, -1, 0, None));
        assert!(service.query(id).is_none());
        assert_eq!(cleanup.cleared(), vec![id]);
    }

    #[test]
    fn message_is_kept_when_update_omits_it() {
        let (service, _events, _cleanup) = service();
        let id = service.create("install", false);

        assert!(service.report(id, 1, 10, Some("decoding entry 1")));
        assert!(service.report(id, 2, 10, None));
        let snapshot = service.query(id).expect("registered snapshot");
        assert_eq!(snapshot.message.as_deref(), Some("decoding entry 1"));
    }

    #[test]
    fn report_on_unknown_id_returns_false() {
        let (service, _events, _cleanup) = service();
        assert!(!service.report(41, 1, 2, None));
    }

    #[test]
    fn cancel_is_idempotent_and_always_notifies_cleanup() {
        let (service, _events, cleanup) = service();
        let id = service.create("install", false);

        service.cancel(id);
        service.cancel(id);
        service.cancel(99);

        assert!(service.query(id).is_none());
        assert_eq!(cleanup.cleared(), vec![id, id, 99]);
    }

    #[tokio::test]
    async fn events_arrive_in_report_order_and_dispatch_observer() {
        let cleanup = Arc::new(RecordingCleanup::default());
        let (service, mut events) = ProgressService::new(cleanup);

        let observed = Arc::new(StdMutex::new(Vec::new()));
        let sink = observed.clone();
        let id = service.create_with_observer("install", false, move |snapshot| {
            sink.lock().expect("observer lock").push(snapshot.value);
        });

        for value in 1..=3 {
            assert!(service.report(id, value, 3, None));
        }

        for expected in 1..=3 {
            let event = events.recv().await.expect("queued event");
            assert_eq!(event.snapshot.id, id);
            assert_eq!(event.snapshot.value, expected);
            event.dispatch();
        }
        assert_eq!(*observed.lock().expect("observer lock"), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn subscribe_sees_latest_then_closes_at_terminal() {
        let (service, _events, _cleanup) = service();
        let id = service.create("install", false);
        assert!(service.report(id, 2, 8, None));

        let mut updates = service.subscribe(id).expect("live subscription");
        assert_eq!(updates.borrow().value, 2);

        assert!(service.report(id, 5, 8, None));
        updates.changed().await.expect("pushed update");
        assert_eq!(updates.borrow_and_update().value, 5);

        assert!(service.report(id, 8, 8, None));
        // Terminal snapshot is still delivered, then the sender drops.
        updates.changed().await.expect("terminal update");
        assert!(updates.borrow_and_update().is_finished());
        assert!(updates.changed().await.is_err());

        assert!(service.subscribe(id).is_none());
    }

    #[test]
    fn reports_from_many_threads_keep_per_id_state_consistent() {
        let (service, mut events, _cleanup) = service();
        let ids: Vec<u64> = (0..4).map(|_| service.create("worker", true)).collect();

        let handles: Vec<_> = ids
            .iter()
            .map(|&id| {
                let service = service.clone();
                thread::spawn(move || {
                    for value in 1..=20 {
                        assert!(service.report(id, value, 20, None));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join reporter thread");
        }

        for &id in &ids {
            assert!(service.query(id).is_none(), "id {id} should be terminal");
        }

        let mut last_seen: HashMap<u64, i64> = HashMap::new();
        while let Ok(event) = events.try_recv() {
            let previous = last_seen
                .insert(event.snapshot.id, event.snapshot.value)
                .unwrap_or(0);
            assert!(
                event.snapshot.value > previous,
                "updates for id {} reordered",
                event.snapshot.id
            );
        }
        for &id in &ids {
            assert_eq!(last_seen.get(&id), Some(&20));
        }
    }
}
