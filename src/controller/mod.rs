//! Controller loop
//!
//! Turns store changes into reconcile calls:
//!
//! - [`ChangeDetector`] polls the store and emits [`Trigger`]s
//! - target triggers fan out to every overlay scoped to that target
//! - [`WorkQueue`] de-duplicates keys and delays failed ones
//! - ready keys are reconciled on a bounded set of scoped threads
//!
//! A key is never handed to two workers at once: a batch holds distinct
//! keys and is joined before the next batch is taken.

mod queue;
mod watch;

pub use queue::{Backoff, WorkQueue};
pub use watch::{ChangeDetector, Trigger};

use std::thread;
use std::time::{Duration, Instant};

use annotator_model::ObjectKey;
use tracing::{debug, error, info, warn};

use crate::reconcile::{overlays_for_target, ReconcileError, ReconcileOutcome, Reconciler};
use crate::shutdown::Shutdown;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Maximum overlays reconciled concurrently.
    pub workers: usize,
    pub poll_interval: Duration,
    pub backoff: Backoff,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_millis(1000),
            backoff: Backoff::default(),
        }
    }
}

/// Overlays to reconcile after the target `name` changed.
///
/// A failed listing yields no requests; the next change retries.
pub fn requests_for_target<S: Store + ?Sized>(store: &S, name: &str) -> Vec<ObjectKey> {
    match store.list_overlays(Some(name)) {
        Ok(overlays) => {
            let matches = overlays_for_target(name);
            overlays
                .iter()
                .filter(|o| matches(o))
                .map(|o| o.key())
                .collect()
        }
        Err(err) => {
            warn!(target_name = %name, error = %err, "Failed to list overlays for target");
            Vec::new()
        }
    }
}

/// Result of one processed batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<(ObjectKey, ReconcileOutcome)>,
    pub failed: Vec<(ObjectKey, ReconcileError)>,
    /// Keys whose worker panicked; they are requeued like failures.
    pub panicked: Vec<ObjectKey>,
}

impl BatchReport {
    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty() && self.panicked.is_empty()
    }

    /// Whether any cycle failed or panicked.
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty() || !self.panicked.is_empty()
    }

    fn absorb(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.panicked.extend(other.panicked);
    }
}

pub struct Controller<S> {
    reconciler: Reconciler<S>,
    config: ControllerConfig,
    queue: WorkQueue,
    detector: ChangeDetector,
}

impl<S: Store + Sync> Controller<S> {
    pub fn new(reconciler: Reconciler<S>, config: ControllerConfig) -> Self {
        let queue = WorkQueue::new(config.backoff);
        Self {
            reconciler,
            config,
            queue,
            detector: ChangeDetector::new(),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<S> {
        &self.reconciler
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.queue
    }

    /// Enqueue the overlays a trigger refers to.
    pub fn handle(&mut self, trigger: Trigger, now: Instant) {
        match trigger {
            Trigger::Overlay(key) => self.queue.add(key, now),
            Trigger::Target(name) => {
                for key in requests_for_target(self.reconciler.store(), &name) {
                    self.queue.add(key, now);
                }
            }
        }
    }

    /// Poll the store for changes and enqueue what they imply.
    pub fn poll(&mut self, now: Instant) -> usize {
        match self.detector.poll(self.reconciler.store()) {
            Ok(triggers) => {
                let count = triggers.len();
                for trigger in triggers {
                    self.handle(trigger, now);
                }
                count
            }
            Err(err) => {
                warn!(error = %err, "Change detection failed");
                0
            }
        }
    }

    /// Reconcile every key that is ready at `now`, `workers` at a time.
    ///
    /// Follow-up work caused by these cycles (a freshly installed finalizer,
    /// a rewritten target) is picked up by the next poll.
    pub fn process_ready(&mut self, now: Instant) -> BatchReport {
        let mut report = BatchReport::default();
        let ready = self.queue.take_ready(now, usize::MAX);

        for batch in ready.chunks(self.config.workers.max(1)) {
            for (key, result) in self.reconcile_batch(batch) {
                match result {
                    Some(Ok(outcome)) => {
                        self.queue.forget(&key);
                        report.succeeded.push((key, outcome));
                    }
                    Some(Err(err)) => {
                        let delay = self.queue.requeue(key.clone(), now);
                        debug!(
                            overlay = %key,
                            delay_ms = delay.as_millis() as u64,
                            "Requeued after failure"
                        );
                        report.failed.push((key, err));
                    }
                    None => {
                        error!(overlay = %key, "Reconcile worker panicked");
                        self.queue.requeue(key.clone(), now);
                        report.panicked.push(key);
                    }
                }
            }
        }
        report
    }

    /// Reconcile distinct keys concurrently. `None` marks a panicked worker.
    fn reconcile_batch(
        &self,
        batch: &[ObjectKey],
    ) -> Vec<(ObjectKey, Option<Result<ReconcileOutcome, ReconcileError>>)> {
        let reconciler = &self.reconciler;
        thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|key| (key, scope.spawn(move || reconciler.reconcile(key))))
                .collect();
            handles
                .into_iter()
                .map(|(key, handle)| (key.clone(), handle.join().ok()))
                .collect()
        })
    }

    /// Poll and process until `shutdown` is requested.
    pub fn run(&mut self, shutdown: &Shutdown) {
        info!(
            workers = self.config.workers,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Controller started"
        );
        while !shutdown.is_requested() {
            let now = Instant::now();
            self.poll(now);
            let report = self.process_ready(now);
            for (key, err) in &report.failed {
                error!(overlay = %key, error = %err, "Reconcile failed, will retry");
            }

            let wait = self
                .queue
                .next_ready_at()
                .map(|at| at.saturating_duration_since(Instant::now()))
                .map_or(self.config.poll_interval, |d| d.min(self.config.poll_interval));
            shutdown.sleep(wait);
        }
        info!("Controller stopped");
    }

    /// Process everything currently known once, then return.
    ///
    /// Keeps going while cycles make progress (finalizer installs lead to a
    /// sync cycle), up to `max_rounds`.
    pub fn run_once(&mut self, max_rounds: usize) -> BatchReport {
        let mut total = BatchReport::default();
        self.poll(Instant::now());
        for _ in 0..max_rounds {
            let report = self.process_ready(Instant::now());
            if report.is_empty() {
                break;
            }
            total.absorb(report);
            self.poll(Instant::now());
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::ReconcilerConfig;
    use crate::store::{FailureConfig, MemoryStore, StoreOp};
    use annotator_model::{Overlay, StoreError, Target};

    fn controller() -> Controller<MemoryStore> {
        let store = MemoryStore::new();
        store.create_target(Target::new("team-a", [("c", "keep")])).unwrap();
        store.create_target(Target::new("team-b", [("c", "keep")])).unwrap();
        store
            .create_overlay(Overlay::new("team-a", "one", [("a", "1")]))
            .unwrap();
        store
            .create_overlay(Overlay::new("team-a", "two", [("b", "2")]))
            .unwrap();
        store
            .create_overlay(Overlay::new("team-b", "three", [("a", "3")]))
            .unwrap();
        Controller::new(
            Reconciler::new(store, ReconcilerConfig::default()),
            ControllerConfig::default(),
        )
    }

    #[test]
    fn test_requests_for_target_fan_out() {
        let c = controller();
        let keys = requests_for_target(c.reconciler().store(), "team-a");
        assert_eq!(
            keys,
            vec![ObjectKey::new("team-a", "one"), ObjectKey::new("team-a", "two")]
        );
        assert!(requests_for_target(c.reconciler().store(), "team-z").is_empty());
    }

    #[test]
    fn test_requests_for_target_list_failure_is_empty() {
        let c = controller();
        c.reconciler()
            .store()
            .inject_failure(StoreOp::ListOverlays, FailureConfig::unavailable("down"));
        assert!(requests_for_target(c.reconciler().store(), "team-a").is_empty());
    }

    #[test]
    fn test_target_trigger_enqueues_scoped_overlays() {
        let mut c = controller();
        let now = Instant::now();
        c.handle(Trigger::Target("team-b".to_string()), now);
        assert_eq!(c.queue().len(), 1);
        assert!(c.queue().contains(&ObjectKey::new("team-b", "three")));
    }

    #[test]
    fn test_run_once_converges_all_overlays() {
        let mut c = controller();
        // Overlays sharing a target may conflict with each other; the target
        // change they cause re-triggers the loser.
        c.run_once(10);

        let store = c.reconciler().store();
        let a = store.get_target("team-a").unwrap();
        assert_eq!(a.attribute("a"), Some("1"));
        assert_eq!(a.attribute("b"), Some("2"));
        assert_eq!(a.attribute("c"), Some("keep"));
        assert_eq!(store.get_target("team-b").unwrap().attribute("a"), Some("3"));

        // A further pass finds nothing to do.
        store.reset_counts();
        let report = c.run_once(10);
        assert!(report.is_empty());
        assert_eq!(c.reconciler().store().write_count(), 0);
    }

    #[test]
    fn test_failure_requeues_with_backoff() {
        let mut c = controller();
        c.reconciler()
            .store()
            .inject_failure(StoreOp::GetTarget, FailureConfig::unavailable("partition"));

        let now = Instant::now();
        c.handle(Trigger::Overlay(ObjectKey::new("team-a", "one")), now);
        let report = c.process_ready(now);
        assert_eq!(report.failed.len(), 1);
        assert!(report.succeeded.is_empty());

        let key = ObjectKey::new("team-a", "one");
        assert!(c.queue().contains(&key));
        assert_eq!(c.queue().failures(&key), 1);
        // Still backing off at the same instant.
        assert!(c.process_ready(now).is_empty());

        c.reconciler().store().clear_failures();
        let later = now + Duration::from_secs(1);
        let report = c.process_ready(later);
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(c.queue().failures(&key), 0);
    }

    /// Store whose overlay reads panic, standing in for a buggy worker.
    struct PanickingStore(MemoryStore);

    impl Store for PanickingStore {
        fn get_overlay(&self, _key: &ObjectKey) -> Result<Overlay, StoreError> {
            panic!("overlay read blew up");
        }

        fn get_target(&self, name: &str) -> Result<Target, StoreError> {
            self.0.get_target(name)
        }

        fn update_overlay(&self, overlay: &Overlay) -> Result<Overlay, StoreError> {
            self.0.update_overlay(overlay)
        }

        fn update_overlay_status(&self, overlay: &Overlay) -> Result<Overlay, StoreError> {
            self.0.update_overlay_status(overlay)
        }

        fn update_target(&self, target: &Target) -> Result<Target, StoreError> {
            self.0.update_target(target)
        }

        fn list_overlays(&self, scope: Option<&str>) -> Result<Vec<Overlay>, StoreError> {
            self.0.list_overlays(scope)
        }

        fn list_targets(&self) -> Result<Vec<Target>, StoreError> {
            self.0.list_targets()
        }
    }

    #[test]
    fn test_panicked_worker_is_reported_and_requeued() {
        let inner = MemoryStore::new();
        inner.create_target(Target::new("team-a", [("c", "keep")])).unwrap();
        inner
            .create_overlay(Overlay::new("team-a", "one", [("a", "1")]))
            .unwrap();
        let mut c = Controller::new(
            Reconciler::new(PanickingStore(inner), ReconcilerConfig::default()),
            ControllerConfig {
                backoff: Backoff {
                    base: Duration::from_secs(60),
                    max: Duration::from_secs(60),
                },
                ..ControllerConfig::default()
            },
        );

        let report = c.run_once(5);
        let key = ObjectKey::new("team-a", "one");
        assert!(!report.is_empty());
        assert!(report.has_failures());
        assert_eq!(report.panicked, vec![key.clone()]);
        assert!(c.queue().contains(&key));
        assert_eq!(c.queue().failures(&key), 1);
    }
}
