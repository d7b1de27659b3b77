//! De-duplicating work queue with per-key backoff.
//!
//! A key is queued at most once. Failed keys come back after an exponential
//! delay; a success resets the key's failure count.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use annotator_model::ObjectKey;

/// Exponential backoff bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(5),
            max: Duration::from_secs(300),
        }
    }
}

impl Backoff {
    /// Delay before retry number `failures` (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .map_or(self.max, |d| d.min(self.max))
    }
}

#[derive(Debug)]
pub struct WorkQueue {
    backoff: Backoff,
    /// FIFO of keys with the earliest time they may run.
    pending: VecDeque<(ObjectKey, Instant)>,
    failures: HashMap<ObjectKey, u32>,
}

impl WorkQueue {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            pending: VecDeque::new(),
            failures: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.pending.iter().any(|(k, _)| k == key)
    }

    /// Queue `key` to run as soon as possible.
    ///
    /// A key already waiting out a backoff is moved forward.
    pub fn add(&mut self, key: ObjectKey, now: Instant) {
        if let Some(entry) = self.pending.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = entry.1.min(now);
            return;
        }
        self.pending.push_back((key, now));
    }

    /// Record a failed cycle and queue the key again after its backoff.
    ///
    /// Returns the chosen delay.
    pub fn requeue(&mut self, key: ObjectKey, now: Instant) -> Duration {
        let failures = self.failures.entry(key.clone()).or_insert(0);
        *failures += 1;
        let delay = self.backoff.delay(*failures);

        let not_before = now + delay;
        if let Some(entry) = self.pending.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = entry.1.max(not_before);
        } else {
            self.pending.push_back((key, not_before));
        }
        delay
    }

    /// Clear the failure history after a successful cycle.
    pub fn forget(&mut self, key: &ObjectKey) {
        self.failures.remove(key);
    }

    pub fn failures(&self, key: &ObjectKey) -> u32 {
        self.failures.get(key).copied().unwrap_or(0)
    }

    /// Remove and return up to `limit` keys that may run at `now`.
    pub fn take_ready(&mut self, now: Instant, limit: usize) -> Vec<ObjectKey> {
        let mut ready = Vec::new();
        let mut waiting = VecDeque::with_capacity(self.pending.len());
        while let Some((key, not_before)) = self.pending.pop_front() {
            if ready.len() < limit && not_before <= now {
                ready.push(key);
            } else {
                waiting.push_back((key, not_before));
            }
        }
        self.pending = waiting;
        ready
    }

    /// Earliest time any queued key may run.
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, at)| *at).min()
    }
}
