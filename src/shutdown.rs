//! Signal handling for graceful shutdown (SIGINT/SIGTERM)
//!
//! The first signal asks the controller loop to stop after the cycles in
//! flight. A second signal exits the process immediately.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of interruptible sleeps.
const SLEEP_STEP: Duration = Duration::from_millis(50);

/// Exit code used when a second signal forces an immediate exit.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: finish in-flight cycles, then stop
    Stop,
    /// Second signal: exit now
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    signals: Arc<AtomicU8>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.signals.load(Ordering::SeqCst) > 0
    }

    /// Request shutdown as if a signal had arrived.
    pub fn request(&self) -> SignalAction {
        match self.signals.fetch_add(1, Ordering::SeqCst) {
            0 => SignalAction::Stop,
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }

    /// Install SIGINT/SIGTERM handlers. Call once at startup.
    pub fn install(&self) -> Result<(), ctrlc::Error> {
        let shutdown = self.clone();
        ctrlc::set_handler(move || match shutdown.request() {
            SignalAction::Stop => {
                tracing::info!("Received interrupt signal, stopping after in-flight cycles");
            }
            SignalAction::ImmediateExit => {
                tracing::warn!("Received second interrupt, exiting immediately");
                std::process::exit(EXIT_CODE_INTERRUPTED);
            }
            SignalAction::Ignore => {}
        })
    }

    /// Sleep for `duration`, waking early if shutdown is requested.
    pub fn sleep(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while !self.is_requested() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            std::thread::sleep(SLEEP_STEP.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_sequence() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_requested());
        assert_eq!(shutdown.request(), SignalAction::Stop);
        assert!(shutdown.is_requested());
        assert_eq!(shutdown.request(), SignalAction::ImmediateExit);
        assert_eq!(shutdown.request(), SignalAction::Ignore);
    }

    #[test]
    fn test_clones_share_state() {
        let shutdown = Shutdown::new();
        let other = shutdown.clone();
        other.request();
        assert!(shutdown.is_requested());
    }

    #[test]
    fn test_sleep_returns_early_when_requested() {
        let shutdown = Shutdown::new();
        shutdown.request();
        let start = Instant::now();
        shutdown.sleep(Duration::from_secs(10));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
