//! One-shot broadcast flag backing the closing/closed transitions.
//!
//! Uses `AtomicBool + Mutex + Condvar` from std — no external dependencies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A one-shot, thread-safe broadcast flag.
///
/// Starts unset and transitions to set exactly once; it never reverts.
/// Any number of threads may check or wait on it concurrently, and every
/// waiter eventually observes the transition.
pub struct Signal {
    fired: AtomicBool,
    lock: Mutex<()>,
    cond: Condvar,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            lock: Mutex::new(()),
            cond: Condvar::new(),
        }
    }

    /// Non-blocking check.
    pub fn is_set(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Fire the signal. Of concurrent callers exactly one performs the
    /// transition; the rest are no-ops. Returns whether this call won.
    pub(crate) fn set(&self) -> bool {
        let _guard = self.lock.lock().unwrap();
        if self.fired.load(Ordering::Relaxed) {
            return false;
        }
        self.fired.store(true, Ordering::Release);
        self.cond.notify_all();
        true
    }

    /// Block until the signal fires. Returns immediately if already set.
    pub fn wait(&self) {
        let mut guard = self.lock.lock().unwrap();
        while !self.fired.load(Ordering::Relaxed) {
            guard = self.cond.wait(guard).unwrap();
        }
    }

    /// Block until the signal fires or `timeout` elapses.
    ///
    /// Returns `true` if the signal fired within the timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.lock.lock().unwrap();
        while !self.fired.load(Ordering::Relaxed) {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) => d,
                None => return false,
            };
            let (g, _) = self.cond.wait_timeout(guard, remaining).unwrap();
            guard = g;
        }
        true
    }
}
