//! Blocking join counter gating a closer's terminal transition.
//!
//! Uses `Mutex + Condvar` from std — no external dependencies.

use std::sync::{Condvar, Mutex};

/// A join counter for outstanding asynchronous obligations.
///
/// Obligations are registered with [`add`](WaitGroup::add) and retired with
/// [`done`](WaitGroup::done); [`wait`](WaitGroup::wait) blocks until the
/// counter reaches zero. `add` and `done` may race freely from any number
/// of threads.
pub struct WaitGroup {
    count: Mutex<usize>,
    cond: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    /// Register `n` pending obligations.
    pub fn add(&self, n: usize) {
        let mut count = self.count.lock().unwrap();
        *count += n;
    }

    /// Retire one obligation.
    ///
    /// Panics if the counter is already zero: an unbalanced `done` means a
    /// mismatched add/done pair in the caller and would otherwise corrupt
    /// the counter silently.
    pub fn done(&self) {
        let mut count = self.count.lock().unwrap();
        if *count == 0 {
            panic!("WaitGroup::done called with no pending add");
        }
        *count -= 1;
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    /// Block until the counter reaches zero. Returns immediately if no
    /// obligations are pending.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.cond.wait(count).unwrap();
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn wait_returns_immediately_when_zero() {
        let wg = WaitGroup::new();
        wg.wait();
    }

    #[test]
    fn add_then_done_balances() {
        let wg = WaitGroup::new();
        wg.add(2);
        wg.done();
        wg.done();
        wg.wait();
    }

    #[test]
    fn wait_blocks_until_done() {
        let wg = Arc::new(WaitGroup::new());
        wg.add(1);

        let wg2 = wg.clone();
        let handle = thread::spawn(move || {
            wg2.wait();
            42
        });

        // Give thread time to block
        thread::sleep(Duration::from_millis(50));
        wg.done();

        assert_eq!(handle.join().unwrap(), 42);
    }

    #[test]
    fn concurrent_done_drains() {
        let wg = Arc::new(WaitGroup::new());
        wg.add(8);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let wg = wg.clone();
                thread::spawn(move || wg.done())
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        wg.wait();
    }

    #[test]
    #[should_panic(expected = "no pending add")]
    fn unbalanced_done_panics() {
        let wg = WaitGroup::new();
        wg.done();
    }
}
