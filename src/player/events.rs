//! Cycle events: resettable completion gates between pipeline stages
//!
//! Each pipeline loop brackets one iteration with `begin` / `complete`;
//! other stages (and shutdown) park on `wait` until the cycle finishes.
//! These are coarse barriers, not per-item signals: a waiter released by
//! `complete` stays released until the next `begin`.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Manual-reset completion gate
pub struct CycleEvent {
    completed: Mutex<bool>,
    signal: Condvar,
}

impl CycleEvent {
    /// Create a gate in the completed state, so waiters never block on a
    /// cycle that has not started
    pub fn new() -> Self {
        Self {
            completed: Mutex::new(true),
            signal: Condvar::new(),
        }
    }

    /// Mark the cycle in progress; subsequent waiters block
    pub fn begin(&self) {
        *self.completed.lock() = false;
    }

    /// Mark the cycle complete and release every waiter
    pub fn complete(&self) {
        let mut completed = self.completed.lock();
        *completed = true;
        self.signal.notify_all();
    }

    /// Whether the gate is currently in the completed state
    pub fn is_completed(&self) -> bool {
        *self.completed.lock()
    }

    /// Block until the current cycle completes
    pub fn wait(&self) {
        let mut completed = self.completed.lock();
        while !*completed {
            self.signal.wait(&mut completed);
        }
    }

    /// Block until the current cycle completes or the timeout elapses;
    /// returns whether the cycle completed
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        let mut completed = self.completed.lock();
        while !*completed {
            if self.signal.wait_until(&mut completed, deadline).timed_out() {
                return *completed;
            }
        }
        true
    }
}

impl Default for CycleEvent {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_gate_is_completed() {
        let event = CycleEvent::new();
        assert!(event.is_completed());
        // Waiting on a completed gate returns immediately.
        event.wait();
    }

    #[test]
    fn test_begin_blocks_until_complete() {
        let event = Arc::new(CycleEvent::new());
        event.begin();
        assert!(!event.is_completed());

        let waiter = {
            let event = Arc::clone(&event);
            thread::spawn(move || {
                event.wait();
                true
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());

        event.complete();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_timeout_expires() {
        let event = CycleEvent::new();
        event.begin();
        assert!(!event.wait_timeout(Duration::from_millis(20)));
        event.complete();
        assert!(event.wait_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_gate_is_reusable() {
        let event = Arc::new(CycleEvent::new());
        for _ in 0..3 {
            event.begin();
            let releaser = {
                let event = Arc::clone(&event);
                thread::spawn(move || {
                    thread::sleep(Duration::from_millis(5));
                    event.complete();
                })
            };
            event.wait();
            assert!(event.is_completed());
            releaser.join().unwrap();
        }
    }

    #[test]
    fn test_complete_releases_all_waiters() {
        let event = Arc::new(CycleEvent::new());
        event.begin();

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let event = Arc::clone(&event);
                thread::spawn(move || event.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(10));
        event.complete();
        for waiter in waiters {
            waiter.join().unwrap();
        }
    }
}
