//! Execution gate: open while no run is in progress, closed while one is.
//!
//! Waiting on the gate is "acquire then immediately release": a waiter blocks
//! until the current run ends and then lets everyone else through too.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Binary open/closed signal that remembers which thread closed it.
#[derive(Debug, Default)]
pub struct ExecutionGate {
    owner: Mutex<Option<ThreadId>>,
    opened: Condvar,
}

impl ExecutionGate {
    /// A new gate starts open.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_none()
    }

    pub fn is_closed(&self) -> bool {
        !self.is_open()
    }

    /// Thread currently holding the gate closed.
    pub fn owner(&self) -> Option<ThreadId> {
        *self.lock()
    }

    /// True when called from inside the run that holds the gate.
    pub fn held_by_current(&self) -> bool {
        self.owner() == Some(thread::current().id())
    }

    /// Close the gate for the calling thread. Returns false if it was already closed.
    pub fn try_close(&self) -> bool {
        let mut owner = self.lock();
        if owner.is_some() {
            return false;
        }
        *owner = Some(thread::current().id());
        true
    }

    /// Reopen and wake every waiter.
    pub fn open(&self) {
        let mut owner = self.lock();
        *owner = None;
        self.opened.notify_all();
    }

    /// Block until the gate is open.
    pub fn wait_open(&self) {
        let mut owner = self.lock();
        while owner.is_some() {
            owner = self.opened.wait(owner).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Like `wait_open` but gives up after `timeout`. Returns whether the gate is open.
    pub fn wait_open_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut owner = self.lock();
        while owner.is_some() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            owner = self
                .opened
                .wait_timeout(owner, deadline - now)
                .unwrap_or_else(|e| e.into_inner())
                .0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_starts_open() {
        let gate = ExecutionGate::new();
        assert!(gate.is_open());
        assert_eq!(gate.owner(), None);
        gate.wait_open();
    }

    #[test]
    fn test_close_is_exclusive() {
        let gate = ExecutionGate::new();
        assert!(gate.try_close());
        assert!(!gate.try_close());
        assert!(gate.held_by_current());
        gate.open();
        assert!(gate.is_open());
        assert!(!gate.held_by_current());
    }

    #[test]
    fn test_waiters_block_until_open() {
        let gate = Arc::new(ExecutionGate::new());
        assert!(gate.try_close());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let gate = Arc::clone(&gate);
                thread::spawn(move || {
                    let start = Instant::now();
                    gate.wait_open();
                    start.elapsed()
                })
            })
            .collect();

        thread::sleep(Duration::from_millis(80));
        gate.open();

        for w in waiters {
            let waited = w.join().unwrap();
            assert!(waited >= Duration::from_millis(60), "waited only {:?}", waited);
        }
    }

    #[test]
    fn test_wait_open_timeout() {
        let gate = ExecutionGate::new();
        assert!(gate.wait_open_timeout(Duration::from_millis(1)));
        assert!(gate.try_close());
        assert!(!gate.wait_open_timeout(Duration::from_millis(20)));
    }

    #[test]
    fn test_owner_is_closing_thread() {
        let gate = Arc::new(ExecutionGate::new());
        let g = Arc::clone(&gate);
        let closer = thread::spawn(move || {
            assert!(g.try_close());
            thread::current().id()
        })
        .join()
        .unwrap();
        assert_eq!(gate.owner(), Some(closer));
        assert!(!gate.held_by_current());
    }
}
