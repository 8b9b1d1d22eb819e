//! One-shot timer rearmed after every run.
//!
//! The timer lock is always taken before the gate lock. Closing the gate for a
//! fire and disarming happen under the timer lock, so a `disarm` either sees the
//! run already in progress or prevents it from starting.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::WorkerError;
use crate::gate::ExecutionGate;

#[derive(Debug, Default)]
struct TimerState {
    /// The schedule is wanted: set by start, cleared by stop/terminate.
    active: bool,
    /// Armed when set; fires once this instant has passed.
    deadline: Option<Instant>,
    /// Last disarm came from terminate.
    terminated: bool,
    shutdown: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fire {
    Elapsed,
    Shutdown,
}

#[derive(Debug)]
pub struct Timer {
    period: Duration,
    state: Mutex<TimerState>,
    changed: Condvar,
}

impl Timer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            state: Mutex::new(TimerState::default()),
            changed: Condvar::new(),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// None when the period cannot be represented as an instant; the timer stays disarmed.
    fn next_deadline(&self) -> Option<Instant> {
        Instant::now().checked_add(self.period)
    }

    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Activate the schedule. An existing deadline is kept; while a run holds
    /// the gate only the intent is recorded and the run arms on completion.
    pub fn arm(&self, gate: &ExecutionGate) {
        let mut st = self.lock();
        st.active = true;
        st.terminated = false;
        if st.deadline.is_none() && !st.shutdown && gate.is_open() {
            st.deadline = self.next_deadline();
            self.changed.notify_all();
        }
    }

    /// Deactivate the schedule. Returns whether it was active.
    pub fn disarm(&self, terminated: bool) -> bool {
        let mut st = self.lock();
        let was_active = st.active;
        st.active = false;
        st.deadline = None;
        st.terminated = terminated;
        self.changed.notify_all();
        was_active
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn is_armed(&self) -> bool {
        self.lock().deadline.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    pub(crate) fn shutdown(&self) {
        let mut st = self.lock();
        st.shutdown = true;
        st.deadline = None;
        self.changed.notify_all();
    }

    /// Block the timer thread until the deadline passes, then close the gate
    /// and disarm in one step.
    pub(crate) fn wait_fire(&self, gate: &ExecutionGate) -> Fire {
        let mut st = self.lock();
        loop {
            if st.shutdown {
                return Fire::Shutdown;
            }
            match st.deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline && gate.try_close() {
                        st.deadline = None;
                        return Fire::Elapsed;
                    }
                    let wait = deadline.saturating_duration_since(now).max(Duration::from_millis(1));
                    st = self
                        .changed
                        .wait_timeout(st, wait)
                        .unwrap_or_else(|e| e.into_inner())
                        .0;
                }
                None => {
                    st = self.changed.wait(st).unwrap_or_else(|e| e.into_inner());
                }
            }
        }
    }

    /// Close the gate for a run outside the schedule. Fails while the schedule
    /// is active; waits out a run that is still finishing.
    pub(crate) fn claim_direct(&self, gate: &ExecutionGate) -> Result<(), WorkerError> {
        loop {
            {
                let st = self.lock();
                if st.active {
                    return Err(WorkerError::invalid_operation(
                        "execute_task",
                        "cannot execute independently while the periodic schedule is active",
                    ));
                }
                if gate.try_close() {
                    return Ok(());
                }
            }
            gate.wait_open();
        }
    }

    /// End of a run: arm for the next period if the schedule is still active,
    /// then reopen the gate.
    pub(crate) fn rearm_and_open(&self, gate: &ExecutionGate) {
        let mut st = self.lock();
        if st.active && !st.shutdown {
            st.deadline = self.next_deadline();
            self.changed.notify_all();
        }
        gate.open();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arm_is_idempotent() {
        let timer = Timer::new(Duration::from_secs(10));
        let gate = ExecutionGate::new();
        timer.arm(&gate);
        let first = timer.lock().deadline;
        timer.arm(&gate);
        assert_eq!(timer.lock().deadline, first);
        assert!(timer.is_armed());
        assert!(timer.is_active());
    }

    #[test]
    fn test_arm_while_gate_closed_only_records_intent() {
        let timer = Timer::new(Duration::from_secs(10));
        let gate = ExecutionGate::new();
        assert!(gate.try_close());
        timer.arm(&gate);
        assert!(timer.is_active());
        assert!(!timer.is_armed());

        timer.rearm_and_open(&gate);
        assert!(timer.is_armed());
        assert!(gate.is_open());
    }

    #[test]
    fn test_rearm_skipped_after_disarm() {
        let timer = Timer::new(Duration::from_millis(5));
        let gate = ExecutionGate::new();
        timer.arm(&gate);
        assert_eq!(timer.wait_fire(&gate), Fire::Elapsed);
        assert!(gate.is_closed());
        assert!(!timer.is_armed());

        assert!(timer.disarm(true));
        timer.rearm_and_open(&gate);
        assert!(!timer.is_armed());
        assert!(gate.is_open());
        assert!(timer.is_terminated());
    }

    #[test]
    fn test_claim_direct_rejected_while_active() {
        let timer = Timer::new(Duration::from_secs(10));
        let gate = ExecutionGate::new();
        timer.arm(&gate);
        assert!(matches!(
            timer.claim_direct(&gate),
            Err(WorkerError::InvalidOperation { .. })
        ));
        assert!(gate.is_open());

        timer.disarm(false);
        timer.claim_direct(&gate).unwrap();
        assert!(gate.is_closed());
    }

    #[test]
    fn test_oversized_period_never_arms() {
        let timer = Timer::new(Duration::MAX);
        let gate = ExecutionGate::new();
        timer.arm(&gate);
        assert!(timer.is_active());
        assert!(!timer.is_armed());

        assert!(gate.try_close());
        timer.rearm_and_open(&gate);
        assert!(!timer.is_armed());
        assert!(gate.is_open());
    }

    #[test]
    fn test_arm_after_shutdown_is_ignored() {
        let timer = Timer::new(Duration::from_secs(10));
        let gate = ExecutionGate::new();
        timer.shutdown();
        timer.arm(&gate);
        assert!(!timer.is_armed());
    }

    #[test]
    fn test_shutdown_wakes_waiter() {
        let timer = std::sync::Arc::new(Timer::new(Duration::from_secs(60)));
        let gate = std::sync::Arc::new(ExecutionGate::new());
        let (t, g) = (timer.clone(), gate.clone());
        let waiter = std::thread::spawn(move || t.wait_fire(&g));
        std::thread::sleep(Duration::from_millis(20));
        timer.shutdown();
        assert_eq!(waiter.join().unwrap(), Fire::Shutdown);
    }
}
