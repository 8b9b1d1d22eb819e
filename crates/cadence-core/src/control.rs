//! Schedule controls shared by a worker and any number of handles.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::WorkerError;
use crate::gate::ExecutionGate;
use crate::log::log_debug;
use crate::timer::Timer;

/// Observable worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    /// Never started, or stopped
    Idle,
    /// Waiting for the period to elapse
    Armed,
    /// The work callback is running
    Executing,
    /// Disarmed by terminate; start() re-arms
    Terminated,
}

#[derive(Debug)]
pub(crate) struct Schedule {
    pub(crate) name: String,
    pub(crate) timer: Timer,
    pub(crate) gate: ExecutionGate,
}

/// Cloneable handle to start, stop, join or terminate a worker's schedule.
///
/// Handles may be moved into the work callback itself. `stop()` from inside the
/// callback deactivates the schedule without waiting; `join()` from inside the
/// callback is rejected since it would wait on itself.
#[derive(Debug, Clone)]
pub struct WorkerControl {
    schedule: Arc<Schedule>,
}

impl WorkerControl {
    pub(crate) fn new(name: String, period: Duration) -> Self {
        Self {
            schedule: Arc::new(Schedule {
                name,
                timer: Timer::new(period),
                gate: ExecutionGate::new(),
            }),
        }
    }

    pub(crate) fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn name(&self) -> &str {
        &self.schedule.name
    }

    pub fn period(&self) -> Duration {
        self.schedule.timer.period()
    }

    /// Arm the timer to fire once after the period. No effect beyond that if already armed.
    pub fn start(&self) {
        let s = &self.schedule;
        s.timer.arm(&s.gate);
        log_debug(&format!("{}: started (period {:?})", s.name, s.timer.period()));
    }

    /// Disarm the timer and wait for an in-flight run to finish.
    ///
    /// The schedule is deactivated first, under the same lock a fire uses to
    /// claim the gate, so once this returns no run is in progress and none
    /// will begin until `start()`.
    pub fn stop(&self) {
        let s = &self.schedule;
        s.timer.disarm(false);
        if s.gate.held_by_current() {
            log_debug(&format!("{}: stopped from inside the work callback", s.name));
            return;
        }
        s.gate.wait_open();
        log_debug(&format!("{}: stopped", s.name));
    }

    /// Wait for an in-flight run to finish. Leaves the timer alone.
    pub fn join(&self) -> Result<(), WorkerError> {
        let s = &self.schedule;
        if s.gate.held_by_current() {
            return Err(WorkerError::invalid_operation(
                "join",
                "called from inside the work callback it would wait for",
            ));
        }
        s.gate.wait_open();
        Ok(())
    }

    /// Like `join` with an upper bound. Returns whether no run is in progress.
    pub fn join_timeout(&self, timeout: Duration) -> Result<bool, WorkerError> {
        let s = &self.schedule;
        if s.gate.held_by_current() {
            return Err(WorkerError::invalid_operation(
                "join_timeout",
                "called from inside the work callback it would wait for",
            ));
        }
        Ok(s.gate.wait_open_timeout(timeout))
    }

    /// Disarm without waiting. A running callback finishes on its own and is not rescheduled.
    pub fn terminate(&self) {
        let s = &self.schedule;
        s.timer.disarm(true);
        log_debug(&format!("{}: terminated", s.name));
    }

    pub fn is_armed(&self) -> bool {
        self.schedule.timer.is_armed()
    }

    /// Armed, or running with a rearm pending.
    pub fn is_active(&self) -> bool {
        self.schedule.timer.is_active()
    }

    pub fn is_executing(&self) -> bool {
        self.schedule.gate.is_closed()
    }

    pub fn state(&self) -> WorkerState {
        let s = &self.schedule;
        if s.gate.is_closed() {
            WorkerState::Executing
        } else if s.timer.is_armed() {
            WorkerState::Armed
        } else if s.timer.is_terminated() {
            WorkerState::Terminated
        } else {
            WorkerState::Idle
        }
    }
}
