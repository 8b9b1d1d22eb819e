//! The periodic payload and the context it is called with.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::error::{TaskResult, WorkerError};
use crate::log::log_error;

/// What triggered a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FireSource {
    /// The timer elapsed
    Timer,
    /// `execute_task` on the caller's thread
    Direct,
}

/// Arguments handed to every run.
#[derive(Debug, Clone, Serialize)]
pub struct FireContext {
    /// 1-based sequence number across scheduled and direct runs
    pub fire: u64,
    pub source: FireSource,
    /// Wall-clock time the run was triggered
    pub signal_time: DateTime<Local>,
}

impl FireContext {
    pub(crate) fn new(fire: u64, source: FireSource) -> Self {
        Self {
            fire,
            source,
            signal_time: Local::now(),
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.source == FireSource::Timer
    }
}

/// Work run by a `PeriodicWorker`.
///
/// `do_work` runs on the worker's timer thread for scheduled fires and on the
/// caller's thread for `execute_task`, never two at a time. An `Err` or a panic
/// is a fault: for scheduled fires it goes to `on_fault` and the schedule
/// carries on; for `execute_task` it is returned to the caller.
pub trait PeriodicTask: Send + 'static {
    fn do_work(&mut self, ctx: &FireContext) -> TaskResult;

    /// Called on the timer thread after a scheduled run fails.
    fn on_fault(&mut self, fault: &WorkerError) {
        log_error(&format!("ERROR: {}", fault));
    }
}

/// Closure adapter for `PeriodicTask`.
pub struct FnTask<F> {
    f: F,
}

impl<F> FnTask<F>
where
    F: FnMut(&FireContext) -> TaskResult + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> PeriodicTask for FnTask<F>
where
    F: FnMut(&FireContext) -> TaskResult + Send + 'static,
{
    fn do_work(&mut self, ctx: &FireContext) -> TaskResult {
        (self.f)(ctx)
    }
}

impl<F> fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnTask")
    }
}
