//! Periodic background worker.
//!
//! One timer thread per worker. Each fire claims the gate, runs the task,
//! then rearms and reopens from a drop guard so a failing task can neither
//! strand `stop`/`join` callers nor kill the schedule.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::{validate_period, WorkerConfig};
use crate::control::{WorkerControl, WorkerState};
use crate::error::{panic_message, TaskResult, WorkerError};
use crate::log::log_debug;
use crate::task::{FireContext, FireSource, FnTask, PeriodicTask};
use crate::gate::ExecutionGate;
use crate::timer::{Fire, Timer};

/// Counters for a worker
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub scheduled_runs: u64,
    pub direct_runs: u64,
    pub faults: u64,
    pub busy_ms: u64,
    pub last_run_ms: Option<u64>,
}

struct Shared<T> {
    control: WorkerControl,
    task: Mutex<T>,
    sequence: AtomicU64,
    stats: Mutex<WorkerStats>,
    last_fault: Mutex<Option<WorkerError>>,
}

/// Rearms the timer (if the schedule is still wanted) and reopens the gate on drop.
struct FireGuard<'a> {
    timer: &'a Timer,
    gate: &'a ExecutionGate,
}

impl Drop for FireGuard<'_> {
    fn drop(&mut self) {
        self.timer.rearm_and_open(self.gate);
    }
}

fn lock<U>(m: &Mutex<U>) -> MutexGuard<'_, U> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl<T: PeriodicTask> Shared<T> {
    /// Run the task once. The caller has already closed the gate.
    fn run(&self, source: FireSource) -> Result<(), WorkerError> {
        let schedule = self.control.schedule();
        let _guard = FireGuard {
            timer: &schedule.timer,
            gate: &schedule.gate,
        };

        let fire = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let ctx = FireContext::new(fire, source);
        let started = Instant::now();

        let mut task = lock(&self.task);
        let result = match panic::catch_unwind(AssertUnwindSafe(|| task.do_work(&ctx))) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(WorkerError::fault(fire, e.to_string())),
            Err(payload) => Err(WorkerError::fault(fire, panic_message(payload.as_ref()))),
        };
        self.record(source, started.elapsed(), result.as_ref().err());

        if source == FireSource::Timer {
            if let Err(fault) = &result {
                if panic::catch_unwind(AssertUnwindSafe(|| task.on_fault(fault))).is_err() {
                    log_debug(&format!("{}: fault hook panicked", schedule.name));
                }
            }
        }
        result
    }

    fn record(&self, source: FireSource, took: Duration, fault: Option<&WorkerError>) {
        let ms = took.as_millis() as u64;
        {
            let mut stats = lock(&self.stats);
            match source {
                FireSource::Timer => stats.scheduled_runs += 1,
                FireSource::Direct => stats.direct_runs += 1,
            }
            stats.busy_ms += ms;
            stats.last_run_ms = Some(ms);
            if fault.is_some() {
                stats.faults += 1;
            }
        }
        if let Some(fault) = fault {
            *lock(&self.last_fault) = Some(fault.clone());
        }
    }
}

fn timer_loop<T: PeriodicTask>(shared: Arc<Shared<T>>) {
    let schedule = shared.control.schedule();
    while schedule.timer.wait_fire(&schedule.gate) == Fire::Elapsed {
        // Faults were already handed to on_fault.
        let _ = shared.run(FireSource::Timer);
    }
    log_debug(&format!("{}: timer thread exiting", schedule.name));
}

/// Runs a `PeriodicTask` every `period` on a background thread.
///
/// ```no_run
/// use std::time::Duration;
/// use cadence_core::PeriodicWorker;
///
/// let worker = PeriodicWorker::from_fn(Duration::from_secs(30), |_ctx| {
///     println!("heartbeat");
///     Ok(())
/// })
/// .unwrap();
/// worker.start();
/// // ...
/// worker.stop();
/// ```
pub struct PeriodicWorker<T: PeriodicTask> {
    shared: Arc<Shared<T>>,
    thread: Option<JoinHandle<()>>,
}

impl<T: PeriodicTask> PeriodicWorker<T> {
    /// Create a worker with the default thread settings. The timer is not started.
    pub fn new(period: Duration, task: T) -> Result<Self, WorkerError> {
        validate_period(period)?;
        Self::spawn(period, &WorkerConfig::with_period(period), task)
    }

    pub fn with_config(config: &WorkerConfig, task: T) -> Result<Self, WorkerError> {
        let period = config.period()?;
        Self::spawn(period, config, task)
    }

    fn spawn(period: Duration, config: &WorkerConfig, task: T) -> Result<Self, WorkerError> {
        let shared = Arc::new(Shared {
            control: WorkerControl::new(config.name.clone(), period),
            task: Mutex::new(task),
            sequence: AtomicU64::new(0),
            stats: Mutex::new(WorkerStats::default()),
            last_fault: Mutex::new(None),
        });

        let for_thread = Arc::clone(&shared);
        let thread = thread::Builder::new()
            .name(config.name.clone())
            .stack_size(config.stack_size)
            .spawn(move || timer_loop(for_thread))
            .map_err(|e| WorkerError::invalid_configuration("timer thread", e.to_string()))?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Handle for controlling the schedule from other threads or from inside the task.
    pub fn control(&self) -> WorkerControl {
        self.shared.control.clone()
    }

    pub fn start(&self) {
        self.shared.control.start();
    }

    pub fn stop(&self) {
        self.shared.control.stop();
    }

    pub fn join(&self) -> Result<(), WorkerError> {
        self.shared.control.join()
    }

    pub fn terminate(&self) {
        self.shared.control.terminate();
    }

    /// Run the task now on the calling thread, outside the schedule.
    ///
    /// Fails with `InvalidOperation` while the schedule is active. A fault
    /// from the task is returned rather than passed to `on_fault`.
    pub fn execute_task(&self) -> Result<(), WorkerError> {
        let schedule = self.shared.control.schedule();
        if schedule.gate.held_by_current() {
            return Err(WorkerError::invalid_operation(
                "execute_task",
                "called from inside the work callback",
            ));
        }
        schedule.timer.claim_direct(&schedule.gate)?;
        self.shared.run(FireSource::Direct)
    }

    pub fn name(&self) -> &str {
        self.shared.control.name()
    }

    pub fn period(&self) -> Duration {
        self.shared.control.period()
    }

    pub fn is_armed(&self) -> bool {
        self.shared.control.is_armed()
    }

    pub fn is_executing(&self) -> bool {
        self.shared.control.is_executing()
    }

    pub fn state(&self) -> WorkerState {
        self.shared.control.state()
    }

    pub fn stats(&self) -> WorkerStats {
        lock(&self.shared.stats).clone()
    }

    /// Most recent fault from any run.
    pub fn last_fault(&self) -> Option<WorkerError> {
        lock(&self.shared.last_fault).clone()
    }
}

impl<F> PeriodicWorker<FnTask<F>>
where
    F: FnMut(&FireContext) -> TaskResult + Send + 'static,
{
    pub fn from_fn(period: Duration, f: F) -> Result<Self, WorkerError> {
        Self::new(period, FnTask::new(f))
    }
}

impl<T: PeriodicTask> Drop for PeriodicWorker<T> {
    fn drop(&mut self) {
        self.shared.control.schedule().timer.shutdown();
        if let Some(handle) = self.thread.take() {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_period_rejected() {
        let result = PeriodicWorker::from_fn(Duration::ZERO, |_| Ok(()));
        assert!(matches!(
            result,
            Err(WorkerError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_unschedulable_period_rejected() {
        let result = PeriodicWorker::from_fn(Duration::MAX, |_| Ok(()));
        assert!(matches!(
            result,
            Err(WorkerError::InvalidConfiguration { .. })
        ));

        let worker = PeriodicWorker::from_fn(Duration::from_millis(u64::MAX), |_| Ok(())).unwrap();
        worker.start();
        assert_eq!(worker.state(), WorkerState::Armed);
        worker.stop();
        worker.execute_task().unwrap();
    }

    #[test]
    fn test_control_outliving_worker_cannot_arm() {
        let worker = PeriodicWorker::from_fn(Duration::from_millis(20), |_| Ok(())).unwrap();
        let control = worker.control();
        drop(worker);
        control.start();
        assert!(!control.is_armed());
        assert_ne!(control.state(), WorkerState::Armed);
    }

    #[test]
    fn test_new_worker_is_idle() {
        let worker = PeriodicWorker::from_fn(Duration::from_millis(20), |_| Ok(())).unwrap();
        assert_eq!(worker.state(), WorkerState::Idle);
        assert!(!worker.is_armed());
        assert_eq!(worker.period(), Duration::from_millis(20));
        assert_eq!(worker.name(), "cadence-timer");
        thread::sleep(Duration::from_millis(60));
        assert_eq!(worker.stats(), WorkerStats::default());
    }

    #[test]
    fn test_with_config_names_thread() {
        let config = WorkerConfig {
            period_ms: 10,
            name: "flush".to_string(),
            ..Default::default()
        };
        let (tx, rx) = std::sync::mpsc::channel();
        let worker = PeriodicWorker::with_config(
            &config,
            FnTask::new(move |_: &FireContext| {
                let _ = tx.send(thread::current().name().map(String::from));
                Ok(())
            }),
        )
        .unwrap();
        worker.start();
        let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        worker.stop();
        assert_eq!(name.as_deref(), Some("flush"));
    }

    #[test]
    fn test_drop_waits_for_timer_thread() {
        let worker = PeriodicWorker::from_fn(Duration::from_millis(5), |_| Ok(())).unwrap();
        worker.start();
        thread::sleep(Duration::from_millis(20));
        drop(worker);
    }
}
