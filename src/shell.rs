//! Shell command as a periodic task. Each run's outcome is sent back to the CLI thread.

use std::process::{Command, Output, Stdio};
use std::sync::mpsc::Sender;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use cadence_core::{FireContext, PeriodicTask, TaskResult, WorkerControl, WorkerError};

/// Outcome of one run, reported to the CLI thread.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub fire: u64,
    pub started_at: String,
    pub took_ms: u64,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RunReport {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub struct ShellTask {
    command: String,
    limit: Option<u64>,
    scheduled_runs: u64,
    control: Arc<OnceLock<WorkerControl>>,
    reports: Sender<RunReport>,
}

impl ShellTask {
    /// `control` is filled in once the worker exists; with a `limit` the task
    /// stops its own schedule after that many scheduled runs.
    pub fn new(
        command: String,
        limit: Option<u64>,
        control: Arc<OnceLock<WorkerControl>>,
        reports: Sender<RunReport>,
    ) -> Self {
        Self {
            command,
            limit,
            scheduled_runs: 0,
            control,
            reports,
        }
    }
}

/// Run a command line through the platform shell and capture its output.
pub fn run_shell(command: &str) -> std::io::Result<Output> {
    #[cfg(unix)]
    let mut cmd = {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };
    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    };
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
}

impl PeriodicTask for ShellTask {
    fn do_work(&mut self, ctx: &FireContext) -> TaskResult {
        if ctx.is_scheduled() {
            self.scheduled_runs += 1;
            if let (Some(limit), Some(control)) = (self.limit, self.control.get()) {
                if self.scheduled_runs >= limit {
                    control.stop();
                }
            }
        }

        let started = Instant::now();
        let output = run_shell(&self.command)?;
        let report = RunReport {
            fire: ctx.fire,
            started_at: ctx.signal_time.format("%H:%M:%S%.3f").to_string(),
            took_ms: started.elapsed().as_millis() as u64,
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim_end().to_string(),
        };
        let ok = report.success();
        let code = report.exit_code;
        // The CLI may already have stopped listening.
        let _ = self.reports.send(report);

        if !ok {
            return Err(match code {
                Some(c) => format!("`{}` exited with status {}", self.command, c),
                None => format!("`{}` was terminated by a signal", self.command),
            }
            .into());
        }
        Ok(())
    }

    fn on_fault(&mut self, _fault: &WorkerError) {
        // Reported through RunReport instead of the log.
    }
}
