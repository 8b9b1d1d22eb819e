//! Core library for Cadence: run a unit of work at a fixed period on a background thread,
//! with start/stop/join/terminate and immediate execution that never overlap.
//! Used by the CLI binary; can be embedded in any service needing a health check, flush or poll loop.

pub mod config;
pub mod control;
pub mod error;
pub mod gate;
pub mod log;
pub mod task;
pub mod timer;
pub mod worker;


pub use config::{load_config, read_config_file, WorkerConfig};
pub use control::{WorkerControl, WorkerState};
pub use error::{TaskResult, WorkerError};
pub use gate::ExecutionGate;
pub use task::{FireContext, FireSource, FnTask, PeriodicTask};
pub use timer::Timer;
pub use worker::{PeriodicWorker, WorkerStats};
