//! Timestamped logging to stderr, optionally mirrored to a file.
//! Level comes from CADENCE_LOG (quiet, error, info, debug); CADENCE_QUIET=1 silences info.

use std::env;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;

use chrono::Local;

lazy_static::lazy_static! {
    static ref FILE_LOCK: Mutex<()> = Mutex::new(());
}

pub const LOG_ENV: &str = "CADENCE_LOG";
pub const QUIET_ENV: &str = "CADENCE_QUIET";
pub const LOG_FILE_ENV: &str = "CADENCE_LOG_FILE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Quiet,
    Error,
    Info,
    Debug,
}

impl Level {
    fn parse(s: &str) -> Option<Level> {
        match s.trim().to_lowercase().as_str() {
            "quiet" | "off" => Some(Level::Quiet),
            "error" => Some(Level::Error),
            "info" => Some(Level::Info),
            "debug" | "trace" => Some(Level::Debug),
            _ => None,
        }
    }
}

/// Effective level from the environment. Defaults to Info.
pub fn level() -> Level {
    if env::var(QUIET_ENV).map(|v| v == "1" || v == "true").unwrap_or(false) {
        return Level::Error;
    }
    env::var(LOG_ENV)
        .ok()
        .and_then(|v| Level::parse(&v))
        .unwrap_or(Level::Info)
}

fn format_line(message: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
    format!("[{}] {}", timestamp, message)
}

fn emit(at: Level, message: &str) {
    if level() < at {
        return;
    }
    let line = format_line(message);
    eprintln!("{}", line);

    if let Ok(path) = env::var(LOG_FILE_ENV) {
        // Appends from several timer threads must not interleave.
        let _guard = FILE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&path) {
            let _ = writeln!(file, "{}", line);
        }
    }
}

pub fn log(message: &str) {
    emit(Level::Info, message);
}

pub fn log_error(message: &str) {
    emit(Level::Error, message);
}

pub fn log_debug(message: &str) {
    emit(Level::Debug, message);
}
