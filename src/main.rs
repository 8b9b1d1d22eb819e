//! Thin CLI layer: parse args, styled output, and drive a cadence-core PeriodicWorker.
//! Crash-proof: panic caught and reported; all errors return Result.

mod shell;

use cadence_core::{load_config, PeriodicWorker, WorkerConfig, WorkerStats};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io::IsTerminal;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use shell::{RunReport, ShellTask};

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal()
        && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn warning(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.yellow());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

fn spinner(quiet: bool) -> Option<ProgressBar> {
    if !quiet || !std::io::stderr().is_terminal() {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⠈⠐⠠⠰⠸⠹")
            .template("{spinner:.dim} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message("waiting for first run…");
    Some(bar)
}

fn print_report(report: &RunReport, quiet: bool, bar: Option<&ProgressBar>) {
    let status = match report.exit_code {
        Some(c) => format!("exit {}", c),
        None => "killed".to_string(),
    };
    if let Some(bar) = bar {
        bar.set_message(format!("run #{} at {}: {}", report.fire, report.started_at, status));
        return;
    }
    let line = format!(
        "run #{} at {} ({} ms): {}",
        report.fire, report.started_at, report.took_ms, status
    );
    if report.success() {
        success(&line);
    } else {
        warning(&line);
    }
    if quiet {
        return;
    }
    if !report.stdout.is_empty() {
        println!("{}", report.stdout);
    }
    if !report.stderr.is_empty() {
        eprintln!("{}", report.stderr);
    }
}

fn summary_json(config: &WorkerConfig, stats: &WorkerStats, last_fault: Option<String>) -> String {
    serde_json::json!({
        "schemaVersion": "1",
        "command": "run",
        "status": if stats.faults == 0 { "ok" } else { "faults" },
        "name": config.name,
        "periodMs": config.period_ms,
        "scheduledRuns": stats.scheduled_runs,
        "directRuns": stats.direct_runs,
        "faults": stats.faults,
        "busyMs": stats.busy_ms,
        "lastRunMs": stats.last_run_ms,
        "lastFault": last_fault,
    })
    .to_string()
}

fn effective_config(sub_m: &ArgMatches) -> Result<WorkerConfig, String> {
    let cwd = env::current_dir().map_err(|e| e.to_string())?;
    let mut config = load_config(&cwd).map_err(|e| e.to_string())?;
    if let Some(ms) = sub_m.get_one::<u64>("every") {
        config.period_ms = *ms;
    }
    if let Some(name) = sub_m.get_one::<String>("name") {
        config.name = name.clone();
    }
    config.period().map_err(|e| e.to_string())?;
    Ok(config)
}

fn run_periodic(sub_m: &ArgMatches) -> Result<(), String> {
    let config = effective_config(sub_m)?;
    let command: Vec<String> = sub_m
        .get_many::<String>("command")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    if command.is_empty() {
        return Err("No command given. Usage: cadence run --every <MS> -- <command>".to_string());
    }
    let command = command.join(" ");
    let count = sub_m.get_one::<u64>("count").copied();
    let run_for = sub_m.get_one::<u64>("for").map(|ms| Duration::from_millis(*ms));
    let quiet = sub_m.get_flag("quiet");
    let json_out = sub_m.get_flag("json");
    let now = sub_m.get_flag("now");

    let (tx, rx) = mpsc::channel::<RunReport>();
    let control = Arc::new(OnceLock::new());
    let task = ShellTask::new(command.clone(), count, Arc::clone(&control), tx);
    let worker = PeriodicWorker::with_config(&config, task).map_err(|e| e.to_string())?;
    let _ = control.set(worker.control());

    if !json_out && !quiet {
        info(&format!("Running `{}` every {} ms", command, config.period_ms));
    }

    let bar = if json_out { None } else { spinner(quiet) };
    let mut seen: u64 = 0;

    if now {
        // Not yet started, so this cannot collide with a scheduled run.
        if let Err(e) = worker.execute_task() {
            if !json_out {
                warning(&e.to_string());
            }
        }
        while let Ok(report) = rx.try_recv() {
            if !json_out {
                print_report(&report, quiet, bar.as_ref());
            }
        }
    }

    worker.start();
    let deadline = run_for.map(|d| Instant::now() + d);
    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        if count.is_some_and(|n| seen >= n) {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(report) => {
                seen += 1;
                if !json_out {
                    print_report(&report, quiet, bar.as_ref());
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                // A run that failed to spawn sends no report; the schedule may still be over.
                if count.is_some() && !worker.control().is_active() && !worker.is_executing() {
                    break;
                }
                if let Some(bar) = &bar {
                    bar.tick();
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    worker.stop();
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    let stats = worker.stats();
    let last_fault = worker.last_fault().map(|f| f.to_string());
    if json_out {
        println!("{}", summary_json(&config, &stats, last_fault));
    } else {
        dim(&format!(
            "{} scheduled run(s), {} direct, {} fault(s), {} ms busy",
            stats.scheduled_runs, stats.direct_runs, stats.faults, stats.busy_ms
        ));
        if let Some(fault) = last_fault {
            dim(&format!("last fault: {}", fault));
        }
    }
    Ok(())
}

fn run() -> Result<(), String> {
    let matches = Command::new("cadence")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Bhuvan Prakash <bhuvanstark6@gmail.com>")
        .about("Run a command on a fixed period; runs never overlap and stop waits for the current one")
        .after_help(
            "Examples:\n  cadence run --every 1000 -- date\n  cadence run --every 500 --count 3 -- curl -fsS localhost:8080/health\n  cadence config",
        )
        .subcommand(
            Command::new("run")
                .about("Run a shell command every period until --count or --for is reached")
                .arg(
                    Arg::new("every")
                        .long("every")
                        .short('e')
                        .value_parser(value_parser!(u64))
                        .help("Period in milliseconds (default from .cadencerc / CADENCE_PERIOD_MS, else 1000)"),
                )
                .arg(
                    Arg::new("count")
                        .long("count")
                        .short('n')
                        .value_parser(value_parser!(u64).range(1..))
                        .help("Stop after this many scheduled runs"),
                )
                .arg(
                    Arg::new("for")
                        .long("for")
                        .value_parser(value_parser!(u64))
                        .help("Stop after this many milliseconds"),
                )
                .arg(
                    Arg::new("name")
                        .long("name")
                        .help("Name of the timer thread"),
                )
                .arg(
                    Arg::new("now")
                        .long("now")
                        .action(ArgAction::SetTrue)
                        .help("Run once immediately before the first period elapses"),
                )
                .arg(
                    Arg::new("quiet")
                        .short('q')
                        .long("quiet")
                        .action(ArgAction::SetTrue)
                        .help("Minimal output; show spinner when attached to a terminal"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output a machine-readable JSON summary"),
                )
                .arg(
                    Arg::new("command")
                        .num_args(1..)
                        .last(true)
                        .help("Command to run (after --)"),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective worker configuration as JSON"))
        .get_matches();

    match matches.subcommand() {
        Some(("run", sub_m)) => run_periodic(sub_m)?,
        Some(("config", _)) => {
            let cwd = env::current_dir().map_err(|e| e.to_string())?;
            let config = load_config(&cwd).map_err(|e| e.to_string())?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| e.to_string())?;
            println!("{}", json);
        }
        _ => {
            if use_color() {
                println!("{}", "cadence".bright_cyan().bold());
                dim("Run a command on a fixed period, one run at a time.");
            } else {
                println!("cadence: run a command on a fixed period, one run at a time");
            }
            dim("\nRun `cadence --help` for details.");
        }
    }

    Ok(())
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&e);
            1
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}
