//! Integration tests: run the cadence binary and check exit codes and output.

use std::process::Command;

fn cadence() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_cadence"));
    cmd.env_remove("CADENCE_PERIOD_MS")
        .env_remove("CADENCE_TIMER_NAME")
        .env("CADENCE_LOG", "error");
    cmd
}

#[test]
fn test_help() {
    let out = cadence().arg("--help").output().unwrap();
    assert!(out.status.success(), "cadence --help should succeed");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("run"));
    assert!(stdout.contains("config"));
}

#[test]
fn test_version() {
    let out = cadence().arg("--version").output().unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_config_reads_local_rc() {
    let td = tempfile::tempdir().expect("tmp");
    std::fs::write(td.path().join(".cadencerc"), r#"{ "periodMs": 250, "name": "probe" }"#)
        .expect("write rc");

    let out = cadence().arg("config").current_dir(td.path()).output().unwrap();
    assert!(out.status.success(), "cadence config should succeed");
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(v["periodMs"], 250);
    assert_eq!(v["name"], "probe");
}

#[test]
fn test_run_without_command_fails() {
    let out = cadence().args(["run", "--every", "10"]).output().unwrap();
    assert!(!out.status.success(), "cadence run with no command should fail");
}

#[test]
fn test_run_zero_period_fails() {
    let out = cadence()
        .args(["run", "--every", "0", "--count", "1", "--", "echo", "hi"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("period"));
}

#[cfg(unix)]
#[test]
fn test_run_count_json_summary() {
    let td = tempfile::tempdir().expect("tmp");
    let out = cadence()
        .current_dir(td.path())
        .args(["run", "--every", "20", "--count", "3", "--json", "--", "echo", "tick"])
        .output()
        .unwrap();
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json summary");
    assert_eq!(v["command"], "run");
    assert_eq!(v["status"], "ok");
    assert_eq!(v["scheduledRuns"], 3);
    assert_eq!(v["faults"], 0);
}

#[cfg(unix)]
#[test]
fn test_run_failing_command_reports_faults() {
    let td = tempfile::tempdir().expect("tmp");
    let out = cadence()
        .current_dir(td.path())
        .args(["run", "--every", "20", "--count", "2", "--json", "--", "exit", "4"])
        .output()
        .unwrap();
    assert!(out.status.success(), "faults are reported, not fatal");
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json summary");
    assert_eq!(v["status"], "faults");
    assert_eq!(v["faults"], 2);
    assert!(v["lastFault"].as_str().unwrap_or("").contains("status 4"));
}

#[cfg(unix)]
#[test]
fn test_run_now_adds_direct_run() {
    let td = tempfile::tempdir().expect("tmp");
    let out = cadence()
        .current_dir(td.path())
        .args(["run", "--every", "20", "--count", "1", "--now", "--json", "--", "true"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json summary");
    assert_eq!(v["directRuns"], 1);
    assert_eq!(v["scheduledRuns"], 1);
}
