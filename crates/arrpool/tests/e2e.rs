//! End-to-end CLI integration tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn arrpool() -> Command {
    let mut cmd = Command::cargo_bin("arrpool").expect("binary not found");
    for var in [
        "ARRPOOL_ENABLED",
        "ARRPOOL_DEBUG",
        "ARRPOOL_CACHE_WAYS",
        "ARRPOOL_GROWTH_WARN_SLOTS",
        "ARRPOOL_ITERATIONS",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn json_report(args: &[&str]) -> serde_json::Value {
    let output = arrpool().args(args).arg("--json").output().unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).expect("report is valid JSON")
}

#[test]
fn help_flag() {
    arrpool()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("workload"));
}

#[test]
fn version_flag() {
    arrpool()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("arrpool"));
}

#[test]
fn default_replay_is_allocation_free() {
    arrpool()
        .assert()
        .success()
        .stdout(predicate::str::contains("Replayed 10 iterations (pooled)"))
        .stdout(predicate::str::contains("steady-state allocations: 0"));
}

#[test]
fn json_report_fields() {
    let report = json_report(&["-n", "4", "-s", "8x8", "-a", "3", "--depth", "2"]);
    assert_eq!(report["iterations"], 4);
    assert_eq!(report["pooled"], true);
    assert_eq!(report["slots"], 8);
    assert_eq!(report["steady_allocations"], 0);
    assert_eq!(report["stats"]["wrapper_misses"], 6);
    assert_eq!(report["stats"]["wrapper_hits"], 18);
}

#[test]
fn iterations_from_env() {
    let output = arrpool()
        .env("ARRPOOL_ITERATIONS", "3")
        .arg("--json")
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["iterations"], 3);
}

#[test]
fn warm_avoids_buffer_growth() {
    let report = json_report(&["--warm"]);
    assert_eq!(report["stats"]["buffer_grows"], 0);
    assert_eq!(report["steady_allocations"], 0);
}

#[test]
fn disabled_pool() {
    arrpool()
        .arg("--disable")
        .assert()
        .success()
        .stdout(predicate::str::contains("(unpooled)"))
        .stdout(predicate::str::contains("slots:                    0"));
}

#[test]
fn debug_validation_passes_for_scalar_results() {
    arrpool().args(["--debug", "--depth", "3"]).assert().success();
}

#[test]
fn invalid_cache_width() {
    arrpool()
        .args(["--ways", "32"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("cache width 32"));
}

#[test]
fn invalid_shape() {
    arrpool()
        .args(["--shape", "64xq"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid extent"));
}

#[test]
fn overflowing_shape() {
    arrpool()
        .args(["--shape", "18446744073709551615x2"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("overflow"));
}
