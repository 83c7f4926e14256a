//! End-to-end tests for the `accelschedd` demo binary, driven through
//! `assert_cmd` the way `assert_cmd` is typically used against a crate's
//! own `[[bin]]` target.

use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn runs_a_small_workload_and_prints_a_summary() {
    Command::cargo_bin("accelschedd")
        .expect("locate accelschedd binary")
        .args(["--tasks", "8", "--holdoff-usec", "5"])
        .assert()
        .success()
        .stdout(contains("submitted 8 tasks"));
}

#[test]
fn emits_valid_json_with_the_json_flag() {
    let output = Command::cargo_bin("accelschedd")
        .expect("locate accelschedd binary")
        .args(["--tasks", "4", "--json"])
        .output()
        .expect("run accelschedd");
    assert!(output.status.success());
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout must be valid JSON");
    assert_eq!(parsed["tasks_submitted"], 4);
    assert!(parsed["jobs"].is_array());
}

#[test]
fn rejects_an_out_of_range_policy_index() {
    Command::cargo_bin("accelschedd")
        .expect("locate accelschedd binary")
        .args(["--tasks", "1", "--policy", "9"])
        .assert()
        .failure();
}
