#![expect(clippy::expect_used)]

use std::io::Write;

use assert_cmd::Command;
use predicates::str::contains;

fn bin() -> Command {
    Command::cargo_bin("toolguard").expect("binary should build")
}

#[test]
fn check_allows_a_clean_exec_call() {
    bin()
        .args(["check", "--session", "s1", "--tool", "exec", "--params-json", r#"{"command":"echo hi"}"#])
        .assert()
        .success()
        .stdout(contains("\"decision\": \"allow\""));
}

#[test]
fn check_denies_a_shell_wrapped_exec_call() {
    bin()
        .args([
            "check",
            "--session",
            "s1",
            "--tool",
            "exec",
            "--params-json",
            r#"{"command":"bash -c 'rm -rf /'"}"#,
        ])
        .assert()
        .success()
        .stdout(contains("exec.shell_wrapped"));
}

#[test]
fn check_rejects_malformed_params_json() {
    bin()
        .args(["check", "--session", "s1", "--tool", "exec", "--params-json", "not json"])
        .assert()
        .failure();
}

#[test]
fn policy_validate_prints_normalized_document() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("policy.json");
    let mut file = std::fs::File::create(&path).expect("create policy file");
    file.write_all(br#"{"version":1,"allowedRoots":["/work"]}"#)
        .expect("write policy file");

    bin()
        .args(["policy", "validate", path.to_str().expect("utf8 path")])
        .assert()
        .success()
        .stdout(contains("/work"));
}
