//! Shape of the JSON log lines emitted with `--json`.

use assert_cmd::prelude::*;
use std::process::Command;

#[test]
fn json_log_lines_carry_the_expected_fields() {
    let out = Command::cargo_bin("soilmon")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("info")
        .arg("self-check")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8_lossy(&out);
    let mut seen = 0;
    for line in stdout.lines().filter(|l| l.starts_with('{')) {
        let v: serde_json::Value = serde_json::from_str(line).expect("valid JSON log line");
        assert!(v.get("timestamp").and_then(|x| x.as_str()).is_some());
        assert!(v.get("level").and_then(|x| x.as_str()).is_some());
        assert!(v.get("target").and_then(|x| x.as_str()).is_some());
        assert!(
            v.get("fields")
                .and_then(|f| f.get("message"))
                .and_then(|x| x.as_str())
                .is_some(),
            "log line without a message: {line}"
        );
        seen += 1;
    }
    assert!(seen > 0, "no JSON log lines found; stdout was: {stdout}");
}

#[test]
fn pretty_mode_does_not_emit_json() {
    let out = Command::cargo_bin("soilmon")
        .unwrap()
        .arg("--log-level")
        .arg("error")
        .arg("self-check")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let stdout = String::from_utf8_lossy(&out);
    assert!(stdout.lines().all(|l| !l.starts_with('{')));
    assert!(stdout.contains("self-check passed"));
}
