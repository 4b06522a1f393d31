//! Integration tests for the run command's stdin transport.

use std::io::Write;
use std::process::{Command, Stdio};

use tempfile::TempDir;

/// Drives `gt run` end to end with JSONL messages on stdin and no collector
/// configured: every event must land in the queue backup file at shutdown.
#[test]
fn test_run_queues_events_to_backup_without_backend() {
    let temp = TempDir::new().unwrap();
    let backup_path = temp.path().join("queue.json");

    let config_path = temp.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "user_id = \"test-user\"\nqueue_backup_path = \"{}\"\n",
            backup_path.display()
        ),
    )
    .unwrap();

    let messages = r#"{"tabId": "41", "message": {"type": "SESSION_START", "data": {"problemUrl": "https://leetcode.com/problems/two-sum/", "problemTitle": "Two Sum"}}}
{"tabId": "41", "message": {"type": "ACTIVITY_PING", "data": {"code": "x = 1", "language": "python3", "significantChange": true}}}
not even json
{"tabId": "41", "message": {"type": "RUN_CLICKED", "data": {"code": "x = 1", "language": "python3"}}}
{"tabId": "41", "message": {"type": "TAB_REMOVED"}}
"#;

    let gt_binary = env!("CARGO_BIN_EXE_gt");
    let mut child = Command::new(gt_binary)
        .arg("--config")
        .arg(&config_path)
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn gt run");

    {
        let stdin = child.stdin.as_mut().unwrap();
        stdin.write_all(messages.as_bytes()).unwrap();
    }

    let output = child.wait_with_output().expect("Failed to wait for gt run");
    assert!(
        output.status.success(),
        "run failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let backup = std::fs::read_to_string(&backup_path).expect("backup file should exist");
    let parsed: serde_json::Value = serde_json::from_str(&backup).unwrap();
    let pending = parsed["pending"].as_array().unwrap();

    // Started, run-clicked progress, and tab-closed terminal event, in
    // order. The malformed line and the ping (which emits nothing) are
    // absent.
    let types: Vec<&str> = pending
        .iter()
        .map(|p| p["eventType"].as_str().unwrap())
        .collect();
    assert_eq!(
        types,
        vec!["ProblemSessionStarted", "ProblemProgress", "ProblemSessionEnded"]
    );

    assert_eq!(pending[0]["data"]["userId"], "test-user");
    assert_eq!(pending[0]["data"]["problemTitle"], "Two Sum");
    assert_eq!(pending[1]["data"]["event"], "run_clicked");
    assert_eq!(pending[2]["data"]["reason"], "tab_closed");
    assert_eq!(pending[2]["data"]["counters"]["keystrokes"], 1);
}

/// A second run must restore the previous run's backup and keep queue order.
#[test]
fn test_run_restores_backup_from_previous_run() {
    let temp = TempDir::new().unwrap();
    let backup_path = temp.path().join("queue.json");
    let config_path = temp.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!("queue_backup_path = \"{}\"\n", backup_path.display()),
    )
    .unwrap();

    let gt_binary = env!("CARGO_BIN_EXE_gt");
    let first = r#"{"tabId": "1", "message": {"type": "SESSION_START", "data": {"problemUrl": "https://leetcode.com/problems/two-sum/", "problemTitle": "Two Sum"}}}
"#;
    let second = r#"{"tabId": "2", "message": {"type": "SESSION_START", "data": {"problemUrl": "https://leetcode.com/problems/3sum/", "problemTitle": "3Sum"}}}
"#;

    for input in [first, second] {
        let mut child = Command::new(gt_binary)
            .arg("--config")
            .arg(&config_path)
            .arg("run")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        child.stdin.as_mut().unwrap().write_all(input.as_bytes()).unwrap();
        assert!(child.wait().unwrap().success());
    }

    let backup = std::fs::read_to_string(&backup_path).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&backup).unwrap();
    let problems: Vec<&str> = parsed["pending"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["data"]["problemId"].as_str().unwrap())
        .collect();

    // First run's events (started + ended at EOF) precede the second run's.
    assert_eq!(problems, vec!["two-sum", "two-sum", "3sum", "3sum"]);
}

/// Empty stdin: the engine starts and stops cleanly with nothing to do.
#[test]
fn test_run_with_empty_stdin_exits_cleanly() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("config.toml");
    std::fs::write(
        &config_path,
        format!(
            "queue_backup_path = \"{}\"\n",
            temp.path().join("queue.json").display()
        ),
    )
    .unwrap();

    let gt_binary = env!("CARGO_BIN_EXE_gt");
    let output = Command::new(gt_binary)
        .arg("--config")
        .arg(&config_path)
        .arg("run")
        .stdin(Stdio::null())
        .output()
        .expect("Failed to run gt");
    assert!(output.status.success());
}
