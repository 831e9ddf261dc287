#![cfg(all(unix, feature = "cli"))]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "fifolog-cli-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn fifolog() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_fifolog"));
    command.arg("--log-level").arg("error");
    command
}

fn wait_for_path(path: &Path, timeout: Duration) {
    let start = Instant::now();
    while !path.exists() {
        if start.elapsed() >= timeout {
            panic!("channel was not created at {}", path.display());
        }
        thread::sleep(Duration::from_millis(25));
    }
}

#[test]
fn limits_json_reports_budget() {
    let output = fifolog()
        .args(["--format", "json", "limits"])
        .output()
        .expect("limits should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("limits output should be JSON");
    assert!(report["schema_id"]
        .as_str()
        .unwrap_or_default()
        .ends_with("limits.schema.json"));

    let limit = report["atomic_write_limit"].as_u64().expect("limit");
    let budget = report["atomic_budget"].as_u64().expect("budget");
    assert_eq!(budget, limit - 5 - 1);
}

#[test]
fn limits_rejects_invalid_terminator() {
    let output = fifolog()
        .args(["limits", "--terminator", "xyz"])
        .output()
        .expect("limits should run");

    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn send_to_missing_channel_returns_transport_code() {
    let dir = unique_temp_dir("missing");
    let path = dir.join("absent.fifo");

    let output = fifolog()
        .arg("send")
        .arg(&path)
        .args(["--data", "hello"])
        .output()
        .expect("send should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("open failed"), "stderr: {stderr}");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_without_reader_reports_cached_lines() {
    let dir = unique_temp_dir("cached");
    let path = dir.join("chan.fifo");
    let channel = fifolog::Channel::ensure(&path).expect("channel should be created");

    let output = fifolog()
        .args(["--format", "json", "send"])
        .arg(&path)
        .args(["--data", "nobody listening"])
        .output()
        .expect("send should run");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("send output should be JSON");
    assert_eq!(report["lines"], 1);
    assert_eq!(report["pending"], 1);

    channel.remove();
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn serve_prints_lines_from_stdin() {
    let dir = unique_temp_dir("serve-stdin");
    let path = dir.join("chan.fifo");

    let mut child = fifolog()
        .args(["--format", "raw", "serve"])
        .arg(&path)
        .arg("--stdin")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");

    {
        let mut stdin = child.stdin.take().expect("stdin should be piped");
        writeln!(stdin, "alpha").unwrap();
        writeln!(stdin, "beta").unwrap();
    }

    let output = child.wait_with_output().expect("serve should exit");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["alpha", "beta"]);
    assert!(!path.exists(), "serve must remove its channel");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn send_delivers_to_running_serve() {
    let dir = unique_temp_dir("serve-send");
    let path = dir.join("chan.fifo");

    let mut child = fifolog()
        .args(["--format", "json", "serve"])
        .arg(&path)
        .arg("--stdin")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("serve should start");
    let stdin = child.stdin.take().expect("stdin should be piped");

    wait_for_path(&path, Duration::from_secs(5));
    let send = fifolog()
        .arg("send")
        .arg(&path)
        .args(["--data", "from another process", "--blocking"])
        .output()
        .expect("send should run");
    assert!(send.status.success());

    drop(stdin);
    let output = child.wait_with_output().expect("serve should exit");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let received: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["line"], "from another process");
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_prints_crate_version() {
    let output = fifolog().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("fifolog {}", env!("CARGO_PKG_VERSION")));
}
