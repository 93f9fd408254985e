use serde_json::Value;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn run_cli(args: &[&str], cwd: &Path) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_flock-cli"))
        .args(args)
        .current_dir(cwd)
        .env_remove("FLOCK_PUBLIC_ACCESS_KEY")
        .env("RUST_LOG", "off")
        .output()
        .expect("cli process should start")
}

fn surface_lines(stdout: &str) -> Vec<Value> {
    stdout
        .lines()
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter(|value| value.get("surface").is_some())
        .collect()
}

#[test]
fn placement_url_prints_encoded_url() {
    let temp = TempDir::new().expect("tempdir should create");
    let output = run_cli(
        &[
            "placement-url",
            "--placement-id",
            "referrer-home",
            "--key",
            "pk_1",
            "--campaign-id",
            "camp-1",
            "--bg",
            "#FFAA00",
            "--query",
            "ref code=a&b",
        ],
        temp.path(),
    );

    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf8");
    assert_eq!(
        stdout.trim(),
        "https://app.withflock.com/placements/referrer-home?key=pk_1&campaign_id=camp-1&bg=%23FFAA00&ref%20code=a%26b"
    );
}

#[test]
fn run_with_mock_backend_presents_and_closes_checkpoint() {
    let temp = TempDir::new().expect("tempdir should create");
    let output = run_cli(
        &[
            "run",
            "--backend",
            "mock",
            "--key",
            "pk_test",
            "--ui-url",
            "https://ui.test",
            "--user-id",
            "u1",
            "--email",
            "u1@example.com",
            "--checkpoint",
            "refer_button",
            "--message",
            r#"{"event":"success"}"#,
            "--message",
            r#"{"event":"close"}"#,
        ],
        temp.path(),
    );

    assert!(
        output.status.success(),
        "stdout:\n{}\nstderr:\n{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf8");
    assert!(stdout.contains("campaign_id: camp-1"));
    assert!(stdout.contains("customer_id: cust-u1"));
    assert!(stdout.contains("bridge: success id=1"));
    assert!(stdout.contains("bridge: close"));
    assert!(stdout.contains("message: close"));

    let calls = surface_lines(&stdout);
    let names: Vec<&str> = calls
        .iter()
        .filter_map(|call| call.get("call").and_then(Value::as_str))
        .collect();
    assert_eq!(
        names,
        vec![
            "register_message_handler",
            "add_user_script",
            "set_background_color",
            "load_url",
            "unregister_message_handler",
            "teardown",
        ]
    );
    assert_eq!(
        calls[3].get("detail").and_then(Value::as_str),
        Some(
            "https://ui.test/placements/referrer-home?key=pk_test&campaign_id=camp-1&customer_id=cust-u1&bg=%23FFAA00"
        )
    );
}

#[test]
fn run_with_unknown_checkpoint_exits_with_skip_code() {
    let temp = TempDir::new().expect("tempdir should create");
    let output = run_cli(
        &[
            "run",
            "--backend",
            "mock",
            "--key",
            "pk_test",
            "--user-id",
            "u1",
            "--email",
            "u1@example.com",
            "--checkpoint",
            "no_such_checkpoint",
        ],
        temp.path(),
    );

    assert_eq!(output.status.code(), Some(2));
    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf8");
    assert!(stdout.contains("outcome: skipped"));
    assert!(surface_lines(&stdout).is_empty());
}

#[test]
fn run_without_access_key_fails() {
    let temp = TempDir::new().expect("tempdir should create");
    let output = run_cli(&["run", "--backend", "mock"], temp.path());
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("stderr should be utf8");
    assert!(stderr.contains("FLOCK_PUBLIC_ACCESS_KEY"));
}

#[test]
fn run_with_event_json_prints_session_events() {
    let temp = TempDir::new().expect("tempdir should create");
    let output = run_cli(
        &["run", "--backend", "mock", "--key", "pk_test", "--event-json"],
        temp.path(),
    );

    assert!(
        output.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("stdout should be utf8");
    let kinds: Vec<String> = stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .filter_map(|value| value.get("kind").and_then(Value::as_str).map(str::to_string))
        .collect();
    assert_eq!(kinds.first().map(String::as_str), Some("campaign_loaded"));
    assert!(kinds.iter().any(|kind| kind == "initialized"));
    assert!(stdout.contains("state: Ready"));
}
