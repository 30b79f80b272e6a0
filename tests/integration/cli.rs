//! CLI smoke tests

use assert_cmd::Command;
use serde_json::{json, Value};
use tempfile::TempDir;

fn harvester(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("aemet-harvester").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("AEMET_API_KEY")
        .env("RUST_LOG", "off");
    cmd
}

fn write(dir: &TempDir, name: &str, value: &Value) {
    let json_dir = dir.path().join("json");
    std::fs::create_dir_all(&json_dir).unwrap();
    std::fs::write(json_dir.join(name), serde_json::to_string(value).unwrap()).unwrap();
}

fn read(dir: &TempDir, name: &str) -> Value {
    let content = std::fs::read_to_string(dir.path().join("json").join(name)).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    let output = harvester(&dir).arg("--help").output().unwrap();
    assert!(output.status.success());

    let text = String::from_utf8_lossy(&output.stdout);
    for command in ["historical", "forecast", "replay", "group-codes", "pending"] {
        assert!(text.contains(command), "missing {command} in help");
    }
}

#[test]
fn test_invalid_end_date_is_rejected() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args(["--api-key", "k", "historical", "--end-date", "2025-13-01"])
        .assert()
        .failure();
    assert!(!dir.path().join("json").exists(), "rejected before any I/O");
}

#[test]
fn test_missing_api_key_fails() {
    let dir = TempDir::new().unwrap();
    harvester(&dir)
        .args(["forecast"])
        .assert()
        .failure();
}

#[test]
fn test_group_codes_writes_groups() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "ema_codes.json",
        &json!({"MADRID, RETIRO": "3195", "MADRID, CIUDAD UNIVERSITARIA": "3194U", "BARCELONA": "0076"}),
    );

    harvester(&dir)
        .args(["group-codes", "--group-size", "2"])
        .assert()
        .success();

    let groups = read(&dir, "codes_group.json");
    assert_eq!(groups["grupo_1"], "3195,3194U");
    assert_eq!(groups["grupo_2"], "0076");
}

#[test]
fn test_pending_writes_code_files() {
    let dir = TempDir::new().unwrap();
    write(&dir, "codes_group.json", &json!({"grupo_1": "3195,3196"}));
    write(&dir, "towns_codes.json", &json!({"01001": "Alegría-Dulantzi"}));

    harvester(&dir)
        .args(["--output-format", "json", "pending"])
        .assert()
        .success();

    assert_eq!(read(&dir, "pending_group_codes.json"), json!({"grupo_1": "3195,3196"}));
    assert_eq!(read(&dir, "pending_towns_codes.json"), json!({"01001": "Alegría-Dulantzi"}));
}
