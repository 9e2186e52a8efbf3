use std::process::Command;

use arena_core::NetConfig;
use arena_testkit::{LinkConfig, ScenarioConfig};

#[test]
fn shipped_config_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/arena.toml");
    let contents = std::fs::read_to_string(path).expect("config/arena.toml present");
    let table: toml::Table = contents.parse().expect("valid toml");
    let net: NetConfig = table["net"].clone().try_into().expect("[net] section");
    let link: LinkConfig = table["link"].clone().try_into().expect("[link] section");
    let scenario: ScenarioConfig = table["scenario"]
        .clone()
        .try_into()
        .expect("[scenario] section");
    assert!(net.verify().is_ok());
    assert!(link.verify().is_ok());
    assert!(scenario.verify().is_ok());
    assert_eq!(net.snap_distance_sq, 8.0);
}

#[test]
fn headless_run_writes_report_and_trace() {
    let dir = tempfile::tempdir().unwrap();
    let metrics = dir.path().join("metrics.json");
    let trace = dir.path().join("trace.jsonl");

    let output = Command::new(env!("CARGO_BIN_EXE_arena-netcode"))
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .args(["--ticks", "240", "--clients", "1", "--host", "--check"])
        .arg("--metrics")
        .arg(&metrics)
        .arg("--trace")
        .arg(&trace)
        .env("RUST_LOG", "error")
        .output()
        .expect("binary runs");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&metrics).unwrap()).unwrap();
    assert_eq!(report["result"], "pass");
    assert_eq!(report["test_execution"]["ticks"], 240);
    assert_eq!(report["prediction"]["clients"], 1);
    let lines = std::fs::read_to_string(&trace).unwrap().lines().count() as u64;
    assert_eq!(
        report["test_execution"]["trace_records"].as_u64(),
        Some(lines)
    );
}

#[test]
fn bad_override_is_rejected() {
    let output = Command::new(env!("CARGO_BIN_EXE_arena-netcode"))
        .current_dir(env!("CARGO_MANIFEST_DIR"))
        .args(["--loss", "3.0", "--ticks", "10"])
        .env("RUST_LOG", "error")
        .output()
        .expect("binary runs");
    assert!(!output.status.success());
}
