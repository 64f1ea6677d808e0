use std::path::PathBuf;
use std::time::Duration;
use telemd::core::config::Config;
use telemd::TelemdError;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("config.json");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_config_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(
        &temp_dir,
        r#"{
            "instruments": {
                "net": {"devices": ["eth0"]},
                "gpu": {"devices": ["0", "1"]},
                "disable": ["cgrp_net"],
                "periods": {"cpu": 500, "ram": 1000}
            },
            "cgroup_root": "/tmp/cgroup",
            "telemetry_buffer": 16
        }"#,
    );

    let config = Config::from_file(&path).unwrap();

    assert_eq!(config.instruments.net.devices, vec!["eth0"]);
    assert_eq!(config.instruments.gpu.devices, vec!["0", "1"]);
    assert!(config.instruments.disk.devices.is_empty());
    assert_eq!(config.instruments.disable, Some(vec!["cgrp_net".to_string()]));
    assert_eq!(
        config.instruments.period("cpu"),
        Some(Duration::from_millis(500))
    );
    assert_eq!(config.cgroup_root, PathBuf::from("/tmp/cgroup"));
    assert_eq!(config.telemetry_buffer, 16);
}

#[test]
fn test_config_empty_file_is_default() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, "  \n");

    let config = Config::from_file(&path).unwrap();
    assert!(config.instruments.periods.is_empty());
    assert_eq!(config.telemetry_buffer, 1024);
}

#[test]
fn test_config_missing_explicit_file() {
    let temp_dir = TempDir::new().unwrap();
    let result = Config::from_file(&temp_dir.path().join("missing.json"));

    assert!(matches!(result, Err(TelemdError::Config(_))));
}

#[test]
fn test_config_invalid_json() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, r#"{"instruments": {"enable": "cpu"}}"#);

    assert!(matches!(Config::from_file(&path), Err(TelemdError::Config(_))));
}

#[test]
fn test_config_rejects_zero_period() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, r#"{"instruments": {"periods": {"load": 0}}}"#);

    match Config::from_file(&path) {
        Err(TelemdError::Config(msg)) => assert!(msg.contains("load")),
        other => panic!("expected config error, got {:?}", other),
    }
}

#[test]
fn test_config_rejects_zero_buffer() {
    let temp_dir = TempDir::new().unwrap();
    let path = write_config(&temp_dir, r#"{"telemetry_buffer": 0}"#);

    assert!(Config::from_file(&path).is_err());
}
