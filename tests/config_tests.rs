use std::time::Duration;

use tempfile::TempDir;

use lx200r::config::{default_config_path, load_config, save_config, ConnectionMode, TesterConfig};

#[test]
fn test_save_and_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("tester.json");

    let mut config = TesterConfig::new(path.to_string_lossy().to_string());
    config.set_property("connection.mode", "emulator");
    config.set_property("run.settleDelayMs", 250i64);
    save_config(&config).unwrap();
    assert!(path.exists());

    let loaded = load_config(&path);
    assert_eq!(loaded.connection_mode().unwrap(), ConnectionMode::Emulator);
    let runner = loaded.runner_config().unwrap();
    assert_eq!(runner.settle_delay, Duration::from_millis(250));
    assert_eq!(runner.response_timeout, Duration::from_secs(3));
}

#[test]
fn test_missing_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_config(&dir.path().join("absent.json"));
    assert_eq!(config.address(), "localhost:4030");
    assert_eq!(config.open_timeout().unwrap(), Duration::from_secs(5));
}

#[test]
fn test_malformed_file_gives_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tester.json");
    std::fs::write(&path, "{ not json").unwrap();

    let config = load_config(&path);
    assert_eq!(config.connection_mode().unwrap(), ConnectionMode::Tcp);
    assert_eq!(config.get_config_resource(), path.to_string_lossy());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tester.json");
    std::fs::write(&path, r#"{ "connection.address": { "String": "scope.local:23" } }"#).unwrap();

    let config = load_config(&path);
    assert_eq!(config.address(), "scope.local:23");
    assert_eq!(config.get_int_property_or("run.pollIntervalMs", 0), 100);
}

#[test]
fn test_env_var_overrides_default_path() {
    std::env::set_var("LX200R_CONFIG", "/tmp/lx200r-test/custom.json");
    assert_eq!(default_config_path(), std::path::PathBuf::from("/tmp/lx200r-test/custom.json"));
    std::env::remove_var("LX200R_CONFIG");
    assert!(default_config_path().ends_with("tester.json"));
}
