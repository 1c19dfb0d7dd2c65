use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn test_config_path_command() {
    let dir = tempdir().unwrap();

    cargo_bin_cmd!("whalewatch")
        .env("WHALEWATCH_HOME", dir.path())
        .env_remove("WHALEWATCH_CONFIG")
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"))
        .stdout(predicate::str::contains(dir.path().to_string_lossy().as_ref()));
}

#[test]
fn test_config_path_honours_flag() {
    let dir = tempdir().unwrap();
    let custom = dir.path().join("custom.toml");

    cargo_bin_cmd!("whalewatch")
        .arg("--config")
        .arg(&custom)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("custom.toml"));
}

#[test]
fn test_config_init_creates_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");

    assert!(!config_path.exists());

    cargo_bin_cmd!("whalewatch")
        .env("WHALEWATCH_HOME", dir.path())
        .env_remove("WHALEWATCH_CONFIG")
        .args(["config", "init"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created config at"));

    assert!(config_path.exists());

    let contents = fs::read_to_string(&config_path).unwrap();
    assert!(contents.contains("endpoint ="));
    assert!(contents.contains("[display]"));
    assert!(contents.contains("# [[tiers]]"));
}

#[test]
fn test_config_init_fails_if_exists() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");

    fs::write(&config_path, "# existing config").unwrap();

    cargo_bin_cmd!("whalewatch")
        .env("WHALEWATCH_HOME", dir.path())
        .env_remove("WHALEWATCH_CONFIG")
        .args(["config", "init"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    fs::write(&config_path, "pairs = 42").unwrap();

    cargo_bin_cmd!("whalewatch")
        .env("WHALEWATCH_HOME", dir.path())
        .arg("--config")
        .arg(&config_path)
        .args(["trades", "--no-sound"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn test_config_help_shows_subcommands() {
    cargo_bin_cmd!("whalewatch")
        .args(["config", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("path"))
        .stdout(predicate::str::contains("init"));
}
