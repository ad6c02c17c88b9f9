//! Tests for configuration loading and database path resolution
//!
//! Tests that manipulate WPA_DATABASE or WPA_CONFIG are marked #[serial]
//! so they do not race each other on the process environment.

use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use wpa_common::config::{
    default_database_path, load_config, resolve_database_path, TomlConfig, CONFIG_ENV_VAR,
    DATABASE_ENV_VAR,
};

#[test]
#[serial]
fn test_cli_argument_wins() {
    env::set_var(DATABASE_ENV_VAR, "/tmp/wpa-env.db");
    let mut config = TomlConfig::default();
    config.database.path = Some(PathBuf::from("/tmp/wpa-toml.db"));

    let path = resolve_database_path(Some(Path::new("/tmp/wpa-cli.db")), &config);
    assert_eq!(path, PathBuf::from("/tmp/wpa-cli.db"));

    env::remove_var(DATABASE_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(DATABASE_ENV_VAR, "/tmp/wpa-env.db");
    let mut config = TomlConfig::default();
    config.database.path = Some(PathBuf::from("/tmp/wpa-toml.db"));

    let path = resolve_database_path(None, &config);
    assert_eq!(path, PathBuf::from("/tmp/wpa-env.db"));

    env::remove_var(DATABASE_ENV_VAR);
}

#[test]
#[serial]
fn test_toml_beats_default() {
    env::remove_var(DATABASE_ENV_VAR);
    let mut config = TomlConfig::default();
    config.database.path = Some(PathBuf::from("/tmp/wpa-toml.db"));

    let path = resolve_database_path(None, &config);
    assert_eq!(path, PathBuf::from("/tmp/wpa-toml.db"));
}

#[test]
#[serial]
fn test_default_when_nothing_configured() {
    env::remove_var(DATABASE_ENV_VAR);
    let path = resolve_database_path(None, &TomlConfig::default());
    assert_eq!(path, default_database_path());
    assert!(path.ends_with("assessments.db"));
}

#[test]
#[serial]
fn test_missing_config_file_uses_defaults() {
    env::remove_var(CONFIG_ENV_VAR);
    let dir = tempfile::tempdir().unwrap();
    let config = load_config(Some(&dir.path().join("absent.toml"))).unwrap();
    assert_eq!(config, TomlConfig::default());
}

#[test]
#[serial]
fn test_config_file_from_env_var() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        concat!(
            "[database]\npath = \"/srv/wpa/assessments.db\"\n\n",
            "[sync]\nassess_on_talk_pages = false\nupdate_rows_per_query = 7\n",
        ),
    )
    .unwrap();

    env::set_var(CONFIG_ENV_VAR, &path);
    let config = load_config(None).unwrap();
    env::remove_var(CONFIG_ENV_VAR);

    assert_eq!(config.database.path, Some(PathBuf::from("/srv/wpa/assessments.db")));
    assert!(!config.sync.assess_on_talk_pages);
    assert_eq!(config.sync.update_rows_per_query, 7);
}

#[test]
#[serial]
fn test_malformed_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[sync\nsubprojects_enabled = yes").unwrap();

    assert!(load_config(Some(&path)).is_err());
}
