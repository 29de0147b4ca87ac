mod common;

use std::fs;
use std::path::Path;
use std::time::Duration;

use clap::ArgMatches;
use common::MockConnector;
use truenas_config_backup::config::{cli, ensure_output_dir, resolve_api_key, BackupConfig};
use truenas_config_backup::error::{BackupError, ConfigError};
use truenas_config_backup::truenas::Connector;
use truenas_config_backup::types::ApiKey;

fn matches_for(out_dir: &Path, extra: &[&str]) -> ArgMatches {
    let mut args = vec![
        "truenas-config-backup".to_string(),
        "--host".to_string(),
        "nas.local".to_string(),
        "--out-dir".to_string(),
        out_dir.to_string_lossy().into_owned(),
    ];
    args.extend(extra.iter().map(|s| s.to_string()));
    cli().try_get_matches_from(args).unwrap()
}

#[test]
fn test_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config =
        BackupConfig::from_matches(&matches_for(dir.path(), &[]), Some("env-key".to_string()))
            .unwrap();

    assert_eq!(config.host, "nas.local");
    assert_eq!(config.api_key.expose(), "env-key");
    assert_eq!(config.out_dir, dir.path());
    assert_eq!(config.retention, 14);
    assert_eq!(config.timeout, Duration::from_secs(300));
    assert!(config.verify_tls);
    assert!(!config.include_secrets);
    assert!(!config.dry_run);
}

#[test]
fn test_flags() {
    let dir = tempfile::tempdir().unwrap();
    let matches = matches_for(
        dir.path(),
        &[
            "--include-secrets",
            "--no-verify-tls",
            "--retention",
            "3",
            "--timeout",
            "30",
            "--dry-run",
        ],
    );
    let config = BackupConfig::from_matches(&matches, Some("env-key".to_string())).unwrap();

    assert!(config.include_secrets);
    assert!(!config.verify_tls);
    assert_eq!(config.retention, 3);
    assert_eq!(config.timeout, Duration::from_secs(30));
    assert!(config.dry_run);
}

#[test]
fn test_missing_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let err = BackupConfig::from_matches(&matches_for(dir.path(), &[]), None).unwrap_err();
    assert!(matches!(err, ConfigError::MissingApiKey));

    let err = BackupConfig::from_matches(&matches_for(dir.path(), &[]), Some("  \n".to_string()))
        .unwrap_err();
    assert!(matches!(err, ConfigError::MissingApiKey));
}

#[tokio::test]
async fn test_missing_api_key_never_reaches_network() {
    let dir = tempfile::tempdir().unwrap();
    let matches = matches_for(dir.path(), &[]);
    let mut connector_built = false;

    let result = truenas_config_backup::run(&matches, None, |_| {
        connector_built = true;
        let mut connector = MockConnector::new();
        connector.expect_connect().never();
        Box::new(connector) as Box<dyn Connector>
    })
    .await;

    let err = result.unwrap_err();
    assert!(matches!(err, BackupError::Config(ConfigError::MissingApiKey)));
    assert_eq!(err.exit_code(), 2);
    assert!(!connector_built);
}

#[test]
fn test_api_key_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let key_file = dir.path().join("key");
    fs::write(&key_file, "  file-key\n").unwrap();

    let key = resolve_api_key(Some("explicit"), Some(&key_file), Some("env")).unwrap();
    assert_eq!(key.expose(), "explicit");

    let key = resolve_api_key(None, Some(&key_file), Some("env")).unwrap();
    assert_eq!(key.expose(), "file-key");

    let key = resolve_api_key(None, None, Some(" env ")).unwrap();
    assert_eq!(key.expose(), "env");
}

#[test]
fn test_empty_key_file_falls_back_to_env() {
    let dir = tempfile::tempdir().unwrap();
    let key_file = dir.path().join("key");
    fs::write(&key_file, "\n").unwrap();

    let key = resolve_api_key(Some(""), Some(&key_file), Some("env")).unwrap();
    assert_eq!(key.expose(), "env");
}

#[test]
fn test_unreadable_key_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");

    let err = resolve_api_key(None, Some(&missing), Some("env")).unwrap_err();
    assert!(matches!(err, ConfigError::ApiKeyFile { .. }));
}

#[test]
fn test_key_file_from_command_line() {
    let dir = tempfile::tempdir().unwrap();
    let key_file = dir.path().join("key");
    fs::write(&key_file, "file-key").unwrap();

    let matches = matches_for(dir.path(), &["--api-key-file", key_file.to_str().unwrap()]);
    let config = BackupConfig::from_matches(&matches, None).unwrap();
    assert_eq!(config.api_key.expose(), "file-key");
}

#[test]
fn test_zero_retention_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let matches = matches_for(dir.path(), &["--retention", "0"]);
    let err = BackupConfig::from_matches(&matches, Some("k".to_string())).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidRetention(0)));
}

#[test]
fn test_non_numeric_retention_rejected_by_parser() {
    let result = cli().try_get_matches_from([
        "truenas-config-backup",
        "--host",
        "nas.local",
        "--out-dir",
        "/tmp",
        "--retention",
        "-1",
    ]);
    assert!(result.is_err());
}

#[test]
fn test_host_and_out_dir_required() {
    assert!(cli()
        .try_get_matches_from(["truenas-config-backup", "--out-dir", "/tmp"])
        .is_err());
    assert!(cli()
        .try_get_matches_from(["truenas-config-backup", "--host", "nas.local"])
        .is_err());
}

#[test]
fn test_blank_host_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let matches = cli()
        .try_get_matches_from([
            "truenas-config-backup",
            "--host",
            "  ",
            "--out-dir",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();
    let err = BackupConfig::from_matches(&matches, Some("k".to_string())).unwrap_err();
    assert!(matches!(err, ConfigError::EmptyHost));
}

#[test]
fn test_output_dir_is_created() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");

    BackupConfig::from_matches(&matches_for(&nested, &[]), Some("k".to_string())).unwrap();

    assert!(nested.is_dir());
    assert_eq!(fs::read_dir(&nested).unwrap().count(), 0);
}

#[test]
fn test_output_dir_that_is_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain");
    fs::write(&file, b"x").unwrap();

    let err = BackupConfig::from_matches(&matches_for(&file, &[]), Some("k".to_string()))
        .unwrap_err();
    assert!(matches!(err, ConfigError::OutputDir { .. }));
}

#[test]
fn test_empty_out_dir_rejected() {
    let err = ensure_output_dir(Path::new("")).unwrap_err();
    match err {
        ConfigError::OutputDir { path, source } => {
            assert_eq!(path, Path::new(""));
            assert_eq!(source.kind(), std::io::ErrorKind::InvalidInput);
        }
        other => panic!("expected OutputDir, got {other:?}"),
    }
}

#[test]
fn test_api_key_is_redacted() {
    let key = ApiKey::new("super-secret").unwrap();
    assert_eq!(format!("{key:?}"), "ApiKey(***)");
}
