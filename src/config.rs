//! Command line and environment resolution.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Arg, ArgMatches, Command};

use crate::error::ConfigError;
use crate::types::ApiKey;

pub const API_KEY_ENV: &str = "TRUENAS_API_KEY";
pub const DEFAULT_RETENTION: usize = 14;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

pub fn cli() -> Command {
    Command::new("truenas-config-backup")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Download a TrueNAS configuration backup and prune old copies")
        .arg(
            Arg::new("host")
                .long("host")
                .required(true)
                .value_name("ADDR")
                .help("TrueNAS host/IP or URL (e.g. 127.0.0.1 or https://truenas.local)"),
        )
        .arg(
            Arg::new("out-dir")
                .long("out-dir")
                .required(true)
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory to store backups"),
        )
        .arg(
            Arg::new("api-key")
                .long("api-key")
                .value_name("KEY")
                .help(format!("API key; falls back to --api-key-file, then {API_KEY_ENV}")),
        )
        .arg(
            Arg::new("api-key-file")
                .long("api-key-file")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Path to a file containing the API key"),
        )
        .arg(
            Arg::new("include-secrets")
                .long("include-secrets")
                .help("Include the secret seed in the backup")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-verify-tls")
                .long("no-verify-tls")
                .help("Disable TLS certificate verification")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("retention")
                .long("retention")
                .value_name("N")
                .value_parser(clap::value_parser!(usize))
                .default_value("14")
                .help("Keep the last N backups"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64))
                .default_value("300")
                .help("Request timeout in seconds"),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Check credentials and show what would be pruned, without writing anything")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue),
        )
}

/// Runtime parameters for one backup run.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub host: String,
    pub api_key: ApiKey,
    pub out_dir: PathBuf,
    pub include_secrets: bool,
    pub verify_tls: bool,
    pub retention: usize,
    pub timeout: Duration,
    pub dry_run: bool,
}

impl BackupConfig {
    /// Resolves parsed arguments plus the value of `TRUENAS_API_KEY`.
    ///
    /// Creates the output directory if it is missing and checks that it is
    /// writable.
    pub fn from_matches(matches: &ArgMatches, env_key: Option<String>) -> Result<Self, ConfigError> {
        let host = matches
            .get_one::<String>("host")
            .map(|h| h.trim().to_string())
            .unwrap_or_default();
        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let retention = matches
            .get_one::<usize>("retention")
            .copied()
            .unwrap_or(DEFAULT_RETENTION);
        if retention == 0 {
            return Err(ConfigError::InvalidRetention(retention));
        }

        let api_key = resolve_api_key(
            matches.get_one::<String>("api-key").map(String::as_str),
            matches.get_one::<PathBuf>("api-key-file").map(PathBuf::as_path),
            env_key.as_deref(),
        )?;

        let out_dir = matches
            .get_one::<PathBuf>("out-dir")
            .cloned()
            .unwrap_or_default();
        ensure_output_dir(&out_dir)?;

        let timeout = matches
            .get_one::<u64>("timeout")
            .copied()
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            host,
            api_key,
            out_dir,
            include_secrets: matches.get_flag("include-secrets"),
            verify_tls: !matches.get_flag("no-verify-tls"),
            retention,
            timeout: Duration::from_secs(timeout),
            dry_run: matches.get_flag("dry-run"),
        })
    }
}

/// First non-empty key from: explicit value, key file, environment.
pub fn resolve_api_key(
    explicit: Option<&str>,
    key_file: Option<&Path>,
    env_key: Option<&str>,
) -> Result<ApiKey, ConfigError> {
    if let Some(key) = explicit.and_then(ApiKey::new) {
        return Ok(key);
    }
    if let Some(path) = key_file {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::ApiKeyFile {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(key) = ApiKey::new(&contents) {
            return Ok(key);
        }
    }
    env_key.and_then(ApiKey::new).ok_or(ConfigError::MissingApiKey)
}

/// Creates `path` if needed and proves it is writable with an anonymous temp file.
pub fn ensure_output_dir(path: &Path) -> Result<(), ConfigError> {
    let err = |source| ConfigError::OutputDir {
        path: path.to_path_buf(),
        source,
    };
    if path.as_os_str().is_empty() {
        return Err(err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path is empty",
        )));
    }
    fs::create_dir_all(path).map_err(err)?;
    tempfile::tempfile_in(path).map_err(err)?;
    Ok(())
}
