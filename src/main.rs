use std::process::ExitCode;

use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use truenas_config_backup::config::{cli, API_KEY_ENV};
use truenas_config_backup::truenas::TrueNasConnector;

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if matches.get_flag("verbose") { "debug" } else { "info" })
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    let env_key = std::env::var(API_KEY_ENV).ok();
    let result = truenas_config_backup::run(&matches, env_key, |config| {
        Box::new(TrueNasConnector::new(config.timeout))
    })
    .await;

    match result {
        Ok(summary) => {
            match &summary.backup {
                Some(path) => println!("Wrote {}", path.display()),
                None => info!(would_prune = summary.pruned.len(), "dry run complete"),
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
