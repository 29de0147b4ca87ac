pub mod app;
pub mod config;
pub mod error;
pub mod store;
pub mod truenas;
pub mod types;

use clap::ArgMatches;

use app::BackupRunner;
use config::BackupConfig;
use error::Result;
use truenas::Connector;
use types::RunSummary;

/// Resolves configuration, then runs one backup.
///
/// `connector` is only invoked once configuration is valid, so a bad
/// invocation never reaches the network.
pub async fn run<F>(matches: &ArgMatches, env_key: Option<String>, connector: F) -> Result<RunSummary>
where
    F: FnOnce(&BackupConfig) -> Box<dyn Connector>,
{
    let config = BackupConfig::from_matches(matches, env_key)?;
    let mut runner = BackupRunner::new(connector(&config), config);
    runner.run().await
}
