use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use crate::config::BackupConfig;
use crate::error::{BackupError, RemoteError, Result};
use crate::store;
use crate::truenas::{Connector, Session, EXPORT_METHOD};
use crate::types::{ConfigExport, RunState, RunSummary};

pub struct BackupRunner {
    pub state: RunState,
    pub config: BackupConfig,
    connector: Box<dyn Connector>,
}

impl BackupRunner {
    pub fn new(connector: Box<dyn Connector>, config: BackupConfig) -> Self {
        Self {
            state: RunState::ConfigResolved,
            config,
            connector,
        }
    }

    /// Export, write, prune. Only pruning problems are tolerated.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let result = if self.config.dry_run {
            self.rehearse().await
        } else {
            self.backup().await
        };

        match &result {
            Ok(_) => self.state = RunState::Success,
            Err(e) => self.state = RunState::Failed(e.to_string()),
        }
        result
    }

    async fn backup(&mut self) -> Result<RunSummary> {
        let export = self.fetch_export().await?;

        let path = store::write_backup(&self.config.out_dir, Utc::now(), export.as_bytes())?;
        self.state = RunState::Written;
        info!(path = %path.display(), bytes = export.len(), "wrote backup");

        let report = store::prune(&self.config.out_dir, self.config.retention, &path);
        self.state = RunState::Pruned;
        if !report.failed.is_empty() {
            warn!(
                failed = report.failed.len(),
                "some old backups could not be pruned"
            );
        }

        Ok(RunSummary {
            backup: Some(path),
            bytes: export.len(),
            pruned: report.removed,
            prune_failures: report.failed,
            dry_run: false,
        })
    }

    /// Checks connectivity and credentials, then reports what pruning would do.
    async fn rehearse(&mut self) -> Result<RunSummary> {
        let mut session = self.open_session().await?;
        let result = session.authenticate(self.config.api_key.expose()).await;
        close_session(session.as_mut()).await;
        result?;

        let existing = store::list_backups(&self.config.out_dir)
            .map_err(|e| BackupError::io(&self.config.out_dir, e))?;
        // The backup a real run writes takes one of the retained slots.
        let expired = store::select_expired(existing, self.config.retention.saturating_sub(1));
        for file in &expired {
            info!(path = %file.path.display(), "dry run: would prune");
        }

        Ok(RunSummary {
            pruned: expired.into_iter().map(|f| f.path).collect(),
            dry_run: true,
            ..Default::default()
        })
    }

    async fn open_session(&mut self) -> std::result::Result<Box<dyn Session>, RemoteError> {
        info!(host = %self.config.host, "connecting");
        let session = self
            .connector
            .connect(&self.config.host, self.config.verify_tls)
            .await?;
        self.state = RunState::Connected;
        Ok(session)
    }

    async fn fetch_export(&mut self) -> std::result::Result<ConfigExport, RemoteError> {
        let mut session = self.open_session().await?;
        let result = self.export(session.as_mut()).await;
        close_session(session.as_mut()).await;
        let export = result?;
        self.state = RunState::Exported;
        Ok(export)
    }

    async fn export(
        &self,
        session: &mut dyn Session,
    ) -> std::result::Result<ConfigExport, RemoteError> {
        session.authenticate(self.config.api_key.expose()).await?;

        let params = json!({ "secretseed": self.config.include_secrets });
        let export = ConfigExport::new(session.call(EXPORT_METHOD, params).await?);
        if export.is_empty() {
            return Err(RemoteError::Protocol(format!(
                "{EXPORT_METHOD} returned an empty document"
            )));
        }
        info!(
            bytes = export.len(),
            include_secrets = self.config.include_secrets,
            "received configuration export"
        );
        Ok(export)
    }
}

async fn close_session(session: &mut dyn Session) {
    if let Err(e) = session.close().await {
        warn!(error = %e, "failed to close session");
    }
}
