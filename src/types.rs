use std::fmt;
use std::path::PathBuf;

/// Bearer credential for the appliance API. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Trims surrounding whitespace; an empty key is treated as absent.
    pub fn new(raw: &str) -> Option<Self> {
        let key = raw.trim();
        if key.is_empty() {
            None
        } else {
            Some(Self(key.to_string()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// The configuration document exactly as the appliance returned it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigExport(Vec<u8>);

impl ConfigExport {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    ConfigResolved,
    Connected,
    Exported,
    Written,
    Pruned,
    Success,
    Failed(String),
}

/// Outcome of a finished run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Backup written by this run; `None` for a dry run.
    pub backup: Option<PathBuf>,
    pub bytes: usize,
    /// Files deleted by pruning, or that would be deleted in a dry run.
    pub pruned: Vec<PathBuf>,
    /// Old files that could not be deleted.
    pub prune_failures: Vec<PathBuf>,
    pub dry_run: bool,
}
