//! Backup files on disk: naming, atomic writes and retention.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use tracing::{debug, info, warn};

use crate::error::{BackupError, Result};

pub const FILE_PREFIX: &str = "truenas_config_";
pub const FILE_EXTENSION: &str = "tar";

const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const STAMP_LEN: usize = 15;
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Name for a backup captured at `at`. `seq` disambiguates captures that land
/// in the same millisecond; zero means no suffix.
pub fn backup_file_name(at: DateTime<Utc>, seq: u32) -> String {
    let stamp = at.format("%Y%m%d_%H%M%S_%3f");
    if seq == 0 {
        format!("{FILE_PREFIX}{stamp}.{FILE_EXTENSION}")
    } else {
        format!("{FILE_PREFIX}{stamp}-{seq}.{FILE_EXTENSION}")
    }
}

/// A backup file found in the output directory.
///
/// Ordering is chronological: capture time, then sequence suffix, then path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BackupFile {
    pub captured_at: NaiveDateTime,
    pub seq: u32,
    pub path: PathBuf,
}

impl BackupFile {
    /// Recognizes `truenas_config_<stamp>[_<millis>][-<seq>].tar`. Anything
    /// else in the directory is not ours.
    pub fn from_path(path: PathBuf) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        let body = name
            .strip_prefix(FILE_PREFIX)?
            .strip_suffix(FILE_EXTENSION)?
            .strip_suffix('.')?;
        let (captured_at, seq) = parse_stamp(body)?;
        Some(Self {
            captured_at,
            seq,
            path,
        })
    }
}

fn parse_stamp(body: &str) -> Option<(NaiveDateTime, u32)> {
    let (stamp, seq) = match body.split_once('-') {
        Some((stamp, seq)) => (stamp, parse_digits(seq)?),
        None => (body, 0),
    };
    if stamp.len() < STAMP_LEN || !stamp.is_char_boundary(STAMP_LEN) {
        return None;
    }
    let (seconds, rest) = stamp.split_at(STAMP_LEN);
    let millis = match rest {
        "" => 0,
        _ => {
            let millis = rest.strip_prefix('_')?;
            if millis.len() != 3 {
                return None;
            }
            parse_digits(millis)?
        }
    };
    let captured_at = NaiveDateTime::parse_from_str(seconds, STAMP_FORMAT)
        .ok()?
        .with_nanosecond(millis * 1_000_000)?;
    Some((captured_at, seq))
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Writes `content` to a new backup file in `dir` and returns its path.
///
/// The content is staged in a hidden temp file and renamed into place without
/// replacing an existing file, so the final path either holds the complete
/// document or does not exist.
pub fn write_backup(dir: &Path, at: DateTime<Utc>, content: &[u8]) -> Result<PathBuf> {
    let mut staged = tempfile::Builder::new()
        .prefix(&format!(".{FILE_PREFIX}"))
        .suffix(".partial")
        .tempfile_in(dir)
        .map_err(|e| BackupError::io(dir, e))?;
    let staged_path = staged.path().to_path_buf();

    staged
        .write_all(content)
        .map_err(|e| BackupError::io(&staged_path, e))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| BackupError::io(&staged_path, e))?;

    let mut seq = 0;
    loop {
        let path = dir.join(backup_file_name(at, seq));
        match staged.persist_noclobber(&path) {
            Ok(_) => return Ok(path),
            Err(err)
                if err.error.kind() == io::ErrorKind::AlreadyExists && seq < MAX_NAME_ATTEMPTS =>
            {
                debug!(path = %path.display(), "backup name taken, trying next suffix");
                staged = err.file;
                seq += 1;
            }
            Err(err) => return Err(BackupError::io(&path, err.error)),
        }
    }
}

/// Lists backup files in `dir`, newest first.
pub fn list_backups(dir: &Path) -> io::Result<Vec<BackupFile>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        if let Some(file) = BackupFile::from_path(entry?.path()) {
            files.push(file);
        }
    }
    files.sort_by(|a, b| b.cmp(a));
    Ok(files)
}

/// Files beyond the newest `retention` entries. Expects `files` newest first.
pub fn select_expired(files: Vec<BackupFile>, retention: usize) -> Vec<BackupFile> {
    files.into_iter().skip(retention).collect()
}

#[derive(Debug, Default)]
pub struct PruneReport {
    pub removed: Vec<PathBuf>,
    pub failed: Vec<PathBuf>,
}

/// Deletes all but the newest `retention` backups. `keep` is never deleted
/// and always counts as one of the retained entries, even when its name sorts
/// older than existing files (clock stepped back, local-time legacy names).
///
/// Best effort: listing and deletion errors are logged and reported, never
/// returned.
pub fn prune(dir: &Path, retention: usize, keep: &Path) -> PruneReport {
    let files = match list_backups(dir) {
        Ok(files) => files,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "could not list backups for pruning");
            return PruneReport::default();
        }
    };

    let (kept, others): (Vec<BackupFile>, Vec<BackupFile>) =
        files.into_iter().partition(|file| file.path == keep);
    let slots = if kept.is_empty() {
        retention
    } else {
        retention.saturating_sub(1)
    };

    let mut report = PruneReport::default();
    for file in select_expired(others, slots) {
        match fs::remove_file(&file.path) {
            Ok(()) => {
                info!(path = %file.path.display(), "pruned old backup");
                report.removed.push(file.path);
            }
            Err(e) => {
                warn!(path = %file.path.display(), error = %e, "failed to prune old backup");
                report.failed.push(file.path);
            }
        }
    }

    report
}
