//! Retry-queue persistence across engine restarts.
//!
//! Undelivered payloads are written to a small JSON state file at shutdown
//! and restored at the next start, so a collector outage spanning a restart
//! still loses nothing. The file is bounded to the most recent payloads.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::EventPayload;

/// Maximum payloads kept in the backup file (most recent win).
pub const MAX_BACKUP_EVENTS: usize = 100;

/// Queue backup errors.
#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode backup: {0}")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct BackupFile {
    pending: Vec<EventPayload>,
}

/// JSON state file holding undelivered payloads.
#[derive(Debug, Clone)]
pub struct QueueBackup {
    path: PathBuf,
}

impl QueueBackup {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads saved payloads, head first. A missing file is an empty queue;
    /// a corrupt one is an error for the caller to log.
    pub fn load(&self) -> Result<Vec<EventPayload>, BackupError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let parsed: BackupFile =
                    serde_json::from_str(&contents).map_err(|source| BackupError::Parse {
                        path: self.path.clone(),
                        source,
                    })?;
                Ok(parsed.pending)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(source) => Err(BackupError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Saves pending payloads, keeping only the most recent
    /// [`MAX_BACKUP_EVENTS`] to bound the file.
    pub fn save(&self, pending: &[EventPayload]) -> Result<(), BackupError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| BackupError::Write {
                path: self.path.clone(),
                source,
            })?;
        }

        let start = pending.len().saturating_sub(MAX_BACKUP_EVENTS);
        if start > 0 {
            tracing::warn!(dropped = start, "queue backup overflow, dropping oldest payloads");
        }
        let file = BackupFile {
            pending: pending[start..].to_vec(),
        };
        let json = serde_json::to_string_pretty(&file).map_err(BackupError::Encode)?;
        fs::write(&self.path, json).map_err(|source| BackupError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}
