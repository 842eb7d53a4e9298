//! On-disk job store
//!
//! Persists the ordered job list as pretty-printed JSON at
//! `<config_dir>/jobs.json`. Only the fields that describe a job are
//! stored; runtime state never is. A missing or malformed file reads as an
//! empty list so a config problem can never keep the daemon from starting,
//! and individually malformed entries are skipped rather than poisoning the
//! whole file.

use crate::job::JobConfig;
use crate::paths;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error type for job-store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to write job store: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode job store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persistence collaborator for the job supervisor.
///
/// `load` and `save` deal in the ordered sequence of job configs; the
/// format and location are the implementation's concern.
pub trait JobStore: Send + Sync {
    fn load(&self) -> Result<Vec<JobConfig>, StoreError>;
    fn save(&self, jobs: &[JobConfig]) -> Result<(), StoreError>;
}

/// JSON-file job store, one file per daemon instance.
pub struct JsonJobStore {
    path: PathBuf,
}

impl JsonJobStore {
    /// Store backed by `jobs.json` inside `config_dir`.
    pub fn new(config_dir: &Path) -> Self {
        Self {
            path: paths::jobs_file(config_dir),
        }
    }

    /// Store backed by an explicit file path.
    pub fn at_path(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl JobStore for JsonJobStore {
    /// Read the job list.
    ///
    /// Missing file, unreadable file, or non-array content all yield an
    /// empty list. Entries that fail to deserialize individually are
    /// dropped, the rest are kept in file order.
    fn load(&self) -> Result<Vec<JobConfig>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(_) => return Ok(Vec::new()),
        };

        let entries: Vec<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(_) => return Ok(Vec::new()),
        };

        Ok(entries
            .into_iter()
            .filter_map(|v| serde_json::from_value::<JobConfig>(v).ok())
            .collect())
    }

    /// Overwrite the job list, preserving order.
    ///
    /// Writes to a temp sibling and renames into place so a crash mid-write
    /// never leaves a truncated jobs file.
    fn save(&self, jobs: &[JobConfig]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(jobs)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
