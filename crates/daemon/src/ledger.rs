//! Processed-file ledger
//!
//! Per-job record of which input files have been attempted, keyed by an
//! identity fingerprint (path relative to the input folder + size + mtime).
//! A file with a prior Succeeded entry at the same fingerprint is never
//! reprocessed; retryable failures stay eligible, and cancelled attempts
//! are never recorded. Ledgers persist as JSON files in the state
//! directory so restarts do not reconvert already-handled files.

use crate::outcome::{FailureCategory, TranscodeOutcome};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Identity fingerprint of one input file for one job.
///
/// The relative path alone is not enough: a file rewritten in place gets a
/// new (size, mtime) pair and counts as a new file, which is what makes a
/// failed-then-fixed source eligible again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    /// Path relative to the job's input folder.
    pub rel_path: String,
    pub size: u64,
    pub mtime_unix_ms: i64,
}

impl FileIdentity {
    /// Map key. `|` cannot appear in the numeric parts, so keys are unique
    /// per fingerprint.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.rel_path, self.size, self.mtime_unix_ms)
    }
}

/// Outcome shape stored in the ledger file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RecordedOutcome {
    Succeeded { output: String },
    Failed {
        category: FailureCategory,
        message: String,
    },
}

/// One recorded attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEntry {
    pub rel_path: String,
    pub size: u64,
    pub mtime_unix_ms: i64,
    pub outcome: RecordedOutcome,
    pub recorded_at_unix_ms: i64,
}

/// Per-job processed-file ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    entries: HashMap<String, ProcessedEntry>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a file with this fingerprint should be submitted.
    ///
    /// False only for a prior Succeeded entry or a failure whose category
    /// is non-retryable; everything else stays eligible.
    pub fn should_process(&self, identity: &FileIdentity) -> bool {
        match self.entries.get(&identity.key()) {
            None => true,
            Some(entry) => match &entry.outcome {
                RecordedOutcome::Succeeded { .. } => false,
                RecordedOutcome::Failed { category, .. } => category.is_retryable(),
            },
        }
    }

    /// Record the outcome of a completed attempt.
    ///
    /// Cancelled attempts and skips are deliberately not recorded: the file
    /// must be retried on a future job start or tick.
    pub fn record(&mut self, identity: FileIdentity, outcome: &TranscodeOutcome) {
        let recorded = match outcome {
            TranscodeOutcome::Succeeded { output, .. } => RecordedOutcome::Succeeded {
                output: output.display().to_string(),
            },
            TranscodeOutcome::Failed {
                category: FailureCategory::Cancelled,
                ..
            } => return,
            TranscodeOutcome::Failed { category, message } => RecordedOutcome::Failed {
                category: *category,
                message: message.clone(),
            },
            TranscodeOutcome::Skipped { .. } => return,
        };

        let entry = ProcessedEntry {
            rel_path: identity.rel_path.clone(),
            size: identity.size,
            mtime_unix_ms: identity.mtime_unix_ms,
            outcome: recorded,
            recorded_at_unix_ms: now_unix_ms(),
        };
        self.entries.insert(identity.key(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load the ledger for `job_key` from the state directory.
    ///
    /// A missing file yields an empty ledger; a corrupt one is logged and
    /// replaced on the next save. Never fatal.
    pub fn load(state_dir: &Path, job_key: &str) -> Self {
        let path = ledger_path(state_dir, job_key);
        let content = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(_) => return Self::new(),
        };
        match serde_json::from_str(&content) {
            Ok(ledger) => ledger,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt ledger file, starting empty");
                Self::new()
            }
        }
    }

    /// Persist the ledger for `job_key` into the state directory.
    ///
    /// Written to a temp sibling and renamed into place so a crash mid-write
    /// never leaves a truncated ledger (which would load empty and reconvert
    /// the whole folder).
    pub fn save(&self, state_dir: &Path, job_key: &str) -> io::Result<()> {
        fs::create_dir_all(state_dir)?;
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let path = ledger_path(state_dir, job_key);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(tmp, path)
    }
}

/// Ledger file path, one per job, keyed by the job's stable key.
pub fn ledger_path(state_dir: &Path, job_key: &str) -> PathBuf {
    state_dir.join(format!("{}.ledger.json", job_key))
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn identity(rel_path: &str, size: u64, mtime: i64) -> FileIdentity {
        FileIdentity {
            rel_path: rel_path.to_string(),
            size,
            mtime_unix_ms: mtime,
        }
    }

    fn success() -> TranscodeOutcome {
        TranscodeOutcome::Succeeded {
            output: PathBuf::from("/proxies/clip.mp4"),
            duration: Duration::from_secs(3),
        }
    }

    // **Property: at-most-once for succeeded fingerprints**
    //
    // *For any* identity recorded as Succeeded, should_process SHALL return
    // false on every subsequent call; a different fingerprint of the same
    // path SHALL remain eligible.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_succeeded_blocks_same_fingerprint(
            rel_path in "[a-zA-Z0-9_.-]{1,20}",
            size in 1u64..1_000_000_000,
            mtime in 0i64..2_000_000_000_000,
        ) {
            let mut ledger = Ledger::new();
            let id = identity(&rel_path, size, mtime);
            prop_assert!(ledger.should_process(&id));

            ledger.record(id.clone(), &success());

            // Same fingerprint: blocked, repeatedly.
            prop_assert!(!ledger.should_process(&id));
            prop_assert!(!ledger.should_process(&id));

            // Changed size or mtime: a different file as far as the job
            // is concerned.
            let regrown = identity(&rel_path, size + 1, mtime);
            prop_assert!(ledger.should_process(&regrown));
            let touched = identity(&rel_path, size, mtime + 1);
            prop_assert!(ledger.should_process(&touched));
        }

        #[test]
        fn prop_retryable_failures_stay_eligible(
            rel_path in "[a-zA-Z0-9_.-]{1,20}",
            category in prop_oneof![
                Just(FailureCategory::EncoderUnavailable),
                Just(FailureCategory::IoError),
                Just(FailureCategory::EncodeFailed),
            ],
        ) {
            let mut ledger = Ledger::new();
            let id = identity(&rel_path, 512, 1000);
            ledger.record(id.clone(), &TranscodeOutcome::failed(category, "boom"));

            prop_assert!(
                ledger.should_process(&id),
                "{} failures must be retried next scan",
                category
            );
            // The attempt is still on record for diagnostics.
            prop_assert_eq!(ledger.len(), 1);
        }
    }

    #[test]
    fn test_cancelled_never_recorded() {
        let mut ledger = Ledger::new();
        let id = identity("clip.mov", 2048, 99);
        ledger.record(
            id.clone(),
            &TranscodeOutcome::failed(FailureCategory::Cancelled, "job stopped"),
        );

        assert!(ledger.is_empty());
        assert!(ledger.should_process(&id));
    }

    #[test]
    fn test_skips_never_recorded() {
        let mut ledger = Ledger::new();
        let id = identity("clip.mov", 2048, 99);
        ledger.record(
            id.clone(),
            &TranscodeOutcome::Skipped {
                reason: crate::outcome::SkipReason::StillWriting,
            },
        );

        assert!(ledger.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::new();
        ledger.record(identity("a.mov", 1, 1), &success());
        ledger.record(
            identity("b.mov", 2, 2),
            &TranscodeOutcome::failed(FailureCategory::EncodeFailed, "exit 1"),
        );

        ledger.save(dir.path(), "proxies").expect("save");
        let loaded = Ledger::load(dir.path(), "proxies");

        assert_eq!(loaded, ledger);
        assert!(!loaded.should_process(&identity("a.mov", 1, 1)));
        assert!(loaded.should_process(&identity("b.mov", 2, 2)));
    }

    #[test]
    fn test_save_leaves_only_the_ledger_file() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::new();
        ledger.record(identity("a.mov", 1, 1), &success());
        ledger.save(dir.path(), "proxies").unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec!["proxies.ledger.json"]);
    }

    #[test]
    fn test_load_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(Ledger::load(dir.path(), "nothing").is_empty());
    }

    #[test]
    fn test_load_corrupt_is_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(ledger_path(dir.path(), "proxies"), "]]oops").unwrap();
        assert!(Ledger::load(dir.path(), "proxies").is_empty());
    }

    #[test]
    fn test_ledgers_are_independent_per_job() {
        // Two jobs watching the same folder keep separate ledgers by
        // design; sharing would couple their output settings.
        let dir = TempDir::new().unwrap();
        let id = identity("clip.mov", 7, 7);

        let mut a = Ledger::new();
        a.record(id.clone(), &success());
        a.save(dir.path(), "job-a").unwrap();

        let b = Ledger::load(dir.path(), "job-b");
        assert!(b.should_process(&id));
    }
}
