//! Scanner module for discovering source files in a job's input folder.
//!
//! Listing is a flat (non-recursive) read of the input folder, filtering by
//! extension and sorting candidates by file name so dispatch order is
//! deterministic across ticks and restarts.

use crate::ledger::FileIdentity;
use crate::outcome::SkipReason;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source file extensions accepted as transcode input (case-insensitive
/// matching). Everything else in the folder, sidecar files included, is
/// ignored.
pub const INPUT_EXTENSIONS: &[&str] = &[
    ".mp4", ".mov", ".mxf", ".avi", ".mkv", ".m4v", ".wmv", ".flv", ".webm", ".ts", ".mpg",
    ".mpeg", ".m2t", ".m2ts", ".dv", ".r3d", ".braw",
];

/// A candidate source file discovered in the input folder.
#[derive(Debug, Clone)]
pub struct ScanCandidate {
    /// Full path to the source file.
    pub path: PathBuf,
    /// File name (also the ledger-relative path, since listing is flat).
    pub file_name: String,
    /// File size in bytes at discovery time.
    pub size_bytes: u64,
    /// Last modified time of the file.
    pub modified_time: SystemTime,
}

impl ScanCandidate {
    /// Ledger fingerprint of this candidate as observed at scan time.
    pub fn identity(&self) -> FileIdentity {
        FileIdentity {
            rel_path: self.file_name.clone(),
            size: self.size_bytes,
            mtime_unix_ms: unix_ms(self.modified_time),
        }
    }
}

/// Checks if a file has an accepted input extension (case-insensitive).
pub fn is_input_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            INPUT_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Why a directory entry is not a candidate, if it isn't one.
pub fn skip_reason(path: &Path) -> Option<SkipReason> {
    if is_input_file(path) {
        None
    } else {
        Some(SkipReason::UnsupportedExtension)
    }
}

/// Lists transcode candidates in the given input folder.
///
/// This function:
/// - Reads only the top level of the folder (no recursion)
/// - Skips subdirectories and hidden files (names starting with `.`)
/// - Filters files by input extensions (case-insensitive)
/// - Captures file size and modified time for stability checking
/// - Sorts candidates by file name (lexicographic, deterministic order)
///
/// A missing folder (unmounted volume, typo in the job config) yields an
/// empty listing rather than an error; the job keeps ticking and picks the
/// files up once the folder appears. Other read errors propagate.
pub fn list_candidates(input_folder: &Path) -> io::Result<Vec<ScanCandidate>> {
    let mut candidates = Vec::new();

    let entries = match fs::read_dir(input_folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(candidates),
        Err(e) => return Err(e),
    };

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        let file_type = entry.file_type()?;
        if !file_type.is_file() {
            continue;
        }

        let file_name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if file_name.starts_with('.') {
            continue;
        }

        if skip_reason(&path).is_some() {
            continue;
        }

        let metadata = entry.metadata()?;
        candidates.push(ScanCandidate {
            path,
            file_name,
            size_bytes: metadata.len(),
            modified_time: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        });
    }

    candidates.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(candidates)
}

/// Output path for a source file: same stem, new extension, in the job's
/// output folder. `extension` carries its leading dot.
pub fn build_output_path(input: &Path, output_folder: &Path, extension: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    output_folder.join(format!("{}{}", stem, extension))
}

/// Result of planning one tick: which candidates to dispatch now, which to
/// defer to a later tick, and which the ledger already settled.
#[derive(Debug, Default)]
pub struct TickPlan {
    pub eligible: Vec<ScanCandidate>,
    pub deferred: Vec<ScanCandidate>,
    /// Candidates with a terminal ledger entry; never submitted again.
    pub settled: Vec<ScanCandidate>,
}

/// Pure tick planning.
///
/// Sets aside candidates the ledger already settled, drops candidates
/// currently in flight, then splits the remainder (still in file-name
/// order) into at most `slots` eligible entries plus the deferred rest.
/// Deferred files reappear on the next tick with no state to clean up.
pub fn plan_tick(
    candidates: Vec<ScanCandidate>,
    ledger: &crate::ledger::Ledger,
    in_flight: &std::collections::HashSet<String>,
    slots: usize,
) -> TickPlan {
    let mut plan = TickPlan::default();
    for candidate in candidates {
        if in_flight.contains(&candidate.file_name) {
            continue;
        }
        if !ledger.should_process(&candidate.identity()) {
            plan.settled.push(candidate);
            continue;
        }
        if plan.eligible.len() < slots {
            plan.eligible.push(candidate);
        } else {
            plan.deferred.push(candidate);
        }
    }
    plan
}

fn unix_ms(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
