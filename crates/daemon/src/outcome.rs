//! Terminal outcomes of transcode attempts
//!
//! Every attempt ends in exactly one [`TranscodeOutcome`]; the watch job
//! records it in its ledger and updates its counters from it.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Failure category of a transcode attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The encoder binary could not be located.
    EncoderUnavailable,
    /// Folder access, permissions, disk-full, or rename failures.
    IoError,
    /// The job was stopped while the task was queued or encoding.
    Cancelled,
    /// The encoder process exited non-zero.
    EncodeFailed,
}

impl FailureCategory {
    /// Whether a file that failed with this category stays eligible on
    /// later scans.
    ///
    /// Every category currently reachable from the executor is retryable;
    /// encode failures follow an at-least-once-until-success policy with no
    /// cap and no backoff. The predicate exists so the ledger states the
    /// rule in one place.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            FailureCategory::EncoderUnavailable
                | FailureCategory::IoError
                | FailureCategory::Cancelled
                | FailureCategory::EncodeFailed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureCategory::EncoderUnavailable => "encoder_unavailable",
            FailureCategory::IoError => "io_error",
            FailureCategory::Cancelled => "cancelled",
            FailureCategory::EncodeFailed => "encode_failed",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a discovered file was not submitted this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The ledger already holds a terminal entry for this fingerprint.
    AlreadyProcessed,
    /// Size changed between the two stability samples.
    StillWriting,
    /// Extension outside the supported input set.
    UnsupportedExtension,
}

/// Terminal result of one transcode task.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeOutcome {
    /// Encode finished and the output was renamed into place.
    Succeeded {
        output: PathBuf,
        /// Wall-clock encode duration.
        duration: Duration,
    },
    /// Encode did not produce a usable output.
    Failed {
        category: FailureCategory,
        message: String,
    },
    /// The file was never submitted.
    Skipped { reason: SkipReason },
}

impl TranscodeOutcome {
    pub fn failed(category: FailureCategory, message: impl Into<String>) -> Self {
        Self::Failed {
            category,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TranscodeOutcome::Succeeded { .. })
    }

    pub fn failure_category(&self) -> Option<FailureCategory> {
        match self {
            TranscodeOutcome::Failed { category, .. } => Some(*category),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TranscodeOutcome::Failed {
                category: FailureCategory::Cancelled,
                ..
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_reachable_categories_retryable() {
        for category in [
            FailureCategory::EncoderUnavailable,
            FailureCategory::IoError,
            FailureCategory::Cancelled,
            FailureCategory::EncodeFailed,
        ] {
            assert!(category.is_retryable(), "{} should retry", category);
        }
    }

    #[test]
    fn test_category_display() {
        assert_eq!(
            FailureCategory::EncoderUnavailable.to_string(),
            "encoder_unavailable"
        );
        assert_eq!(FailureCategory::IoError.to_string(), "io_error");
        assert_eq!(FailureCategory::Cancelled.to_string(), "cancelled");
        assert_eq!(FailureCategory::EncodeFailed.to_string(), "encode_failed");
    }

    #[test]
    fn test_outcome_predicates() {
        let ok = TranscodeOutcome::Succeeded {
            output: PathBuf::from("/proxies/clip.mp4"),
            duration: Duration::from_secs(12),
        };
        assert!(ok.is_success());
        assert!(!ok.is_cancelled());

        let cancelled = TranscodeOutcome::failed(FailureCategory::Cancelled, "job stopped");
        assert!(cancelled.is_cancelled());
        assert!(!cancelled.is_success());

        let failed = TranscodeOutcome::failed(FailureCategory::EncodeFailed, "exit 1");
        assert!(!failed.is_cancelled());
        assert!(!failed.is_success());
    }
}
