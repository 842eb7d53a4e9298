//! Stability checking module for verifying files are fully copied.
//!
//! Camera offloads and network copies can take minutes; before submitting a
//! file we verify it's stable (no longer being written) by checking that its
//! size and modification time remain unchanged over a configurable window.

use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;

/// Result of a stability check on a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StabilityResult {
    /// Size and mtime remained unchanged during the stability window.
    Stable,
    /// The file changed during the stability window.
    Unstable {
        /// Size when first checked.
        initial_size: u64,
        /// Size after waiting.
        current_size: u64,
    },
}

/// Check if a file is stable by comparing size and mtime before and after a
/// wait period.
///
/// Returns `Err` if the file cannot be read after the wait (deleted or the
/// volume unmounted mid-copy); the caller skips the file for this tick.
pub async fn check_stability(
    path: &Path,
    initial_size: u64,
    initial_mtime: SystemTime,
    window: Duration,
) -> Result<StabilityResult, std::io::Error> {
    sleep(window).await;

    let metadata = tokio::fs::metadata(path).await?;
    let current_size = metadata.len();
    let current_mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

    Ok(compare_samples(
        initial_size,
        initial_mtime,
        current_size,
        current_mtime,
    ))
}

/// Compare two (size, mtime) samples and return the appropriate
/// StabilityResult.
///
/// This is a pure function extracted for property testing. An mtime change
/// at constant size (in-place rewrite) still counts as unstable.
#[inline]
pub fn compare_samples(
    initial_size: u64,
    initial_mtime: SystemTime,
    current_size: u64,
    current_mtime: SystemTime,
) -> StabilityResult {
    if initial_size == current_size && initial_mtime == current_mtime {
        StabilityResult::Stable
    } else {
        StabilityResult::Unstable {
            initial_size,
            current_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::time::UNIX_EPOCH;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    // **Property: stability sample comparison**
    //
    // *For any* pair of samples, the file SHALL be reported stable if and
    // only if both size and mtime are unchanged.
    proptest! {
        #[test]
        fn prop_stability_sample_comparison(
            initial_size: u64,
            current_size: u64,
            initial_mtime_secs in 0u64..4_000_000_000,
            current_mtime_secs in 0u64..4_000_000_000,
        ) {
            let result = compare_samples(
                initial_size,
                at(initial_mtime_secs),
                current_size,
                at(current_mtime_secs),
            );

            if initial_size == current_size && initial_mtime_secs == current_mtime_secs {
                prop_assert_eq!(result, StabilityResult::Stable);
            } else {
                match result {
                    StabilityResult::Unstable { initial_size: i, current_size: c } => {
                        prop_assert_eq!(i, initial_size);
                        prop_assert_eq!(c, current_size);
                    }
                    StabilityResult::Stable => {
                        prop_assert!(false, "Expected Unstable when samples differ");
                    }
                }
            }
        }
    }

    #[test]
    fn test_compare_samples_stable() {
        let result = compare_samples(1000, at(50), 1000, at(50));
        assert_eq!(result, StabilityResult::Stable);
    }

    #[test]
    fn test_compare_samples_size_grew() {
        let result = compare_samples(1000, at(50), 2000, at(51));
        assert_eq!(
            result,
            StabilityResult::Unstable {
                initial_size: 1000,
                current_size: 2000
            }
        );
    }

    #[test]
    fn test_compare_samples_touched_at_same_size() {
        // In-place rewrite finishing at the same byte count.
        let result = compare_samples(1000, at(50), 1000, at(60));
        assert_eq!(
            result,
            StabilityResult::Unstable {
                initial_size: 1000,
                current_size: 1000
            }
        );
    }

    #[tokio::test]
    async fn test_check_stability_missing_file_is_err() {
        let dir = tempfile::TempDir::new().unwrap();
        let gone = dir.path().join("vanished.mov");
        let result =
            check_stability(&gone, 10, at(1), Duration::from_millis(1)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_check_stability_on_settled_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("clip.mov");
        std::fs::write(&path, b"settled").unwrap();
        let metadata = std::fs::metadata(&path).unwrap();

        let result = check_stability(
            &path,
            metadata.len(),
            metadata.modified().unwrap(),
            Duration::from_millis(1),
        )
        .await
        .unwrap();
        assert_eq!(result, StabilityResult::Stable);
    }
}
