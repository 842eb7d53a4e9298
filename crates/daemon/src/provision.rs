//! Encoder binary provisioning and concurrency sizing.
//!
//! Locates the `ffmpeg` binary (bundled bin dir first, then `PATH`) and
//! derives the default number of concurrent encode slots from the machine's
//! core count when the setting is left at 0.

use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

const FFMPEG_BINARY: &str = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("ffmpeg binary not found (bin_dir: {searched:?}, PATH: {searched_path})")]
    BinaryMissing {
        searched: Option<PathBuf>,
        searched_path: bool,
    },
}

/// Locates and caches the path to the ffmpeg binary.
///
/// Lookup order: the configured bin dir (bundled-binary layout), then the
/// system `PATH`. The first hit is cached for the lifetime of the locator;
/// an ffmpeg that appears later is only picked up after restart.
#[derive(Debug)]
pub struct FfmpegLocator {
    bin_dir: Option<PathBuf>,
    search_system_path: bool,
    cached: Mutex<Option<PathBuf>>,
}

impl FfmpegLocator {
    pub fn new(bin_dir: Option<PathBuf>) -> Self {
        Self {
            bin_dir,
            search_system_path: true,
            cached: Mutex::new(None),
        }
    }

    /// Locator pinned to a vendored ffmpeg build, no `PATH` fallback.
    pub fn bundled_only(bin_dir: PathBuf) -> Self {
        Self {
            bin_dir: Some(bin_dir),
            search_system_path: false,
            cached: Mutex::new(None),
        }
    }

    pub fn locate(&self) -> Result<PathBuf, ProvisionError> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(path) = cached.as_ref() {
            return Ok(path.clone());
        }

        if let Some(dir) = &self.bin_dir {
            let bundled = dir.join(FFMPEG_BINARY);
            if bundled.is_file() {
                *cached = Some(bundled.clone());
                return Ok(bundled);
            }
        }

        if self.search_system_path {
            if let Ok(found) = which::which(FFMPEG_BINARY) {
                *cached = Some(found.clone());
                return Ok(found);
            }
        }

        Err(ProvisionError::BinaryMissing {
            searched: self.bin_dir.clone(),
            searched_path: self.search_system_path,
        })
    }
}

/// Effective number of global encode slots.
///
/// A configured non-zero value is used unchanged; 0 means derive from the
/// logical core count.
pub fn effective_encode_slots(configured: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        derive_encode_slots(num_cpus::get())
    }
}

/// Derive encode slots from core count.
/// - 4 slots for 16+ cores
/// - 2 slots for 8+ cores
/// - 1 slot otherwise
fn derive_encode_slots(cores: usize) -> usize {
    if cores >= 16 {
        4
    } else if cores >= 8 {
        2
    } else {
        1
    }
}
