//! Filesystem layout for daemon state
//!
//! Everything lives under one config directory:
//!   Linux   : ~/.config/autotranscode/
//!   macOS   : ~/Library/Application Support/autotranscode/
//!   Windows : %APPDATA%\autotranscode\
//!
//! Layout inside it: `settings.toml`, `jobs.json`, and `state/` holding
//! per-job ledgers.

use std::path::{Path, PathBuf};

/// Platform config directory for the daemon.
///
/// Falls back to the current directory if the platform dir cannot be
/// resolved (e.g. stripped-down containers without a home).
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autotranscode")
}

/// Path of the daemon settings file inside `config_dir`.
pub fn settings_file(config_dir: &Path) -> PathBuf {
    config_dir.join("settings.toml")
}

/// Path of the persisted job list inside `config_dir`.
pub fn jobs_file(config_dir: &Path) -> PathBuf {
    config_dir.join("jobs.json")
}

/// Directory holding per-job ledgers inside `config_dir`.
pub fn state_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("state")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_under_config_dir() {
        let base = Path::new("/home/op/.config/autotranscode");
        assert_eq!(
            settings_file(base),
            PathBuf::from("/home/op/.config/autotranscode/settings.toml")
        );
        assert_eq!(
            jobs_file(base),
            PathBuf::from("/home/op/.config/autotranscode/jobs.json")
        );
        assert_eq!(
            state_dir(base),
            PathBuf::from("/home/op/.config/autotranscode/state")
        );
    }

    #[test]
    fn test_default_config_dir_ends_with_app_name() {
        assert!(default_config_dir().ends_with("autotranscode"));
    }
}
