//! Watch-job descriptors
//!
//! A [`JobConfig`] describes one recurring watch-folder job: where to look
//! for source files, where to write converted files, how often to scan, and
//! which codec/audio settings to encode with. Configs are immutable once a
//! job is running; editing a job means stopping it and recreating it with a
//! new config.
//!
//! Codec settings are a tagged union so the compression-value shape is
//! enforced per codec family: CRF integers for H.264/H.265, a fixed profile
//! set for ProRes and DNxHR, nothing for a lossless remux. Remaining dynamic
//! invariants (CRF bounds, folder distinctness) are checked once at
//! construction by [`JobConfig::validate`], never at dispatch time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Inclusive CRF domain shared by libx264 and libx265.
pub const CRF_MIN: u8 = 0;
pub const CRF_MAX: u8 = 51;

/// Error type for job-config validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobConfigError {
    #[error("job name must not be empty")]
    EmptyName,

    #[error("input folder and output folder must differ: {0}")]
    SameFolder(String),

    #[error("scan interval must be at least 1 second")]
    ZeroInterval,

    #[error("unsupported profile: CRF {crf} outside {min}..={max}")]
    CrfOutOfRange { crf: u8, min: u8, max: u8 },

    #[error("output extension must start with '.' and name a format: {0:?}")]
    BadExtension(String),

    #[error("container {extension:?} not supported by {codec} (allowed: {allowed:?})")]
    UnsupportedContainer {
        extension: String,
        codec: String,
        allowed: &'static [&'static str],
    },
}

/// ProRes quality tiers accepted by `prores_ks -profile:v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProResProfile {
    Proxy,
    Lt,
    Standard,
    Hq,
    #[serde(rename = "4444")]
    P4444,
}

impl std::fmt::Display for ProResProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProResProfile::Proxy => write!(f, "proxy"),
            ProResProfile::Lt => write!(f, "lt"),
            ProResProfile::Standard => write!(f, "standard"),
            ProResProfile::Hq => write!(f, "hq"),
            ProResProfile::P4444 => write!(f, "4444"),
        }
    }
}

/// DNxHR quality tiers accepted by `dnxhd -profile:v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DnxHrProfile {
    Lb,
    Sq,
    Hq,
    Hqx,
    #[serde(rename = "444")]
    P444,
}

impl std::fmt::Display for DnxHrProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DnxHrProfile::Lb => write!(f, "lb"),
            DnxHrProfile::Sq => write!(f, "sq"),
            DnxHrProfile::Hq => write!(f, "hq"),
            DnxHrProfile::Hqx => write!(f, "hqx"),
            DnxHrProfile::P444 => write!(f, "444"),
        }
    }
}

/// Video codec family plus its compression value.
///
/// Serialized internally tagged so a persisted job reads naturally:
/// `{"codec": "h264", "crf": 23}` or `{"codec": "prores", "profile": "hq"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "codec", rename_all = "lowercase")]
pub enum VideoCodec {
    H264 { crf: u8 },
    H265 { crf: u8 },
    #[serde(rename = "prores")]
    ProRes { profile: ProResProfile },
    #[serde(rename = "dnxhr")]
    DnxHr { profile: DnxHrProfile },
    Remux,
}

impl VideoCodec {
    /// Check the compression value against the codec's accepted domain.
    ///
    /// Profile-based families are statically valid; only CRF can go out of
    /// range (e.g. via a hand-edited jobs file).
    pub fn validate(&self) -> Result<(), JobConfigError> {
        match *self {
            VideoCodec::H264 { crf } | VideoCodec::H265 { crf } => {
                if crf > CRF_MAX {
                    Err(JobConfigError::CrfOutOfRange {
                        crf,
                        min: CRF_MIN,
                        max: CRF_MAX,
                    })
                } else {
                    Ok(())
                }
            }
            VideoCodec::ProRes { .. } | VideoCodec::DnxHr { .. } | VideoCodec::Remux => Ok(()),
        }
    }

    /// The container extension conventionally paired with this family.
    pub fn default_extension(&self) -> &'static str {
        match self {
            VideoCodec::H264 { .. } | VideoCodec::H265 { .. } => ".mp4",
            VideoCodec::ProRes { .. } => ".mov",
            VideoCodec::DnxHr { .. } => ".mxf",
            VideoCodec::Remux => ".mov",
        }
    }

    /// Container extensions this family can actually be muxed into.
    ///
    /// ffmpeg accepts far more combinations than are sane for editorial
    /// workflows; the set here is what each codec is delivered in. An
    /// extension outside the set would only fail at encode time, so it is
    /// rejected at job creation instead.
    pub fn allowed_extensions(&self) -> &'static [&'static str] {
        match self {
            VideoCodec::H264 { .. } => &[".mp4", ".mkv", ".mov"],
            VideoCodec::H265 { .. } => &[".mp4", ".mkv"],
            VideoCodec::ProRes { .. } => &[".mov"],
            VideoCodec::DnxHr { .. } => &[".mxf", ".mov"],
            VideoCodec::Remux => &[".mov", ".mp4", ".mkv", ".mxf"],
        }
    }
}

impl std::fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoCodec::H264 { crf } => write!(f, "h264 (crf {})", crf),
            VideoCodec::H265 { crf } => write!(f, "h265 (crf {})", crf),
            VideoCodec::ProRes { profile } => write!(f, "prores ({})", profile),
            VideoCodec::DnxHr { profile } => write!(f, "dnxhr ({})", profile),
            VideoCodec::Remux => write!(f, "remux"),
        }
    }
}

/// How the audio streams are handled, independent of the video codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioMode {
    /// Stream-copy audio as-is.
    Copy,
    /// Re-encode to AAC.
    Aac,
    /// Re-encode to 16-bit PCM.
    Pcm,
}

impl Default for AudioMode {
    fn default() -> Self {
        Self::Copy
    }
}

impl std::fmt::Display for AudioMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioMode::Copy => write!(f, "copy"),
            AudioMode::Aac => write!(f, "aac"),
            AudioMode::Pcm => write!(f, "pcm"),
        }
    }
}

/// Everything needed to describe one recurring watch-folder job.
///
/// Runtime state (job lifecycle, counters, errors) is deliberately not part
/// of this struct and is never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Display name, unique across jobs.
    pub name: String,
    /// Folder scanned for source files (non-recursive).
    pub input_folder: PathBuf,
    /// Folder converted files are written to. Created lazily on first write.
    pub output_folder: PathBuf,
    /// Seconds between scan ticks.
    pub scan_interval_secs: u64,
    /// Video codec family and compression value.
    #[serde(flatten)]
    pub codec: VideoCodec,
    /// Audio handling, composed independently with the video settings.
    #[serde(default)]
    pub audio: AudioMode,
    /// Output container extension, including the leading dot (e.g. ".mov").
    /// An omitted or empty extension is filled with the codec's conventional
    /// container by [`JobConfig::normalize`].
    #[serde(default)]
    pub output_extension: String,
}

impl JobConfig {
    /// Fill in defaults that depend on other fields.
    ///
    /// Currently just the output extension: a config that leaves it empty
    /// (e.g. a hand-written jobs file) gets the codec's conventional
    /// container. Called by the supervisor before validation.
    pub fn normalize(&mut self) {
        if self.output_extension.is_empty() {
            self.output_extension = self.codec.default_extension().to_string();
        }
    }

    /// Validate all construction-time invariants.
    ///
    /// Called by the supervisor before a job is started; a config that fails
    /// here never reaches the executor.
    pub fn validate(&self) -> Result<(), JobConfigError> {
        if self.name.trim().is_empty() {
            return Err(JobConfigError::EmptyName);
        }
        if self.input_folder == self.output_folder {
            return Err(JobConfigError::SameFolder(
                self.input_folder.display().to_string(),
            ));
        }
        if self.scan_interval_secs == 0 {
            return Err(JobConfigError::ZeroInterval);
        }
        self.codec.validate()?;
        if !self.output_extension.starts_with('.') || self.output_extension.len() < 2 {
            return Err(JobConfigError::BadExtension(self.output_extension.clone()));
        }
        let extension = self.output_extension.to_ascii_lowercase();
        let allowed = self.codec.allowed_extensions();
        if !allowed.contains(&extension.as_str()) {
            return Err(JobConfigError::UnsupportedContainer {
                extension: self.output_extension.clone(),
                codec: self.codec.to_string(),
                allowed,
            });
        }
        Ok(())
    }
}
