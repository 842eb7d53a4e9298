//! Configuration crate for the autotranscode daemon
//!
//! Job descriptors, daemon settings (TOML + environment overrides), the
//! on-disk job store, and platform config-directory resolution.

pub mod job;
pub mod paths;
pub mod settings;
pub mod store;

pub use job::{AudioMode, DnxHrProfile, JobConfig, JobConfigError, ProResProfile, VideoCodec};
pub use settings::{Settings, SettingsError};
pub use store::{JobStore, JsonJobStore, StoreError};
