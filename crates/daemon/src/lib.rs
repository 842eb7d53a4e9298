//! AutoTranscode daemon
//!
//! Background service that watches input folders and transcodes new media
//! files through ffmpeg: codec catalog, transcode executor, per-job
//! ledgers, watch jobs, supervisor, and the status HTTP server.

pub mod catalog;
pub mod executor;
pub mod ledger;
pub mod outcome;
pub mod provision;
pub mod scan;
pub mod stability;
pub mod status_server;
pub mod supervisor;
pub mod watch_job;

pub use autotranscode_config as config;
pub use autotranscode_config::{AudioMode, JobConfig, Settings, VideoCodec};
pub use catalog::{transcode_args, CatalogError};
pub use executor::{TranscodeExecutor, TranscodeTask};
pub use ledger::{FileIdentity, Ledger, ProcessedEntry};
pub use outcome::{FailureCategory, SkipReason, TranscodeOutcome};
pub use provision::{effective_encode_slots, FfmpegLocator, ProvisionError};
pub use scan::{list_candidates, plan_tick, ScanCandidate, TickPlan, INPUT_EXTENSIONS};
pub use stability::{check_stability, StabilityResult};
pub use status_server::{
    collect_system_metrics, create_status_router, run_status_server, ServerError, StatusSnapshot,
    SystemMetrics,
};
pub use supervisor::{JobSnapshot, RestoreReport, Supervisor, SupervisorError};
pub use watch_job::{job_key, JobState, JobStatus, WatchJob};
