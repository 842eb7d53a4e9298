//! Job supervisor module.
//!
//! Owns the set of watch jobs for the daemon's lifetime: add/remove/stop/
//! start, persistence of the job list through the configured store, and
//! restore at startup. Job ids are fresh per process; the job name is the
//! durable identity (it keys the on-disk ledger).

use crate::executor::TranscodeExecutor;
use crate::watch_job::{JobState, JobStatus, WatchJob};
use autotranscode_config::{JobConfig, JobConfigError, JobStore, StoreError};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Invalid(#[from] JobConfigError),

    #[error("a job named '{0}' already exists")]
    DuplicateName(String),

    #[error("no job with id {0}")]
    UnknownJob(Uuid),

    #[error("job '{0}' is already running")]
    AlreadyRunning(String),

    #[error("failed to persist job list: {0}")]
    Store(#[from] StoreError),
}

/// Point-in-time view of one supervised job for display surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: Uuid,
    pub name: String,
    pub input_folder: PathBuf,
    pub output_folder: PathBuf,
    #[serde(flatten)]
    pub status: JobStatus,
}

/// Outcome of restoring persisted jobs at startup.
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub started: usize,
    /// (job name, reason) for every persisted entry that failed validation.
    pub skipped: Vec<(String, String)>,
}

struct RunningJob {
    job: Arc<WatchJob>,
    handle: JoinHandle<()>,
}

struct JobEntry {
    id: Uuid,
    config: JobConfig,
    running: Option<RunningJob>,
}

pub struct Supervisor {
    // Vec, not a map: the persisted job list keeps insertion order.
    jobs: tokio::sync::Mutex<Vec<JobEntry>>,
    store: Arc<dyn JobStore>,
    executor: Arc<TranscodeExecutor>,
    state_dir: PathBuf,
    stability_window: Duration,
    max_in_flight_per_job: usize,
}

impl Supervisor {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<TranscodeExecutor>,
        state_dir: PathBuf,
        stability_window: Duration,
        max_in_flight_per_job: usize,
    ) -> Self {
        Self {
            jobs: tokio::sync::Mutex::new(Vec::new()),
            store,
            executor,
            state_dir,
            stability_window,
            max_in_flight_per_job,
        }
    }

    /// Add a new job: normalize, validate, persist, start watching.
    pub async fn add(&self, mut config: JobConfig) -> Result<Uuid, SupervisorError> {
        config.normalize();
        config.validate()?;

        let mut jobs = self.jobs.lock().await;
        if jobs
            .iter()
            .any(|entry| entry.config.name.eq_ignore_ascii_case(&config.name))
        {
            return Err(SupervisorError::DuplicateName(config.name));
        }

        let id = Uuid::new_v4();
        let running = self.spawn_job(id, config.clone());
        jobs.push(JobEntry {
            id,
            config,
            running: Some(running),
        });
        self.persist(&jobs)?;
        info!(%id, "job added");
        Ok(id)
    }

    /// Remove a job entirely, cancelling any in-flight work.
    ///
    /// The job's ledger file is left in the state dir; re-adding a job with
    /// the same name picks its history back up.
    pub async fn remove(&self, id: Uuid) -> Result<(), SupervisorError> {
        let mut jobs = self.jobs.lock().await;
        let index = jobs
            .iter()
            .position(|entry| entry.id == id)
            .ok_or(SupervisorError::UnknownJob(id))?;

        let entry = jobs.remove(index);
        if let Some(running) = entry.running {
            running.job.stop();
            let _ = running.handle.await;
        }
        self.persist(&jobs)?;
        info!(%id, name = %entry.config.name, "job removed");
        Ok(())
    }

    /// Stop a job's loop and cancel its in-flight encodes, keeping the
    /// entry. Stopped is not deleted: the config stays persisted and the
    /// job can be started again.
    pub async fn stop(&self, id: Uuid) -> Result<(), SupervisorError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(SupervisorError::UnknownJob(id))?;

        if let Some(running) = entry.running.take() {
            running.job.stop();
            let _ = running.handle.await;
            info!(%id, name = %entry.config.name, "job stopped");
        }
        Ok(())
    }

    /// Start a previously stopped job with a fresh loop (and a ledger
    /// reloaded from disk).
    pub async fn start(&self, id: Uuid) -> Result<(), SupervisorError> {
        let mut jobs = self.jobs.lock().await;
        let entry = jobs
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or(SupervisorError::UnknownJob(id))?;

        if entry.running.is_some() {
            return Err(SupervisorError::AlreadyRunning(entry.config.name.clone()));
        }
        entry.running = Some(self.spawn_job(entry.id, entry.config.clone()));
        info!(%id, name = %entry.config.name, "job started");
        Ok(())
    }

    /// Snapshots of all supervised jobs, running or stopped.
    pub async fn list(&self) -> Vec<JobSnapshot> {
        let jobs = self.jobs.lock().await;
        let mut snapshots = Vec::with_capacity(jobs.len());
        for entry in jobs.iter() {
            let status = match &entry.running {
                Some(running) => running.job.status_handle().read().await.clone(),
                None => stopped_status(),
            };
            snapshots.push(JobSnapshot {
                id: entry.id,
                name: entry.config.name.clone(),
                input_folder: entry.config.input_folder.clone(),
                output_folder: entry.config.output_folder.clone(),
                status,
            });
        }
        snapshots
    }

    /// Load persisted jobs and start the valid ones.
    ///
    /// One bad entry never prevents the others from starting; failures are
    /// reported per job.
    pub async fn restore(&self) -> Result<RestoreReport, SupervisorError> {
        let configs = self.store.load()?;
        let mut report = RestoreReport::default();

        let mut jobs = self.jobs.lock().await;
        for mut config in configs {
            config.normalize();
            if let Err(e) = config.validate() {
                warn!(name = %config.name, error = %e, "skipping persisted job");
                report.skipped.push((config.name.clone(), e.to_string()));
                continue;
            }
            if jobs
                .iter()
                .any(|entry| entry.config.name.eq_ignore_ascii_case(&config.name))
            {
                warn!(name = %config.name, "skipping persisted job with duplicate name");
                report
                    .skipped
                    .push((config.name.clone(), "duplicate name".to_string()));
                continue;
            }

            let id = Uuid::new_v4();
            let running = self.spawn_job(id, config.clone());
            jobs.push(JobEntry {
                id,
                config,
                running: Some(running),
            });
            report.started += 1;
        }

        info!(
            started = report.started,
            skipped = report.skipped.len(),
            "jobs restored"
        );
        Ok(report)
    }

    /// Stop every job. Used at daemon shutdown.
    pub async fn stop_all(&self) {
        let mut jobs = self.jobs.lock().await;
        for entry in jobs.iter_mut() {
            if let Some(running) = entry.running.take() {
                running.job.stop();
                let _ = running.handle.await;
            }
        }
        info!("all jobs stopped");
    }

    fn spawn_job(&self, id: Uuid, config: JobConfig) -> RunningJob {
        let job = WatchJob::new(
            id,
            config,
            self.executor.clone(),
            self.state_dir.clone(),
            self.stability_window,
            self.max_in_flight_per_job,
        );
        let handle = tokio::spawn(job.clone().run());
        RunningJob { job, handle }
    }

    fn persist(&self, jobs: &[JobEntry]) -> Result<(), StoreError> {
        let configs: Vec<JobConfig> = jobs.iter().map(|entry| entry.config.clone()).collect();
        self.store.save(&configs)
    }
}

fn stopped_status() -> JobStatus {
    JobStatus {
        state: JobState::Stopped,
        last_scan_unix_ms: None,
        in_flight: 0,
        completed: 0,
        failed: 0,
        deferred: 0,
        last_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provision::FfmpegLocator;
    use autotranscode_config::{AudioMode, VideoCodec};
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// In-memory store standing in for the JSON file.
    #[derive(Default)]
    struct MemoryStore {
        jobs: Mutex<Vec<JobConfig>>,
        saves: Mutex<usize>,
    }

    impl JobStore for MemoryStore {
        fn load(&self) -> Result<Vec<JobConfig>, StoreError> {
            Ok(self.jobs.lock().unwrap().clone())
        }

        fn save(&self, jobs: &[JobConfig]) -> Result<(), StoreError> {
            *self.jobs.lock().unwrap() = jobs.to_vec();
            *self.saves.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn job_config(dir: &Path, name: &str) -> JobConfig {
        JobConfig {
            name: name.to_string(),
            input_folder: dir.join(name).join("in"),
            output_folder: dir.join(name).join("out"),
            scan_interval_secs: 60,
            codec: VideoCodec::H265 { crf: 20 },
            audio: AudioMode::Aac,
            output_extension: ".mp4".to_string(),
        }
    }

    fn supervisor(dir: &Path, store: Arc<MemoryStore>) -> Supervisor {
        // No encoder needed: these tests never let a file reach ffmpeg.
        let locator = Arc::new(FfmpegLocator::bundled_only(dir.join("no-bin")));
        Supervisor::new(
            store,
            Arc::new(TranscodeExecutor::new(1, locator)),
            dir.join("state"),
            Duration::from_millis(10),
            4,
        )
    }

    #[tokio::test]
    async fn test_add_persists_and_lists_job() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let sup = supervisor(dir.path(), store.clone());

        let id = sup.add(job_config(dir.path(), "proxies")).await.unwrap();

        let listed = sup.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
        assert_eq!(listed[0].name, "proxies");

        let persisted = store.load().unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].name, "proxies");

        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let sup = supervisor(dir.path(), store.clone());

        let mut bad = job_config(dir.path(), "proxies");
        bad.scan_interval_secs = 0;

        assert!(matches!(
            sup.add(bad).await,
            Err(SupervisorError::Invalid(_))
        ));
        assert_eq!(*store.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_fills_default_container() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let sup = supervisor(dir.path(), store.clone());

        let mut config = job_config(dir.path(), "proxies");
        config.output_extension = String::new();
        sup.add(config).await.unwrap();

        // Persisted with the codec's conventional container filled in.
        let persisted = store.load().unwrap();
        assert_eq!(persisted[0].output_extension, ".mp4");

        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_add_rejects_unsupported_container() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let sup = supervisor(dir.path(), store.clone());

        let mut config = job_config(dir.path(), "proxies");
        config.output_extension = ".wmv".to_string();

        assert!(matches!(
            sup.add(config).await,
            Err(SupervisorError::Invalid(
                JobConfigError::UnsupportedContainer { .. }
            ))
        ));
        assert_eq!(*store.saves.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_name() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let sup = supervisor(dir.path(), store.clone());

        sup.add(job_config(dir.path(), "proxies")).await.unwrap();
        let duplicate = sup.add(job_config(dir.path(), "PROXIES")).await;
        assert!(matches!(
            duplicate,
            Err(SupervisorError::DuplicateName(_))
        ));

        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_remove_cancels_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let sup = supervisor(dir.path(), store.clone());

        let keep = sup.add(job_config(dir.path(), "keep")).await.unwrap();
        let gone = sup.add(job_config(dir.path(), "gone")).await.unwrap();

        sup.remove(gone).await.unwrap();

        let listed = sup.list().await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep);
        assert_eq!(store.load().unwrap().len(), 1);

        assert!(matches!(
            sup.remove(gone).await,
            Err(SupervisorError::UnknownJob(_))
        ));

        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_stop_keeps_entry_and_start_revives_it() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let sup = supervisor(dir.path(), store.clone());

        let id = sup.add(job_config(dir.path(), "proxies")).await.unwrap();
        sup.stop(id).await.unwrap();

        let listed = sup.list().await;
        assert_eq!(listed[0].status.state, JobState::Stopped);
        // Still persisted: stopped is not deleted.
        assert_eq!(store.load().unwrap().len(), 1);

        sup.start(id).await.unwrap();
        let listed = sup.list().await;
        assert_ne!(listed[0].status.state, JobState::Stopped);

        assert!(matches!(
            sup.start(id).await,
            Err(SupervisorError::AlreadyRunning(_))
        ));

        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_restore_skips_invalid_entries() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());

        let mut bad = job_config(dir.path(), "broken");
        bad.output_folder = bad.input_folder.clone();
        store
            .save(&[job_config(dir.path(), "good"), bad, job_config(dir.path(), "also-good")])
            .unwrap();

        let sup = supervisor(dir.path(), store.clone());
        let report = sup.restore().await.unwrap();

        assert_eq!(report.started, 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0, "broken");

        let names: Vec<String> = sup.list().await.into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["good", "also-good"]);

        sup.stop_all().await;
    }

    #[tokio::test]
    async fn test_stop_all_stops_every_job() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::default());
        let sup = supervisor(dir.path(), store.clone());

        sup.add(job_config(dir.path(), "a")).await.unwrap();
        sup.add(job_config(dir.path(), "b")).await.unwrap();
        sup.stop_all().await;

        for snapshot in sup.list().await {
            assert_eq!(snapshot.status.state, JobState::Stopped);
        }
    }
}
