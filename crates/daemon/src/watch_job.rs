//! Watch job module.
//!
//! One watch job owns one input-folder-to-output-folder pipeline: a
//! periodic tick lists the input folder, waits out the stability window for
//! new files, and dispatches eligible ones to the shared executor. Each
//! dispatched file runs as a detached task; the tick loop never blocks on
//! encode completion.

use crate::executor::{TranscodeExecutor, TranscodeTask};
use crate::ledger::Ledger;
use crate::outcome::{SkipReason, TranscodeOutcome};
use crate::scan::{self, ScanCandidate};
use crate::stability::{self, StabilityResult};
use autotranscode_config::JobConfig;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Where a job currently is in its tick cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for the next scheduled tick.
    Idle,
    /// Listing the input folder and waiting out stability windows.
    Scanning,
    /// Handing eligible files to the executor.
    Dispatching,
    /// Tick loop ended (stopped by the supervisor).
    Stopped,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Scanning => "scanning",
            JobState::Dispatching => "dispatching",
            JobState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of one job, published for the status server.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub state: JobState,
    pub last_scan_unix_ms: Option<i64>,
    /// Files currently queued or encoding.
    pub in_flight: usize,
    /// Files transcoded successfully since this job loop started.
    pub completed: u64,
    /// Failed attempts since this job loop started.
    pub failed: u64,
    /// Candidates seen but not dispatched on the most recent tick
    /// (still writing, or over the per-job cap).
    pub deferred: usize,
    pub last_error: Option<String>,
}

impl JobStatus {
    fn new() -> Self {
        Self {
            state: JobState::Idle,
            last_scan_unix_ms: None,
            in_flight: 0,
            completed: 0,
            failed: 0,
            deferred: 0,
            last_error: None,
        }
    }
}

pub type SharedJobStatus = Arc<RwLock<JobStatus>>;

/// Stable on-disk key for a job, derived from its (unique) name.
///
/// Job ids are assigned fresh at startup, so the ledger file has to be
/// keyed by something that survives restarts.
pub fn job_key(name: &str) -> String {
    let key: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = key.trim_matches('-');
    if trimmed.is_empty() {
        "job".to_string()
    } else {
        trimmed.to_string()
    }
}

/// One running watch job.
pub struct WatchJob {
    pub id: Uuid,
    pub config: JobConfig,
    status: SharedJobStatus,
    ledger: Mutex<Ledger>,
    in_flight: Mutex<HashSet<String>>,
    executor: Arc<TranscodeExecutor>,
    state_dir: PathBuf,
    stability_window: Duration,
    max_in_flight: usize,
    cancel: CancellationToken,
}

impl WatchJob {
    pub fn new(
        id: Uuid,
        config: JobConfig,
        executor: Arc<TranscodeExecutor>,
        state_dir: PathBuf,
        stability_window: Duration,
        max_in_flight: usize,
    ) -> Arc<Self> {
        let ledger = Ledger::load(&state_dir, &job_key(&config.name));
        Arc::new(Self {
            id,
            config,
            status: Arc::new(RwLock::new(JobStatus::new())),
            ledger: Mutex::new(ledger),
            in_flight: Mutex::new(HashSet::new()),
            executor,
            state_dir,
            stability_window,
            max_in_flight,
            cancel: CancellationToken::new(),
        })
    }

    pub fn status_handle(&self) -> SharedJobStatus {
        self.status.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the tick loop and cancel in-flight encodes.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Tick loop. Runs until cancelled; does not return early on per-file
    /// failures.
    pub async fn run(self: Arc<Self>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.scan_interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = self.cancel.cancelled() => break,
            }
            self.tick().await;
            if self.cancel.is_cancelled() {
                break;
            }
        }

        self.status.write().await.state = JobState::Stopped;
        debug!(job = %self.config.name, "watch job stopped");
    }

    /// One scan-and-dispatch cycle.
    async fn tick(self: &Arc<Self>) {
        {
            let mut status = self.status.write().await;
            status.state = JobState::Scanning;
            status.last_scan_unix_ms = Some(now_unix_ms());
        }

        let candidates = match scan::list_candidates(&self.config.input_folder) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(job = %self.config.name, error = %e, "input folder scan failed");
                let mut status = self.status.write().await;
                status.last_error = Some(format!("scan failed: {}", e));
                status.state = JobState::Idle;
                return;
            }
        };

        // Drop settled and in-flight files before paying for stability
        // windows; the slot cap is applied after stability below.
        let fresh = {
            let ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
            let in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            let prefilter = scan::plan_tick(candidates, &ledger, &in_flight, usize::MAX);
            for candidate in &prefilter.settled {
                self.note_skip(&candidate.file_name, SkipReason::AlreadyProcessed);
            }
            prefilter.eligible
        };

        let (stable, still_writing) = self.await_stability(fresh).await;
        if self.cancel.is_cancelled() {
            self.status.write().await.state = JobState::Idle;
            return;
        }

        let plan = {
            let ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            let slots = self.max_in_flight.saturating_sub(in_flight.len());
            let plan = scan::plan_tick(stable, &ledger, &in_flight, slots);
            for candidate in &plan.eligible {
                in_flight.insert(candidate.file_name.clone());
            }
            plan
        };

        {
            let mut status = self.status.write().await;
            status.state = JobState::Dispatching;
            status.deferred = plan.deferred.len() + still_writing;
        }

        for candidate in plan.eligible {
            self.dispatch(candidate);
        }

        let mut status = self.status.write().await;
        status.in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).len();
        status.state = JobState::Idle;
    }

    /// Run stability checks for all candidates concurrently, keeping the
    /// original (file-name) order of the survivors. Also returns how many
    /// candidates were still being written, so the tick can count them as
    /// deferred.
    async fn await_stability(&self, candidates: Vec<ScanCandidate>) -> (Vec<ScanCandidate>, usize) {
        let mut handles = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let path = candidate.path.clone();
            let size = candidate.size_bytes;
            let mtime = candidate.modified_time;
            let window = self.stability_window;
            handles.push(tokio::spawn(async move {
                stability::check_stability(&path, size, mtime, window).await
            }));
        }

        let mut stable = Vec::new();
        let mut still_writing = 0;
        for (candidate, handle) in candidates.into_iter().zip(handles) {
            match handle.await {
                Ok(Ok(StabilityResult::Stable)) => stable.push(candidate),
                Ok(Ok(StabilityResult::Unstable { .. })) => {
                    still_writing += 1;
                    self.note_skip(&candidate.file_name, SkipReason::StillWriting);
                }
                Ok(Err(e)) => {
                    debug!(
                        job = %self.config.name,
                        file = %candidate.file_name,
                        error = %e,
                        "candidate vanished during stability window"
                    );
                }
                Err(_) => {}
            }
        }
        (stable, still_writing)
    }

    /// Log a file that was seen but not submitted this tick.
    fn note_skip(&self, file_name: &str, reason: SkipReason) {
        let outcome = TranscodeOutcome::Skipped { reason };
        debug!(
            job = %self.config.name,
            file = %file_name,
            outcome = ?outcome,
            "file not submitted this tick"
        );
    }

    /// Spawn a detached task for one eligible file.
    fn dispatch(self: &Arc<Self>, candidate: ScanCandidate) {
        let dest = scan::build_output_path(
            &candidate.path,
            &self.config.output_folder,
            &self.config.output_extension,
        );
        let task = TranscodeTask {
            job_id: self.id,
            job_name: self.config.name.clone(),
            source: candidate.path.clone(),
            dest,
            codec: self.config.codec.clone(),
            audio: self.config.audio,
        };

        let job = self.clone();
        let cancel = self.cancel.child_token();
        tokio::spawn(async move {
            let identity = candidate.identity();
            let file_name = candidate.file_name;
            let outcome = job.executor.execute(task, cancel).await;
            job.finish_file(&file_name, identity, &outcome).await;
        });
    }

    /// Bookkeeping after one file's attempt finishes.
    async fn finish_file(
        &self,
        file_name: &str,
        identity: crate::ledger::FileIdentity,
        outcome: &TranscodeOutcome,
    ) {
        {
            let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
            ledger.record(identity, outcome);
            if let Err(e) = ledger.save(&self.state_dir, &job_key(&self.config.name)) {
                warn!(job = %self.config.name, error = %e, "failed to persist ledger");
            }
        }

        let in_flight = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            in_flight.remove(file_name);
            in_flight.len()
        };

        let mut status = self.status.write().await;
        status.in_flight = in_flight;
        match outcome {
            TranscodeOutcome::Succeeded { .. } => status.completed += 1,
            TranscodeOutcome::Failed { category, message } if !outcome.is_cancelled() => {
                status.failed += 1;
                status.last_error = Some(format!("{}: {} ({})", file_name, message, category));
            }
            _ => {}
        }
    }
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
