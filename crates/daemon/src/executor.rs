//! Transcode executor module.
//!
//! Runs individual ffmpeg transcodes under a global admission gate: a
//! machine-wide semaphore caps how many encoder processes run at once, and
//! queued tasks are admitted in FIFO order across all watch jobs. Each
//! execution supervises one child process, encodes into a temp sibling and
//! renames it into place only on success.

use crate::catalog;
use crate::outcome::{FailureCategory, TranscodeOutcome};
use crate::provision::FfmpegLocator;
use autotranscode_config::{AudioMode, VideoCodec};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How much of the encoder's stderr to keep for failure messages.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// How long to wait for the child to die after a kill before giving up.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Suffix for in-flight output files. Falls outside the accepted input
/// extensions, so a job scanning its own output folder never picks one up.
const PART_SUFFIX: &str = ".part";

/// One file transcode, with all settings copied at submission time so a
/// concurrent job edit cannot change an in-flight task.
#[derive(Debug, Clone)]
pub struct TranscodeTask {
    /// Identifier of the submitting watch job (for logging and status).
    pub job_id: Uuid,
    pub job_name: String,
    /// Full path to the source file.
    pub source: PathBuf,
    /// Final output path, extension included.
    pub dest: PathBuf,
    pub codec: VideoCodec,
    pub audio: AudioMode,
}

/// Executor shared by all watch jobs.
pub struct TranscodeExecutor {
    semaphore: Arc<Semaphore>,
    locator: Arc<FfmpegLocator>,
    slots: usize,
}

impl TranscodeExecutor {
    /// Create an executor with `slots` concurrent encode slots.
    pub fn new(slots: usize, locator: Arc<FfmpegLocator>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(slots)),
            locator,
            slots,
        }
    }

    /// Total encode slots.
    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Slots not currently held by a running encode.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run one transcode to completion.
    ///
    /// Blocks in the admission queue until a slot frees up; tokio's
    /// semaphore wakes waiters in FIFO order, so tasks start in the order
    /// they were submitted regardless of which job submitted them.
    /// Cancellation is honoured both while queued and mid-encode.
    pub async fn execute(&self, task: TranscodeTask, cancel: CancellationToken) -> TranscodeOutcome {
        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => {
                    return TranscodeOutcome::failed(
                        FailureCategory::Cancelled,
                        "executor shut down",
                    )
                }
            },
            _ = cancel.cancelled() => {
                debug!(job = %task.job_name, source = %task.source.display(), "cancelled while queued");
                return TranscodeOutcome::failed(FailureCategory::Cancelled, "cancelled while queued");
            }
        };
        let _permit = permit;

        let ffmpeg = match self.locator.locate() {
            Ok(path) => path,
            Err(e) => {
                return TranscodeOutcome::failed(FailureCategory::EncoderUnavailable, e.to_string())
            }
        };

        let args = match catalog::transcode_args(&task.codec, task.audio) {
            Ok(args) => args,
            Err(e) => return TranscodeOutcome::failed(FailureCategory::EncodeFailed, e.to_string()),
        };

        // Output folder may not exist yet (or the volume was remounted).
        if let Some(parent) = task.dest.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return TranscodeOutcome::failed(
                    FailureCategory::IoError,
                    format!("cannot create output folder: {}", e),
                );
            }
        }

        let temp = part_path(&task.dest);
        let started = Instant::now();
        info!(
            job = %task.job_name,
            source = %task.source.display(),
            dest = %task.dest.display(),
            "starting encode"
        );

        let mut cmd = Command::new(&ffmpeg);
        cmd.arg("-hide_banner")
            .arg("-nostdin")
            .arg("-y")
            .arg("-i")
            .arg(&task.source)
            .args(&args)
            .arg("-f")
            .arg(muxer_for_dest(&task.dest))
            .arg(&temp)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return TranscodeOutcome::failed(
                    FailureCategory::IoError,
                    format!("failed to spawn ffmpeg: {}", e),
                )
            }
        };

        // Drain stderr concurrently, keeping only the tail. An encoder that
        // fills the pipe would otherwise deadlock against our wait().
        let stderr = child.stderr.take();
        let tail_task = tokio::spawn(async move {
            let mut tail: Vec<u8> = Vec::new();
            if let Some(mut stderr) = stderr {
                let mut buf = [0u8; 4096];
                loop {
                    match stderr.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            tail.extend_from_slice(&buf[..n]);
                            if tail.len() > STDERR_TAIL_BYTES {
                                let excess = tail.len() - STDERR_TAIL_BYTES;
                                tail.drain(..excess);
                            }
                        }
                    }
                }
            }
            String::from_utf8_lossy(&tail).into_owned()
        });

        let status = tokio::select! {
            status = child.wait() => status,
            _ = cancel.cancelled() => {
                info!(job = %task.job_name, source = %task.source.display(), "killing encode on cancel");
                let _ = child.start_kill();
                let _ = tokio::time::timeout(KILL_GRACE, child.wait()).await;
                tail_task.abort();
                let _ = tokio::fs::remove_file(&temp).await;
                return TranscodeOutcome::failed(
                    FailureCategory::Cancelled,
                    "cancelled while encoding",
                );
            }
        };

        let stderr_tail = tail_task.await.unwrap_or_default();

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                let _ = tokio::fs::remove_file(&temp).await;
                return TranscodeOutcome::failed(
                    FailureCategory::IoError,
                    format!("failed waiting on ffmpeg: {}", e),
                );
            }
        };

        if !status.success() {
            let _ = tokio::fs::remove_file(&temp).await;
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            warn!(
                job = %task.job_name,
                source = %task.source.display(),
                exit = %code,
                "encode failed"
            );
            return TranscodeOutcome::failed(
                FailureCategory::EncodeFailed,
                format!("ffmpeg exited with {}: {}", code, stderr_tail.trim()),
            );
        }

        // Publish atomically so downstream watchers of the output folder
        // never see a half-written file under its final name.
        if let Err(e) = tokio::fs::rename(&temp, &task.dest).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return TranscodeOutcome::failed(
                FailureCategory::IoError,
                format!("failed to move output into place: {}", e),
            );
        }

        let duration = started.elapsed();
        info!(
            job = %task.job_name,
            dest = %task.dest.display(),
            secs = duration.as_secs(),
            "encode finished"
        );
        TranscodeOutcome::Succeeded {
            output: task.dest,
            duration,
        }
    }
}

/// Temp sibling path for an in-flight encode: `clip.mp4` -> `clip.mp4.part`.
pub fn part_path(dest: &Path) -> PathBuf {
    let mut os = dest.as_os_str().to_owned();
    os.push(PART_SUFFIX);
    PathBuf::from(os)
}

/// ffmpeg muxer name for the destination container.
///
/// ffmpeg normally infers the muxer from the output extension, but the temp
/// file ends in `.part`, so the format has to be passed explicitly. Job
/// validation restricts destinations to mp4/mkv/mov/mxf; only mkv needs a
/// name that differs from its extension.
fn muxer_for_dest(dest: &Path) -> String {
    let ext = dest
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("mp4")
        .to_ascii_lowercase();
    match ext.as_str() {
        "mkv" => "matroska".to_string(),
        other => other.to_string(),
    }
}
