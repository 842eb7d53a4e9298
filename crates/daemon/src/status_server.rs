//! Status HTTP server.
//!
//! Read-only JSON view of the daemon for dashboards and scripts: per-job
//! state and counters plus system resource metrics. Serving this has no
//! effect on job behavior.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::executor::TranscodeExecutor;
use crate::supervisor::{JobSnapshot, Supervisor};

/// Errors that can occur when running the status server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind status server: {0}")]
    Bind(#[from] std::io::Error),
}

/// System-level metrics for resource monitoring
#[derive(Debug, Clone, Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub mem_usage_percent: f32,
    pub load_avg_1: f32,
    pub load_avg_5: f32,
    pub load_avg_15: f32,
}

/// Complete status snapshot served at GET /status
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub timestamp_unix_ms: i64,
    /// Global encode slots and how many are currently free.
    pub encode_slots: usize,
    pub available_slots: usize,
    pub jobs: Vec<JobSnapshot>,
    pub system: SystemMetrics,
}

/// Collects current system metrics using sysinfo
pub fn collect_system_metrics() -> SystemMetrics {
    use sysinfo::System;

    let mut sys = System::new();
    sys.refresh_cpu_usage();
    sys.refresh_memory();

    let cpu_usage = sys.global_cpu_usage();
    let total_memory = sys.total_memory();
    let used_memory = sys.used_memory();
    let mem_usage = if total_memory > 0 {
        (used_memory as f64 / total_memory as f64 * 100.0) as f32
    } else {
        0.0
    };

    let load_avg = System::load_average();

    SystemMetrics {
        cpu_usage_percent: cpu_usage,
        mem_usage_percent: mem_usage,
        load_avg_1: load_avg.one as f32,
        load_avg_5: load_avg.five as f32,
        load_avg_15: load_avg.fifteen as f32,
    }
}

#[derive(Clone)]
struct AppState {
    supervisor: Arc<Supervisor>,
    executor: Arc<TranscodeExecutor>,
}

/// Handler for GET /status endpoint
async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    let jobs = state.supervisor.list().await;
    Json(StatusSnapshot {
        timestamp_unix_ms: now_unix_ms(),
        encode_slots: state.executor.slots(),
        available_slots: state.executor.available_permits(),
        jobs,
        system: collect_system_metrics(),
    })
}

/// Creates the axum Router with the status endpoint
pub fn create_status_router(
    supervisor: Arc<Supervisor>,
    executor: Arc<TranscodeExecutor>,
) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .with_state(AppState {
            supervisor,
            executor,
        })
}

/// Runs the status HTTP server until the process exits.
pub async fn run_status_server(
    supervisor: Arc<Supervisor>,
    executor: Arc<TranscodeExecutor>,
    addr: SocketAddr,
) -> Result<(), ServerError> {
    let app = create_status_router(supervisor, executor);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "status server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn now_unix_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
