//! Scan job state: the `pending -> running -> {completed, failed, cancelled}`
//! lifecycle, the signals/rejections a scan accumulates, and the cooperative
//! cancellation flag workers poll between pipeline stages.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use confluence_scorer::ScoreTrace;
use market_types::{Direction, ModeProfile};
use position_sizer::PositionSize;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Request parameters for [`crate::orchestrator::ScanOrchestrator::create_scan`].
#[derive(Debug, Clone)]
pub struct ScanParams {
    /// Explicit symbol list. When `None`, the orchestrator asks the adapter
    /// for `limit` top symbols by quote volume.
    pub symbols: Option<Vec<String>>,
    pub limit: Option<usize>,
    pub min_score: Option<f64>,
    pub mode_profile: ModeProfile,
    pub leverage: f64,
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub trace: ScoreTrace,
    pub position: PositionSize,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub symbol: String,
    pub direction: Option<Direction>,
    pub stage: &'static str,
    pub reason: String,
}

/// Rejection counts, keyed by the stable [`market_types::ScanError::reason_code`]
/// strings (plus a handful of pipeline-local stage names such as `"threshold"`
/// and `"scorer_blocked"` that never round-trip through `ScanError`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct RejectionSummary {
    pub total: usize,
    pub by_reason: HashMap<String, usize>,
}

impl RejectionSummary {
    fn record(&mut self, reason_code: &str) {
        self.total += 1;
        *self.by_reason.entry(reason_code.to_string()).or_insert(0) += 1;
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub run_id: Uuid,
    pub status: JobStatus,
    pub progress: usize,
    pub total: usize,
    pub current_symbol: Option<String>,
    pub signals: Vec<Signal>,
    pub rejections: RejectionSummary,
    pub metadata: serde_json::Value,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    fn new(run_id: Uuid, total: usize) -> Self {
        Self {
            run_id,
            status: JobStatus::Pending,
            progress: 0,
            total,
            current_symbol: None,
            signals: Vec::new(),
            rejections: RejectionSummary::default(),
            metadata: serde_json::json!({}),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Shared handle a worker pool mutates and the job facade reads back.
/// Cancellation is a flag, not a channel close: workers observe it between
/// stages and between symbols, so suspension is always cooperative.
pub struct JobState {
    job: Mutex<Job>,
    cancelled: AtomicBool,
}

impl JobState {
    pub fn new(run_id: Uuid, total: usize) -> Self {
        Self { job: Mutex::new(Job::new(run_id, total)), cancelled: AtomicBool::new(false) }
    }

    pub fn set_running(&self) {
        self.job.lock().unwrap().status = JobStatus::Running;
    }

    pub fn set_current_symbol(&self, symbol: Option<String>) {
        self.job.lock().unwrap().current_symbol = symbol;
    }

    /// Updates the expected symbol count once the scan's symbol list is
    /// resolved (it may have been unknown when the job was created, e.g. for
    /// a "top N by volume" request).
    pub fn set_total(&self, total: usize) {
        self.job.lock().unwrap().total = total;
    }

    pub fn push_signal(&self, signal: Signal) {
        let mut job = self.job.lock().unwrap();
        job.signals.push(signal);
        job.progress += 1;
    }

    pub fn push_rejection(&self, rejection: Rejection, reason_code: &str) {
        let mut job = self.job.lock().unwrap();
        job.rejections.record(reason_code);
        job.progress += 1;
        tracing::debug!(symbol = %rejection.symbol, stage = rejection.stage, reason = %rejection.reason, "symbol rejected");
    }

    pub fn finish(&self, status: JobStatus, error: Option<String>) {
        let mut job = self.job.lock().unwrap();
        job.status = status;
        job.error = error;
        job.finished_at = Some(Utc::now());
        job.current_symbol = None;
    }

    pub fn request_cancel(&self) -> bool {
        let already_terminal = {
            let job = self.job.lock().unwrap();
            matches!(job.status, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
        };
        if already_terminal {
            return false;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> Job {
        self.job.lock().unwrap().clone()
    }
}
