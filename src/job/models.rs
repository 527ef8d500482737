/*!
 * Job data model and host-facing event payloads.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::subtitle_processor::SubtitleCollection;
use crate::translation::batcher::{Batch, BatchStatus};

/// Longest batch error shown in `batch_status` events
pub const ERROR_MSG_DISPLAY_LIMIT: usize = 200;

/// Lifecycle of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Done,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error | JobStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a job, returned by value to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: String,
    pub file_id: String,
    pub status: JobStatus,

    /// Fraction of cues translated, 0.0..=1.0
    pub progress: f64,

    pub done_cues: usize,
    pub total_cues: usize,

    /// 0 until the job starts
    pub total_batches: usize,
    pub failed_batches: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,

    /// Set when the job finishes successfully
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,

    /// Set when the job fails
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobInfo {
    pub fn new(id: String, file_id: String, total_cues: usize) -> Self {
        Self {
            id,
            file_id,
            status: JobStatus::Queued,
            progress: 0.0,
            done_cues: 0,
            total_cues,
            total_batches: 0,
            failed_batches: 0,
            eta_seconds: None,
            output_path: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Result of importing a subtitle file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub id: String,
    pub cue_count: usize,
}

/// A parsed subtitle file waiting to be used by jobs
#[derive(Debug, Clone)]
pub struct ImportedFile {
    pub id: String,

    /// Where the file came from; output names are derived from it
    pub source_path: PathBuf,

    pub collection: SubtitleCollection,
}

impl ImportedFile {
    pub fn cue_count(&self) -> usize {
        self.collection.cues.len()
    }

    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            id: self.id.clone(),
            cue_count: self.cue_count(),
        }
    }
}

/// Coarse phase reported with progress events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Queued,
    Translating,
    Writing,
    Done,
    Cancelled,
    Error,
}

/// `progress` event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub job_id: String,
    pub done_cues: usize,
    pub total_cues: usize,
    pub percent: f32,
    pub eta_seconds: Option<u64>,
    pub stage: Stage,
    /// Batches currently running
    pub active_threads: usize,
}

/// `batch_status` event payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchInfo {
    pub job_id: String,
    pub batch_no: usize,
    pub total_batches: usize,
    pub status: BatchStatus,
    pub cue_start: usize,
    pub cue_end: usize,

    /// Failure message shortened for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,

    /// Full failure message
    #[serde(skip)]
    pub error_detail: Option<String>,

    /// Attempts made so far
    pub attempts: u32,
}

impl BatchInfo {
    pub fn from_batch(job_id: &str, batch: &Batch, attempts: u32) -> Self {
        Self {
            job_id: job_id.to_string(),
            batch_no: batch.batch_no,
            total_batches: batch.total_batches,
            status: batch.status,
            cue_start: batch.core.start,
            cue_end: batch.core.end,
            error_msg: batch.error_msg.as_deref().map(truncate_for_display),
            error_detail: batch.error_msg.clone(),
            attempts,
        }
    }
}

/// Events pushed to the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Progress(ProgressEvent),
    BatchStatus(BatchInfo),
    Finished { job_id: String, output_path: PathBuf },
    Error { job_id: String, message: String },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            JobEvent::Progress(p) => &p.job_id,
            JobEvent::BatchStatus(b) => &b.job_id,
            JobEvent::Finished { job_id, .. } | JobEvent::Error { job_id, .. } => job_id,
        }
    }

    /// Whether this is the last event a job emits
    pub fn is_terminal(&self) -> bool {
        match self {
            JobEvent::Finished { .. } | JobEvent::Error { .. } => true,
            JobEvent::Progress(p) => p.stage == Stage::Cancelled,
            JobEvent::BatchStatus(_) => false,
        }
    }
}

/// Shorten a message to `ERROR_MSG_DISPLAY_LIMIT` chars, adding an ellipsis
pub fn truncate_for_display(message: &str) -> String {
    let message = message.trim();
    if message.chars().count() <= ERROR_MSG_DISPLAY_LIMIT {
        return message.to_string();
    }
    let mut short: String = message.chars().take(ERROR_MSG_DISPLAY_LIMIT - 1).collect();
    short.push('…');
    short
}

/// First 8 chars of an id, for log lines
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}
