/*!
 * Progress and ETA aggregation for a running job.
 *
 * `done_cues` is summed over batches that reached `Done`, never over
 * arrival order. The ETA is an exponential moving average of per-batch
 * wall time, scaled by the batches left and the concurrency they can use.
 */

use std::time::Duration;

use super::models::{ProgressEvent, Stage};

/// Weight of the newest sample in the moving average
const EMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total_cues: usize,
    total_batches: usize,
    threads: usize,
    done_cues: usize,
    finished_batches: usize,
    avg_batch_secs: Option<f64>,
    last_emitted_done: Option<usize>,
}

impl ProgressTracker {
    pub fn new(total_cues: usize, total_batches: usize, threads: usize) -> Self {
        Self {
            total_cues,
            total_batches,
            threads: threads.max(1),
            done_cues: 0,
            finished_batches: 0,
            avg_batch_secs: None,
            last_emitted_done: None,
        }
    }

    /// Account for a batch reaching a terminal state after `elapsed`
    pub fn record_batch(&mut self, core_cues: usize, succeeded: bool, elapsed: Duration) {
        if succeeded {
            self.done_cues = (self.done_cues + core_cues).min(self.total_cues);
        }
        self.finished_batches = (self.finished_batches + 1).min(self.total_batches);

        let sample = elapsed.as_secs_f64();
        self.avg_batch_secs = Some(match self.avg_batch_secs {
            Some(avg) => EMA_ALPHA * sample + (1.0 - EMA_ALPHA) * avg,
            None => sample,
        });
    }

    pub fn done_cues(&self) -> usize {
        self.done_cues
    }

    pub fn remaining_batches(&self) -> usize {
        self.total_batches - self.finished_batches
    }

    /// Fraction translated, 0.0..=1.0
    pub fn fraction(&self) -> f64 {
        if self.total_cues == 0 {
            return 0.0;
        }
        self.done_cues as f64 / self.total_cues as f64
    }

    pub fn percent(&self) -> f32 {
        (self.fraction() * 100.0) as f32
    }

    /// Seconds left; `None` until the first batch finishes
    pub fn eta_seconds(&self) -> Option<u64> {
        let remaining = self.remaining_batches();
        if remaining == 0 {
            return Some(0);
        }
        let avg = self.avg_batch_secs?;
        let lanes = self.threads.min(remaining) as f64;
        Some((avg * remaining as f64 / lanes).ceil() as u64)
    }

    /// Build a progress event unless it would report fewer done cues than
    /// the previous one
    pub fn event(&mut self, job_id: &str, stage: Stage, active_threads: usize) -> Option<ProgressEvent> {
        if self.last_emitted_done.is_some_and(|last| self.done_cues < last) {
            return None;
        }
        self.last_emitted_done = Some(self.done_cues);

        Some(ProgressEvent {
            job_id: job_id.to_string(),
            done_cues: self.done_cues,
            total_cues: self.total_cues,
            percent: self.percent(),
            eta_seconds: self.eta_seconds(),
            stage,
            active_threads,
        })
    }
}
