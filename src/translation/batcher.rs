/*!
 * Batch construction.
 *
 * Cues are grouped into core windows of `batch_size` cues, each carrying a
 * few neighbouring cues as read-only context. A window whose masked text
 * would exceed `max_chars_per_request` is split again at cue boundaries.
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

use crate::app_config::BatchConfig;
use crate::subtitle_processor::Cue;

use super::formatting::TagGuard;

/// Inclusive range of cue indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CueRange {
    pub start: usize,
    pub end: usize,
}

impl CueRange {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..=self.end).contains(&index)
    }

    pub fn indices(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }
}

impl fmt::Display for CueRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}-{}]", self.start, self.end)
    }
}

/// Lifecycle of a batch; only ever moves forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BatchStatus::Done | BatchStatus::Error)
    }

    /// Whether `next` is a legal successor of this status
    pub fn can_advance_to(self, next: BatchStatus) -> bool {
        matches!(
            (self, next),
            (BatchStatus::Pending, BatchStatus::Running)
                | (BatchStatus::Running, BatchStatus::Done)
                | (BatchStatus::Running, BatchStatus::Error)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BatchStatus::Pending => "pending",
            BatchStatus::Running => "running",
            BatchStatus::Done => "done",
            BatchStatus::Error => "error",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unit of translation, retry and progress reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// 1-based, sequential
    pub batch_no: usize,

    /// Fixed once the job's batches are computed
    pub total_batches: usize,

    /// Cues translated by this batch
    pub core: CueRange,

    /// Preceding cues sent as context only
    pub context_before: Option<CueRange>,

    /// Following cues sent as context only
    pub context_after: Option<CueRange>,

    pub status: BatchStatus,

    /// Last failure message, set when the batch ends in error
    pub error_msg: Option<String>,
}

impl Batch {
    /// Number of cues translated by this batch
    pub fn core_len(&self) -> usize {
        self.core.len()
    }

    /// Move to `next` if the transition is legal; returns whether it moved
    pub fn advance(&mut self, next: BatchStatus) -> bool {
        if self.status.can_advance_to(next) {
            self.status = next;
            true
        } else {
            false
        }
    }
}

/// Split `cues` into batches.
///
/// Core ranges partition the cue sequence exactly. A single cue is always
/// accepted even if it alone exceeds the character ceiling.
pub fn split(cues: &[Cue], config: &BatchConfig) -> Vec<Batch> {
    if cues.is_empty() {
        return Vec::new();
    }

    let batch_size = config.batch_size.max(1);
    let sizes: Vec<usize> = cues
        .iter()
        .map(|cue| TagGuard::mask(&cue.original_text).0.chars().count())
        .collect();

    let mut ranges: Vec<CueRange> = Vec::new();
    let mut window_start = 0usize;

    while window_start < cues.len() {
        let window_end = (window_start + batch_size).min(cues.len()) - 1;
        split_window(window_start, window_end, &sizes, config, &mut ranges);
        window_start = window_end + 1;
    }

    let total_batches = ranges.len();
    ranges
        .into_iter()
        .enumerate()
        .map(|(i, core)| Batch {
            batch_no: i + 1,
            total_batches,
            core,
            context_before: context_before(core, config.context_before),
            context_after: context_after(core, config.context_after, cues.len()),
            status: BatchStatus::Pending,
            error_msg: None,
        })
        .collect()
}

/// Greedily cut `[start, end]` into the longest runs whose request fits
fn split_window(start: usize, end: usize, sizes: &[usize], config: &BatchConfig, out: &mut Vec<CueRange>) {
    let mut sub_start = start;

    while sub_start <= end {
        let mut sub_end = sub_start;
        while sub_end < end {
            let candidate = CueRange::new(sub_start, sub_end + 1);
            if request_chars(candidate, sizes, config) > config.max_chars_per_request {
                break;
            }
            sub_end += 1;
        }

        out.push(CueRange::new(sub_start, sub_end));
        sub_start = sub_end + 1;
    }
}

/// Masked characters of core plus context for `core`
fn request_chars(core: CueRange, sizes: &[usize], config: &BatchConfig) -> usize {
    let before = context_before(core, config.context_before);
    let after = context_after(core, config.context_after, sizes.len());

    [Some(core), before, after]
        .into_iter()
        .flatten()
        .flat_map(|range| range.indices())
        .map(|i| sizes[i])
        .sum()
}

fn context_before(core: CueRange, count: usize) -> Option<CueRange> {
    if count == 0 || core.start == 0 {
        return None;
    }
    Some(CueRange::new(core.start.saturating_sub(count), core.start - 1))
}

fn context_after(core: CueRange, count: usize, total: usize) -> Option<CueRange> {
    if count == 0 || core.end + 1 >= total {
        return None;
    }
    Some(CueRange::new(core.end + 1, (core.end + count).min(total - 1)))
}
