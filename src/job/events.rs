/*!
 * Event delivery to the host.
 *
 * Delivery is best effort and at most once: a sink that cannot deliver
 * drops the event. Sinks are called while the job's state lock is held,
 * so they must not block.
 */

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use super::models::{short_id, JobEvent, Stage};

/// Receiver of job events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: JobEvent);
}

/// Forwards events over an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: UnboundedSender<JobEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<JobEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelSink {
    fn emit(&self, event: JobEvent) {
        if self.sender.send(event).is_err() {
            debug!("Event receiver dropped; discarding event");
        }
    }
}

/// Writes events to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: JobEvent) {
        match &event {
            JobEvent::Progress(p) => debug!(
                "[{}] {:?} {}/{} cues ({:.1}%), {} active",
                short_id(&p.job_id),
                p.stage,
                p.done_cues,
                p.total_cues,
                p.percent,
                p.active_threads
            ),
            JobEvent::BatchStatus(b) => match &b.error_msg {
                Some(msg) => warn!(
                    "[{}] batch {}/{} {}: {}",
                    short_id(&b.job_id),
                    b.batch_no,
                    b.total_batches,
                    b.status,
                    msg
                ),
                None => debug!(
                    "[{}] batch {}/{} {}",
                    short_id(&b.job_id),
                    b.batch_no,
                    b.total_batches,
                    b.status
                ),
            },
            JobEvent::Finished { job_id, output_path } => {
                info!("[{}] finished: {}", short_id(job_id), output_path.display())
            }
            JobEvent::Error { job_id, message } => error!("[{}] failed: {}", short_id(job_id), message),
        }

        if let JobEvent::Progress(p) = &event {
            if p.stage == Stage::Cancelled {
                info!("[{}] cancelled", short_id(&p.job_id));
            }
        }
    }
}

/// Fans each event out to several sinks
#[derive(Clone, Default)]
pub struct MultiSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl MultiSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for MultiSink {
    fn emit(&self, event: JobEvent) {
        for sink in &self.sinks {
            sink.emit(event.clone());
        }
    }
}

/// Keeps every event in memory, for tests and diagnostics
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<JobEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: JobEvent) {
        self.events.lock().push(event);
    }
}
