/*!
 * Translation jobs: lifecycle, progress aggregation and host events.
 *
 * - `models`: job snapshots and event payloads
 * - `progress`: done-cue counting and the ETA estimate
 * - `events`: sinks that deliver events to the host
 * - `coordinator`: the `JobCoordinator` owning all jobs in a process
 */

pub use self::coordinator::{CoordinatorSettings, GatewayFactory, JobCoordinator};
pub use self::events::{ChannelSink, EventSink, LogSink, MultiSink, RecordingSink};
pub use self::models::{BatchInfo, ImportSummary, ImportedFile, JobEvent, JobInfo, JobStatus, ProgressEvent, Stage};
pub use self::progress::ProgressTracker;

pub mod coordinator;
pub mod events;
pub mod models;
pub mod progress;
