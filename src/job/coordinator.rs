/*!
 * Job coordinator for the translation job lifecycle.
 *
 * This module handles:
 * - Importing subtitle files and keeping them until jobs are created
 * - Creating, starting and cancelling jobs
 * - Aggregating batch results into progress, ETA and the output file
 * - Emitting host events for every state transition
 *
 * Each job's mutable state sits behind one lock. Batch callbacks, host
 * operations and event emission all take it, so updates are applied one
 * at a time and progress never regresses.
 */

use futures::future::BoxFuture;
use log::{debug, error, info};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use uuid::Uuid;

use crate::app_config::{Config, JobOptions, ProviderConnection};
use crate::errors::{JobError, ProviderError};
use crate::file_utils::FileManager;
use crate::providers::{self, Gateway};
use crate::subtitle_processor::{self, SubtitleCollection};
use crate::translation::batch::{BatchOutcome, BatchReporter, BatchTranslator};
use crate::translation::batcher::{self, Batch, BatchStatus};
use crate::translation::concurrency::ProviderProfile;
use crate::translation::prompts::TranslationPromptBuilder;
use crate::translation::retry::{RetryPolicy, RetryState};

use super::events::EventSink;
use super::models::{
    short_id, BatchInfo, ImportSummary, ImportedFile, JobEvent, JobInfo, JobStatus, ProgressEvent, Stage,
};
use super::progress::ProgressTracker;

/// Builds the gateway a job talks to from its connection descriptor
pub type GatewayFactory =
    Arc<dyn Fn(&ProviderConnection) -> Result<Arc<dyn Gateway>, ProviderError> + Send + Sync>;

/// Process-wide coordinator settings
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    /// Ceiling on jobs running at the same time
    pub max_concurrent_jobs: usize,

    /// Inserted between the input stem and the language code
    pub output_suffix: String,

    /// Where output files go; next to the input when `None`
    pub output_dir: Option<PathBuf>,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl CoordinatorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_concurrent_jobs: config.max_concurrent_jobs.max(1),
            output_suffix: config.output_suffix.clone(),
            output_dir: None,
        }
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// Owns every imported file and job in the process
pub struct JobCoordinator {
    settings: CoordinatorSettings,
    gateways: GatewayFactory,
    events: Arc<dyn EventSink>,
    registry: Mutex<Registry>,
}

#[derive(Default)]
struct Registry {
    files: HashMap<String, Arc<ImportedFile>>,
    jobs: HashMap<String, Arc<JobHandle>>,
    /// Job ids in creation order
    order: Vec<String>,
}

impl JobCoordinator {
    /// Create a coordinator that builds HTTP gateways from each job's options
    pub fn new(settings: CoordinatorSettings, events: Arc<dyn EventSink>) -> Self {
        Self::with_gateway_factory(settings, Arc::new(providers::gateway_for), events)
    }

    /// Create a coordinator whose jobs all use `gateway`
    pub fn with_gateway(settings: CoordinatorSettings, gateway: Arc<dyn Gateway>, events: Arc<dyn EventSink>) -> Self {
        let factory: GatewayFactory = Arc::new(move |_: &ProviderConnection| Ok::<_, ProviderError>(gateway.clone()));
        Self::with_gateway_factory(settings, factory, events)
    }

    pub fn with_gateway_factory(settings: CoordinatorSettings, gateways: GatewayFactory, events: Arc<dyn EventSink>) -> Self {
        Self {
            settings,
            gateways,
            events,
            registry: Mutex::new(Registry::default()),
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    // =========================================================================
    // Files
    // =========================================================================

    /// Parse and validate a subtitle file; no job is created
    pub fn import<P: AsRef<Path>>(&self, path: P) -> Result<ImportSummary, JobError> {
        let path = path.as_ref();
        let collection = SubtitleCollection::parse_file(path)?;
        Ok(self.register_file(path.to_path_buf(), collection))
    }

    /// Import subtitle content that is already in memory.
    ///
    /// `source_path` only names the output file; it is not read.
    pub fn import_bytes(&self, source_path: impl Into<PathBuf>, bytes: &[u8]) -> Result<ImportSummary, JobError> {
        let collection = subtitle_processor::parse(bytes)?;
        Ok(self.register_file(source_path.into(), collection))
    }

    fn register_file(&self, source_path: PathBuf, collection: SubtitleCollection) -> ImportSummary {
        let file = ImportedFile {
            id: Uuid::new_v4().to_string(),
            source_path,
            collection,
        };
        info!(
            "Imported {} as {} ({} cues, {:?})",
            file.source_path.display(),
            short_id(&file.id),
            file.cue_count(),
            file.collection.encoding
        );

        let summary = file.summary();
        self.registry.lock().files.insert(file.id.clone(), Arc::new(file));
        summary
    }

    /// Forget an imported file; jobs already created from it keep their copy
    pub fn remove_file(&self, file_id: &str) -> Result<(), JobError> {
        match self.registry.lock().files.remove(file_id) {
            Some(_) => Ok(()),
            None => Err(JobError::FileNotFound(file_id.to_string())),
        }
    }

    // =========================================================================
    // Job lifecycle
    // =========================================================================

    /// Create a queued job for an imported file
    pub fn create_job(&self, file_id: &str, options: JobOptions) -> Result<JobInfo, JobError> {
        let file = self
            .registry
            .lock()
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| JobError::FileNotFound(file_id.to_string()))?;

        options
            .validate()
            .map_err(|e| JobError::Validation(format!("{:#}", e)))?;
        if file.cue_count() == 0 {
            return Err(JobError::Validation("the file contains no cues".to_string()));
        }

        let handle = Arc::new(JobHandle::new(
            Uuid::new_v4().to_string(),
            file,
            options,
            self.events.clone(),
        ));
        let snapshot = handle.snapshot();
        info!(
            "Created job {} for file {} ({} -> {}, {} cues)",
            short_id(&handle.id),
            short_id(file_id),
            handle.options.source_language,
            handle.options.target_language,
            snapshot.total_cues
        );
        handle.emit_queued();

        let mut registry = self.registry.lock();
        registry.order.push(handle.id.clone());
        registry.jobs.insert(handle.id.clone(), handle);

        Ok(snapshot)
    }

    /// Start a queued job. Must be called from within a tokio runtime.
    pub fn start_job(&self, job_id: &str) -> Result<(), JobError> {
        let (handle, translator, batches) = {
            let registry = self.registry.lock();
            let handle = registry
                .jobs
                .get(job_id)
                .cloned()
                .ok_or_else(|| JobError::JobNotFound(job_id.to_string()))?;

            let status = handle.status();
            if status != JobStatus::Queued {
                return Err(JobError::InvalidState {
                    job_id: job_id.to_string(),
                    status: status.to_string(),
                    operation: "start",
                });
            }

            let running = registry
                .jobs
                .values()
                .filter(|job| job.status() == JobStatus::Running)
                .count();
            if running >= self.settings.max_concurrent_jobs {
                return Err(JobError::TooManyJobs {
                    limit: self.settings.max_concurrent_jobs,
                });
            }

            let gateway = (self.gateways)(&handle.options.provider)
                .map_err(|e| JobError::Validation(format!("Cannot reach provider: {}", e)))?;
            let threads = ProviderProfile::for_connection(&handle.options.provider)
                .effective_threads(handle.options.threads);
            let translator = BatchTranslator::new(
                gateway,
                TranslationPromptBuilder::new(&handle.options),
                RetryPolicy::from_options(&handle.options),
                threads,
            );

            // Status flips to Running before the registry lock is released
            let batches = handle.begin(threads);
            (handle, translator, batches)
        };

        let output_path = self.output_path_for(&handle);
        let worker = {
            let handle = handle.clone();
            tokio::spawn(async move {
                let reporter: Arc<dyn BatchReporter> = handle.clone();
                translator.run(&batches, &handle.file.collection.cues, reporter).await;
                handle.finish(&output_path);
            })
        };

        // A panicking worker must still leave the job in a terminal state
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                handle.abort(format!("Job task stopped unexpectedly: {}", e));
            }
        });

        Ok(())
    }

    /// Cancel a job. Already finished jobs are left untouched.
    pub fn cancel_job(&self, job_id: &str) -> Result<(), JobError> {
        self.handle(job_id)?.cancel();
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn get_job(&self, job_id: &str) -> Result<JobInfo, JobError> {
        Ok(self.handle(job_id)?.snapshot())
    }

    /// All jobs in creation order
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        let registry = self.registry.lock();
        registry
            .order
            .iter()
            .filter_map(|id| registry.jobs.get(id))
            .map(|job| job.snapshot())
            .collect()
    }

    /// Current state of every batch; empty until the job starts
    pub fn get_batches(&self, job_id: &str) -> Result<Vec<BatchInfo>, JobError> {
        Ok(self.handle(job_id)?.batch_infos())
    }

    /// Wait until the job reaches Done, Error or Cancelled
    pub async fn wait_for_job(&self, job_id: &str) -> Result<JobInfo, JobError> {
        let handle = self.handle(job_id)?;
        let mut status = handle.status_tx.subscribe();
        if status.wait_for(|s| s.is_terminal()).await.is_err() {
            debug!("Status channel of job {} closed", short_id(job_id));
        }
        Ok(handle.snapshot())
    }

    fn handle(&self, job_id: &str) -> Result<Arc<JobHandle>, JobError> {
        self.registry
            .lock()
            .jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::JobNotFound(job_id.to_string()))
    }

    fn output_path_for(&self, handle: &JobHandle) -> PathBuf {
        FileManager::generate_output_path(
            &handle.file.source_path,
            self.settings.output_dir.as_deref(),
            &self.settings.output_suffix,
            &handle.options.target_language,
        )
    }
}

/// One job and its mutable state
struct JobHandle {
    id: String,
    file: Arc<ImportedFile>,
    options: JobOptions,
    events: Arc<dyn EventSink>,
    state: Mutex<JobState>,
    cancelled: AtomicBool,
    status_tx: watch::Sender<JobStatus>,
}

struct JobState {
    info: JobInfo,
    batches: Vec<Batch>,
    retry: RetryState,
    /// Unmasked translation per cue index
    translations: Vec<Option<String>>,
    tracker: ProgressTracker,
    dispatched_at: HashMap<usize, Instant>,
}

impl JobHandle {
    fn new(id: String, file: Arc<ImportedFile>, options: JobOptions, events: Arc<dyn EventSink>) -> Self {
        let total_cues = file.cue_count();
        let (status_tx, _) = watch::channel(JobStatus::Queued);
        Self {
            state: Mutex::new(JobState {
                info: JobInfo::new(id.clone(), file.id.clone(), total_cues),
                batches: Vec::new(),
                retry: RetryState::default(),
                translations: vec![None; total_cues],
                tracker: ProgressTracker::new(total_cues, 0, options.threads),
                dispatched_at: HashMap::new(),
            }),
            id,
            file,
            options,
            events,
            cancelled: AtomicBool::new(false),
            status_tx,
        }
    }

    fn status(&self) -> JobStatus {
        *self.status_tx.borrow()
    }

    fn snapshot(&self) -> JobInfo {
        self.state.lock().info.clone()
    }

    fn batch_infos(&self) -> Vec<BatchInfo> {
        let state = self.state.lock();
        state
            .batches
            .iter()
            .map(|batch| BatchInfo::from_batch(&self.id, batch, state.retry.attempts(batch.batch_no)))
            .collect()
    }

    fn emit_queued(&self) {
        let info = self.snapshot();
        self.events.emit(JobEvent::Progress(ProgressEvent {
            job_id: self.id.clone(),
            done_cues: 0,
            total_cues: info.total_cues,
            percent: 0.0,
            eta_seconds: None,
            stage: Stage::Queued,
            active_threads: 0,
        }));
    }

    /// Split the batches and move Queued -> Running
    fn begin(&self, threads: usize) -> Vec<Batch> {
        let mut state = self.state.lock();
        let batches = batcher::split(&self.file.collection.cues, &self.options.batch);

        state.retry = RetryState::new(batches.len());
        state.tracker = ProgressTracker::new(self.file.cue_count(), batches.len(), threads);
        state.info.total_batches = batches.len();
        state.batches = batches.clone();
        self.set_status(&mut state, JobStatus::Running);

        info!(
            "Starting job {}: {} cues in {} batches, {} threads",
            short_id(&self.id),
            state.info.total_cues,
            batches.len(),
            threads
        );
        self.emit_progress(&mut state, Stage::Translating);
        batches
    }

    fn cancel(&self) {
        let mut state = self.state.lock();
        if state.info.status.is_terminal() {
            debug!("Job {} already {}; cancel ignored", short_id(&self.id), state.info.status);
            return;
        }

        self.cancelled.store(true, Ordering::SeqCst);
        state.info.eta_seconds = None;
        self.set_status(&mut state, JobStatus::Cancelled);
        info!(
            "Cancelled job {} at {}/{} cues",
            short_id(&self.id),
            state.info.done_cues,
            state.info.total_cues
        );
        self.emit_progress(&mut state, Stage::Cancelled);
    }

    /// Apply the failure policy and write the output once every batch is settled
    fn finish(&self, output_path: &Path) {
        let mut state = self.state.lock();
        if state.info.status != JobStatus::Running {
            debug!("Job {} ended as {}; nothing to write", short_id(&self.id), state.info.status);
            return;
        }

        let failed = state.info.failed_batches;
        let total = state.batches.len();
        if self.options.failure_policy.job_failed(failed, total) {
            let first_error = state
                .batches
                .iter()
                .find_map(|b| b.error_msg.as_deref())
                .unwrap_or("unknown error");
            let message = format!("{} of {} batches failed. First error: {}", failed, total, first_error);
            self.fail(&mut state, message);
            return;
        }

        self.emit_progress(&mut state, Stage::Writing);

        let mut cues = self.file.collection.cues.clone();
        for (cue, translation) in cues.iter_mut().zip(state.translations.iter()) {
            cue.translated_text = translation.clone();
        }
        let output = SubtitleCollection {
            newline: self.file.collection.newline,
            encoding: self.file.collection.encoding,
            cues,
        };

        if let Err(e) = FileManager::write_bytes(output_path, &output.serialize()) {
            self.fail(&mut state, JobError::Output(format!("{:#}", e)).to_string());
            return;
        }

        state.info.output_path = Some(output_path.to_path_buf());
        state.info.eta_seconds = Some(0);
        self.set_status(&mut state, JobStatus::Done);
        if failed > 0 {
            info!(
                "Job {} finished with {} failed batch(es); their cues keep the source text",
                short_id(&self.id),
                failed
            );
        }
        info!("Job {} done: {}", short_id(&self.id), output_path.display());

        self.emit_progress(&mut state, Stage::Done);
        self.events.emit(JobEvent::Finished {
            job_id: self.id.clone(),
            output_path: output_path.to_path_buf(),
        });
    }

    /// Move a job that is still live to Error; used when its task died
    fn abort(&self, message: String) {
        let mut state = self.state.lock();
        if state.info.status.is_terminal() {
            return;
        }
        self.cancelled.store(true, Ordering::SeqCst);
        self.fail(&mut state, message);
    }

    fn fail(&self, state: &mut JobState, message: String) {
        error!("Job {} failed: {}", short_id(&self.id), message);
        state.info.error = Some(message.clone());
        state.info.eta_seconds = None;
        self.set_status(state, JobStatus::Error);
        self.emit_progress(state, Stage::Error);
        self.events.emit(JobEvent::Error {
            job_id: self.id.clone(),
            message,
        });
    }

    fn set_status(&self, state: &mut JobState, status: JobStatus) {
        state.info.status = status;
        if status.is_terminal() {
            state.info.finished_at = Some(chrono::Utc::now());
        }
        self.status_tx.send_replace(status);
    }

    /// Sync the job snapshot with the tracker and emit a progress event
    fn emit_progress(&self, state: &mut JobState, stage: Stage) {
        state.info.done_cues = state.tracker.done_cues();
        state.info.progress = state.tracker.fraction();
        if !state.info.status.is_terminal() {
            state.info.eta_seconds = state.tracker.eta_seconds();
        }

        let active = state
            .batches
            .iter()
            .filter(|b| b.status == BatchStatus::Running)
            .count();
        if let Some(mut event) = state.tracker.event(&self.id, stage, active) {
            event.eta_seconds = state.info.eta_seconds;
            self.events.emit(JobEvent::Progress(event));
        }
    }

    fn emit_batch(&self, state: &JobState, index: usize) {
        let batch = &state.batches[index];
        let attempts = state.retry.attempts(batch.batch_no);
        self.events
            .emit(JobEvent::BatchStatus(BatchInfo::from_batch(&self.id, batch, attempts)));
    }

    fn batch_index(state: &JobState, batch_no: usize) -> Option<usize> {
        batch_no.checked_sub(1).filter(|i| *i < state.batches.len())
    }
}

impl BatchReporter for JobHandle {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn on_dispatch(&self, batch_no: usize) {
        let mut state = self.state.lock();
        if state.info.status != JobStatus::Running {
            return;
        }
        let Some(index) = Self::batch_index(&state, batch_no) else {
            return;
        };

        if state.batches[index].advance(BatchStatus::Running) {
            state.dispatched_at.insert(batch_no, Instant::now());
            self.emit_batch(&state, index);
            self.emit_progress(&mut state, Stage::Translating);
        }
    }

    fn cancelled(&self) -> BoxFuture<'static, ()> {
        let mut status = self.status_tx.subscribe();
        Box::pin(async move {
            let _ = status.wait_for(|s| s.is_terminal()).await;
        })
    }

    fn on_attempt(&self, batch_no: usize, attempt: u32) {
        let mut state = self.state.lock();
        if state.info.status == JobStatus::Running {
            state.retry.record_attempt(batch_no, attempt);
        }
    }

    fn on_retry(&self, batch_no: usize, _attempt: u32, delay: Duration, error: &ProviderError) {
        let mut state = self.state.lock();
        if state.info.status == JobStatus::Running {
            state.retry.record_backoff(batch_no, delay, error);
        }
    }

    fn on_complete(&self, batch_no: usize, outcome: BatchOutcome) {
        let mut guard = self.state.lock();
        if guard.info.status != JobStatus::Running {
            debug!("Discarding batch {} of job {}", batch_no, short_id(&self.id));
            return;
        }
        let Some(index) = Self::batch_index(&guard, batch_no) else {
            return;
        };

        let state = &mut *guard;
        let elapsed = state
            .dispatched_at
            .remove(&batch_no)
            .map(|started| started.elapsed())
            .unwrap_or_default();
        let core = state.batches[index].core;

        let succeeded = match outcome {
            BatchOutcome::Translated(lines) => {
                for (offset, line) in lines.into_iter().enumerate() {
                    if let Some(slot) = state.translations.get_mut(core.start + offset) {
                        *slot = Some(line);
                    }
                }
                state.batches[index].advance(BatchStatus::Done)
            }
            BatchOutcome::Failed(err) => {
                let attempts = state.retry.attempts(batch_no);
                error!(
                    "Job {} batch {}/{} (cues {}) failed after {} attempt(s): {}",
                    short_id(&self.id),
                    batch_no,
                    state.batches.len(),
                    core,
                    attempts,
                    err
                );
                state.retry.record_failure(batch_no, &err);
                state.batches[index].error_msg = Some(err.to_string());
                state.batches[index].advance(BatchStatus::Error);
                state.info.failed_batches += 1;
                false
            }
        };

        state.tracker.record_batch(core.len(), succeeded, elapsed);
        self.emit_batch(state, index);
        self.emit_progress(state, Stage::Translating);
    }
}
