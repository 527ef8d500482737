use anyhow::{Context, Result, anyhow};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::app_config::Config;
use crate::file_utils::FileManager;
use crate::job::{
    ChannelSink, CoordinatorSettings, JobCoordinator, JobEvent, JobInfo, JobStatus, LogSink, MultiSink, Stage,
};
use crate::providers::{self, Gateway};
use crate::translation::BatchStatus;

// @module: Command-line driver running translation jobs end to end

/// Main application controller for subtitle translation
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: Output directory; next to each input when unset
    output_dir: Option<PathBuf>,

    // @field: Gateway override used instead of the configured provider
    gateway: Option<Arc<dyn Gateway>>,
}

/// Outcome counts for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub done: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().context("Configuration validation failed")?;
        Ok(Self {
            config,
            output_dir: None,
            gateway: None,
        })
    }

    /// Write outputs to `dir` instead of next to each input
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Use `gateway` for every job instead of the configured provider
    pub fn with_gateway(mut self, gateway: Arc<dyn Gateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Check that the configured provider answers
    pub async fn test_connection(&self) -> Result<()> {
        let gateway = match &self.gateway {
            Some(gateway) => gateway.clone(),
            None => providers::gateway_for(&self.config.provider)?,
        };
        gateway
            .test_connection()
            .await
            .with_context(|| format!("{} is not reachable", self.config.provider.display_name()))?;
        info!(
            "Connected to {} ({})",
            self.config.provider.display_name(),
            self.config.provider.model()
        );
        Ok(())
    }

    /// Translate one subtitle file; returns `None` when it was skipped
    pub async fn run(&self, input_file: PathBuf, force_overwrite: bool) -> Result<Option<JobInfo>> {
        if !FileManager::file_exists(&input_file) {
            return Err(anyhow!("Input file does not exist: {:?}", input_file));
        }

        let (jobs, _) = self.run_files(&[input_file], force_overwrite, true).await?;
        let Some(job) = jobs.into_iter().next() else {
            return Ok(None);
        };

        match job.status {
            JobStatus::Error => Err(anyhow!(job.error.unwrap_or_else(|| "Translation failed".to_string()))),
            _ => Ok(Some(job)),
        }
    }

    /// Translate every `.srt` file directly inside `input_dir`.
    ///
    /// Up to `max_concurrent_jobs` files are translated at once. Files that
    /// look like earlier outputs of this tool are ignored.
    pub async fn run_folder(&self, input_dir: PathBuf, force_overwrite: bool) -> Result<RunSummary> {
        if !FileManager::dir_exists(&input_dir) {
            return Err(anyhow!("Input directory does not exist: {:?}", input_dir));
        }

        let inputs = self.folder_inputs(&input_dir)?;
        if inputs.is_empty() {
            warn!("No subtitle files found in {:?}", input_dir);
            return Ok(RunSummary::default());
        }
        info!("Found {} subtitle file(s) in {:?}", inputs.len(), input_dir);

        let start_time = Instant::now();
        let (_, summary) = self.run_files(&inputs, force_overwrite, false).await?;
        info!(
            "Folder complete: {} done, {} failed, {} cancelled, {} skipped - Duration: {}",
            summary.done,
            summary.failed,
            summary.cancelled,
            summary.skipped,
            Self::format_duration(start_time.elapsed())
        );
        Ok(summary)
    }

    fn folder_inputs(&self, input_dir: &Path) -> Result<Vec<PathBuf>> {
        let output_tail = format!(".{}.{}.srt", self.config.output_suffix, self.config.target_language);
        let inputs = FileManager::find_srt_files(input_dir)
            .with_context(|| format!("Failed to read directory: {:?}", input_dir))?
            .into_iter()
            .filter(|path| !path.to_string_lossy().ends_with(&output_tail))
            .collect();
        Ok(inputs)
    }

    fn coordinator(&self, events: Arc<MultiSink>) -> JobCoordinator {
        let mut settings = CoordinatorSettings::from_config(&self.config);
        settings.output_dir = self.output_dir.clone();

        match &self.gateway {
            Some(gateway) => JobCoordinator::with_gateway(settings, gateway.clone(), events),
            None => JobCoordinator::new(settings, events),
        }
    }

    /// Run jobs for `inputs` in waves of `max_concurrent_jobs`.
    ///
    /// With `fail_fast`, an input that cannot be imported aborts the run;
    /// otherwise it is logged and counted as failed.
    async fn run_files(
        &self,
        inputs: &[PathBuf],
        force_overwrite: bool,
        fail_fast: bool,
    ) -> Result<(Vec<JobInfo>, RunSummary)> {
        let (channel, mut events) = ChannelSink::new();
        let sink = Arc::new(MultiSink::new().with(Arc::new(channel)).with(Arc::new(LogSink)));
        let coordinator = self.coordinator(sink);

        let mut renderer = EventRenderer::new();
        let mut jobs = Vec::new();
        let mut summary = RunSummary::default();
        let limit = self.config.max_concurrent_jobs.max(1);

        info!(
            "srtweave: {} - {}",
            self.config.provider.display_name(),
            self.config.provider.model()
        );

        for wave in inputs.chunks(limit) {
            let mut started = Vec::new();

            for input in wave {
                match self.start_file(&coordinator, input, force_overwrite) {
                    Ok(Some(job_id)) => {
                        renderer.label(&job_id, input);
                        started.push(job_id);
                    }
                    Ok(None) => summary.skipped += 1,
                    Err(e) if fail_fast => return Err(e),
                    Err(e) => {
                        error!("Skipping {:?}: {:#}", input, e);
                        summary.failed += 1;
                    }
                }
            }

            let pending: HashSet<String> = started.iter().cloned().collect();
            let interrupted = Self::drive(&coordinator, &mut events, &mut renderer, pending).await;

            for job_id in started {
                let job = coordinator.get_job(&job_id)?;
                match job.status {
                    JobStatus::Done => summary.done += 1,
                    JobStatus::Cancelled => summary.cancelled += 1,
                    _ => summary.failed += 1,
                }
                jobs.push(job);
            }

            if interrupted {
                warn!("Interrupted; remaining files were not started");
                break;
            }
        }

        Ok((jobs, summary))
    }

    /// Import, create and start one job; `None` when the output already exists
    fn start_file(&self, coordinator: &JobCoordinator, input: &Path, force_overwrite: bool) -> Result<Option<String>> {
        let output_path = FileManager::generate_output_path(
            input,
            self.output_dir.as_deref(),
            &self.config.output_suffix,
            &self.config.target_language,
        );
        if FileManager::file_exists(&output_path) && !force_overwrite {
            warn!(
                "Skipping {:?}, translation already exists at {:?} (use -f to force overwrite)",
                input, output_path
            );
            return Ok(None);
        }

        let file = coordinator
            .import(input)
            .with_context(|| format!("Failed to import {:?}", input))?;
        let job = coordinator.create_job(&file.id, self.config.job_options())?;
        coordinator.start_job(&job.id)?;
        Ok(Some(job.id))
    }

    /// Render events until every job in `pending` has ended.
    ///
    /// Ctrl-C cancels the pending jobs; returns whether that happened.
    async fn drive(
        coordinator: &JobCoordinator,
        events: &mut UnboundedReceiver<JobEvent>,
        renderer: &mut EventRenderer,
        mut pending: HashSet<String>,
    ) -> bool {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interrupted = false;

        while !pending.is_empty() {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    renderer.handle(&event);
                    if event.is_terminal() {
                        pending.remove(event.job_id());
                    }
                }
                _ = &mut ctrl_c, if !interrupted => {
                    interrupted = true;
                    warn!("Interrupted, cancelling {} running job(s)", pending.len());
                    for job_id in &pending {
                        if let Err(e) = coordinator.cancel_job(job_id) {
                            error!("Failed to cancel job: {}", e);
                        }
                    }
                }
            }
        }

        interrupted
    }

    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}

/// One progress bar per job, driven by job events
struct EventRenderer {
    multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
    labels: HashMap<String, String>,
    started: HashMap<String, Instant>,
}

impl EventRenderer {
    fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            labels: HashMap::new(),
            started: HashMap::new(),
        }
    }

    fn label(&mut self, job_id: &str, input: &Path) {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| job_id.to_string());
        self.labels.insert(job_id.to_string(), name);
        self.started.insert(job_id.to_string(), Instant::now());
    }

    fn bar(&mut self, job_id: &str, total_cues: usize) -> &ProgressBar {
        let multi = &self.multi;
        let label = self.labels.get(job_id).cloned().unwrap_or_default();
        self.bars.entry(job_id.to_string()).or_insert_with(|| {
            let bar = multi.add(ProgressBar::new(total_cues as u64));
            let style = ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} cues ({percent}%) {prefix} {msg}")
                .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
                .unwrap_or_else(|_| ProgressStyle::default_bar());
            bar.set_style(style.progress_chars("█▓▒░"));
            bar.set_prefix(label);
            bar
        })
    }

    fn handle(&mut self, event: &JobEvent) {
        match event {
            JobEvent::Progress(progress) => {
                let bar = self.bar(&progress.job_id, progress.total_cues);
                bar.set_position(progress.done_cues as u64);
                match progress.stage {
                    Stage::Translating => {
                        let eta = progress
                            .eta_seconds
                            .map(|s| format!(", eta {}", Controller::format_duration(Duration::from_secs(s))))
                            .unwrap_or_default();
                        bar.set_message(format!("{} in flight{}", progress.active_threads, eta));
                    }
                    Stage::Writing => bar.set_message("writing"),
                    Stage::Cancelled => bar.abandon_with_message("cancelled"),
                    Stage::Queued | Stage::Done | Stage::Error => {}
                }
            }
            JobEvent::BatchStatus(batch) if batch.status == BatchStatus::Error => {
                let bar = self.bar(&batch.job_id, 0);
                bar.set_message(format!("batch {}/{} failed", batch.batch_no, batch.total_batches));
            }
            JobEvent::BatchStatus(_) => {}
            JobEvent::Finished { job_id, output_path } => {
                let elapsed = self.started.get(job_id).map(|s| s.elapsed()).unwrap_or_default();
                let bar = self.bar(job_id, 0);
                bar.finish_with_message(format!("done in {}", Controller::format_duration(elapsed)));
                info!("Success: {:?}", output_path);
            }
            JobEvent::Error { job_id, .. } => {
                self.bar(job_id, 0).abandon_with_message("failed");
            }
        }
    }
}
