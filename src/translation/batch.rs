/*!
 * Bounded-concurrency batch dispatch.
 *
 * Batches are pulled in `batch_no` order and at most `threads` run at once.
 * Each one is masked, sent to the gateway under the retry policy, parsed
 * and unmasked. Status changes are reported through a `BatchReporter`,
 * which owns all mutable job state.
 */

use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::errors::ProviderError;
use crate::providers::{Gateway, GatewayRequest};
use crate::subtitle_processor::Cue;

use super::batcher::{Batch, CueRange};
use super::formatting::{TagGuard, TagMap};
use super::prompts::{parse_numbered_response, TranslationPromptBuilder};
use super::retry::RetryPolicy;

/// Final result of one batch
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    /// One unmasked translation per core cue, in cue order
    Translated(Vec<String>),
    /// Retries exhausted or a terminal error
    Failed(ProviderError),
}

/// Receives batch lifecycle callbacks from the pool
pub trait BatchReporter: Send + Sync {
    /// Checked before dispatch, before each retry and after each result
    fn is_cancelled(&self) -> bool;

    /// Resolves once the job is cancelled; interrupts backoff sleeps
    fn cancelled(&self) -> BoxFuture<'static, ()>;

    /// Batch moves Pending -> Running
    fn on_dispatch(&self, batch_no: usize);

    /// Attempt `attempt` (1-based) is about to call the gateway
    fn on_attempt(&self, batch_no: usize, attempt: u32);

    /// Attempt `attempt` failed and will be retried after `delay`
    fn on_retry(&self, batch_no: usize, attempt: u32, delay: Duration, error: &ProviderError);

    /// Batch reached a terminal outcome
    fn on_complete(&self, batch_no: usize, outcome: BatchOutcome);
}

/// Batch translator for dispatching a job's batches to a gateway
pub struct BatchTranslator {
    /// The gateway to call
    gateway: Arc<dyn Gateway>,

    /// Request builder carrying the language pair and model
    prompt: TranslationPromptBuilder,

    /// Backoff policy applied per batch
    policy: RetryPolicy,

    /// Maximum number of concurrent requests
    threads: usize,
}

/// Masked request plus what is needed to unmask its result
struct PreparedBatch {
    batch_no: usize,
    request: GatewayRequest,
    tag_maps: Vec<TagMap>,
}

impl BatchTranslator {
    pub fn new(gateway: Arc<dyn Gateway>, prompt: TranslationPromptBuilder, policy: RetryPolicy, threads: usize) -> Self {
        Self {
            gateway,
            prompt,
            policy,
            threads: threads.max(1),
        }
    }

    /// Dispatch every batch and wait until all of them have finished or
    /// been skipped because of cancellation
    pub async fn run(&self, batches: &[Batch], cues: &[Cue], reporter: Arc<dyn BatchReporter>) {
        let semaphore = Arc::new(Semaphore::new(self.threads));

        let tasks: Vec<_> = batches
            .iter()
            .map(|batch| {
                let semaphore = semaphore.clone();
                let reporter = reporter.clone();

                async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };

                    if reporter.is_cancelled() {
                        debug!("Skipping batch {}: job cancelled", batch.batch_no);
                        return;
                    }

                    let prepared = self.prepare(batch, cues);
                    reporter.on_dispatch(batch.batch_no);
                    self.translate_prepared(prepared, reporter.as_ref()).await;
                }
            })
            .collect();

        stream::iter(tasks)
            .buffer_unordered(self.threads)
            .collect::<Vec<()>>()
            .await;
    }

    /// Mask the batch's cues and build its request
    fn prepare(&self, batch: &Batch, cues: &[Cue]) -> PreparedBatch {
        let (entries, tag_maps): (Vec<String>, Vec<TagMap>) = batch
            .core
            .indices()
            .map(|i| TagGuard::mask(&cues[i].original_text))
            .unzip();

        let request = self
            .prompt
            .clone()
            .with_context_before(masked_texts(batch.context_before, cues))
            .with_entries(entries)
            .with_context_after(masked_texts(batch.context_after, cues))
            .build();

        PreparedBatch {
            batch_no: batch.batch_no,
            request,
            tag_maps,
        }
    }

    async fn translate_prepared(&self, prepared: PreparedBatch, reporter: &dyn BatchReporter) {
        let batch_no = prepared.batch_no;
        let request = &prepared.request;
        let expected = request.expected_lines;

        let outcome = self
            .policy
            .run_until(
                |attempt| {
                    reporter.on_attempt(batch_no, attempt);
                    let gateway = self.gateway.clone();
                    async move {
                        let raw = gateway.translate(request).await?;
                        parse_numbered_response(&raw, expected)
                    }
                },
                |attempt, delay, error| {
                    if reporter.is_cancelled() {
                        return false;
                    }
                    warn!(
                        "Batch {} attempt {} failed: {}. Retrying in {}ms",
                        batch_no,
                        attempt,
                        error,
                        delay.as_millis()
                    );
                    reporter.on_retry(batch_no, attempt, delay, error);
                    true
                },
                reporter.cancelled(),
            )
            .await;

        if reporter.is_cancelled() {
            debug!("Discarding result of batch {}: job cancelled", batch_no);
            return;
        }

        let outcome = match outcome.result {
            Ok(lines) => BatchOutcome::Translated(
                lines
                    .iter()
                    .zip(prepared.tag_maps.iter())
                    .map(|(line, map)| TagGuard::unmask(line, map))
                    .collect(),
            ),
            Err(error) => BatchOutcome::Failed(error),
        };
        reporter.on_complete(batch_no, outcome);
    }
}

fn masked_texts(range: Option<CueRange>, cues: &[Cue]) -> Vec<String> {
    range
        .map(|r| r.indices().map(|i| TagGuard::mask(&cues[i].original_text).0).collect())
        .unwrap_or_default()
}
