/*!
 * Batch translation of subtitle cues.
 *
 * The pieces a job is built from, split into several submodules:
 *
 * - `batcher`: grouping cues into context-aware batches
 * - `formatting`: protecting inline tags across the round-trip
 * - `prompts`: request text for the gateway and response parsing
 * - `batch`: bounded-concurrency dispatch of batches
 * - `retry`: per-batch backoff policy and retry bookkeeping
 * - `concurrency`: per-provider ceilings on in-flight requests
 */

// Re-export main types for easier usage
pub use self::batch::{BatchOutcome, BatchReporter, BatchTranslator};
pub use self::batcher::{Batch, BatchStatus, CueRange};
pub use self::formatting::{TagGuard, TagMap};
pub use self::retry::{RetryPolicy, RetryState};

// Re-export prompt types
pub use self::prompts::TranslationPromptBuilder;

// Submodules
pub mod batch;
pub mod batcher;
pub mod concurrency;
pub mod formatting;
pub mod prompts;
pub mod retry;
