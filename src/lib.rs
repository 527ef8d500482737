/*!
 * # srtweave - batch translation engine for SRT subtitles
 *
 * A Rust library that translates subtitle files through LLM backends
 * in context-aware batches.
 *
 * ## Features
 *
 * - UTF-8 and UTF-16 SRT parsing with verbatim timing round-trip
 * - Inline tag protection (`<i>`, `{\an8}`, ...) across translation
 * - Batches with read-only context cues and a hard request-size ceiling
 * - Bounded-concurrency dispatch with exponential backoff and jitter
 * - Jobs with progress, ETA and push events, plus partial-failure output
 * - Backends:
 *   - OpenAI-compatible APIs (OpenAI, a local proxy, Ollama)
 *   - Anthropic API
 *
 * ## Architecture
 *
 * The library is organized in these main modules:
 * - `subtitle_processor`: SRT decoding, parsing and serialization
 * - `translation`: batching, tag guarding, dispatch and retry:
 *   - `translation::batcher`: cue grouping
 *   - `translation::formatting`: tag masking
 *   - `translation::batch`: the worker pool
 *   - `translation::retry`: backoff policy
 * - `job`: job lifecycle, progress aggregation and events
 * - `providers`: gateway implementations for LLM backends
 * - `app_config`: configuration and per-job options
 * - `app_controller`: drives one job for the command line
 * - `file_utils`: file system operations
 * - `language_utils`: ISO language code utilities
 * - `errors`: custom error types
 *
 * ## License
 *
 * This project is licensed under the MIT License
 */

// Global lints configuration
// These lints will be allowed but not auto-fixed
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::redundant_closure_for_method_calls)]

// Public modules
pub mod app_config;
pub mod app_controller;
pub mod errors;
pub mod file_utils;
pub mod job;
pub mod language_utils;
pub mod providers;
pub mod subtitle_processor;
pub mod translation;

// Re-export main types for easier usage
pub use app_config::{Config, JobOptions, ProviderConnection};
pub use errors::{JobError, ProviderError, SubtitleError};
pub use job::{JobCoordinator, JobEvent, JobInfo, JobStatus};
pub use language_utils::{get_language_name, language_codes_match, normalize_to_part2t};
pub use subtitle_processor::{Cue, SubtitleCollection};
