use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::default::Default;

use crate::language_utils;

/// Application configuration module
/// This module handles the engine configuration: the JSON file read by the
/// CLI, and the resolved per-job `JobOptions` the coordinator consumes.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO) or "auto"
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Translation backend connection
    #[serde(default)]
    pub provider: ProviderConnection,

    /// Batch sizing
    #[serde(default)]
    pub batch: BatchConfig,

    /// Maximum concurrent in-flight batches per job
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Retries after the first failed attempt of a batch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds, doubled on each retry
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// When a job with failed batches is considered failed
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Suffix inserted into output file names
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,

    /// Maximum number of jobs running at once in this process
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Connection descriptor for the translation backend.
///
/// Only some backends need an API key; each variant carries exactly the
/// fields it needs so validation is exhaustive per variant.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ProviderConnection {
    // @provider: OpenAI or any hosted OpenAI-compatible API
    #[serde(rename = "openai")]
    OpenAi {
        #[serde(default = "default_openai_endpoint")]
        base_url: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
    },
    // @provider: Anthropic messages API
    #[serde(rename = "anthropic")]
    Anthropic {
        #[serde(default = "default_anthropic_endpoint")]
        base_url: String,
        api_key: String,
        #[serde(default = "default_anthropic_model")]
        model: String,
    },
    // @provider: local OpenAI-compatible proxy fronting several providers
    #[serde(rename = "local_proxy")]
    LocalProxy {
        #[serde(default = "default_local_proxy_endpoint")]
        base_url: String,
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default = "default_openai_model")]
        model: String,
    },
    // @provider: Ollama (OpenAI-compatible endpoint under /v1)
    #[serde(rename = "ollama")]
    Ollama {
        #[serde(default = "default_ollama_endpoint")]
        base_url: String,
        #[serde(default = "default_ollama_model")]
        model: String,
    },
}

impl Default for ProviderConnection {
    fn default() -> Self {
        Self::LocalProxy {
            base_url: default_local_proxy_endpoint(),
            api_key: None,
            model: default_openai_model(),
        }
    }
}

impl ProviderConnection {
    /// OpenAI with the default endpoint and model
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::OpenAi {
            base_url: default_openai_endpoint(),
            api_key: api_key.into(),
            model: default_openai_model(),
        }
    }

    /// Anthropic with the default endpoint and model
    pub fn anthropic(api_key: impl Into<String>) -> Self {
        Self::Anthropic {
            base_url: default_anthropic_endpoint(),
            api_key: api_key.into(),
            model: default_anthropic_model(),
        }
    }

    /// Local Ollama server with the default model
    pub fn ollama() -> Self {
        Self::Ollama {
            base_url: default_ollama_endpoint(),
            model: default_ollama_model(),
        }
    }

    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAi { .. } => "OpenAI",
            Self::Anthropic { .. } => "Anthropic",
            Self::LocalProxy { .. } => "Local proxy",
            Self::Ollama { .. } => "Ollama",
        }
    }

    pub fn base_url(&self) -> &str {
        match self {
            Self::OpenAi { base_url, .. }
            | Self::Anthropic { base_url, .. }
            | Self::LocalProxy { base_url, .. }
            | Self::Ollama { base_url, .. } => base_url,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Self::OpenAi { model, .. }
            | Self::Anthropic { model, .. }
            | Self::LocalProxy { model, .. }
            | Self::Ollama { model, .. } => model,
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        match self {
            Self::OpenAi { api_key, .. } | Self::Anthropic { api_key, .. } => Some(api_key),
            Self::LocalProxy { api_key, .. } => api_key.as_deref().filter(|k| !k.is_empty()),
            Self::Ollama { .. } => None,
        }
    }

    /// Replace the model name, keeping the rest of the descriptor
    pub fn with_model(mut self, new_model: impl Into<String>) -> Self {
        let new_model = new_model.into();
        match &mut self {
            Self::OpenAi { model, .. }
            | Self::Anthropic { model, .. }
            | Self::LocalProxy { model, .. }
            | Self::Ollama { model, .. } => *model = new_model,
        }
        self
    }

    /// Check the descriptor is usable
    pub fn validate(&self) -> Result<()> {
        let base_url = self.base_url().trim();
        if base_url.is_empty() {
            return Err(anyhow!("{} base URL cannot be empty", self.display_name()));
        }
        url::Url::parse(base_url)
            .map_err(|e| anyhow!("Invalid {} base URL '{}': {}", self.display_name(), base_url, e))?;

        if self.model().trim().is_empty() {
            return Err(anyhow!("{} model cannot be empty", self.display_name()));
        }

        match self {
            Self::OpenAi { api_key, .. } | Self::Anthropic { api_key, .. } => {
                if api_key.trim().is_empty() {
                    return Err(anyhow!("API key is required for {} provider", self.display_name()));
                }
            }
            Self::LocalProxy { .. } | Self::Ollama { .. } => {}
        }

        Ok(())
    }
}

/// Batch sizing configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BatchConfig {
    /// Core cues per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Read-only context cues before each batch
    #[serde(default = "default_context_cues")]
    pub context_before: usize,

    /// Read-only context cues after each batch
    #[serde(default = "default_context_cues")]
    pub context_after: usize,

    /// Hard ceiling on masked core + context characters per request
    #[serde(default = "default_max_chars_per_request")]
    pub max_chars_per_request: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            context_before: default_context_cues(),
            context_after: default_context_cues(),
            max_chars_per_request: default_max_chars_per_request(),
        }
    }
}

/// Job-level escalation rule for failed batches
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct FailurePolicy {
    /// The job fails when more than this fraction of batches end in error.
    /// 0.0 means any failed batch fails the job.
    #[serde(default = "default_max_failed_ratio")]
    pub max_failed_ratio: f64,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            max_failed_ratio: default_max_failed_ratio(),
        }
    }
}

impl FailurePolicy {
    /// Whether a job with `failed` of `total` batches in error has failed
    pub fn job_failed(&self, failed: usize, total: usize) -> bool {
        if failed == 0 || total == 0 {
            return false;
        }
        if failed == total {
            return true;
        }
        (failed as f64 / total as f64) > self.max_failed_ratio
    }
}

/// Fully resolved options for one job; immutable once the job is created
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct JobOptions {
    /// Source language code (ISO) or "auto"
    pub source_language: String,

    /// Target language code (ISO)
    pub target_language: String,

    /// Batch sizing
    #[serde(default)]
    pub batch: BatchConfig,

    /// Maximum concurrent in-flight batches
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Translation backend connection
    #[serde(default)]
    pub provider: ProviderConnection,

    /// Retries after the first failed attempt of a batch
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Job-level escalation rule
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_language: default_target_language(),
            batch: BatchConfig::default(),
            threads: default_threads(),
            provider: ProviderConnection::default(),
            max_retries: default_max_retries(),
            min_delay_ms: default_min_delay_ms(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl JobOptions {
    /// Validate the options for consistency and required values
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(anyhow!("threads must be at least 1"));
        }
        if self.batch.batch_size == 0 {
            return Err(anyhow!("batch_size must be at least 1"));
        }
        if self.batch.max_chars_per_request == 0 {
            return Err(anyhow!("max_chars_per_request must be at least 1"));
        }

        let ratio = self.failure_policy.max_failed_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(anyhow!("max_failed_ratio must be between 0 and 1, got {}", ratio));
        }

        if !language_utils::is_auto(&self.source_language) {
            language_utils::normalize_to_part2t(&self.source_language)?;
        }
        if language_utils::is_auto(&self.target_language) {
            return Err(anyhow!("Target language cannot be auto-detected"));
        }
        language_utils::normalize_to_part2t(&self.target_language)?;
        if language_utils::language_codes_match(&self.source_language, &self.target_language) {
            return Err(anyhow!(
                "Source and target language are the same: {}",
                self.target_language
            ));
        }

        self.provider.validate()
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl From<&LogLevel> for log::LevelFilter {
    fn from(level: &LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

fn default_source_language() -> String {
    language_utils::AUTO_DETECT.to_string()
}

fn default_target_language() -> String {
    "en".to_string()
}

fn default_threads() -> usize {
    3
}

fn default_max_retries() -> u32 {
    3
}

fn default_min_delay_ms() -> u64 {
    500 // doubled on each retry, capped by the retry policy
}

fn default_batch_size() -> usize {
    25
}

fn default_context_cues() -> usize {
    2
}

fn default_max_chars_per_request() -> usize {
    12_000
}

fn default_max_failed_ratio() -> f64 {
    0.5
}

fn default_output_suffix() -> String {
    "translated".to_string()
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_local_proxy_endpoint() -> String {
    "http://localhost:8317/v1".to_string()
}

fn default_ollama_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_ollama_model() -> String {
    "llama3.2:3b".to_string()
}

impl Config {
    /// Validate the configuration after loading and overriding
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(anyhow!("max_concurrent_jobs must be at least 1"));
        }
        if self.output_suffix.contains(['/', '\\']) {
            return Err(anyhow!("output_suffix cannot contain path separators"));
        }
        self.job_options().validate()
    }

    /// Resolve the per-job options from this configuration
    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            batch: self.batch.clone(),
            threads: self.threads,
            provider: self.provider.clone(),
            max_retries: self.max_retries,
            min_delay_ms: self.min_delay_ms,
            failure_policy: self.failure_policy,
        }
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: default_source_language(),
            target_language: default_target_language(),
            provider: ProviderConnection::default(),
            batch: BatchConfig::default(),
            threads: default_threads(),
            max_retries: default_max_retries(),
            min_delay_ms: default_min_delay_ms(),
            failure_policy: FailurePolicy::default(),
            output_suffix: default_output_suffix(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            log_level: LogLevel::default(),
        }
    }
}
