/*!
 * Error types for the srtweave engine.
 *
 * This module contains custom error types for the different parts of the engine,
 * using the thiserror crate for ergonomic error definitions:
 * - `SubtitleError`: the input could not be decoded or parsed
 * - `ProviderError`: a Gateway call failed (scoped to one batch)
 * - `JobError`: a host-facing operation on the job coordinator failed
 */

use thiserror::Error;

/// Errors that can occur when working with provider APIs
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Error when making an API request fails
    #[error("API request failed: {0}")]
    RequestFailed(String),

    /// Error when parsing an API response fails
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// Error returned by the API itself
    #[error("API responded with error: {status_code} - {message}")]
    ApiError {
        /// HTTP status code
        status_code: u16,
        /// Error message from the API
        message: String,
    },

    /// Error establishing or maintaining a connection
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error related to rate limiting
    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    /// Error with authentication
    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    /// The request did not complete in time
    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    /// Build an error from an HTTP status and body, classifying the status
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status_code {
            401 | 403 => Self::AuthenticationError(message),
            429 => Self::RateLimitExceeded(message),
            408 | 504 => Self::Timeout(message),
            _ => Self::ApiError { status_code, message },
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// 4xx responses other than 429 are terminal; 429, 5xx, timeouts and
    /// transport failures are retryable. Malformed model output is retried
    /// too, since a fresh completion usually parses.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RequestFailed(_)
            | Self::ParseError(_)
            | Self::ConnectionError(_)
            | Self::RateLimitExceeded(_)
            | Self::Timeout(_) => true,
            Self::AuthenticationError(_) => false,
            Self::ApiError { status_code, .. } => {
                *status_code == 429 || *status_code >= 500 || *status_code < 400
            }
        }
    }
}

/// Errors that can occur while decoding or parsing a subtitle file
#[derive(Error, Debug)]
pub enum SubtitleError {
    /// Failure reading the file from disk
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// The byte stream is neither UTF-8 nor UTF-16
    #[error("This file is not valid text or has an unsupported encoding. {hint}")]
    Encoding {
        /// Suggestion for the user
        hint: String,
    },

    /// Structural error in the cue layout
    #[error("Invalid SRT format on line {line}: {message}")]
    Format {
        /// 1-based line number in the decoded text
        line: usize,
        /// What was expected at that line
        message: String,
    },
}

/// Errors returned by job coordinator operations
#[derive(Error, Debug)]
pub enum JobError {
    /// The input file could not be imported
    #[error("Subtitle error: {0}")]
    Subtitle(#[from] SubtitleError),

    /// The job options are invalid
    #[error("Invalid job options: {0}")]
    Validation(String),

    /// The operation is not allowed in the job's current state
    #[error("Cannot {operation} job {job_id} while it is {status}")]
    InvalidState {
        /// Job the operation targeted
        job_id: String,
        /// Current job status
        status: String,
        /// Operation that was refused
        operation: &'static str,
    },

    /// No job with this id
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// No imported file with this id
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Too many jobs are already running in this process
    #[error("Too many running jobs (limit {limit})")]
    TooManyJobs {
        /// Configured ceiling
        limit: usize,
    },

    /// The translated file could not be written
    #[error("Failed to write output: {0}")]
    Output(String),
}
