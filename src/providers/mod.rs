/*!
 * Provider implementations for the translation gateway.
 *
 * The engine only needs one capability from a backend: translate a batch of
 * numbered lines and return the raw completion text. This module contains:
 * - `Gateway`: the trait every backend implements
 * - `openai`: OpenAI-compatible chat completions (OpenAI, local proxy, Ollama `/v1`)
 * - `anthropic`: Anthropic messages API
 * - `mock`: scripted gateway for tests and benchmarks
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::app_config::ProviderConnection;
use crate::errors::ProviderError;

/// Default per-request timeout for HTTP gateways
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// One batch request, fully rendered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// System instructions naming the language pair
    pub system_prompt: String,

    /// Numbered lines to translate, wrapped in BEGIN/END
    pub text: String,

    /// Surrounding dialogue, not to be translated (may be empty)
    pub context: String,

    /// Source language display name
    pub source_language: String,

    /// Target language display name
    pub target_language: String,

    /// Model identifier passed through to the backend
    pub model: String,

    /// Number of lines the response must contain
    pub expected_lines: usize,
}

impl GatewayRequest {
    /// User message sent to chat-style backends: context first, then the lines
    pub fn user_message(&self) -> String {
        if self.context.is_empty() {
            self.text.clone()
        } else {
            format!("{}\n\n{}", self.context, self.text)
        }
    }
}

/// Translation backend consumed by the worker pool
///
/// Implementations must be cheap to share across workers; the pool holds
/// them behind an `Arc` and calls `translate` concurrently.
#[async_trait]
pub trait Gateway: Send + Sync + Debug {
    /// Translate one batch, returning the raw completion text
    async fn translate(&self, request: &GatewayRequest) -> Result<String, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self) -> Result<(), ProviderError>;

    /// Human-readable backend name for logs
    fn name(&self) -> &str;
}

/// Build the HTTP gateway matching a connection descriptor
pub fn gateway_for(connection: &ProviderConnection) -> Result<Arc<dyn Gateway>, ProviderError> {
    match connection {
        ProviderConnection::Anthropic { base_url, api_key, .. } => {
            Ok(Arc::new(anthropic::AnthropicGateway::new(api_key.clone(), base_url.clone())?))
        }
        ProviderConnection::OpenAi { base_url, api_key, .. } => Ok(Arc::new(
            openai::OpenAiCompatGateway::new("OpenAI", base_url.clone(), Some(api_key.clone()))?,
        )),
        ProviderConnection::LocalProxy { base_url, api_key, .. } => Ok(Arc::new(
            openai::OpenAiCompatGateway::new("Local proxy", base_url.clone(), api_key.clone())?,
        )),
        ProviderConnection::Ollama { base_url, .. } => {
            // Ollama serves the OpenAI-compatible API under /v1
            let base = format!("{}/v1", base_url.trim_end_matches('/'));
            Ok(Arc::new(openai::OpenAiCompatGateway::new("Ollama", base, None)?))
        }
    }
}

/// Classify a transport failure from reqwest
pub(crate) fn transport_error(provider: &str, e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(format!("{} request timed out: {}", provider, e))
    } else if e.is_connect() {
        ProviderError::ConnectionError(format!("Failed to connect to {}: {}", provider, e))
    } else {
        ProviderError::RequestFailed(format!("Failed to send request to {}: {}", provider, e))
    }
}

/// Build the shared HTTP client
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ProviderError::ConnectionError(format!("Failed to build HTTP client: {}", e)))
}

pub mod openai;
pub mod anthropic;
pub mod mock;
