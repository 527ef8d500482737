use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::errors::ProviderError;

use super::{Gateway, GatewayRequest, DEFAULT_REQUEST_TIMEOUT, http_client, transport_error};

/// Client for any OpenAI-compatible chat completions endpoint.
///
/// Used for OpenAI itself, for local proxies fronting several providers
/// (typically `http://localhost:8317/v1`), and for Ollama's `/v1` API.
#[derive(Debug)]
pub struct OpenAiCompatGateway {
    /// Name used in logs and errors
    name: String,
    /// HTTP client for API requests
    client: Client,
    /// Base URL including the version segment, e.g. `https://api.openai.com/v1`
    base_url: String,
    /// Bearer token, if the endpoint needs one
    api_key: Option<String>,
}

/// Chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

/// Chat completions request body
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

/// Chat completions response body
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

impl ChatRequest {
    /// Build the two-message request for a batch
    pub fn from_gateway_request(request: &GatewayRequest) -> Self {
        Self {
            model: request.model.clone(),
            temperature: 0.2,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_message(),
                },
            ],
        }
    }
}

impl OpenAiCompatGateway {
    /// Create a new client; an empty key is treated as no key
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: Option<String>,
    ) -> Result<Self, ProviderError> {
        Ok(Self {
            name: name.into(),
            client: http_client(DEFAULT_REQUEST_TIMEOUT)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Pull the completion text out of a response body
    pub fn extract_text(body: &str) -> Result<String, ProviderError> {
        let response: ChatResponse = serde_json::from_str(body)
            .map_err(|e| ProviderError::ParseError(format!("Response was not valid JSON: {}", e)))?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::ParseError("Missing choices[0].message.content".to_string()))
    }
}

#[async_trait]
impl Gateway for OpenAiCompatGateway {
    async fn translate(&self, request: &GatewayRequest) -> Result<String, ProviderError> {
        let body = ChatRequest::from_gateway_request(request);
        let url = self.endpoint("chat/completions");
        debug!("POST {} ({} lines, model {})", url, request.expected_lines, request.model);

        let response = self
            .authorize(self.client.post(&url).json(&body))
            .send()
            .await
            .map_err(|e| transport_error(&self.name, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&self.name, e))?;

        if !status.is_success() {
            error!("{} API error ({}): {}", self.name, status, text);
            return Err(ProviderError::from_status(status.as_u16(), text));
        }

        Self::extract_text(&text)
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        let response = self
            .authorize(self.client.get(self.endpoint("models")))
            .send()
            .await
            .map_err(|e| transport_error(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), text));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
