/*!
 * HTTP gateway tests against a one-shot local server
 */

use anyhow::Result;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use srtweave::app_config::ProviderConnection;
use srtweave::errors::ProviderError;
use srtweave::job::JobStatus;
use srtweave::providers::anthropic::AnthropicGateway;
use srtweave::providers::openai::OpenAiCompatGateway;
use srtweave::providers::{gateway_for, Gateway, GatewayRequest};
use srtweave::translation::prompts::render_numbered;
use crate::common;

const WAIT: Duration = Duration::from_secs(10);

fn request(lines: &[&str]) -> GatewayRequest {
    GatewayRequest {
        system_prompt: "Translate from English to French.".to_string(),
        text: render_numbered(lines),
        context: "CONTEXT BEFORE (do not translate):\n- Earlier line".to_string(),
        source_language: "English".to_string(),
        target_language: "French".to_string(),
        model: "gpt-4o-mini".to_string(),
        expected_lines: lines.len(),
    }
}

fn chat_body(content: &str) -> String {
    json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] }).to_string()
}

/// Test a successful chat completion round-trip
#[tokio::test]
async fn test_openAi_translate_shouldPostChatCompletionWithBearerKey() -> Result<()> {
    let (base_url, raw_request) = common::serve_once("200 OK", chat_body("BEGIN\n1. Bonjour\nEND")).await?;
    let gateway = OpenAiCompatGateway::new("OpenAI", base_url, Some("sk-test".to_string()))?;

    let text = gateway.translate(&request(&["Hello"])).await?;
    assert_eq!(text, "BEGIN\n1. Bonjour\nEND");

    let raw = timeout(WAIT, raw_request).await??;
    assert!(raw.starts_with("POST /chat/completions "));
    assert!(raw.to_lowercase().contains("authorization: bearer sk-test"));
    assert!(raw.contains(r#""model":"gpt-4o-mini""#));
    assert!(raw.contains(r#""role":"system""#));
    // Context travels in the user message ahead of the numbered list
    assert!(raw.contains("Earlier line"));
    Ok(())
}

/// Test that a keyless local proxy sends no authorization header
#[tokio::test]
async fn test_localProxy_withoutKey_shouldNotSendAuthorization() -> Result<()> {
    let (base_url, raw_request) = common::serve_once("200 OK", chat_body("1. Salut")).await?;
    let gateway = OpenAiCompatGateway::new("Local proxy", format!("{}/", base_url), Some(String::new()))?;

    gateway.translate(&request(&["Hi"])).await?;

    let raw = timeout(WAIT, raw_request).await??;
    assert!(!raw.to_lowercase().contains("authorization:"));
    Ok(())
}

/// Test status code classification from a real response
#[tokio::test]
async fn test_openAi_withUnauthorized_shouldBeTerminalAuthError() -> Result<()> {
    let (base_url, _raw) = common::serve_once("401 Unauthorized", r#"{"error":"bad key"}"#.to_string()).await?;
    let gateway = OpenAiCompatGateway::new("OpenAI", base_url, Some("sk-wrong".to_string()))?;

    let err = gateway.translate(&request(&["Hello"])).await.unwrap_err();

    assert!(matches!(err, ProviderError::AuthenticationError(ref body) if body.contains("bad key")));
    assert!(!err.is_retryable());
    Ok(())
}

/// Test that server errors are retryable
#[tokio::test]
async fn test_openAi_withServiceUnavailable_shouldBeRetryable() -> Result<()> {
    let (base_url, _raw) = common::serve_once("503 Service Unavailable", "{}".to_string()).await?;
    let gateway = OpenAiCompatGateway::new("OpenAI", base_url, Some("sk-test".to_string()))?;

    let err = gateway.translate(&request(&["Hello"])).await.unwrap_err();

    assert!(matches!(err, ProviderError::ApiError { status_code: 503, .. }));
    assert!(err.is_retryable());
    Ok(())
}

/// Test that a refused connection is classified as retryable
#[tokio::test]
async fn test_openAi_withNothingListening_shouldBeConnectionError() -> Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    let gateway = OpenAiCompatGateway::new("OpenAI", format!("http://{}", addr), None)?;

    let err = gateway.translate(&request(&["Hello"])).await.unwrap_err();

    assert!(matches!(err, ProviderError::ConnectionError(_)));
    assert!(err.is_retryable());
    Ok(())
}

/// Test the connection check endpoint
#[tokio::test]
async fn test_openAi_testConnection_shouldGetModels() -> Result<()> {
    let (base_url, raw_request) = common::serve_once("200 OK", r#"{"data":[]}"#.to_string()).await?;
    let gateway = OpenAiCompatGateway::new("OpenAI", base_url, Some("sk-test".to_string()))?;

    gateway.test_connection().await?;

    let raw = timeout(WAIT, raw_request).await??;
    assert!(raw.starts_with("GET /models "));
    Ok(())
}

/// Test an Anthropic messages round-trip
#[tokio::test]
async fn test_anthropic_translate_shouldSendApiKeyHeaders() -> Result<()> {
    let body = json!({ "content": [{ "type": "text", "text": "BEGIN\n1. Hola\nEND" }] }).to_string();
    let (base_url, raw_request) = common::serve_once("200 OK", body).await?;
    let gateway = AnthropicGateway::new("sk-ant-test", base_url)?;

    let text = gateway.translate(&request(&["Hello"])).await?;
    assert_eq!(text, "BEGIN\n1. Hola\nEND");

    let raw = timeout(WAIT, raw_request).await??.to_lowercase();
    assert!(raw.starts_with("post /v1/messages "));
    assert!(raw.contains("x-api-key: sk-ant-test"));
    assert!(raw.contains("anthropic-version:"));
    Ok(())
}

/// Test that Ollama connections use the OpenAI-compatible path
#[tokio::test]
async fn test_gatewayFor_withOllama_shouldUseV1Path() -> Result<()> {
    let (base_url, raw_request) = common::serve_once("200 OK", chat_body("1. Bonjour")).await?;
    let connection = ProviderConnection::Ollama {
        base_url,
        model: "llama3.2:3b".to_string(),
    };
    let gateway = gateway_for(&connection)?;
    assert_eq!(gateway.name(), "Ollama");

    gateway.translate(&request(&["Hello"])).await?;

    let raw = timeout(WAIT, raw_request).await??;
    assert!(raw.starts_with("POST /v1/chat/completions "));
    Ok(())
}

/// Test a whole job going through the HTTP gateway
#[tokio::test]
async fn test_job_throughHttpGateway_shouldWriteServerTranslation() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let (base_url, _raw) = common::serve_once("200 OK", chat_body("BEGIN\n1. Bonjour\n2. Au revoir\nEND")).await?;
    let gateway = OpenAiCompatGateway::new("Local proxy", base_url, None)?;
    let (coordinator, _sink) = common::test_coordinator(Arc::new(gateway), temp_dir.path());

    let srt = "1\n00:00:01,000 --> 00:00:02,000\nHello\n\n2\n00:00:03,000 --> 00:00:04,000\nGoodbye\n";
    let file = coordinator.import_bytes(temp_dir.path().join("greet.srt"), srt.as_bytes())?;
    let job = coordinator.create_job(&file.id, common::test_options())?;
    coordinator.start_job(&job.id)?;
    let finished = timeout(WAIT, coordinator.wait_for_job(&job.id)).await??;

    assert_eq!(finished.status, JobStatus::Done);
    let output = std::fs::read_to_string(temp_dir.path().join("greet.translated.fr.srt"))?;
    assert_eq!(
        output,
        "1\n00:00:01,000 --> 00:00:02,000\nBonjour\n\n2\n00:00:03,000 --> 00:00:04,000\nAu revoir\n"
    );
    Ok(())
}
