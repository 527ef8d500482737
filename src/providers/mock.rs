/*!
 * Mock gateway for testing.
 *
 * `MockGateway` answers numbered-list requests the way a well-behaved model
 * would (`[<target>] <text>` per line) or misbehaves on purpose:
 * - `MockBehavior::Working` - always succeeds
 * - `MockBehavior::Failing` - always fails with a retryable 503
 * - `MockBehavior::FailFirst` - fails the first N calls, then succeeds
 * - `MockBehavior::FailBatches` - fails every request containing a marker
 * - `MockBehavior::Slow` - succeeds after a delay
 * - `MockBehavior::DropPlaceholders` - succeeds but strips tag placeholders
 * - `MockBehavior::Terminal` - fails with a non-retryable 400
 * - `MockBehavior::Garbled` - returns text that is not a numbered list
 *
 * Clones share their counters, so a test can keep one handle and give
 * another to the engine.
 */

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::providers::{Gateway, GatewayRequest};
use crate::translation::prompts::{parse_numbered_response, render_numbered};

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[TAG_\d+\]\]").unwrap());

/// Behavior mode for the mock gateway
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a proper translation
    Working,
    /// Always fails with a retryable error
    Failing,
    /// Fails the first `failures` calls, then succeeds
    FailFirst { failures: usize },
    /// Fails every request whose text contains `marker`
    FailBatches { marker: &'static str },
    /// Succeeds after sleeping `delay_ms`
    Slow { delay_ms: u64 },
    /// Succeeds but drops every tag placeholder
    DropPlaceholders,
    /// Fails with a client error that must not be retried
    Terminal,
    /// Returns prose instead of a numbered list
    Garbled,
}

/// Mock gateway for testing translation behavior
#[derive(Debug, Clone)]
pub struct MockGateway {
    /// Behavior mode
    behavior: MockBehavior,
    /// Total calls, shared across clones
    request_count: Arc<AtomicUsize>,
    /// Calls currently in progress
    in_flight: Arc<AtomicUsize>,
    /// Highest value `in_flight` reached
    peak_in_flight: Arc<AtomicUsize>,
    /// Every request received, in arrival order
    requests: Arc<Mutex<Vec<GatewayRequest>>>,
}

/// Decrements the in-flight counter when a call ends
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockGateway {
    /// Create a new mock gateway with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a working mock gateway that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a failing mock gateway that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a gateway that fails `failures` times before succeeding
    pub fn fail_first(failures: usize) -> Self {
        Self::new(MockBehavior::FailFirst { failures })
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().clone()
    }

    /// Translate the numbered list in `request` by tagging each line
    pub fn translate_lines(request: &GatewayRequest) -> Result<String, ProviderError> {
        let lines = parse_numbered_response(&request.text, request.expected_lines)?;
        let translated: Vec<String> = lines
            .iter()
            .map(|line| format!("[{}] {}", request.target_language, line))
            .collect();
        Ok(render_numbered(&translated))
    }

    fn simulated_outage(call: usize) -> ProviderError {
        ProviderError::ApiError {
            status_code: 503,
            message: format!("Simulated provider failure (request #{})", call + 1),
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn translate(&self, request: &GatewayRequest) -> Result<String, ProviderError> {
        let call = self.request_count.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlightGuard(self.in_flight.clone());
        self.requests.lock().push(request.clone());

        match self.behavior {
            MockBehavior::Working => Self::translate_lines(request),

            MockBehavior::Failing => Err(Self::simulated_outage(call)),

            MockBehavior::FailFirst { failures } => {
                if call < failures {
                    Err(Self::simulated_outage(call))
                } else {
                    Self::translate_lines(request)
                }
            }

            MockBehavior::FailBatches { marker } => {
                if request.text.contains(marker) {
                    Err(Self::simulated_outage(call))
                } else {
                    Self::translate_lines(request)
                }
            }

            MockBehavior::Slow { delay_ms } => {
                tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                Self::translate_lines(request)
            }

            MockBehavior::DropPlaceholders => {
                let response = Self::translate_lines(request)?;
                Ok(PLACEHOLDER.replace_all(&response, "").into_owned())
            }

            MockBehavior::Terminal => Err(ProviderError::from_status(400, "Simulated invalid request")),

            MockBehavior::Garbled => Ok("I'm sorry, I can only translate one line at a time.".to_string()),
        }
    }

    async fn test_connection(&self) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(Self::simulated_outage(0)),
            MockBehavior::Terminal => Err(ProviderError::from_status(401, "Simulated bad key")),
            _ => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "Mock"
    }
}
