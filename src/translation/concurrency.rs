/*!
 * Provider-specific concurrency ceilings.
 *
 * `threads` from the job options is the user's request; each backend kind
 * also has a ceiling past which extra in-flight batches only trigger rate
 * limiting. The effective pool size is the smaller of the two.
 */

use log::info;

use crate::app_config::ProviderConnection;

/// Provider-specific concurrency profile
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderProfile {
    /// Maximum concurrent requests
    pub max_concurrent_requests: usize,
}

impl ProviderProfile {
    /// Get the profile for a connection
    pub fn for_connection(connection: &ProviderConnection) -> Self {
        match connection {
            ProviderConnection::OpenAi { .. } => Self {
                max_concurrent_requests: 10,
            },
            ProviderConnection::Anthropic { .. } => Self {
                max_concurrent_requests: 5,
            },
            ProviderConnection::LocalProxy { .. } => Self {
                // The proxy rotates keys across upstream providers
                max_concurrent_requests: 8,
            },
            ProviderConnection::Ollama { .. } => Self {
                max_concurrent_requests: 4,
            },
        }
    }

    /// Effective pool size for the requested thread count (at least 1)
    pub fn effective_threads(&self, requested: usize) -> usize {
        let effective = requested.clamp(1, self.max_concurrent_requests.max(1));
        if effective < requested {
            info!(
                "Limiting concurrency to {} in-flight batches (requested {})",
                effective, requested
            );
        }
        effective
    }
}
