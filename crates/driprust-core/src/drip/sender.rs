//! Message sending capability - the SMS provider boundary

use async_trait::async_trait;
use thiserror::Error;

/// Receipt returned by the provider for an accepted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// Provider-assigned message id
    pub provider_id: String,
    /// Provider-reported status (e.g. "queued", "sent")
    pub status: String,
}

/// Send failures, split by whether a retry can help
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Temporary send failure: {0}")]
    Temporary(String),

    #[error("Permanent send failure: {0}")]
    Permanent(String),
}

/// Outbound message capability.
///
/// The engine never retries sends itself; failures propagate to the
/// caller with enrollment state untouched, so a redelivered task retries
/// the same step.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, to: &str, from: &str, body: &str) -> Result<SendReceipt, SendError>;
}
