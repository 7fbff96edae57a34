//! Upstream generation-service clients.
//!
//! The streaming side is a narrow seam: submit a request, receive an
//! ordered event sequence. Alternate backends can be substituted without
//! touching the reassembly logic.

pub mod openai;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::model::CompletionRequest;

/// Ordered events produced by a streaming generation call: zero or more
/// `Delta`s, then exactly one of `Done`/`Error`. Events may be produced
/// on a different task than the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionEvent {
    /// One partial text fragment.
    Delta(String),
    /// Normal end of stream.
    Done,
    /// Upstream failure; terminal.
    Error(String),
}

/// Single-shot generation call returning one full text result.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> anyhow::Result<String>;

    fn provider_name(&self) -> &'static str;
}

/// Streaming generation call.
#[async_trait]
pub trait StreamingLlmClient: Send + Sync {
    /// Start the call and return the ordered event receiver.
    async fn stream_chat(
        &self,
        request: &CompletionRequest,
    ) -> anyhow::Result<mpsc::Receiver<CompletionEvent>>;

    fn provider_name(&self) -> &'static str;
}
