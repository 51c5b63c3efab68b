use async_trait::async_trait;

use crate::errors::WebClawResult;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse};

/// Chat-completion backend. Implementations return the whole reply; streamed
/// replies are buffered before returning.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Identifier matching the `[llm.providers.<id>]` key.
    fn name(&self) -> &str;

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> WebClawResult<LlmResponse>;
}
