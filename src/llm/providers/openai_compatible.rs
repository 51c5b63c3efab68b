use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;

use crate::errors::{WebClawError, WebClawResult};
use crate::llm::provider::LlmProvider;
use crate::llm::sse_parser;
use crate::llm::types::{CallConfig, ChatMessage, LlmResponse, StreamChunkKind};

pub struct OpenAiCompatibleProvider {
    id: String,
    api_base: String,
    api_key: String,
    json_mode: bool,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(
        id: String,
        api_base: String,
        api_key: String,
        timeout: Duration,
        json_mode: bool,
    ) -> WebClawResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WebClawError::Config(format!("HTTP client for '{id}': {e}")))?;
        Ok(Self {
            id,
            api_base,
            api_key,
            json_mode,
            client,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], cfg: &CallConfig) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": cfg.model,
            "messages": messages,
            "stream": cfg.stream,
            "temperature": cfg.temperature,
        });
        if self.json_mode {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.id
    }

    async fn chat(&self, messages: Vec<ChatMessage>, cfg: &CallConfig) -> WebClawResult<LlmResponse> {
        let body = self.request_body(&messages, cfg);

        tracing::debug!(
            provider = %self.id,
            model = %cfg.model,
            stream = cfg.stream,
            "sending LLM request"
        );
        tracing::trace!(body = %sanitized_for_log(&body), "request body (images omitted)");

        let response = self
            .client
            .post(&self.api_base)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| WebClawError::Transport(format!("{}: {e}", self.id)))?;

        if !response.status().is_success() {
            let status = response.status();
            let err_body = response.text().await.unwrap_or_default();
            return Err(WebClawError::Transport(format!("{}: {status}: {err_body}", self.id)));
        }

        if cfg.stream {
            self.handle_stream(response).await
        } else {
            self.handle_json(response).await
        }
    }
}

impl OpenAiCompatibleProvider {
    /// Buffer an SSE response into a single reply.
    async fn handle_stream(&self, response: reqwest::Response) -> WebClawResult<LlmResponse> {
        let mut byte_stream = response.bytes_stream();
        let mut acc = StreamAccumulator::default();

        while let Some(result) = byte_stream.next().await {
            let bytes = result.map_err(|e| WebClawError::Transport(format!("stream interrupted: {e}")))?;
            if acc.push(&bytes)? {
                break;
            }
        }

        let reply = acc.finish();
        tracing::info!(
            content_len = reply.content.len(),
            reasoning_len = reply.reasoning.len(),
            finished = reply.finished,
            "LLM stream complete"
        );
        Ok(reply)
    }

    async fn handle_json(&self, response: reqwest::Response) -> WebClawResult<LlmResponse> {
        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| WebClawError::Transport(format!("unreadable response body: {e}")))?;

        let message = &json["choices"][0]["message"];
        let content = message["content"].as_str().unwrap_or("").to_string();
        let reasoning = message["reasoning_content"].as_str().unwrap_or("").to_string();

        tracing::info!(content_len = content.len(), "LLM JSON response received");

        Ok(LlmResponse {
            content,
            reasoning,
            finished: true,
        })
    }
}

/// Splits arbitrary byte chunks into SSE lines and collects the deltas.
#[derive(Default)]
pub struct StreamAccumulator {
    pending: Vec<u8>,
    content: String,
    reasoning: String,
    finished: bool,
}

impl StreamAccumulator {
    /// Feed raw bytes. Returns true once the terminal marker has been seen.
    pub fn push(&mut self, bytes: &[u8]) -> WebClawResult<bool> {
        self.pending.extend_from_slice(bytes);
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if self.line(line.trim())? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn line(&mut self, line: &str) -> WebClawResult<bool> {
        let Some(chunk) = sse_parser::parse_sse_line(line)? else {
            return Ok(false);
        };
        match chunk.kind {
            StreamChunkKind::Reasoning => self.reasoning.push_str(&chunk.content),
            StreamChunkKind::Content => self.content.push_str(&chunk.content),
            StreamChunkKind::Done => self.finished = true,
        }
        Ok(self.finished)
    }

    pub fn finish(mut self) -> LlmResponse {
        if !self.finished && !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&std::mem::take(&mut self.pending)).to_string();
            if let Err(e) = self.line(tail.trim()) {
                tracing::debug!("trailing SSE fragment skipped: {e}");
            }
        }
        LlmResponse {
            content: self.content,
            reasoning: self.reasoning,
            finished: self.finished,
        }
    }
}

/// Copy of the request body with inline images replaced, for logging.
fn sanitized_for_log(body: &serde_json::Value) -> String {
    let mut log_body = body.clone();
    if let Some(msgs) = log_body.get_mut("messages").and_then(|m| m.as_array_mut()) {
        for part in msgs
            .iter_mut()
            .filter_map(|m| m.get_mut("content").and_then(|c| c.as_array_mut()))
            .flatten()
        {
            if part.get("type").and_then(|t| t.as_str()) == Some("image_url") {
                part["image_url"]["url"] = serde_json::Value::String("<omitted_base64_image>".into());
            }
        }
    }
    serde_json::to_string(&log_body).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::types::ContentPart;

    #[test]
    fn accumulates_across_split_chunks() {
        let mut acc = StreamAccumulator::default();
        assert!(!acc.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"a\\\"\"}}]}\n\nda").unwrap());
        assert!(!acc.push(b"ta: {\"choices\":[{\"delta\":{\"content\":\":1}\"}}]}\n").unwrap());
        assert!(acc.push(b"data: [DONE]\n").unwrap());
        let reply = acc.finish();
        assert_eq!(reply.content, "{\"a\":1}");
        assert!(reply.finished);
    }

    #[test]
    fn stream_without_terminal_marker_is_unfinished() {
        let mut acc = StreamAccumulator::default();
        acc.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"thou\"}}]}\n").unwrap();
        let reply = acc.finish();
        assert!(!reply.finished);
        assert_eq!(reply.content, "{\"thou");
    }

    #[test]
    fn json_mode_sets_response_format() {
        let provider = OpenAiCompatibleProvider::new(
            "local".into(),
            "http://127.0.0.1:9/v1/chat/completions".into(),
            String::new(),
            Duration::from_secs(1),
            true,
        )
        .unwrap();
        let cfg = CallConfig {
            model: "m".into(),
            stream: false,
            temperature: 0.0,
        };
        let body = provider.request_body(&[ChatMessage::system("hi")], &cfg);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["stream"], false);
    }

    #[test]
    fn log_copy_omits_images() {
        let body = serde_json::json!({
            "messages": [ChatMessage::user_parts(vec![ContentPart::text("x"), ContentPart::png("AAAA")])]
        });
        let logged = sanitized_for_log(&body);
        assert!(!logged.contains("AAAA"));
        assert!(logged.contains("<omitted_base64_image>"));
    }
}
