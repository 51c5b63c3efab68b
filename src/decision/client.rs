use std::sync::Arc;

use base64::Engine;

use crate::agent_engine::state::{ActionOutcome, Objective};
use crate::decision::parser::parse_decision;
use crate::decision::prompt::{user_text, SYSTEM_PROMPT};
use crate::decision::types::Decision;
use crate::errors::{WebClawError, WebClawResult};
use crate::llm::provider::LlmProvider;
use crate::llm::types::{CallConfig, ChatMessage, ContentPart};
use crate::perception::types::AnnotatedScene;

/// Turns one annotated scene into one validated decision.
///
/// Every call carries its full context; nothing is remembered between calls
/// and nothing is retried here.
pub struct DecisionClient {
    provider: Arc<dyn LlmProvider>,
    call: CallConfig,
    history_window: usize,
}

impl DecisionClient {
    pub fn new(provider: Arc<dyn LlmProvider>, call: CallConfig, history_window: usize) -> Self {
        Self {
            provider,
            call,
            history_window,
        }
    }

    pub fn build_messages(
        &self,
        objective: &Objective,
        scene: &AnnotatedScene,
        history: &[ActionOutcome],
        step_count: u32,
    ) -> Vec<ChatMessage> {
        let window = &history[history.len().saturating_sub(self.history_window)..];
        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&scene.image);
        vec![
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user_parts(vec![
                ContentPart::text(user_text(objective, scene, window, step_count)),
                ContentPart::png(&image_b64),
            ]),
        ]
    }

    pub async fn decide(
        &self,
        objective: &Objective,
        scene: &AnnotatedScene,
        history: &[ActionOutcome],
        step_count: u32,
    ) -> WebClawResult<Decision> {
        let messages = self.build_messages(objective, scene, history, step_count);
        let reply = self.provider.chat(messages, &self.call).await?;

        if reply.content.trim().is_empty() {
            return Err(WebClawError::DecisionParse("model returned no content".into()));
        }

        let decision = match parse_decision(&reply.content, &scene.elements) {
            Ok(d) => d,
            Err(e) if !reply.finished => {
                return Err(WebClawError::DecisionParse(format!("stream ended early: {e}")));
            }
            Err(e) => return Err(e),
        };

        tracing::info!(
            step = step_count + 1,
            action = %decision.action.describe(),
            confidence = decision.confidence,
            objective_complete = decision.objective_complete,
            "decision received"
        );
        if !decision.thought.is_empty() {
            tracing::debug!(thought = %decision.thought, "model reasoning");
        }
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::types::Action;
    use crate::llm::types::{LlmResponse, MessageContent};
    use crate::perception::types::Viewport;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned {
        reply: LlmResponse,
        seen: Mutex<Vec<Vec<ChatMessage>>>,
    }

    #[async_trait]
    impl LlmProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> WebClawResult<LlmResponse> {
            self.seen.lock().unwrap().push(messages);
            Ok(self.reply.clone())
        }
    }

    fn scene() -> AnnotatedScene {
        AnnotatedScene {
            image: vec![1, 2, 3],
            elements: vec![],
            viewport: Viewport { width: 800.0, height: 600.0, device_pixel_ratio: 1.0 },
            url: "about:blank".into(),
            title: String::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    fn client(content: &str, finished: bool) -> (Arc<Canned>, DecisionClient) {
        let provider = Arc::new(Canned {
            reply: LlmResponse { content: content.into(), reasoning: String::new(), finished },
            seen: Mutex::new(Vec::new()),
        });
        let call = CallConfig { model: "m".into(), stream: true, temperature: 0.0 };
        (provider.clone(), DecisionClient::new(provider, call, 2))
    }

    fn history(n: u32) -> Vec<ActionOutcome> {
        (1..=n).map(|s| ActionOutcome::failed(s, Action::GoBack, format!("boom {s}"))).collect()
    }

    #[tokio::test]
    async fn sends_image_and_windowed_history() {
        let (provider, client) = client(r#"{"action":{"name":"DONE"}}"#, true);
        let objective = Objective::new("find docs").unwrap();
        let decision = client.decide(&objective, &scene(), &history(5), 5).await.unwrap();
        assert!(decision.objective_complete);

        let seen = provider.seen.lock().unwrap();
        let MessageContent::Parts(parts) = &seen[0][1].content else {
            panic!("user message should be multipart");
        };
        let ContentPart::Text { text } = &parts[0] else { panic!("text first") };
        assert!(text.contains("boom 5") && text.contains("boom 4"));
        assert!(!text.contains("boom 3"));
        assert!(text.contains("Step: 6"));
        let ContentPart::ImageUrl { image_url } = &parts[1] else { panic!("image second") };
        assert_eq!(image_url.url, "data:image/png;base64,AQID");
    }

    #[tokio::test]
    async fn truncated_stream_is_parse_error() {
        let (_, client) = client(r#"{"thought":"x","action":{"name":"NAV"#, false);
        let err = client
            .decide(&Objective::new("x").unwrap(), &scene(), &[], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, WebClawError::DecisionParse(m) if m.contains("stream ended early")));
    }

    #[tokio::test]
    async fn empty_reply_is_parse_error() {
        let (_, client) = client("  ", true);
        let err = client
            .decide(&Objective::new("x").unwrap(), &scene(), &[], 0)
            .await
            .unwrap_err();
        assert!(matches!(err, WebClawError::DecisionParse(_)));
    }
}
