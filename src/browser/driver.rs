use async_trait::async_trait;

use crate::errors::WebClawResult;

/// Capability set the agent needs from a browser-automation backend.
///
/// Selector-based operations address the top-level document only; elements in
/// nested frames are reached through `evaluate` with the helpers in
/// [`crate::browser::frames`]. Element-level failures should surface as
/// `WebClawError::Interaction` so the executor's cascade can move on.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> WebClawResult<()>;

    /// Evaluate an expression in the top-level document and return its value.
    /// Scripts used by this crate return JSON strings, which are returned as
    /// `Value::String`.
    async fn evaluate(&self, script: &str) -> WebClawResult<serde_json::Value>;

    /// PNG screenshot of the current viewport.
    async fn screenshot(&self) -> WebClawResult<Vec<u8>>;

    async fn click(&self, selector: &str) -> WebClawResult<()>;

    async fn type_into(&self, selector: &str, text: &str, clear_first: bool) -> WebClawResult<()>;

    async fn hover(&self, selector: &str) -> WebClawResult<()>;

    async fn select_option(&self, selector: &str, value: &str) -> WebClawResult<()>;

    /// Mouse click at viewport CSS-pixel coordinates.
    async fn click_at(&self, x: f64, y: f64) -> WebClawResult<()>;

    async fn move_mouse_to(&self, x: f64, y: f64) -> WebClawResult<()>;

    /// Send key events for `text` to whatever currently has focus.
    async fn insert_text(&self, text: &str) -> WebClawResult<()>;

    async fn press_key(&self, key: &str) -> WebClawResult<()>;

    async fn scroll_by(&self, dx: i64, dy: i64) -> WebClawResult<()> {
        self.evaluate(&format!("window.scrollBy({dx}, {dy}); 'ok'"))
            .await
            .map(|_| ())
    }

    async fn go_back(&self) -> WebClawResult<()> {
        self.evaluate("history.back(); 'ok'").await.map(|_| ())
    }
}
