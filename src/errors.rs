use thiserror::Error;

#[derive(Debug, Error)]
pub enum WebClawError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Scene unavailable: {0}")]
    SceneUnavailable(String),

    #[error("Decision parse error: {0}")]
    DecisionParse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Interaction error ({strategy}): {message}")]
    Interaction { strategy: String, message: String },

    #[error("Stale element: id {0} could not be re-resolved")]
    StaleElement(u32),

    #[error("Budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML deserialize error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Session task failed: {0}")]
    Task(String),

    #[error("Session cancelled")]
    Cancelled,
}

impl WebClawError {
    pub fn interaction(strategy: &str, message: impl Into<String>) -> Self {
        Self::Interaction {
            strategy: strategy.to_string(),
            message: message.into(),
        }
    }

    /// Failures that consume the control loop's whole-step attempt budget.
    pub fn is_step_retryable(&self) -> bool {
        matches!(
            self,
            Self::SceneUnavailable(_) | Self::DecisionParse(_) | Self::Transport(_) | Self::Http(_)
        )
    }

    /// Failures that let the executor move on to the next interaction strategy.
    pub fn is_cascade_recoverable(&self) -> bool {
        matches!(self, Self::Interaction { .. })
    }
}

impl serde::Serialize for WebClawError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

pub type WebClawResult<T> = Result<T, WebClawError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_tiers_do_not_overlap() {
        let step = [
            WebClawError::SceneUnavailable("loading".into()),
            WebClawError::DecisionParse("bad".into()),
            WebClawError::Transport("timeout".into()),
        ];
        for e in &step {
            assert!(e.is_step_retryable(), "{e}");
            assert!(!e.is_cascade_recoverable(), "{e}");
        }

        let cascade = WebClawError::interaction("native", "obscured");
        assert!(cascade.is_cascade_recoverable());
        assert!(!cascade.is_step_retryable());

        assert!(!WebClawError::StaleElement(3).is_cascade_recoverable());
        assert!(!WebClawError::StaleElement(3).is_step_retryable());
        assert!(!WebClawError::BudgetExceeded("steps".into()).is_step_retryable());
    }

    #[test]
    fn serializes_as_display_string() {
        let json = serde_json::to_string(&WebClawError::StaleElement(3)).unwrap();
        assert_eq!(json, "\"Stale element: id 3 could not be re-resolved\"");
    }
}
