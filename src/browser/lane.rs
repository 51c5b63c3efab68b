use std::sync::Arc;

use tokio::sync::Mutex;

use crate::errors::{WebClawError, WebClawResult};

/// Serialises blocking browser calls.
///
/// The lane is held by the blocking task itself, so a caller that stops
/// waiting (a timeout dropping its future) does not release it: the next
/// call queues until the abandoned one has really returned.
#[derive(Debug, Clone, Default)]
pub struct BlockingLane {
    busy: Arc<Mutex<()>>,
}

impl BlockingLane {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn run<T, F>(&self, f: F) -> WebClawResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> WebClawResult<T> + Send + 'static,
    {
        let held = self.busy.clone().lock_owned().await;
        tokio::task::spawn_blocking(move || {
            let _held = held;
            f()
        })
        .await
        .map_err(|e| WebClawError::Browser(format!("driver task failed: {e}")))?
    }
}
