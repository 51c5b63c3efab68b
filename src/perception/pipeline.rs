/// Perception pipeline: index → screenshot → annotate, producing one
/// `AnnotatedScene` per step.
use crate::browser::BrowserDriver;
use crate::errors::{WebClawError, WebClawResult};
use crate::perception::annotator;
use crate::perception::indexer::ElementIndexer;
use crate::perception::types::AnnotatedScene;

/// Index first so the screenshot shows the page the catalog describes.
pub async fn perceive(
    driver: &dyn BrowserDriver,
    indexer: &ElementIndexer,
) -> WebClawResult<AnnotatedScene> {
    let index = indexer.index(driver).await?;

    let shot = driver
        .screenshot()
        .await
        .map_err(|e| WebClawError::SceneUnavailable(format!("screenshot failed: {e}")))?;

    // Rasterising is CPU-bound; keep it off the async workers.
    let elements = index.elements.clone();
    let viewport = index.viewport;
    let image = tokio::task::spawn_blocking(move || {
        annotator::annotate_scene(&shot, &elements, &viewport)
    })
    .await
    .map_err(|e| WebClawError::SceneUnavailable(format!("annotate join: {e}")))??;

    tracing::debug!(
        elements = index.elements.len(),
        bytes = image.len(),
        "scene annotated"
    );

    Ok(AnnotatedScene {
        image,
        elements: index.elements,
        viewport: index.viewport,
        url: index.url,
        title: index.title,
        timestamp: chrono::Utc::now(),
    })
}
