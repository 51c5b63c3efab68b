/// Element indexer: catalogues interactive elements of the live page,
/// descending into same-origin frames depth-first in document order.
///
/// Each pass clears the previous pass's id attributes before tagging, so an id
/// only ever refers to the element tagged in the current step.
use std::time::Duration;

use serde::Deserialize;

use crate::browser::frames::{decode_json_result, ID_ATTR};
use crate::browser::BrowserDriver;
use crate::config::BrowserConfig;
use crate::errors::{WebClawError, WebClawResult};
use crate::perception::types::{Bounds, ElementRole, IndexedElement, Viewport};

const INDEX_JS: &str = r#"
(() => {
  const ATTR = '__ATTR__';
  const MAX = __MAX__;
  if (document.readyState === 'loading' || !document.body) {
    return JSON.stringify({ ready: false });
  }
  const SELECTOR = [
    'a[href]', 'button', 'input:not([type=hidden])', 'textarea', 'select', 'summary',
    '[role=button]', '[role=link]', '[role=checkbox]', '[role=radio]', '[role=tab]',
    '[role=menuitem]', '[role=option]', '[role=switch]', '[role=combobox]', '[role=textbox]',
    '[contenteditable=""]', '[contenteditable=true]', '[onclick]',
    '[tabindex]:not([tabindex="-1"])'
  ].join(',');
  const vw = window.innerWidth, vh = window.innerHeight;
  const out = [];
  let next = 1, skipped = 0;

  function roleOf(el) {
    const explicit = el.getAttribute('role');
    if (explicit) return explicit;
    const t = el.tagName.toLowerCase();
    if (t === 'a') return 'link';
    if (t === 'input') {
      const ty = (el.type || 'text').toLowerCase();
      if (['button', 'submit', 'reset', 'image'].includes(ty)) return 'button';
      if (ty === 'checkbox' || ty === 'radio') return ty;
      return 'input';
    }
    if (['textarea', 'select', 'button', 'summary'].includes(t)) return t;
    if (el.isContentEditable) return 'editable';
    return t;
  }

  function labelOf(el) {
    const candidates = [
      el.getAttribute('aria-label'), el.innerText, el.getAttribute('placeholder'),
      el.getAttribute('title'), el.getAttribute('alt'), el.value, el.getAttribute('name')
    ];
    for (const c of candidates) {
      if (typeof c === 'string' && c.trim()) return c.trim().replace(/\s+/g, ' ').slice(0, 80);
    }
    return '';
  }

  function zOf(el, win) {
    let z = 0;
    for (let n = el; n && n.nodeType === 1; n = n.parentElement) {
      const v = parseInt(win.getComputedStyle(n).zIndex, 10);
      if (!isNaN(v) && v > z) z = v;
    }
    return z;
  }

  function walk(doc, path, ox, oy, zBase) {
    doc.querySelectorAll('[' + ATTR + ']').forEach(el => el.removeAttribute(ATTR));
    const win = doc.defaultView || window;
    const frames = Array.from(doc.querySelectorAll('iframe,frame'));
    for (const el of doc.querySelectorAll(SELECTOR + ',iframe,frame')) {
      const tag = el.tagName.toLowerCase();
      if (tag === 'iframe' || tag === 'frame') {
        let inner = null;
        try { inner = el.contentDocument; } catch (e) { inner = null; }
        if (!inner) { skipped++; continue; }
        const fr = el.getBoundingClientRect();
        walk(inner, path.concat([frames.indexOf(el)]),
             ox + fr.left + el.clientLeft, oy + fr.top + el.clientTop, zBase + zOf(el, win));
        continue;
      }
      if (out.length >= MAX) continue;
      const r = el.getBoundingClientRect();
      const s = win.getComputedStyle(el);
      const x = ox + r.left, y = oy + r.top;
      const rendered = r.width > 0 && r.height > 0 && s.display !== 'none'
        && s.visibility !== 'hidden' && parseFloat(s.opacity || '1') > 0;
      const inView = x + r.width > 0 && y + r.height > 0 && x < vw && y < vh;
      const enabled = !el.disabled && el.getAttribute('aria-disabled') !== 'true';
      const id = next++;
      el.setAttribute(ATTR, String(id));
      out.push({
        id, role: roleOf(el), tag, label: labelOf(el),
        x, y, w: r.width, h: r.height, frame: path,
        visible: rendered && inView, enabled, z: zBase + zOf(el, win)
      });
    }
  }

  walk(document, [], 0, 0, 0);
  return JSON.stringify({
    ready: true, url: location.href, title: document.title,
    viewport: { width: vw, height: vh, dpr: window.devicePixelRatio || 1 },
    skipped_frames: skipped, elements: out
  });
})()
"#;

#[derive(Debug, Deserialize)]
struct ScanResult {
    ready: bool,
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    viewport: Option<ScanViewport>,
    #[serde(default)]
    skipped_frames: u32,
    #[serde(default)]
    elements: Vec<ScanElement>,
}

#[derive(Debug, Deserialize)]
struct ScanViewport {
    width: f64,
    height: f64,
    #[serde(default = "one")]
    dpr: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct ScanElement {
    id: u32,
    role: String,
    tag: String,
    #[serde(default)]
    label: String,
    x: f64,
    y: f64,
    w: f64,
    h: f64,
    #[serde(default)]
    frame: Vec<u32>,
    visible: bool,
    enabled: bool,
    #[serde(default)]
    z: i32,
}

/// Result of one indexing pass.
#[derive(Debug, Clone)]
pub struct PageIndex {
    pub elements: Vec<IndexedElement>,
    pub viewport: Viewport,
    pub url: String,
    pub title: String,
}

pub struct ElementIndexer {
    max_elements: usize,
    attempts: u32,
    retry_delay: Duration,
}

impl ElementIndexer {
    pub fn new(cfg: &BrowserConfig) -> Self {
        Self {
            max_elements: cfg.max_elements,
            attempts: cfg.scan_attempts.max(1),
            retry_delay: Duration::from_millis(cfg.scan_retry_delay_ms),
        }
    }

    pub fn script(&self) -> String {
        INDEX_JS
            .replace("__ATTR__", ID_ATTR)
            .replace("__MAX__", &self.max_elements.to_string())
    }

    /// Scan the page, retrying while the document is mid-navigation.
    pub async fn index(&self, driver: &dyn BrowserDriver) -> WebClawResult<PageIndex> {
        let script = self.script();
        let mut last_err = String::new();

        for attempt in 1..=self.attempts {
            let scanned = match driver.evaluate(&script).await {
                Ok(value) => decode_json_result(value).and_then(parse_scan),
                Err(e) => Err(e),
            };
            match scanned {
                Ok(index) => {
                    tracing::debug!(
                        attempt,
                        elements = index.elements.len(),
                        url = %index.url,
                        "page indexed"
                    );
                    return Ok(index);
                }
                Err(e @ (WebClawError::SceneUnavailable(_) | WebClawError::Browser(_) | WebClawError::Json(_))) => {
                    tracing::debug!(attempt, error = %e, "index scan not ready, retrying");
                    last_err = e.to_string();
                }
                Err(e) => return Err(e),
            }
            if attempt < self.attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        Err(WebClawError::SceneUnavailable(format!(
            "page not indexable after {} attempts: {last_err}",
            self.attempts
        )))
    }
}

/// Convert the scanner's JSON into a validated catalog.
pub fn parse_scan(value: serde_json::Value) -> WebClawResult<PageIndex> {
    let scan: ScanResult = serde_json::from_value(value)?;
    if !scan.ready {
        return Err(WebClawError::SceneUnavailable("document is still loading".into()));
    }
    let viewport = scan
        .viewport
        .map(|v| Viewport {
            width: v.width,
            height: v.height,
            device_pixel_ratio: v.dpr,
        })
        .ok_or_else(|| WebClawError::SceneUnavailable("scan reported no viewport".into()))?;

    if scan.skipped_frames > 0 {
        tracing::debug!(skipped = scan.skipped_frames, "cross-origin frames not indexed");
    }

    let mut elements = Vec::with_capacity(scan.elements.len());
    for (pos, raw) in scan.elements.into_iter().enumerate() {
        let expected = pos as u32 + 1;
        if raw.id != expected {
            // The page re-entered the scanner or mutated mid-pass.
            return Err(WebClawError::SceneUnavailable(format!(
                "element ids not dense: expected {expected}, got {}",
                raw.id
            )));
        }
        elements.push(IndexedElement {
            id: raw.id,
            role: ElementRole::from_scan(&raw.role),
            tag: raw.tag,
            label: raw.label,
            bounds: Bounds {
                x: raw.x,
                y: raw.y,
                width: raw.w,
                height: raw.h,
            },
            frame_path: raw.frame,
            visible: raw.visible,
            enabled: raw.enabled,
            z_order: raw.z,
        });
    }

    Ok(PageIndex {
        elements,
        viewport,
        url: scan.url,
        title: scan.title,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn element(id: u32, frame: Vec<u32>) -> serde_json::Value {
        let x = 10.0 * id as f64;
        json!({
            "id": id, "role": "button", "tag": "button", "label": format!("b{id}"),
            "x": x, "y": 5.0, "w": 40.0, "h": 20.0,
            "frame": frame, "visible": true, "enabled": id != 2, "z": 0
        })
    }

    #[test]
    fn parses_dense_catalog_with_frame_paths() {
        let index = parse_scan(json!({
            "ready": true,
            "url": "https://example.com/",
            "title": "Example",
            "viewport": { "width": 1280.0, "height": 800.0, "dpr": 2.0 },
            "elements": [element(1, vec![]), element(2, vec![0]), element(3, vec![0, 1])]
        }))
        .unwrap();

        let ids: Vec<u32> = index.elements.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(index.elements[2].frame_path, vec![0, 1]);
        assert!(!index.elements[1].enabled);
        assert_eq!(index.viewport.device_pixel_ratio, 2.0);
        assert_eq!(index.elements[0].role, ElementRole::Button);
    }

    #[test]
    fn loading_document_is_scene_unavailable() {
        let err = parse_scan(json!({ "ready": false })).unwrap_err();
        assert!(matches!(err, WebClawError::SceneUnavailable(_)));
    }

    #[test]
    fn gaps_in_ids_are_rejected() {
        let err = parse_scan(json!({
            "ready": true,
            "viewport": { "width": 800.0, "height": 600.0 },
            "elements": [element(1, vec![]), element(3, vec![])]
        }))
        .unwrap_err();
        assert!(matches!(err, WebClawError::SceneUnavailable(_)));
    }

    #[test]
    fn script_embeds_attribute_and_limit() {
        let indexer = ElementIndexer::new(&BrowserConfig {
            max_elements: 42,
            ..BrowserConfig::default()
        });
        let js = indexer.script();
        assert!(js.contains("const MAX = 42;"));
        assert!(js.contains(ID_ATTR));
        assert!(!js.contains("__ATTR__"));
    }
}
