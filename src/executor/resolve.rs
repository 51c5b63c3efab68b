/// Re-locates a catalogued element right before it is acted on.
use crate::browser::frames::{decode_json_result, id_selector, in_frame, js_string, ID_ATTR};
use crate::browser::BrowserDriver;
use crate::errors::{WebClawError, WebClawResult};
use crate::perception::types::{FramePath, IndexedElement};

/// Pixels an element may drift from its indexed bounds and still count as the same element.
const BOUNDS_TOLERANCE: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTarget {
    pub id: u32,
    /// Selector valid inside the element's own document.
    pub selector: String,
    pub frame_path: FramePath,
    /// Current center in top-level viewport CSS pixels.
    pub center: (f64, f64),
    /// True when the id attribute was lost and the element was found again by bounds.
    pub relocated: bool,
}

fn resolve_body(el: &IndexedElement) -> String {
    let b = &el.bounds;
    format!(
        r#"// webclawResolve
const ATTR = {attr}, ID = {id}, TAG = {tag}, TOL = {tol};
const B = {{ x: {x}, y: {y}, w: {w}, h: {h} }};
function fits(e) {{
  if (!e || e.tagName.toLowerCase() !== TAG) return false;
  const r = e.getBoundingClientRect();
  return Math.abs(ox + r.left - B.x) <= TOL && Math.abs(oy + r.top - B.y) <= TOL
    && Math.abs(r.width - B.w) <= TOL && Math.abs(r.height - B.h) <= TOL;
}}
let el = doc.querySelector('[' + ATTR + '="' + ID + '"]');
let relocated = false;
if (el && !el.isConnected) el = null;
if (!el) {{
  let cand = doc.elementFromPoint(B.x + B.w / 2 - ox, B.y + B.h / 2 - oy);
  while (cand && !fits(cand)) cand = cand.parentElement;
  if (cand) {{ cand.setAttribute(ATTR, String(ID)); el = cand; relocated = true; }}
}}
if (!el) return JSON.stringify({{ ok: false, error: 'element not found' }});
const r = el.getBoundingClientRect();
if (r.width <= 0 || r.height <= 0) return JSON.stringify({{ ok: false, error: 'element no longer rendered' }});
return JSON.stringify({{ ok: true, relocated, x: ox + r.left + r.width / 2, y: oy + r.top + r.height / 2 }});"#,
        attr = js_string(ID_ATTR),
        id = el.id,
        tag = js_string(&el.tag),
        tol = BOUNDS_TOLERANCE,
        x = b.x,
        y = b.y,
        w = b.width,
        h = b.height,
    )
}

/// Find the element again by id, falling back to tag + bounds at its recorded
/// position. Fails with `StaleElement` when neither matches.
pub async fn resolve(driver: &dyn BrowserDriver, el: &IndexedElement) -> WebClawResult<ResolvedTarget> {
    let script = in_frame(&el.frame_path, &resolve_body(el));
    let value = decode_json_result(driver.evaluate(&script).await?)?;

    if value["ok"].as_bool() != Some(true) {
        tracing::debug!(
            id = el.id,
            reason = value["error"].as_str().unwrap_or("unknown"),
            "element could not be re-resolved"
        );
        return Err(WebClawError::StaleElement(el.id));
    }

    let center = match (value["x"].as_f64(), value["y"].as_f64()) {
        (Some(x), Some(y)) => (x, y),
        _ => el.bounds.center(),
    };
    let relocated = value["relocated"].as_bool().unwrap_or(false);
    if relocated {
        tracing::info!(id = el.id, "element re-tagged by position");
    }

    Ok(ResolvedTarget {
        id: el.id,
        selector: id_selector(el.id),
        frame_path: el.frame_path.clone(),
        center,
        relocated,
    })
}
