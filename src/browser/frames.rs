/// Helpers for addressing elements inside nested same-origin frames.
///
/// Every in-page script built here returns `JSON.stringify(...)` so the result
/// survives drivers that only return primitive values.
use crate::errors::{WebClawError, WebClawResult};

/// Attribute the indexer writes onto every catalogued element.
pub const ID_ATTR: &str = "data-webclaw-id";

pub fn id_selector(id: u32) -> String {
    format!("[{ID_ATTR}=\"{id}\"]")
}

/// Walks a frame path from the top document. Returns `{doc, ox, oy}` where
/// `ox/oy` is the frame's content origin in top-level viewport pixels, or
/// `null` when a frame is missing or cross-origin.
const FRAME_RESOLVER: &str = r#"
function webclawFrame(path) {
  let doc = document, ox = 0, oy = 0;
  for (const idx of path) {
    const frames = doc.querySelectorAll('iframe,frame');
    const frame = frames[idx];
    if (!frame) return null;
    let inner = null;
    try { inner = frame.contentDocument; } catch (e) { inner = null; }
    if (!inner) return null;
    const r = frame.getBoundingClientRect();
    ox += r.left + frame.clientLeft;
    oy += r.top + frame.clientTop;
    doc = inner;
  }
  return { doc, ox, oy };
}
"#;

/// Wrap `body` so it runs with `doc`, `ox` and `oy` bound to the frame at `path`.
/// `body` must `return JSON.stringify(...)`.
pub fn in_frame(path: &[u32], body: &str) -> String {
    let path_literal = serde_json::to_string(path).unwrap_or_else(|_| "[]".into());
    format!(
        "(() => {{\n{FRAME_RESOLVER}\nconst __f = webclawFrame({path_literal});\n\
         if (!__f) return JSON.stringify({{ ok: false, error: 'frame unavailable' }});\n\
         const doc = __f.doc, ox = __f.ox, oy = __f.oy;\n{body}\n}})()"
    )
}

/// Quote a Rust string as a JS string literal.
pub fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".into())
}

/// Unwrap a `JSON.stringify` result returned by the driver.
pub fn decode_json_result(value: serde_json::Value) -> WebClawResult<serde_json::Value> {
    match value {
        serde_json::Value::String(s) => Ok(serde_json::from_str(&s)?),
        serde_json::Value::Null => Err(WebClawError::Browser("script returned no value".into())),
        other => Ok(other),
    }
}
