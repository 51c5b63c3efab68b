/// Validation of raw decision payloads.
///
/// Dispatches on the action name and builds the typed `Action` variant; any
/// unknown name, missing parameter or wrong type is a `DecisionParse` error.
use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::decision::types::{Action, ActionKind, ClickTarget, Decision, ScrollDirection};
use crate::errors::{WebClawError, WebClawResult};
use crate::perception::types::{find_element, IndexedElement};

const DEFAULT_CONFIDENCE: f64 = 0.5;
const DEFAULT_SCROLL_PX: u32 = 600;

fn parse_err(msg: impl Into<String>) -> WebClawError {
    WebClawError::DecisionParse(msg.into())
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").expect("static regex"))
}

/// Pull the first balanced JSON object out of the model's text, tolerating
/// markdown fences and surrounding prose.
pub fn extract_json_object(content: &str) -> WebClawResult<&str> {
    let body = fence_re()
        .captures(content)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(content);

    let start = body
        .find('{')
        .ok_or_else(|| parse_err("no JSON object in model response"))?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in body[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&body[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    Err(parse_err("unterminated JSON object in model response"))
}

/// Parse and validate a decision against the current step's catalog.
pub fn parse_decision(content: &str, catalog: &[IndexedElement]) -> WebClawResult<Decision> {
    let raw = extract_json_object(content)?;
    let value: Value =
        serde_json::from_str(raw).map_err(|e| parse_err(format!("invalid JSON: {e}")))?;
    let obj = value
        .as_object()
        .ok_or_else(|| parse_err("decision must be a JSON object"))?;

    let thought = match obj.get("thought") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => return Err(parse_err(format!("thought must be a string, got {other}"))),
    };

    let action_obj = obj
        .get("action")
        .and_then(Value::as_object)
        .ok_or_else(|| parse_err("missing 'action' object"))?;
    let name = action_obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| parse_err("missing 'action.name'"))?;
    let kind = ActionKind::parse(name).ok_or_else(|| parse_err(format!("unknown action '{name}'")))?;

    let empty = Map::new();
    let params = match action_obj.get("parameters") {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(m)) => m,
        Some(other) => {
            return Err(parse_err(format!("action.parameters must be an object, got {other}")))
        }
    };

    let action = build_action(kind, params, catalog)?;
    let confidence = coerce_confidence(obj.get("confidence"))?;
    let flagged = match obj.get("objective_complete") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(other) => {
            return Err(parse_err(format!("objective_complete must be a bool, got {other}")))
        }
    };

    Ok(Decision {
        thought,
        objective_complete: flagged || kind == ActionKind::Done,
        action,
        confidence,
    })
}

fn build_action(
    kind: ActionKind,
    p: &Map<String, Value>,
    catalog: &[IndexedElement],
) -> WebClawResult<Action> {
    let action = match kind {
        ActionKind::Navigate => Action::Navigate {
            url: req_str(p, kind, "url")?,
        },
        ActionKind::Click => {
            if p.contains_key("id") {
                Action::Click(ClickTarget::Element {
                    id: req_element(p, kind, catalog)?,
                })
            } else if p.contains_key("x") || p.contains_key("y") {
                Action::Click(ClickTarget::Point {
                    x: req_coord(p, kind, "x")?,
                    y: req_coord(p, kind, "y")?,
                })
            } else {
                return Err(parse_err("CLICK requires 'id' or both 'x' and 'y'"));
            }
        }
        ActionKind::Type => Action::Type {
            id: req_element(p, kind, catalog)?,
            text: req_text(p, kind, "text")?,
            clear_first: opt_bool(p, kind, "clear_first")?.unwrap_or(true),
        },
        ActionKind::Scroll => {
            let raw = req_str(p, kind, "direction")?;
            let direction = ScrollDirection::parse(&raw)
                .ok_or_else(|| parse_err(format!("SCROLL direction '{raw}' is not up/down/left/right")))?;
            let amount = match p.get("amount") {
                None | Some(Value::Null) => DEFAULT_SCROLL_PX,
                Some(v) => v
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| parse_err(format!("SCROLL amount must be a positive integer, got {v}")))?,
            };
            Action::Scroll { direction, amount }
        }
        ActionKind::Hover => Action::Hover {
            id: req_element(p, kind, catalog)?,
        },
        ActionKind::Select => Action::Select {
            id: req_element(p, kind, catalog)?,
            value: req_text(p, kind, "value")?,
        },
        ActionKind::ExecuteScript => Action::ExecuteScript {
            code: req_str(p, kind, "code")?,
        },
        ActionKind::PressKey => Action::PressKey {
            key: req_str(p, kind, "key")?,
        },
        ActionKind::GoBack => Action::GoBack,
        ActionKind::Wait => {
            let v = p
                .get("duration_ms")
                .or_else(|| p.get("duration"))
                .ok_or_else(|| parse_err("WAIT requires 'duration_ms'"))?;
            Action::Wait {
                duration_ms: v
                    .as_u64()
                    .ok_or_else(|| parse_err(format!("WAIT duration must be a non-negative integer, got {v}")))?,
            }
        }
        ActionKind::Done => Action::Done {
            summary: p.get("summary").and_then(Value::as_str).map(str::to_string),
        },
    };
    Ok(action)
}

/// Required non-empty string.
fn req_str(p: &Map<String, Value>, kind: ActionKind, key: &str) -> WebClawResult<String> {
    let s = req_text(p, kind, key)?;
    if s.trim().is_empty() {
        return Err(parse_err(format!("{kind} parameter '{key}' must not be empty")));
    }
    Ok(s)
}

/// Required string; empty is allowed (e.g. typing "" to clear a field).
fn req_text(p: &Map<String, Value>, kind: ActionKind, key: &str) -> WebClawResult<String> {
    match p.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(parse_err(format!("{kind} parameter '{key}' must be a string, got {other}"))),
        None => Err(parse_err(format!("{kind} requires parameter '{key}'"))),
    }
}

fn opt_bool(p: &Map<String, Value>, kind: ActionKind, key: &str) -> WebClawResult<Option<bool>> {
    match p.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(parse_err(format!("{kind} parameter '{key}' must be a bool, got {other}"))),
    }
}

fn req_coord(p: &Map<String, Value>, kind: ActionKind, key: &str) -> WebClawResult<f64> {
    match p.get(key).and_then(Value::as_f64) {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(parse_err(format!("{kind} requires numeric coordinate '{key}'"))),
    }
}

/// Integer `id` that names an element of the current catalog.
fn req_element(
    p: &Map<String, Value>,
    kind: ActionKind,
    catalog: &[IndexedElement],
) -> WebClawResult<u32> {
    let v = p
        .get("id")
        .ok_or_else(|| parse_err(format!("{kind} requires parameter 'id'")))?;
    let id = v
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| parse_err(format!("{kind} parameter 'id' must be an integer, got {v}")))?;
    if find_element(catalog, id).is_none() {
        return Err(parse_err(format!("{kind} references id {id}, which is not in the current catalog")));
    }
    Ok(id)
}

fn coerce_confidence(v: Option<&Value>) -> WebClawResult<f64> {
    let raw = match v {
        None | Some(Value::Null) => return Ok(DEFAULT_CONFIDENCE),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok().map(|f| {
            if s.trim().ends_with('%') { f / 100.0 } else { f }
        }),
        Some(_) => None,
    };
    match raw {
        Some(f) if f.is_finite() => Ok(f.clamp(0.0, 1.0)),
        _ => Err(parse_err(format!("confidence is not numeric: {}", v.map(|v| v.to_string()).unwrap_or_default()))),
    }
}
