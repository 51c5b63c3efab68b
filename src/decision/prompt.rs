use crate::agent_engine::state::{ActionOutcome, Objective};
use crate::perception::types::{AnnotatedScene, IndexedElement};

pub const SYSTEM_PROMPT: &str = r#"You are a web-browsing agent. Each turn you receive a screenshot of the
current page with a numeric label drawn next to every interactive element, the
same elements as a text list, the user's objective and the outcomes of your
most recent actions. Choose exactly ONE next action.

Reply with a single JSON object and nothing else:
{
  "thought": "<brief reasoning>",
  "action": { "name": "<ACTION>", "parameters": { ... } },
  "confidence": <number between 0 and 1>,
  "objective_complete": <true|false>
}

Actions and parameters:
- NAVIGATE        {"url": string}
- CLICK           {"id": integer} or {"x": number, "y": number}
- TYPE            {"id": integer, "text": string, "clear_first": bool (default true)}
- SCROLL          {"direction": "up"|"down"|"left"|"right", "amount": integer pixels (default 600)}
- HOVER           {"id": integer}
- SELECT          {"id": integer, "value": string}
- EXECUTE_SCRIPT  {"code": string}  the script's return value is reported back to you
- PRESS_KEY       {"key": string}  e.g. "Enter", "Tab", "Escape"
- GO_BACK         {}
- WAIT            {"duration_ms": integer}
- DONE            {"summary": string}

Rules:
- Only use ids that appear in the element list for this turn. Ids change every turn.
- Elements marked (disabled) or (hidden) cannot be interacted with.
- When the objective is achieved, reply with DONE and objective_complete true.
- If an action failed, try a different approach instead of repeating it."#;

/// One catalog line, e.g. `[3] button "Search" (disabled) frame 0>1`.
pub fn element_line(el: &IndexedElement) -> String {
    let mut line = format!("[{}] {}", el.id, el.role.as_str());
    if el.role.as_str() != el.tag {
        line.push_str(&format!(" <{}>", el.tag));
    }
    if !el.label.is_empty() {
        line.push_str(&format!(" {:?}", el.label));
    }
    if !el.enabled {
        line.push_str(" (disabled)");
    }
    if !el.visible {
        line.push_str(" (hidden)");
    }
    if !el.frame_path.is_empty() {
        let path: Vec<String> = el.frame_path.iter().map(u32::to_string).collect();
        line.push_str(&format!(" frame {}", path.join(">")));
    }
    line
}

/// Text part of the per-step request. `history` is already windowed.
pub fn user_text(
    objective: &Objective,
    scene: &AnnotatedScene,
    history: &[ActionOutcome],
    step_count: u32,
) -> String {
    let mut text = format!(
        "Objective: {objective}\nStep: {}\nURL: {}\nTitle: {}\nViewport: {:.0}x{:.0}\n\n",
        step_count + 1,
        scene.url,
        scene.title,
        scene.viewport.width,
        scene.viewport.height,
    );

    if scene.elements.is_empty() {
        text.push_str("Interactive elements: none found\n");
    } else {
        text.push_str("Interactive elements:\n");
        for el in &scene.elements {
            text.push_str(&element_line(el));
            text.push('\n');
        }
    }

    text.push('\n');
    if history.is_empty() {
        text.push_str("Recent actions: none yet\n");
    } else {
        text.push_str("Recent actions (oldest first):\n");
        for outcome in history {
            text.push_str("- ");
            text.push_str(&outcome.summary_line());
            text.push('\n');
        }
    }
    text
}
