/// Interaction strategies tried in order by the executor.
///
/// A strategy signals "try the next one" by returning
/// `WebClawError::Interaction`; any other error stops the cascade.
use async_trait::async_trait;

use crate::browser::frames::{decode_json_result, in_frame, js_string};
use crate::browser::BrowserDriver;
use crate::errors::{WebClawError, WebClawResult};
use crate::executor::resolve::ResolvedTarget;

#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Click,
    Type { text: String, clear_first: bool },
    Hover,
    Select { value: String },
}

#[async_trait]
pub trait InteractionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn perform(
        &self,
        driver: &dyn BrowserDriver,
        target: &ResolvedTarget,
        interaction: &Interaction,
    ) -> WebClawResult<()>;
}

/// Driver-level element operations. Top-level document only.
pub struct NativeStrategy;

#[async_trait]
impl InteractionStrategy for NativeStrategy {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn perform(
        &self,
        driver: &dyn BrowserDriver,
        target: &ResolvedTarget,
        interaction: &Interaction,
    ) -> WebClawResult<()> {
        if !target.frame_path.is_empty() {
            return Err(WebClawError::interaction(self.name(), "element is inside a nested frame"));
        }
        match interaction {
            Interaction::Click => driver.click(&target.selector).await,
            Interaction::Type { text, clear_first } => {
                driver.type_into(&target.selector, text, *clear_first).await
            }
            Interaction::Hover => driver.hover(&target.selector).await,
            Interaction::Select { value } => driver.select_option(&target.selector, value).await,
        }
    }
}

/// Synthetic DOM events dispatched from an in-page script.
pub struct ScriptStrategy;

impl ScriptStrategy {
    fn body(target: &ResolvedTarget, interaction: &Interaction) -> String {
        let action = match interaction {
            Interaction::Click => r#"
  el.scrollIntoView({ block: 'center', inline: 'center' });
  for (const t of ['pointerdown', 'mousedown', 'pointerup', 'mouseup']) {
    el.dispatchEvent(new MouseEvent(t, { bubbles: true, cancelable: true, view: win }));
  }
  if (typeof el.click === 'function') el.click();
  else el.dispatchEvent(new MouseEvent('click', { bubbles: true, cancelable: true, view: win }));"#
                .to_string(),
            Interaction::Type { text, clear_first } => format!(
                r#"
  const text = {text}, clear = {clear};
  el.focus();
  if (el.isContentEditable) {{
    el.textContent = clear ? text : el.textContent + text;
  }} else if ('value' in el) {{
    const proto = Object.getPrototypeOf(el);
    const setter = Object.getOwnPropertyDescriptor(proto, 'value');
    const next = clear ? text : el.value + text;
    if (setter && setter.set) setter.set.call(el, next); else el.value = next;
  }} else {{
    return JSON.stringify({{ ok: false, error: 'element does not accept text' }});
  }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));"#,
                text = js_string(text),
                clear = clear_first,
            ),
            Interaction::Hover => r#"
  for (const t of ['pointerover', 'mouseover', 'mouseenter', 'mousemove']) {
    el.dispatchEvent(new MouseEvent(t, { bubbles: t !== 'mouseenter', view: win }));
  }"#
            .to_string(),
            Interaction::Select { value } => format!(
                r#"
  const wanted = {value};
  const opts = Array.from(el.options || []);
  const hit = opts.find(o => o.value === wanted)
    || opts.find(o => (o.text || '').trim().toLowerCase() === wanted.trim().toLowerCase());
  if (!hit) return JSON.stringify({{ ok: false, error: 'no option matching ' + wanted }});
  el.value = hit.value;
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));"#,
                value = js_string(value),
            ),
        };
        format!(
            "// webclawSynthetic\nconst el = doc.querySelector({sel});\n\
             if (!el) return JSON.stringify({{ ok: false, error: 'element missing' }});\n\
             const win = doc.defaultView || window;\n{action}\nreturn JSON.stringify({{ ok: true }});",
            sel = js_string(&target.selector),
        )
    }
}

#[async_trait]
impl InteractionStrategy for ScriptStrategy {
    fn name(&self) -> &'static str {
        "script"
    }

    async fn perform(
        &self,
        driver: &dyn BrowserDriver,
        target: &ResolvedTarget,
        interaction: &Interaction,
    ) -> WebClawResult<()> {
        let script = in_frame(&target.frame_path, &Self::body(target, interaction));
        let result = decode_json_result(driver.evaluate(&script).await?)?;
        if result["ok"].as_bool() == Some(true) {
            Ok(())
        } else {
            let reason = result["error"].as_str().unwrap_or("script interaction failed");
            Err(WebClawError::interaction(self.name(), reason))
        }
    }
}

/// Raw mouse and keyboard input at the element's current center.
pub struct CoordinateStrategy;

const CLEAR_FOCUSED: &str = r#"// webclawClearFocused
const el = doc.activeElement;
if (el && 'value' in el) { el.value = ''; el.dispatchEvent(new Event('input', { bubbles: true })); }
else if (el && el.isContentEditable) { el.textContent = ''; }
return JSON.stringify({ ok: true });"#;

#[async_trait]
impl InteractionStrategy for CoordinateStrategy {
    fn name(&self) -> &'static str {
        "coordinate"
    }

    async fn perform(
        &self,
        driver: &dyn BrowserDriver,
        target: &ResolvedTarget,
        interaction: &Interaction,
    ) -> WebClawResult<()> {
        let (x, y) = target.center;
        match interaction {
            Interaction::Click => driver.click_at(x, y).await,
            Interaction::Hover => driver.move_mouse_to(x, y).await,
            Interaction::Type { text, clear_first } => {
                driver.click_at(x, y).await?;
                if *clear_first {
                    driver.evaluate(&in_frame(&target.frame_path, CLEAR_FOCUSED)).await?;
                }
                driver.insert_text(text).await
            }
            Interaction::Select { .. } => Err(WebClawError::interaction(
                self.name(),
                "option lists cannot be driven by coordinates",
            )),
        }
    }
}

/// Build the ordered cascade from strategy names.
pub fn build_cascade(names: &[String]) -> WebClawResult<Vec<Box<dyn InteractionStrategy>>> {
    names
        .iter()
        .map(|name| -> WebClawResult<Box<dyn InteractionStrategy>> {
            match name.trim().to_ascii_lowercase().as_str() {
                "native" => Ok(Box::new(NativeStrategy)),
                "script" => Ok(Box::new(ScriptStrategy)),
                "coordinate" => Ok(Box::new(CoordinateStrategy)),
                other => Err(WebClawError::Config(format!("unknown interaction strategy '{other}'"))),
            }
        })
        .collect()
}
