use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::browser::tab::point::Point;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};

use crate::browser::driver::BrowserDriver;
use crate::browser::lane::BlockingLane;
use crate::config::BrowserConfig;
use crate::errors::{WebClawError, WebClawResult};

const NATIVE: &str = "native";

const SELECT_OPTION_FN: &str = r#"
function (wanted) {
  const opts = Array.from(this.options || []);
  const hit = opts.find(o => o.value === wanted)
    || opts.find(o => (o.text || '').trim().toLowerCase() === wanted.trim().toLowerCase());
  if (!hit) return false;
  this.value = hit.value;
  this.dispatchEvent(new Event('input', { bubbles: true }));
  this.dispatchEvent(new Event('change', { bubbles: true }));
  return true;
}
"#;

/// True when the element's midpoint hits the element itself or a descendant.
const HIT_TEST_FN: &str = r#"
function () {
  const r = this.getBoundingClientRect();
  const top = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
  return !!top && (top === this || this.contains(top));
}
"#;

fn browser_err(e: impl std::fmt::Display) -> WebClawError {
    WebClawError::Browser(e.to_string())
}

fn native_err(e: impl std::fmt::Display) -> WebClawError {
    WebClawError::interaction(NATIVE, e.to_string())
}

fn hit_test_verdict(value: Option<&serde_json::Value>) -> WebClawResult<()> {
    match value {
        Some(serde_json::Value::Bool(true)) => Ok(()),
        _ => Err(native_err("element is obscured")),
    }
}

/// Input events land on whatever is at the midpoint, so refuse when that is
/// some other element.
fn ensure_unobscured(el: &Element) -> WebClawResult<()> {
    el.scroll_into_view().map_err(native_err)?;
    let hit = el.call_js_fn(HIT_TEST_FN, vec![], false).map_err(native_err)?;
    hit_test_verdict(hit.value.as_ref())
}

/// Chrome over the DevTools protocol. Owns its browser process; one per session.
///
/// Every tab call goes through one [`BlockingLane`], and the tab's default
/// timeout bounds each call, so an abandoned call finishes before the next
/// one starts.
pub struct ChromeDriver {
    _browser: Browser,
    tab: Arc<Tab>,
    lane: BlockingLane,
}

impl ChromeDriver {
    /// Blocking: call from `spawn_blocking`.
    pub fn launch(cfg: &BrowserConfig) -> WebClawResult<Self> {
        let options = LaunchOptions {
            headless: cfg.headless,
            path: cfg.chrome_path.clone(),
            window_size: Some((cfg.window_width, cfg.window_height)),
            args: vec![
                OsStr::new("--no-first-run"),
                OsStr::new("--no-default-browser-check"),
                OsStr::new("--disable-infobars"),
            ],
            idle_browser_timeout: Duration::from_secs(300),
            ..Default::default()
        };

        tracing::info!(headless = cfg.headless, "starting Chrome");
        let browser = Browser::new(options).map_err(browser_err)?;
        let tab = browser.new_tab().map_err(browser_err)?;
        tab.set_default_timeout(Duration::from_secs(cfg.navigation_timeout_secs));
        tab.navigate_to("about:blank").map_err(browser_err)?;
        tracing::info!("Chrome ready");

        Ok(Self {
            _browser: browser,
            tab,
            lane: BlockingLane::new(),
        })
    }

    /// Run a blocking tab operation off the async runtime.
    async fn with_tab<T, F>(&self, f: F) -> WebClawResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> WebClawResult<T> + Send + 'static,
    {
        let tab = self.tab.clone();
        self.lane.run(move || f(&tab)).await
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> WebClawResult<()> {
        let url = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&url).map_err(browser_err)?;
            tab.wait_until_navigated().map_err(browser_err)?;
            Ok(())
        })
        .await
    }

    async fn evaluate(&self, script: &str) -> WebClawResult<serde_json::Value> {
        let script = script.to_string();
        self.with_tab(move |tab| {
            let result = tab.evaluate(&script, false).map_err(browser_err)?;
            Ok(result.value.unwrap_or(serde_json::Value::Null))
        })
        .await
    }

    async fn screenshot(&self) -> WebClawResult<Vec<u8>> {
        self.with_tab(|tab| {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(browser_err)
        })
        .await
    }

    async fn click(&self, selector: &str) -> WebClawResult<()> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            let el = tab.find_element(&selector).map_err(native_err)?;
            ensure_unobscured(&el)?;
            el.click().map_err(native_err)?;
            Ok(())
        })
        .await
    }

    async fn type_into(&self, selector: &str, text: &str, clear_first: bool) -> WebClawResult<()> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.with_tab(move |tab| {
            let el = tab.find_element(&selector).map_err(native_err)?;
            ensure_unobscured(&el)?;
            if clear_first {
                el.call_js_fn("function () { this.value = ''; }", vec![], false)
                    .map_err(native_err)?;
            }
            el.type_into(&text).map_err(native_err)?;
            Ok(())
        })
        .await
    }

    async fn hover(&self, selector: &str) -> WebClawResult<()> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            let el = tab.find_element(&selector).map_err(native_err)?;
            ensure_unobscured(&el)?;
            el.move_mouse_over().map_err(native_err)?;
            Ok(())
        })
        .await
    }

    async fn select_option(&self, selector: &str, value: &str) -> WebClawResult<()> {
        let selector = selector.to_string();
        let value = value.to_string();
        self.with_tab(move |tab| {
            let el = tab.find_element(&selector).map_err(native_err)?;
            let picked = el
                .call_js_fn(SELECT_OPTION_FN, vec![serde_json::Value::String(value.clone())], false)
                .map_err(native_err)?;
            match picked.value {
                Some(serde_json::Value::Bool(true)) => Ok(()),
                _ => Err(native_err(format!("no option matching '{value}'"))),
            }
        })
        .await
    }

    async fn click_at(&self, x: f64, y: f64) -> WebClawResult<()> {
        self.with_tab(move |tab| {
            tab.click_point(Point { x, y })
                .map_err(|e| WebClawError::interaction("coordinate", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn move_mouse_to(&self, x: f64, y: f64) -> WebClawResult<()> {
        self.with_tab(move |tab| {
            tab.move_mouse_to_point(Point { x, y })
                .map_err(|e| WebClawError::interaction("coordinate", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn insert_text(&self, text: &str) -> WebClawResult<()> {
        let text = text.to_string();
        self.with_tab(move |tab| {
            tab.type_str(&text)
                .map_err(|e| WebClawError::interaction("coordinate", e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str) -> WebClawResult<()> {
        let key = key.to_string();
        self.with_tab(move |tab| {
            tab.press_key(&key).map_err(browser_err)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covered_midpoint_is_a_native_interaction_failure() {
        assert!(hit_test_verdict(Some(&serde_json::Value::Bool(true))).is_ok());

        for value in [None, Some(serde_json::Value::Bool(false)), Some(serde_json::Value::Null)] {
            let err = hit_test_verdict(value.as_ref()).unwrap_err();
            assert!(err.is_cascade_recoverable());
            assert_eq!(err.to_string(), "Interaction error (native): element is obscured");
        }
    }

    #[test]
    fn hit_test_accepts_descendants() {
        assert!(HIT_TEST_FN.contains("elementFromPoint"));
        assert!(HIT_TEST_FN.contains("this.contains(top)"));
    }
}
