#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use webclaw_lib::agent_engine::event_bus::CancelFlag;
use webclaw_lib::agent_engine::{AgentEngine, HistoryMode};
use webclaw_lib::browser::lane::BlockingLane;
use webclaw_lib::browser::BrowserDriver;
use webclaw_lib::config::AppConfig;
use webclaw_lib::decision::DecisionClient;
use webclaw_lib::errors::{WebClawError, WebClawResult};
use webclaw_lib::llm::provider::LlmProvider;
use webclaw_lib::llm::types::{CallConfig, ChatMessage, LlmResponse, MessageContent, ContentPart};

pub const PAGE_W: u32 = 320;
pub const PAGE_H: u32 = 200;

#[derive(Debug, Clone)]
pub struct MockElement {
    pub role: &'static str,
    pub tag: &'static str,
    pub label: &'static str,
    pub rect: (f64, f64, f64, f64),
    pub frame: Vec<u32>,
    pub enabled: bool,
}

impl MockElement {
    pub fn button(label: &'static str, x: f64, y: f64) -> Self {
        Self { role: "button", tag: "button", label, rect: (x, y, 60.0, 20.0), frame: vec![], enabled: true }
    }

    pub fn input(label: &'static str, x: f64, y: f64) -> Self {
        Self { role: "input", tag: "input", label, rect: (x, y, 120.0, 20.0), frame: vec![], enabled: true }
    }

    pub fn in_frame(mut self, frame: Vec<u32>) -> Self {
        self.frame = frame;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    elements: Vec<MockElement>,
    not_ready_scans: u32,
    stale_ids: HashSet<u32>,
    native_fails: bool,
    script_fails: bool,
    coordinate_fails: bool,
    ops: Vec<String>,
    scans: u32,
    hang_scans: u32,
    slow_click: Option<Duration>,
    timeline: Vec<&'static str>,
    cancel_on_side_effect: Option<CancelFlag>,
}

/// In-memory browser that answers the agent's in-page scripts and records
/// every state-changing operation.
pub struct MockDriver {
    state: Arc<Mutex<PageState>>,
    lane: BlockingLane,
}

impl MockDriver {
    pub fn new(elements: Vec<MockElement>) -> Arc<Self> {
        Arc::new(Self {
            state: Arc::new(Mutex::new(PageState {
                url: "about:blank".into(),
                elements,
                ..PageState::default()
            })),
            lane: BlockingLane::new(),
        })
    }

    pub fn not_ready_for(&self, scans: u32) {
        self.state.lock().unwrap().not_ready_scans = scans;
    }

    /// The next `scans` index scans never answer.
    pub fn hang_scans(&self, scans: u32) {
        self.state.lock().unwrap().hang_scans = scans;
    }

    /// Native clicks block a worker thread for `ms`, like a slow CDP call.
    pub fn slow_click(&self, ms: u64) {
        self.state.lock().unwrap().slow_click = Some(Duration::from_millis(ms));
    }

    /// Order in which scans and slow clicks started and finished.
    pub fn timeline(&self) -> Vec<&'static str> {
        self.state.lock().unwrap().timeline.clone()
    }

    pub fn make_stale(&self, id: u32) {
        self.state.lock().unwrap().stale_ids.insert(id);
    }

    pub fn fail_native(&self) {
        self.state.lock().unwrap().native_fails = true;
    }

    pub fn fail_script(&self) {
        self.state.lock().unwrap().script_fails = true;
    }

    pub fn fail_coordinate(&self) {
        self.state.lock().unwrap().coordinate_fails = true;
    }

    pub fn cancel_on_side_effect(&self, flag: CancelFlag) {
        self.state.lock().unwrap().cancel_on_side_effect = Some(flag);
    }

    pub fn ops(&self) -> Vec<String> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn scans(&self) -> u32 {
        self.state.lock().unwrap().scans
    }

    fn record(&self, op: String) {
        let mut st = self.state.lock().unwrap();
        st.ops.push(op);
        if let Some(flag) = &st.cancel_on_side_effect {
            flag.cancel();
        }
    }

    fn take_hang(&self) -> bool {
        let mut st = self.state.lock().unwrap();
        st.scans += 1;
        if st.hang_scans > 0 {
            st.hang_scans -= 1;
            return true;
        }
        false
    }

    fn scan(&self) -> Value {
        let mut st = self.state.lock().unwrap();
        st.timeline.push("scan");
        if st.not_ready_scans > 0 {
            st.not_ready_scans -= 1;
            return json!({ "ready": false });
        }
        let elements: Vec<Value> = st
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| {
                json!({
                    "id": i as u32 + 1,
                    "role": e.role, "tag": e.tag, "label": e.label,
                    "x": e.rect.0, "y": e.rect.1, "w": e.rect.2, "h": e.rect.3,
                    "frame": e.frame, "visible": true, "enabled": e.enabled, "z": 0
                })
            })
            .collect();
        json!({
            "ready": true,
            "url": st.url,
            "title": "Mock page",
            "viewport": { "width": PAGE_W, "height": PAGE_H, "dpr": 1.0 },
            "skipped_frames": 0,
            "elements": elements
        })
    }

    fn resolve(&self, script: &str) -> Value {
        let id: u32 = script
            .split("ID = ")
            .nth(1)
            .and_then(|rest| rest.split(',').next())
            .and_then(|n| n.trim().parse().ok())
            .unwrap_or(0);
        let st = self.state.lock().unwrap();
        match st.elements.get((id as usize).wrapping_sub(1)) {
            Some(e) if !st.stale_ids.contains(&id) => json!({
                "ok": true,
                "relocated": false,
                "x": e.rect.0 + e.rect.2 / 2.0,
                "y": e.rect.1 + e.rect.3 / 2.0
            }),
            _ => json!({ "ok": false, "error": "element not found" }),
        }
    }

    fn selector_id(selector: &str) -> String {
        selector.chars().filter(|c| c.is_ascii_digit()).collect()
    }

    fn png() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(PAGE_W, PAGE_H, image::Rgba([250, 250, 250, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn navigate(&self, url: &str) -> WebClawResult<()> {
        self.state.lock().unwrap().url = url.to_string();
        self.record(format!("navigate {url}"));
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> WebClawResult<Value> {
        // Queue behind any blocking call still in flight.
        self.lane.run(|| Ok(())).await?;
        let result = if script.contains("const MAX = ") {
            if self.take_hang() {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            self.scan()
        } else if script.contains("webclawResolve") {
            self.resolve(script)
        } else if script.contains("webclawSynthetic") {
            if self.state.lock().unwrap().script_fails {
                json!({ "ok": false, "error": "synthetic events ignored" })
            } else {
                self.record("script-interaction".into());
                json!({ "ok": true })
            }
        } else if script.contains("webclawClearFocused") {
            json!({ "ok": true })
        } else if let Some(rest) = script.strip_prefix("window.scrollBy(") {
            let args = rest.split(')').next().unwrap_or_default().to_string();
            self.record(format!("scroll {args}"));
            return Ok(Value::String("ok".into()));
        } else if script.starts_with("history.back") {
            self.record("back".into());
            return Ok(Value::String("ok".into()));
        } else {
            self.record(format!("eval {script}"));
            return Ok(json!(42));
        };
        Ok(Value::String(result.to_string()))
    }

    async fn screenshot(&self) -> WebClawResult<Vec<u8>> {
        Ok(Self::png())
    }

    async fn click(&self, selector: &str) -> WebClawResult<()> {
        if self.state.lock().unwrap().native_fails {
            return Err(WebClawError::interaction("native", "element is obscured"));
        }
        let slow = self.state.lock().unwrap().slow_click;
        if let Some(delay) = slow {
            self.state.lock().unwrap().timeline.push("click-start");
            let state = self.state.clone();
            self.lane
                .run(move || {
                    std::thread::sleep(delay);
                    state.lock().unwrap().timeline.push("click-finished");
                    Ok(())
                })
                .await?;
        }
        self.record(format!("click {}", Self::selector_id(selector)));
        Ok(())
    }

    async fn type_into(&self, selector: &str, text: &str, _clear_first: bool) -> WebClawResult<()> {
        if self.state.lock().unwrap().native_fails {
            return Err(WebClawError::interaction("native", "element is obscured"));
        }
        self.record(format!("type {} {text}", Self::selector_id(selector)));
        Ok(())
    }

    async fn hover(&self, selector: &str) -> WebClawResult<()> {
        self.record(format!("hover {}", Self::selector_id(selector)));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> WebClawResult<()> {
        self.record(format!("select {} {value}", Self::selector_id(selector)));
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> WebClawResult<()> {
        if self.state.lock().unwrap().coordinate_fails {
            return Err(WebClawError::interaction("coordinate", "nothing at point"));
        }
        self.record(format!("click_at {x:.0},{y:.0}"));
        Ok(())
    }

    async fn move_mouse_to(&self, x: f64, y: f64) -> WebClawResult<()> {
        self.record(format!("mouse_to {x:.0},{y:.0}"));
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> WebClawResult<()> {
        self.record(format!("insert {text}"));
        Ok(())
    }

    async fn press_key(&self, key: &str) -> WebClawResult<()> {
        self.record(format!("key {key}"));
        Ok(())
    }
}

pub enum Scripted {
    Reply(String),
    Fail(WebClawError),
}

/// Model stand-in that replays a fixed script, then repeats `fallback`.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Option<String>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Scripted>) -> Arc<Self> {
        Self::with_fallback(script, None)
    }

    pub fn with_fallback(script: Vec<Scripted>, fallback: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: fallback.map(str::to_string),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Text part of every request received so far.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub fn reply(json: &str) -> Scripted {
    Scripted::Reply(json.to_string())
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: Vec<ChatMessage>, _cfg: &CallConfig) -> WebClawResult<LlmResponse> {
        let text = messages
            .iter()
            .filter_map(|m| match &m.content {
                MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                    ContentPart::Text { text } => Some(text.clone()),
                    _ => None,
                }),
                MessageContent::Text(_) => None,
            })
            .collect::<Vec<_>>()
            .join("\n");
        self.requests.lock().unwrap().push(text);

        let next = self.script.lock().unwrap().pop_front();
        let content = match next {
            Some(Scripted::Reply(content)) => content,
            Some(Scripted::Fail(e)) => return Err(e),
            None => match &self.fallback {
                Some(f) => f.clone(),
                None => return Err(WebClawError::Transport("script exhausted".into())),
            },
        };
        Ok(LlmResponse { content, reasoning: String::new(), finished: true })
    }
}

/// Fast-retry config with no on-disk side effects.
pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.agent.retry_backoff_ms = 1;
    cfg.agent.max_backoff_ms = 4;
    cfg.agent.max_steps = 10;
    cfg.browser.scan_retry_delay_ms = 1;
    cfg.safety.max_wait_ms = 50;
    cfg
}

pub fn engine(driver: Arc<MockDriver>, provider: Arc<ScriptedProvider>, cfg: &AppConfig) -> AgentEngine {
    let call = CallConfig { model: "test-vl".into(), stream: false, temperature: 0.0 };
    let decider = DecisionClient::new(provider, call, cfg.agent.history_window);
    AgentEngine::new(driver, decider, cfg)
        .unwrap()
        .with_history(HistoryMode::InMemory)
}
