use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Scroll,
    Hover,
    Select,
    ExecuteScript,
    PressKey,
    GoBack,
    Wait,
    Done,
}

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        Self::Navigate,
        Self::Click,
        Self::Type,
        Self::Scroll,
        Self::Hover,
        Self::Select,
        Self::ExecuteScript,
        Self::PressKey,
        Self::GoBack,
        Self::Wait,
        Self::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Navigate => "NAVIGATE",
            Self::Click => "CLICK",
            Self::Type => "TYPE",
            Self::Scroll => "SCROLL",
            Self::Hover => "HOVER",
            Self::Select => "SELECT",
            Self::ExecuteScript => "EXECUTE_SCRIPT",
            Self::PressKey => "PRESS_KEY",
            Self::GoBack => "GO_BACK",
            Self::Wait => "WAIT",
            Self::Done => "DONE",
        }
    }

    /// Case-insensitive; accepts `-`, space or `_` as separators.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|k| k.as_str() == normalized)
    }

    /// Actions that leave browser state untouched.
    pub fn is_no_op(&self) -> bool {
        matches!(self, Self::Wait | Self::Done)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    /// (dx, dy) in CSS pixels.
    pub fn delta(&self, amount: u32) -> (i64, i64) {
        let a = amount as i64;
        match self {
            Self::Up => (0, -a),
            Self::Down => (0, a),
            Self::Left => (-a, 0),
            Self::Right => (a, 0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClickTarget {
    Element { id: u32 },
    Point { x: f64, y: f64 },
}

/// One variant per `ActionKind`, each with its own typed parameters.
/// Serializes as `{"name": "CLICK", "parameters": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", content = "parameters", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Navigate { url: String },
    Click(ClickTarget),
    Type { id: u32, text: String, clear_first: bool },
    Scroll { direction: ScrollDirection, amount: u32 },
    Hover { id: u32 },
    Select { id: u32, value: String },
    ExecuteScript { code: String },
    PressKey { key: String },
    GoBack,
    Wait { duration_ms: u64 },
    Done { summary: Option<String> },
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Navigate { .. } => ActionKind::Navigate,
            Self::Click(_) => ActionKind::Click,
            Self::Type { .. } => ActionKind::Type,
            Self::Scroll { .. } => ActionKind::Scroll,
            Self::Hover { .. } => ActionKind::Hover,
            Self::Select { .. } => ActionKind::Select,
            Self::ExecuteScript { .. } => ActionKind::ExecuteScript,
            Self::PressKey { .. } => ActionKind::PressKey,
            Self::GoBack => ActionKind::GoBack,
            Self::Wait { .. } => ActionKind::Wait,
            Self::Done { .. } => ActionKind::Done,
        }
    }

    /// Compact one-line rendering for prompts and logs.
    pub fn describe(&self) -> String {
        match self {
            Self::Navigate { url } => format!("NAVIGATE {url}"),
            Self::Click(ClickTarget::Element { id }) => format!("CLICK [{id}]"),
            Self::Click(ClickTarget::Point { x, y }) => format!("CLICK ({x:.0},{y:.0})"),
            Self::Type { id, text, .. } => format!("TYPE [{id}] {text:?}"),
            Self::Scroll { direction, amount } => format!("SCROLL {direction:?} {amount}px"),
            Self::Hover { id } => format!("HOVER [{id}]"),
            Self::Select { id, value } => format!("SELECT [{id}] {value:?}"),
            Self::ExecuteScript { code } => {
                let head: String = code.chars().take(60).collect();
                format!("EXECUTE_SCRIPT {head:?}")
            }
            Self::PressKey { key } => format!("PRESS_KEY {key}"),
            Self::GoBack => "GO_BACK".into(),
            Self::Wait { duration_ms } => format!("WAIT {duration_ms}ms"),
            Self::Done { .. } => "DONE".into(),
        }
    }
}

/// The reasoning model's validated output for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub thought: String,
    pub action: Action,
    /// Clamped into [0, 1].
    pub confidence: f64,
    pub objective_complete: bool,
}
