use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementRole {
    Button,
    Link,
    Input,
    TextArea,
    Select,
    Checkbox,
    Radio,
    Option,
    Tab,
    MenuItem,
    Editable,
    Other(String),
}

impl ElementRole {
    /// Map the `role` string reported by the in-page scanner.
    pub fn from_scan(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "button" | "submit" | "reset" | "summary" => Self::Button,
            "link" | "a" => Self::Link,
            "input" | "textbox" | "searchbox" => Self::Input,
            "textarea" => Self::TextArea,
            "select" | "combobox" | "listbox" => Self::Select,
            "checkbox" | "switch" => Self::Checkbox,
            "radio" => Self::Radio,
            "option" => Self::Option,
            "tab" => Self::Tab,
            "menuitem" => Self::MenuItem,
            "editable" => Self::Editable,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Button => "button",
            Self::Link => "link",
            Self::Input => "input",
            Self::TextArea => "textarea",
            Self::Select => "select",
            Self::Checkbox => "checkbox",
            Self::Radio => "radio",
            Self::Option => "option",
            Self::Tab => "tab",
            Self::MenuItem => "menuitem",
            Self::Editable => "editable",
            Self::Other(s) => s,
        }
    }
}

/// Axis-aligned rectangle in top-level viewport CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Bounds {
    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }
}

/// Indices into `querySelectorAll('iframe,frame')` from the top document down.
pub type FramePath = Vec<u32>;

/// One interactive element, valid for the step that indexed it only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedElement {
    pub id: u32,
    pub role: ElementRole,
    pub tag: String,
    /// Visible text, accessible name, placeholder or value, whichever is first present.
    pub label: String,
    pub bounds: Bounds,
    pub frame_path: FramePath,
    pub visible: bool,
    pub enabled: bool,
    /// Paint-order rank; higher is drawn on top.
    pub z_order: i32,
}

impl IndexedElement {
    pub fn is_interactable(&self) -> bool {
        self.visible && self.enabled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
}

/// The annotated image plus the catalog it was drawn from. Owned by one step.
#[derive(Debug, Clone)]
pub struct AnnotatedScene {
    /// PNG bytes.
    pub image: Vec<u8>,
    pub elements: Vec<IndexedElement>,
    pub viewport: Viewport,
    pub url: String,
    pub title: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Ids are dense and 1-based, so lookup is positional with a fallback scan.
pub fn find_element(catalog: &[IndexedElement], id: u32) -> Option<&IndexedElement> {
    catalog
        .get((id as usize).wrapping_sub(1))
        .filter(|e| e.id == id)
        .or_else(|| catalog.iter().find(|e| e.id == id))
}
