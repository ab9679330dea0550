use serde::{Deserialize, Serialize};

use crate::models::{Modifiers, Point, Rect, Selector, SelectorKind, Viewport};
use crate::selector::ElementDescriptor;

/// How the page runtime should find an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Locator {
    Css { value: String },
    Xpath { value: String },
    /// Page coordinates, hit-tested with `elementFromPoint`
    Point { x: f64, y: f64 },
}

impl Locator {
    pub fn describe(&self) -> String {
        match self {
            Locator::Css { value } | Locator::Xpath { value } => value.clone(),
            Locator::Point { x, y } => format!("point ({:.0}, {:.0})", x, y),
        }
    }

    pub fn is_point(&self) -> bool {
        matches!(self, Locator::Point { .. })
    }
}

impl From<&Selector> for Locator {
    fn from(selector: &Selector) -> Self {
        match selector.kind {
            SelectorKind::Css => Locator::Css {
                value: selector.value.clone(),
            },
            SelectorKind::Xpath => Locator::Xpath {
                value: selector.value.clone(),
            },
        }
    }
}

impl From<Point> for Locator {
    fn from(p: Point) -> Self {
        Locator::Point { x: p.x, y: p.y }
    }
}

/// A structural interaction performed by the page runtime with the event
/// sequence a real user would produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Interaction {
    Click,
    Input { value: String },
    Focus,
    Keypress { key: String, modifiers: Modifiers },
    Submit,
    Checkbox { checked: bool },
    Select { value: String },
    Hover,
}

/// Configuration handed to the capture module at install time. The active
/// flag is restored from the session here, never assumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub active: bool,
    pub epoch: u64,
    pub keys: Vec<String>,
    pub text_limit: usize,
}

/// Calls into the static page runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PageScript {
    InstallCapture { config: CaptureConfig },
    ProbeCapture,
    SetCaptureActive { active: bool },
    Resolve { locator: Locator },
    /// Scroll the element into view and report its viewport position
    Reveal { locator: Locator },
    Perform { locator: Locator, interaction: Interaction },
    ScrollTo { x: f64, y: f64 },
    ReadDocument,
    ReadValue { locator: Locator },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementReport {
    pub found: bool,
    #[serde(default)]
    pub count: usize,
    #[serde(default)]
    pub visible: bool,
    /// Page coordinates
    #[serde(default)]
    pub rect: Option<Rect>,
    /// Centre of the element in viewport coordinates
    #[serde(default)]
    pub client: Option<Point>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl ElementReport {
    pub fn is_unique_and_visible(&self) -> bool {
        self.found && self.count == 1 && self.visible
    }

    /// Hits on the document itself carry no information about the target
    pub fn is_document_hit(&self) -> bool {
        matches!(self.tag.as_deref(), Some("html" | "body"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    NotFound,
    NotVisible,
    Blocked,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionReport {
    pub ok: bool,
    #[serde(default)]
    pub reason: Option<FailureReason>,
    #[serde(default)]
    pub detail: Option<String>,
    /// Where the element ended up after scrolling, for the synthetic fallback
    #[serde(default)]
    pub client: Option<Point>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub installed: bool,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub listeners: u32,
    #[serde(default)]
    pub epoch: u64,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub url: String,
    pub ready_state: String,
    pub width: u32,
    pub height: u32,
    #[serde(default = "one")]
    pub pixel_ratio: f64,
    #[serde(default)]
    pub scroll_x: f64,
    #[serde(default)]
    pub scroll_y: f64,
}

fn one() -> f64 {
    1.0
}

impl DocumentReport {
    pub fn viewport(&self) -> Viewport {
        Viewport {
            width: self.width,
            height: self.height,
            pixel_ratio: self.pixel_ratio,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready_state != "loading"
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueReport {
    pub found: bool,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub checked: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapturedKind {
    Click,
    Input,
    Focus,
    Keypress,
    Submit,
    Checkbox,
    Select,
    Scroll,
}

/// A raw DOM observation forwarded by the capture module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedEvent {
    pub context_id: String,
    pub seq: u64,
    #[serde(default)]
    pub epoch: u64,
    pub kind: CapturedKind,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub element: Option<ElementDescriptor>,
    /// Page coordinates of the pointer
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub checked: Option<bool>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub modifiers: Modifiers,
    #[serde(default)]
    pub scroll_x: Option<f64>,
    #[serde(default)]
    pub scroll_y: Option<f64>,
}

impl CapturedEvent {
    pub fn point(&self) -> Option<Point> {
        Some(Point::new(self.x?, self.y?))
    }
}

/// Messages sent from the page context over the binding channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "snake_case")]
pub enum PageMessage {
    Captured(CapturedEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavigationEvent {
    /// A new document is being loaded; the script context is gone
    Started { url: String },
    /// The new document is parsed and can host scripts
    DocumentReady { url: String },
    /// Same-document navigation (history API, fragment)
    InPage { url: String },
}

impl NavigationEvent {
    pub fn url(&self) -> &str {
        match self {
            NavigationEvent::Started { url }
            | NavigationEvent::DocumentReady { url }
            | NavigationEvent::InPage { url } => url,
        }
    }
}

/// Everything a page host reports, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Navigation(NavigationEvent),
    Message(PageMessage),
}

/// Raw input delivered below the DOM event layer. Coordinates are viewport
/// coordinates in CSS pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyntheticInput {
    MouseMove { x: f64, y: f64 },
    MouseDown { x: f64, y: f64, click_count: u32 },
    MouseUp { x: f64, y: f64, click_count: u32 },
    KeyDown { key: String, modifiers: Modifiers },
    KeyUp { key: String, modifiers: Modifiers },
    InsertText { text: String },
    Wheel { x: f64, y: f64, delta_x: f64, delta_y: f64 },
}
