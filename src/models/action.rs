use serde::{Deserialize, Serialize};

/// How a selector string is interpreted when it is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    #[default]
    Css,
    Xpath,
}

/// A single selector candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selector {
    pub value: String,
    #[serde(default)]
    pub kind: SelectorKind,
}

impl Selector {
    pub fn css(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: SelectorKind::Css,
        }
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: SelectorKind::Xpath,
        }
    }
}

/// Page coordinates (document space, CSS pixels)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Scale a point recorded under `from` into the `to` viewport.
    pub fn scaled(self, from: &Viewport, to: &Viewport) -> Self {
        let sx = if from.width > 0 {
            to.width as f64 / from.width as f64
        } else {
            1.0
        };
        let sy = if from.height > 0 {
            to.height as f64 / from.height as f64
        } else {
            1.0
        };
        Self {
            x: self.x * sx,
            y: self.y * sy,
        }
    }
}

/// Element box in page coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.x + self.width && p.y >= self.y && p.y <= self.y + self.height
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: f64,
}

fn default_pixel_ratio() -> f64 {
    1.0
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            pixel_ratio: 1.0,
        }
    }
}

/// A resolvable reference to a page element.
///
/// Several candidates are retained because the selector generated at record
/// time is not guaranteed to still be unique when the automation is replayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub primary_selector: String,
    #[serde(default)]
    pub selector_kind: SelectorKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_selectors: Vec<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point_hint: Option<Point>,
}

impl Target {
    pub fn css(selector: impl Into<String>) -> Self {
        Self {
            primary_selector: selector.into(),
            selector_kind: SelectorKind::Css,
            alternate_selectors: Vec::new(),
            point_hint: None,
        }
    }

    pub fn with_alternate(mut self, selector: Selector) -> Self {
        self.alternate_selectors.push(selector);
        self
    }

    pub fn with_point(mut self, point: Point) -> Self {
        self.point_hint = Some(point);
        self
    }

    /// All structural candidates in resolution order
    pub fn candidates(&self) -> impl Iterator<Item = Selector> + '_ {
        std::iter::once(Selector {
            value: self.primary_selector.clone(),
            kind: self.selector_kind,
        })
        .chain(self.alternate_selectors.iter().cloned())
    }

    /// Loose identity used to decide whether two actions address the same element.
    pub fn same_element(&self, other: &Target) -> bool {
        self.primary_selector == other.primary_selector && self.selector_kind == other.selector_kind
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Modifiers {
    #[serde(default)]
    pub alt: bool,
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub meta: bool,
    #[serde(default)]
    pub shift: bool,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        !(self.alt || self.ctrl || self.meta || self.shift)
    }

    /// CDP modifier bit mask (Alt=1, Ctrl=2, Meta=4, Shift=8)
    pub fn bits(&self) -> i64 {
        let mut bits = 0;
        if self.alt {
            bits |= 1;
        }
        if self.ctrl {
            bits |= 2;
        }
        if self.meta {
            bits |= 4;
        }
        if self.shift {
            bits |= 8;
        }
        bits
    }
}

/// What the user did. Serialized as an internally tagged object so that an
/// action log reads like `{"type": "click", "target": {...}, "timestamp": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ActionKind {
    Navigate {
        url: String,
    },
    SpaNavigate {
        url: String,
    },
    Click {
        target: Target,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Input {
        target: Target,
        value: String,
    },
    Focus {
        target: Target,
    },
    Keypress {
        target: Target,
        key: String,
        #[serde(default, skip_serializing_if = "Modifiers::is_empty")]
        modifiers: Modifiers,
    },
    Submit {
        target: Target,
    },
    Checkbox {
        target: Target,
        checked: bool,
    },
    Select {
        target: Target,
        value: String,
    },
    Scroll {
        x: f64,
        y: f64,
    },
    Hover {
        target: Target,
    },
    Viewport {
        width: u32,
        height: u32,
        #[serde(rename = "pixelRatio", alias = "pixel_ratio")]
        pixel_ratio: f64,
    },
    Wait {
        #[serde(rename = "durationMs", alias = "duration_ms")]
        duration_ms: u64,
    },
}

impl ActionKind {
    /// Stable type tag, identical to the serialized `type` field
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::Navigate { .. } => "navigate",
            ActionKind::SpaNavigate { .. } => "spa-navigate",
            ActionKind::Click { .. } => "click",
            ActionKind::Input { .. } => "input",
            ActionKind::Focus { .. } => "focus",
            ActionKind::Keypress { .. } => "keypress",
            ActionKind::Submit { .. } => "submit",
            ActionKind::Checkbox { .. } => "checkbox",
            ActionKind::Select { .. } => "select",
            ActionKind::Scroll { .. } => "scroll",
            ActionKind::Hover { .. } => "hover",
            ActionKind::Viewport { .. } => "viewport",
            ActionKind::Wait { .. } => "wait",
        }
    }

    pub fn target(&self) -> Option<&Target> {
        match self {
            ActionKind::Click { target, .. }
            | ActionKind::Input { target, .. }
            | ActionKind::Focus { target }
            | ActionKind::Keypress { target, .. }
            | ActionKind::Submit { target }
            | ActionKind::Checkbox { target, .. }
            | ActionKind::Select { target, .. }
            | ActionKind::Hover { target } => Some(target),
            ActionKind::Navigate { .. }
            | ActionKind::SpaNavigate { .. }
            | ActionKind::Scroll { .. }
            | ActionKind::Viewport { .. }
            | ActionKind::Wait { .. } => None,
        }
    }

    pub fn is_navigation(&self) -> bool {
        matches!(self, ActionKind::Navigate { .. } | ActionKind::SpaNavigate { .. })
    }

    /// Short human readable description for progress surfaces
    pub fn describe(&self) -> String {
        match self {
            ActionKind::Navigate { url } => format!("Navigate to {}", url),
            ActionKind::SpaNavigate { url } => format!("In-page navigation to {}", url),
            ActionKind::Click { target, text } => match text.as_deref().filter(|t| !t.is_empty()) {
                Some(text) => format!("Click '{}'", truncate(text, 30)),
                None => format!("Click {}", target.primary_selector),
            },
            ActionKind::Input { target, value } => {
                format!("Type '{}' into {}", truncate(value, 30), target.primary_selector)
            }
            ActionKind::Focus { target } => format!("Focus {}", target.primary_selector),
            ActionKind::Keypress { key, .. } => format!("Press {}", key),
            ActionKind::Submit { target } => format!("Submit {}", target.primary_selector),
            ActionKind::Checkbox { target, checked } => format!(
                "{} {}",
                if *checked { "Check" } else { "Uncheck" },
                target.primary_selector
            ),
            ActionKind::Select { value, .. } => format!("Select '{}'", truncate(value, 30)),
            ActionKind::Scroll { x, y } => format!("Scroll to ({}, {})", x, y),
            ActionKind::Hover { target } => format!("Hover {}", target.primary_selector),
            ActionKind::Viewport { width, height, .. } => format!("Viewport {}x{}", width, height),
            ActionKind::Wait { duration_ms } => format!("Wait {}ms", duration_ms),
        }
    }
}

/// One entry of an action log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Capture time in milliseconds; orders the log, never paces replay
    pub timestamp: i64,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl Action {
    pub fn new(timestamp: i64, kind: ActionKind) -> Self {
        Self { timestamp, kind }
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn target(&self) -> Option<&Target> {
        self.kind.target()
    }
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        None => s.to_string(),
        Some((idx, _)) => format!("{}...", &s[..idx]),
    }
}
