use serde::{Deserialize, Serialize};

use super::escape::{css_escape, css_string, xpath_literal};
use crate::models::{Point, Rect, Selector, Target};

/// Everything the page runtime reports about an element so selectors can be
/// ranked on this side of the boundary.
///
/// Each `*_count` is the number of document elements matched by the
/// corresponding candidate selector at capture time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub id_count: usize,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default)]
    pub aria_label_count: usize,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_count: usize,
    #[serde(default)]
    pub test_id: Option<String>,
    #[serde(default)]
    pub test_id_count: usize,
    /// At most the first three classes of the class list
    #[serde(default)]
    pub classes: Vec<String>,
    /// Matches for `tag.class1.class2...` built from `classes`
    #[serde(default)]
    pub class_count: usize,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub input_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub rect: Option<Rect>,
    /// Root-to-element chain of `(tag, nth-of-type)` pairs
    #[serde(default)]
    pub path: Vec<PathSegment>,
    #[serde(default)]
    pub editable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSegment {
    pub tag: String,
    /// 1-based position among siblings with the same tag
    pub nth: usize,
    /// Present only when the id is unique in the document
    #[serde(default)]
    pub id: Option<String>,
}

impl PathSegment {
    pub fn new(tag: &str, nth: usize) -> Self {
        Self {
            tag: tag.to_string(),
            nth,
            id: None,
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

impl ElementDescriptor {
    pub fn is_form_field(&self) -> bool {
        self.editable || matches!(self.tag.as_str(), "input" | "textarea" | "select")
    }

    pub fn is_toggle(&self) -> bool {
        self.tag == "input" && matches!(self.input_type.as_deref(), Some("checkbox" | "radio"))
    }
}

/// Ids that look generated by a framework or build step are not worth
/// anchoring on: they change between page loads.
pub fn is_stable_id(id: &str) -> bool {
    if id.is_empty() || id.len() > 64 || id.contains(':') || id.chars().any(char::is_whitespace) {
        return false;
    }

    let mut run = 0;
    for c in id.chars() {
        if c.is_ascii_digit() {
            run += 1;
            if run >= 4 {
                return false;
            }
        } else {
            run = 0;
        }
    }

    const GENERATED_PREFIXES: [&str; 6] = ["ember", "react-", "mui-", "radix-", "headlessui-", "yui_"];
    let lower = id.to_ascii_lowercase();
    let has_digit = lower.chars().any(|c| c.is_ascii_digit());
    !(has_digit && GENERATED_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)))
}

fn is_stable_class(class: &str) -> bool {
    !class.is_empty()
        && !class.contains(':')
        && !class.chars().next().is_some_and(|c| c.is_ascii_digit())
        && is_stable_id(class)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Rank every applicable selector for an element. The first entry becomes the
/// primary selector, the rest are kept as alternates.
pub fn candidate_selectors(desc: &ElementDescriptor) -> Vec<Selector> {
    let mut out: Vec<Selector> = Vec::new();
    let mut push = |selector: Selector| {
        if !out.iter().any(|s| s.value == selector.value && s.kind == selector.kind) {
            out.push(selector);
        }
    };

    if let Some(id) = non_empty(&desc.id) {
        if desc.id_count == 1 && is_stable_id(id) {
            push(Selector::css(format!("#{}", css_escape(id))));
        }
    }
    if let Some(label) = non_empty(&desc.aria_label) {
        if desc.aria_label_count == 1 {
            push(Selector::css(format!("[aria-label={}]", css_string(label))));
        }
    }
    if let Some(name) = non_empty(&desc.name) {
        if desc.name_count == 1 {
            push(Selector::css(format!("[name={}]", css_string(name))));
        }
    }
    if let Some(test_id) = non_empty(&desc.test_id) {
        if desc.test_id_count == 1 {
            push(Selector::css(format!("[data-testid={}]", css_string(test_id))));
        }
    }
    if !desc.classes.is_empty()
        && desc.class_count == 1
        && desc.classes.iter().all(|c| is_stable_class(c))
    {
        let classes: Vec<String> = desc.classes.iter().map(|c| css_escape(c)).collect();
        push(Selector::css(format!("{}.{}", desc.tag, classes.join("."))));
    }
    if let Some(css) = structural_css(&desc.path) {
        push(Selector::css(css));
    }
    if let Some(xpath) = structural_xpath(&desc.path) {
        push(Selector::xpath(xpath));
    }
    out
}

/// Index of the nearest segment (excluding the element itself) that can
/// anchor a structural path.
fn anchor_index(path: &[PathSegment]) -> Option<usize> {
    let last = path.len().checked_sub(1)?;
    path[..last]
        .iter()
        .rposition(|seg| seg.id.as_deref().is_some_and(is_stable_id))
}

fn structural_css(path: &[PathSegment]) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let (mut parts, rest) = match anchor_index(path) {
        Some(i) => {
            let id = path[i].id.as_deref().unwrap_or_default();
            (vec![format!("#{}", css_escape(id))], &path[i + 1..])
        }
        None => (Vec::new(), path),
    };
    for seg in rest {
        if seg.tag == "html" && parts.is_empty() {
            parts.push("html".to_string());
        } else {
            parts.push(format!("{}:nth-of-type({})", seg.tag, seg.nth.max(1)));
        }
    }
    Some(parts.join(" > "))
}

fn structural_xpath(path: &[PathSegment]) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    let (mut out, rest) = match anchor_index(path) {
        Some(i) => {
            let id = path[i].id.as_deref().unwrap_or_default();
            (format!("//*[@id={}]", xpath_literal(id)), &path[i + 1..])
        }
        None => (String::new(), path),
    };
    for seg in rest {
        out.push_str(&format!("/{}[{}]", seg.tag, seg.nth.max(1)));
    }
    Some(out)
}

/// Build the `Target` recorded for an element.
pub fn generate_target(desc: &ElementDescriptor, point: Option<Point>) -> Target {
    let mut candidates = candidate_selectors(desc).into_iter();
    let primary = candidates
        .next()
        .unwrap_or_else(|| Selector::css(desc.tag.clone()));
    Target {
        primary_selector: primary.value,
        selector_kind: primary.kind,
        alternate_selectors: candidates.collect(),
        point_hint: point.or_else(|| desc.rect.filter(|r| !r.is_empty()).map(|r| r.center())),
    }
}
