//! In-process page host that simulates a small DOM, the page runtime, the
//! navigation lifecycle and synthetic input.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;

use browser_automation::config::EngineConfig;
use browser_automation::controller::SessionController;
use browser_automation::error::HostError;
use browser_automation::host::{
    CapturedEvent, CapturedKind, DocumentReport, ElementReport, FailureReason, HostEvent, Interaction,
    InteractionReport, Locator, NavigationEvent, PageHost, PageMessage, PageScript, ProbeReport, SyntheticInput,
    ValueReport,
};
use browser_automation::models::{Modifiers, Point, ProgressEvent, Rect, Selector, SelectorKind, Viewport};
use browser_automation::selector::{candidate_selectors, css_escape, css_string, ElementDescriptor, PathSegment};
use browser_automation::store::MemoryAutomationStore;

pub const BLANK_URL: &str = "about:blank";
pub const FORM_URL: &str = "https://example.test/form";
pub const ACCOUNT_URL: &str = "https://example.test/account";

#[derive(Debug, Clone)]
pub struct FixtureElement {
    pub key: String,
    pub tag: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub aria_label: Option<String>,
    pub classes: Vec<String>,
    pub input_type: Option<String>,
    pub text: Option<String>,
    pub rect: Rect,
    pub value: String,
    pub checked: bool,
    pub options: Vec<String>,
    pub form: Option<String>,
    pub submits: bool,
    pub visible: bool,
    /// An overlay sits on top: structural clicks are blocked, raw input lands
    pub covered: bool,
}

impl FixtureElement {
    pub fn new(key: &str, tag: &str, rect: Rect) -> Self {
        Self {
            key: key.to_string(),
            tag: tag.to_string(),
            id: None,
            name: None,
            aria_label: None,
            classes: Vec::new(),
            input_type: None,
            text: None,
            rect,
            value: String::new(),
            checked: false,
            options: Vec::new(),
            form: None,
            submits: false,
            visible: true,
            covered: false,
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn classes(mut self, classes: &[&str]) -> Self {
        self.classes = classes.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn input_type(mut self, input_type: &str) -> Self {
        self.input_type = Some(input_type.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.value = value.to_string();
        self
    }

    pub fn options(mut self, options: &[&str]) -> Self {
        self.options = options.iter().map(|o| o.to_string()).collect();
        self
    }

    pub fn in_form(mut self, form: &str) -> Self {
        self.form = Some(form.to_string());
        self
    }

    pub fn submit_button(mut self) -> Self {
        self.submits = true;
        self
    }

    fn is_toggle(&self) -> bool {
        self.tag == "input" && matches!(self.input_type.as_deref(), Some("checkbox" | "radio"))
    }

    fn is_field(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea" | "select")
    }
}

/// Sign-up form used by most scenarios
pub fn form_page() -> Vec<FixtureElement> {
    vec![
        FixtureElement::new("signup", "form", Rect::new(100.0, 80.0, 400.0, 300.0)).id("signup"),
        FixtureElement::new("name", "input", Rect::new(120.0, 100.0, 200.0, 30.0))
            .id("name")
            .name("name")
            .input_type("text")
            .in_form("signup"),
        FixtureElement::new("terms", "input", Rect::new(120.0, 150.0, 20.0, 20.0))
            .id("terms")
            .input_type("checkbox")
            .in_form("signup"),
        FixtureElement::new("plan", "select", Rect::new(120.0, 190.0, 200.0, 30.0))
            .id("plan")
            .name("plan")
            .options(&["free", "pro"])
            .value("free")
            .in_form("signup"),
        FixtureElement::new("submit", "button", Rect::new(120.0, 240.0, 100.0, 40.0))
            .id("submit")
            .classes(&["btn", "primary"])
            .text("Sign up")
            .in_form("signup")
            .submit_button(),
    ]
}

pub fn account_page() -> Vec<FixtureElement> {
    vec![
        FixtureElement::new("bio", "textarea", Rect::new(100.0, 100.0, 300.0, 120.0))
            .id("bio")
            .name("bio"),
        FixtureElement::new("save", "button", Rect::new(100.0, 240.0, 80.0, 30.0))
            .id("save")
            .text("Save"),
    ]
}

#[derive(Debug, Default)]
struct CaptureState {
    installed: bool,
    active: bool,
    epoch: u64,
    listeners: u32,
}

struct PageState {
    url: String,
    context: u64,
    seq: u64,
    elements: Vec<FixtureElement>,
    capture: CaptureState,
    capture_installs: u32,
    focused: Option<usize>,
    pressed: Option<usize>,
    select_all: bool,
    scroll: (f64, f64),
    viewport: Viewport,
    submissions: Vec<HashMap<String, String>>,
    clicks: Vec<String>,
    synthetic: Vec<SyntheticInput>,
    failing_installs: u32,
    stale_performs: u32,
    structural_broken: bool,
}

pub struct FixturePage {
    id: String,
    site: HashMap<String, Vec<FixtureElement>>,
    state: Mutex<PageState>,
    events: broadcast::Sender<HostEvent>,
}

impl FixturePage {
    /// A tab on `about:blank` that can load the form and account pages
    pub fn new(id: &str) -> Arc<Self> {
        Self::with_site(
            id,
            vec![(BLANK_URL, Vec::new()), (FORM_URL, form_page()), (ACCOUNT_URL, account_page())],
        )
    }

    pub fn with_site(id: &str, site: Vec<(&str, Vec<FixtureElement>)>) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            site: site.into_iter().map(|(url, page)| (url.to_string(), page)).collect(),
            state: Mutex::new(PageState {
                url: BLANK_URL.to_string(),
                context: 1,
                seq: 0,
                elements: Vec::new(),
                capture: CaptureState::default(),
                capture_installs: 0,
                focused: None,
                pressed: None,
                select_all: false,
                scroll: (0.0, 0.0),
                viewport: Viewport::default(),
                submissions: Vec::new(),
                clicks: Vec::new(),
                synthetic: Vec::new(),
                failing_installs: 0,
                stale_performs: 0,
                structural_broken: false,
            }),
            events: broadcast::channel(256).0,
        })
    }

    fn state(&self) -> MutexGuard<'_, PageState> {
        self.state.lock().unwrap()
    }

    // Inspection

    pub fn url(&self) -> String {
        self.state().url.clone()
    }

    pub fn value_of(&self, key: &str) -> String {
        let state = self.state();
        state.elements[index_of(&state, key)].value.clone()
    }

    pub fn is_checked(&self, key: &str) -> bool {
        let state = self.state();
        state.elements[index_of(&state, key)].checked
    }

    pub fn submissions(&self) -> Vec<HashMap<String, String>> {
        self.state().submissions.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state().clicks.clone()
    }

    pub fn synthetic_inputs(&self) -> Vec<SyntheticInput> {
        self.state().synthetic.clone()
    }

    pub fn capture_installs(&self) -> u32 {
        self.state().capture_installs
    }

    pub fn capture_active(&self) -> bool {
        let state = self.state();
        state.capture.installed && state.capture.active
    }

    /// Capture listeners registered in the current context
    pub fn listeners(&self) -> u32 {
        self.state().capture.listeners
    }

    // Fault injection

    /// The next `n` capture installs land in a context that is going away
    pub fn fail_installs(&self, n: u32) {
        self.state().failing_installs = n;
    }

    /// The next `n` structural interactions race a context teardown
    pub fn stale_performs(&self, n: u32) {
        self.state().stale_performs = n;
    }

    /// Every structural interaction throws inside the page
    pub fn break_structural(&self, broken: bool) {
        self.state().structural_broken = broken;
    }

    /// Simulate the page dropping the capture module without navigating
    pub fn wipe_capture(&self) {
        self.state().capture = CaptureState::default();
    }

    pub fn edit(&self, key: &str, f: impl FnOnce(&mut FixtureElement)) {
        let mut state = self.state();
        let idx = index_of(&state, key);
        f(&mut state.elements[idx]);
    }

    // Navigation

    /// Full document load, as if the user followed a link
    pub fn load(&self, url: &str) -> Result<(), HostError> {
        let Some(elements) = self.site.get(url).cloned() else {
            return Err(HostError::Navigation(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)));
        };
        let _ = self.events.send(HostEvent::Navigation(NavigationEvent::Started { url: url.to_string() }));
        {
            let mut state = self.state();
            state.url = url.to_string();
            state.context += 1;
            state.seq = 0;
            state.elements = elements;
            state.capture = CaptureState::default();
            state.focused = None;
            state.pressed = None;
            state.scroll = (0.0, 0.0);
        }
        let _ = self
            .events
            .send(HostEvent::Navigation(NavigationEvent::DocumentReady { url: url.to_string() }));
        Ok(())
    }

    /// History API route change; the script context survives
    pub fn push_state(&self, url: &str) {
        self.state().url = url.to_string();
        let _ = self.events.send(HostEvent::Navigation(NavigationEvent::InPage { url: url.to_string() }));
    }

    // User simulation: mutate the page and forward what the capture module
    // would observe.

    fn with_element<R>(&self, key: &str, f: impl FnOnce(&mut PageState, usize) -> R) -> R {
        let mut state = self.state();
        let idx = index_of(&state, key);
        f(&mut state, idx)
    }

    fn emit(&self, state: &mut PageState, kind: CapturedKind, idx: Option<usize>, fill: impl FnOnce(&mut CapturedEvent)) {
        if !(state.capture.installed && state.capture.active) {
            return;
        }
        state.seq += 1;
        let centre = idx.map(|i| state.elements[i].rect.center());
        let mut event = CapturedEvent {
            context_id: format!("ctx-{}", state.context),
            seq: state.seq,
            epoch: state.capture.epoch,
            kind,
            url: state.url.clone(),
            element: idx.map(|i| descriptor(&state.elements, i)),
            x: centre.map(|p| p.x),
            y: centre.map(|p| p.y),
            value: None,
            checked: None,
            key: None,
            modifiers: Modifiers::default(),
            scroll_x: None,
            scroll_y: None,
        };
        fill(&mut event);
        let _ = self.events.send(HostEvent::Message(PageMessage::Captured(event)));
    }

    pub fn user_click(&self, key: &str) {
        self.with_element(key, |state, idx| {
            self.emit(state, CapturedKind::Click, Some(idx), |_| {});
            let submitted = activate(state, idx);
            if state.elements[idx].is_toggle() {
                let checked = state.elements[idx].checked;
                self.emit(state, CapturedKind::Checkbox, Some(idx), |e| e.checked = Some(checked));
            }
            if let Some(form) = submitted {
                self.emit(state, CapturedKind::Submit, Some(form), |_| {});
            }
        });
    }

    pub fn user_focus(&self, key: &str) {
        self.with_element(key, |state, idx| {
            state.focused = Some(idx);
            self.emit(state, CapturedKind::Focus, Some(idx), |_| {});
        });
    }

    /// One `input` event per character, like a real keyboard
    pub fn user_type(&self, key: &str, text: &str) {
        self.with_element(key, |state, idx| {
            state.focused = Some(idx);
            for ch in text.chars() {
                state.elements[idx].value.push(ch);
                let value = state.elements[idx].value.clone();
                self.emit(state, CapturedKind::Input, Some(idx), |e| e.value = Some(value));
            }
        });
    }

    pub fn user_press(&self, key: &str, name: &str) {
        self.with_element(key, |state, idx| {
            self.emit(state, CapturedKind::Keypress, Some(idx), |e| e.key = Some(name.to_string()));
            if name == "Enter" && state.elements[idx].tag == "input" {
                if let Some(form) = submit_form_of(state, idx) {
                    self.emit(state, CapturedKind::Submit, Some(form), |_| {});
                }
            }
        });
    }

    pub fn user_select(&self, key: &str, value: &str) {
        self.with_element(key, |state, idx| {
            self.emit(state, CapturedKind::Click, Some(idx), |_| {});
            state.elements[idx].value = value.to_string();
            self.emit(state, CapturedKind::Select, Some(idx), |e| e.value = Some(value.to_string()));
        });
    }

    pub fn user_scroll(&self, x: f64, y: f64) {
        let mut state = self.state();
        state.scroll = (x, y);
        self.emit(&mut state, CapturedKind::Scroll, None, |e| {
            e.scroll_x = Some(x);
            e.scroll_y = Some(y);
        });
    }

    // Page runtime

    fn run_script(&self, script: &PageScript) -> Result<serde_json::Value, HostError> {
        let mut state = self.state();
        let value = match script {
            PageScript::InstallCapture { config } => {
                if state.failing_installs > 0 {
                    state.failing_installs -= 1;
                    return Err(HostError::StaleContext("Execution context was destroyed.".into()));
                }
                state.capture_installs += 1;
                if !state.capture.installed {
                    state.capture.installed = true;
                    state.capture.listeners = 8;
                }
                state.capture.active = config.active;
                state.capture.epoch = config.epoch;
                to_value(probe(&state))?
            }
            PageScript::ProbeCapture => to_value(probe(&state))?,
            PageScript::SetCaptureActive { active } => {
                if !state.capture.installed {
                    return Ok(serde_json::Value::Null);
                }
                state.capture.active = *active;
                to_value(probe(&state))?
            }
            PageScript::Resolve { locator } | PageScript::Reveal { locator } => to_value(element_report(&state, locator))?,
            PageScript::Perform { locator, interaction } => {
                if state.stale_performs > 0 {
                    state.stale_performs -= 1;
                    return Err(HostError::StaleContext("Cannot find context with specified id".into()));
                }
                to_value(perform(&mut state, locator, interaction))?
            }
            PageScript::ScrollTo { x, y } => {
                state.scroll = (*x, *y);
                to_value(document(&state))?
            }
            PageScript::ReadDocument => to_value(document(&state))?,
            PageScript::ReadValue { locator } => {
                let report = match locate(&state, locator).first() {
                    Some(&idx) => {
                        let el = &state.elements[idx];
                        ValueReport {
                            found: true,
                            value: Some(el.value.clone()),
                            checked: el.is_toggle().then_some(el.checked),
                        }
                    }
                    None => ValueReport::default(),
                };
                to_value(report)?
            }
        };
        Ok(value)
    }

    fn deliver(&self, input: SyntheticInput) {
        let mut state = self.state();
        state.synthetic.push(input.clone());
        let (sx, sy) = state.scroll;
        match input {
            SyntheticInput::MouseMove { .. } => {}
            SyntheticInput::MouseDown { x, y, .. } => state.pressed = hit_test(&state, Point::new(x + sx, y + sy)),
            SyntheticInput::MouseUp { x, y, .. } => {
                let hit = hit_test(&state, Point::new(x + sx, y + sy));
                if let (Some(idx), true) = (hit, hit == state.pressed) {
                    activate(&mut state, idx);
                }
                state.pressed = None;
            }
            SyntheticInput::KeyDown { key, modifiers } => {
                if key == "a" && (modifiers.ctrl || modifiers.meta) {
                    state.select_all = true;
                } else if key == "Enter" {
                    if let Some(idx) = state.focused.filter(|&i| state.elements[i].tag == "input") {
                        submit_form_of(&mut state, idx);
                    }
                }
            }
            SyntheticInput::KeyUp { .. } => {}
            SyntheticInput::InsertText { text } => {
                if let Some(idx) = state.focused {
                    let select_all = state.select_all;
                    let el = &mut state.elements[idx];
                    if el.tag == "select" {
                        if el.options.contains(&text) {
                            el.value = text;
                        }
                    } else if select_all {
                        el.value = text;
                    } else {
                        el.value.push_str(&text);
                    }
                }
                state.select_all = false;
            }
            SyntheticInput::Wheel { delta_x, delta_y, .. } => {
                state.scroll = (sx + delta_x, sy + delta_y);
            }
        }
    }
}

#[async_trait]
impl PageHost for FixturePage {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute_in_context(&self, script: &PageScript) -> Result<serde_json::Value, HostError> {
        self.run_script(script)
    }

    async fn send_synthetic_input(&self, input: SyntheticInput) -> Result<(), HostError> {
        self.deliver(input);
        Ok(())
    }

    async fn navigate(&self, url: &str) -> Result<(), HostError> {
        self.load(url)
    }

    async fn current_url(&self) -> Result<String, HostError> {
        Ok(self.url())
    }

    async fn set_viewport(&self, viewport: &Viewport) -> Result<(), HostError> {
        self.state().viewport = viewport.clone();
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}

fn to_value<T: serde::Serialize>(report: T) -> Result<serde_json::Value, HostError> {
    serde_json::to_value(report).map_err(|e| HostError::Script(e.to_string()))
}

fn index_of(state: &PageState, key: &str) -> usize {
    state
        .elements
        .iter()
        .position(|e| e.key == key)
        .unwrap_or_else(|| panic!("no fixture element '{}' on {}", key, state.url))
}

fn probe(state: &PageState) -> ProbeReport {
    ProbeReport {
        installed: state.capture.installed,
        active: state.capture.active,
        version: state.capture.installed.then(|| "1".to_string()),
        context_id: Some(format!("ctx-{}", state.context)),
        listeners: state.capture.listeners,
        epoch: state.capture.epoch,
        url: state.url.clone(),
    }
}

fn document(state: &PageState) -> DocumentReport {
    DocumentReport {
        url: state.url.clone(),
        ready_state: "complete".to_string(),
        width: state.viewport.width,
        height: state.viewport.height,
        pixel_ratio: state.viewport.pixel_ratio,
        scroll_x: state.scroll.0,
        scroll_y: state.scroll.1,
    }
}

fn descriptor(elements: &[FixtureElement], idx: usize) -> ElementDescriptor {
    let el = &elements[idx];
    let count = |f: &dyn Fn(&FixtureElement) -> bool| elements.iter().filter(|&e| f(e)).count();
    let nth = elements[..=idx].iter().filter(|e| e.tag == el.tag).count();

    ElementDescriptor {
        tag: el.tag.clone(),
        id: el.id.clone(),
        id_count: el.id.as_ref().map_or(0, |id| count(&|e| e.id.as_ref() == Some(id))),
        aria_label: el.aria_label.clone(),
        aria_label_count: el
            .aria_label
            .as_ref()
            .map_or(0, |l| count(&|e| e.aria_label.as_ref() == Some(l))),
        name: el.name.clone(),
        name_count: el.name.as_ref().map_or(0, |n| count(&|e| e.name.as_ref() == Some(n))),
        test_id: None,
        test_id_count: 0,
        classes: el.classes.clone(),
        class_count: if el.classes.is_empty() {
            0
        } else {
            count(&|e| e.tag == el.tag && el.classes.iter().all(|c| e.classes.contains(c)))
        },
        role: None,
        input_type: el.input_type.clone(),
        text: el.text.clone(),
        rect: Some(el.rect),
        path: vec![
            PathSegment::new("html", 1),
            PathSegment::new("body", 1),
            PathSegment::new(&el.tag, nth),
        ],
        editable: false,
    }
}

/// Every selector that matches the element in its current document
fn selectors_for(elements: &[FixtureElement], idx: usize) -> Vec<Selector> {
    let el = &elements[idx];
    let mut selectors = candidate_selectors(&descriptor(elements, idx));
    if let Some(id) = &el.id {
        selectors.push(Selector::css(format!("#{}", css_escape(id))));
    }
    if let Some(name) = &el.name {
        selectors.push(Selector::css(format!("[name={}]", css_string(name))));
    }
    if let Some(label) = &el.aria_label {
        selectors.push(Selector::css(format!("[aria-label={}]", css_string(label))));
    }
    if !el.classes.is_empty() {
        let classes: Vec<String> = el.classes.iter().map(|c| css_escape(c)).collect();
        selectors.push(Selector::css(format!("{}.{}", el.tag, classes.join("."))));
    }
    selectors.push(Selector::css(el.tag.clone()));
    selectors
}

fn locate(state: &PageState, locator: &Locator) -> Vec<usize> {
    let (value, kind) = match locator {
        Locator::Css { value } => (value, SelectorKind::Css),
        Locator::Xpath { value } => (value, SelectorKind::Xpath),
        Locator::Point { x, y } => return hit_test(state, Point::new(*x, *y)).into_iter().collect(),
    };
    (0..state.elements.len())
        .filter(|&i| {
            selectors_for(&state.elements, i)
                .iter()
                .any(|s| s.kind == kind && s.value == *value)
        })
        .collect()
}

/// Topmost visible element under a page point
fn hit_test(state: &PageState, point: Point) -> Option<usize> {
    state
        .elements
        .iter()
        .enumerate()
        .rev()
        .find(|(_, e)| e.visible && e.rect.contains(point))
        .map(|(i, _)| i)
}

fn client_centre(state: &PageState, idx: usize) -> Point {
    let centre = state.elements[idx].rect.center();
    Point::new(centre.x - state.scroll.0, centre.y - state.scroll.1)
}

fn element_report(state: &PageState, locator: &Locator) -> ElementReport {
    let matches = locate(state, locator);
    match matches.first() {
        Some(&idx) => {
            let el = &state.elements[idx];
            ElementReport {
                found: true,
                count: matches.len(),
                visible: el.visible,
                rect: Some(el.rect),
                client: Some(client_centre(state, idx)),
                tag: Some(el.tag.clone()),
            }
        }
        // Hit-testing empty space lands on the body
        None if locator.is_point() => ElementReport {
            found: true,
            count: 1,
            visible: true,
            tag: Some("body".to_string()),
            ..Default::default()
        },
        None => ElementReport::default(),
    }
}

fn perform(state: &mut PageState, locator: &Locator, interaction: &Interaction) -> InteractionReport {
    let Some(&idx) = locate(state, locator).first() else {
        return failure(FailureReason::NotFound, None, None);
    };
    let client = Some(client_centre(state, idx));
    let hidden_ok = matches!(
        interaction,
        Interaction::Checkbox { .. } | Interaction::Select { .. } | Interaction::Submit
    );
    if !hidden_ok && !state.elements[idx].visible {
        return failure(FailureReason::NotVisible, None, client);
    }
    if matches!(interaction, Interaction::Click | Interaction::Hover) && state.elements[idx].covered {
        return failure(FailureReason::Blocked, Some("div".into()), client);
    }
    if state.structural_broken {
        return failure(FailureReason::Error, Some("TypeError: handler is not a function".into()), client);
    }

    match interaction {
        Interaction::Click => {
            activate(state, idx);
        }
        Interaction::Input { value } => {
            state.focused = Some(idx);
            state.elements[idx].value = value.clone();
        }
        Interaction::Focus => state.focused = Some(idx),
        Interaction::Keypress { key, .. } => {
            state.focused = Some(idx);
            if key == "Enter" && state.elements[idx].tag == "input" {
                submit_form_of(state, idx);
            }
        }
        Interaction::Submit => {
            if submit_form_of(state, idx).is_none() {
                return failure(FailureReason::Error, Some("no enclosing form".into()), client);
            }
        }
        Interaction::Checkbox { checked } => {
            if state.elements[idx].checked != *checked {
                activate(state, idx);
            }
        }
        Interaction::Select { value } => {
            if !state.elements[idx].options.contains(value) {
                return failure(FailureReason::Error, Some(format!("no option with value {}", value)), client);
            }
            state.elements[idx].value = value.clone();
        }
        Interaction::Hover => {}
    }
    InteractionReport {
        ok: true,
        reason: None,
        detail: None,
        client,
    }
}

fn failure(reason: FailureReason, detail: Option<String>, client: Option<Point>) -> InteractionReport {
    InteractionReport {
        ok: false,
        reason: Some(reason),
        detail,
        client,
    }
}

/// What a real click does: focus, toggle, submit. Returns the submitted
/// form's index.
fn activate(state: &mut PageState, idx: usize) -> Option<usize> {
    let key = state.elements[idx].key.clone();
    state.clicks.push(key);
    if state.elements[idx].is_field() {
        state.focused = Some(idx);
    }
    if state.elements[idx].is_toggle() {
        state.elements[idx].checked = !state.elements[idx].checked;
    }
    if state.elements[idx].submits {
        return submit_form_of(state, idx);
    }
    None
}

fn submit_form_of(state: &mut PageState, idx: usize) -> Option<usize> {
    let form_key = if state.elements[idx].tag == "form" {
        state.elements[idx].key.clone()
    } else {
        state.elements[idx].form.clone()?
    };
    let form_idx = state.elements.iter().position(|e| e.key == form_key)?;
    let fields = state
        .elements
        .iter()
        .filter(|e| e.form.as_deref() == Some(form_key.as_str()) && e.is_field())
        .map(|e| {
            let value = if e.is_toggle() {
                if e.checked { "on".to_string() } else { String::new() }
            } else {
                e.value.clone()
            };
            (e.key.clone(), value)
        })
        .collect();
    state.submissions.push(fields);
    Some(form_idx)
}

// Shared test helpers

pub fn as_host(page: &Arc<FixturePage>) -> Arc<dyn PageHost> {
    page.clone()
}

pub fn controller() -> Arc<SessionController> {
    controller_with_store().0
}

/// Controller plus direct access to its store, for seeding automations
pub fn controller_with_store() -> (Arc<SessionController>, Arc<MemoryAutomationStore>) {
    let store = Arc::new(MemoryAutomationStore::new());
    let controller = Arc::new(SessionController::new(store.clone(), EngineConfig::default()));
    (controller, store)
}

/// Let spawned tasks and debounce timers run. Time is paused in these tests,
/// so this advances the clock deterministically.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Drain every progress event currently buffered
pub fn drain(rx: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
