use anyhow::anyhow;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventDomContentEventFired, EventFrameNavigated, EventNavigatedWithinDocument,
};
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::Page;
use dashmap::DashMap;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::protocol::{HostEvent, NavigationEvent, PageMessage, PageScript, SyntheticInput};
use super::runtime::{self, BINDING_NAME};
use super::{HostProvider, PageHost};
use crate::error::HostError;
use crate::models::{Modifiers, Viewport};

const EVENT_CAPACITY: usize = 1024;
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A Chrome tab driven over the DevTools protocol.
pub struct CdpPageHost {
    id: String,
    page: Page,
    events: broadcast::Sender<HostEvent>,
    pump: JoinHandle<()>,
}

impl CdpPageHost {
    /// Wire the binding and lifecycle listeners onto an open page.
    pub async fn attach(id: impl Into<String>, page: Page) -> anyhow::Result<Self> {
        let id = id.into();

        page.execute(AddBindingParams::new(BINDING_NAME))
            .await
            .map_err(|e| anyhow!("Failed to add binding '{}': {}", BINDING_NAME, e))?;

        let bindings = page.event_listener::<EventBindingCalled>().await?;
        let navigated = page.event_listener::<EventFrameNavigated>().await?;
        let dom_ready = page.event_listener::<EventDomContentEventFired>().await?;
        let in_page = page.event_listener::<EventNavigatedWithinDocument>().await?;

        let main_frame = page.mainframe().await?;
        let initial_url = page.url().await?.unwrap_or_default();

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let tx = events.clone();
        let host_id = id.clone();

        // Binding calls are polled first so a capture emitted right before a
        // navigation reaches subscribers ahead of it.
        let pump = tokio::spawn(async move {
            let mut bindings = bindings;
            let mut navigated = navigated;
            let mut dom_ready = dom_ready;
            let mut in_page = in_page;
            let mut current_url = initial_url;

            loop {
                let event = tokio::select! {
                    biased;
                    Some(call) = bindings.next() => {
                        if call.name != BINDING_NAME {
                            continue;
                        }
                        match serde_json::from_str::<PageMessage>(&call.payload) {
                            Ok(message) => HostEvent::Message(message),
                            Err(e) => {
                                tracing::debug!("[{}] Ignoring malformed page message: {}", host_id, e);
                                continue;
                            }
                        }
                    }
                    // frameStartedLoading carries no URL; the main frame's
                    // commit is the first event that names the new document
                    Some(nav) = navigated.next() => {
                        if nav.frame.parent_id.is_some() {
                            continue;
                        }
                        current_url = nav.frame.url.clone();
                        HostEvent::Navigation(NavigationEvent::Started { url: current_url.clone() })
                    }
                    Some(_) = dom_ready.next() => {
                        HostEvent::Navigation(NavigationEvent::DocumentReady { url: current_url.clone() })
                    }
                    Some(nav) = in_page.next() => {
                        if main_frame.as_ref().is_some_and(|f| *f != nav.frame_id) {
                            continue;
                        }
                        current_url = nav.url.clone();
                        HostEvent::Navigation(NavigationEvent::InPage { url: current_url.clone() })
                    }
                    else => break,
                };
                // No subscribers is fine; the event is simply dropped
                let _ = tx.send(event);
            }
            tracing::debug!("[{}] Page event streams closed", host_id);
        });

        tracing::info!("[{}] Attached page host", id);
        Ok(Self {
            id,
            page,
            events,
            pump,
        })
    }

    async fn dispatch_mouse(
        &self,
        kind: DispatchMouseEventType,
        x: f64,
        y: f64,
        click_count: Option<u32>,
    ) -> Result<(), HostError> {
        let mut builder = DispatchMouseEventParams::builder().r#type(kind).x(x).y(y);
        if let Some(count) = click_count {
            builder = builder.button(MouseButton::Left).click_count(count as i64);
        }
        let params = builder.build().map_err(HostError::Input)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| HostError::Input(e.to_string()))?;
        Ok(())
    }

    async fn dispatch_key(
        &self,
        kind: DispatchKeyEventType,
        key: &str,
        modifiers: Modifiers,
    ) -> Result<(), HostError> {
        let def = key_definition(key);
        let mut builder = DispatchKeyEventParams::builder()
            .r#type(kind.clone())
            .key(key)
            .code(def.code)
            .windows_virtual_key_code(def.key_code)
            .native_virtual_key_code(def.key_code)
            .modifiers(modifiers.bits());
        let typing = kind == DispatchKeyEventType::KeyDown && !modifiers.ctrl && !modifiers.meta;
        if let (true, Some(text)) = (typing, def.text) {
            builder = builder.text(text);
        }
        if kind == DispatchKeyEventType::KeyDown && (modifiers.ctrl || modifiers.meta) && key.eq_ignore_ascii_case("a") {
            builder = builder.commands(vec!["selectAll".to_string()]);
        }
        let params = builder.build().map_err(HostError::Input)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| HostError::Input(e.to_string()))?;
        Ok(())
    }
}

impl Drop for CdpPageHost {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[async_trait]
impl PageHost for CdpPageHost {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute_in_context(&self, script: &PageScript) -> Result<serde_json::Value, HostError> {
        let expression = runtime::render(script)?;
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| HostError::from_script_message(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn send_synthetic_input(&self, input: SyntheticInput) -> Result<(), HostError> {
        match input {
            SyntheticInput::MouseMove { x, y } => {
                self.dispatch_mouse(DispatchMouseEventType::MouseMoved, x, y, None).await
            }
            SyntheticInput::MouseDown { x, y, click_count } => {
                self.dispatch_mouse(DispatchMouseEventType::MousePressed, x, y, Some(click_count))
                    .await
            }
            SyntheticInput::MouseUp { x, y, click_count } => {
                self.dispatch_mouse(DispatchMouseEventType::MouseReleased, x, y, Some(click_count))
                    .await
            }
            SyntheticInput::KeyDown { key, modifiers } => {
                self.dispatch_key(DispatchKeyEventType::KeyDown, &key, modifiers).await
            }
            SyntheticInput::KeyUp { key, modifiers } => {
                self.dispatch_key(DispatchKeyEventType::KeyUp, &key, modifiers).await
            }
            SyntheticInput::InsertText { text } => {
                self.page
                    .execute(InsertTextParams::new(text))
                    .await
                    .map_err(|e| HostError::Input(e.to_string()))?;
                Ok(())
            }
            SyntheticInput::Wheel {
                x,
                y,
                delta_x,
                delta_y,
            } => {
                let params = DispatchMouseEventParams::builder()
                    .r#type(DispatchMouseEventType::MouseWheel)
                    .x(x)
                    .y(y)
                    .delta_x(delta_x)
                    .delta_y(delta_y)
                    .build()
                    .map_err(HostError::Input)?;
                self.page
                    .execute(params)
                    .await
                    .map_err(|e| HostError::Input(e.to_string()))?;
                Ok(())
            }
        }
    }

    async fn navigate(&self, url: &str) -> Result<(), HostError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| HostError::Navigation(format!("{}: {}", url, e)))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, HostError> {
        self.page
            .url()
            .await
            .map_err(|e| HostError::from_script_message(e.to_string()))?
            .ok_or_else(|| HostError::Protocol("page has no URL".into()))
    }

    async fn set_viewport(&self, viewport: &Viewport) -> Result<(), HostError> {
        let params = SetDeviceMetricsOverrideParams::builder()
            .width(viewport.width as i64)
            .height(viewport.height as i64)
            .device_scale_factor(viewport.pixel_ratio)
            .mobile(false)
            .build()
            .map_err(HostError::Protocol)?;
        self.page
            .execute(params)
            .await
            .map_err(|e| HostError::Protocol(format!("Failed to set viewport: {}", e)))?;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }
}

struct KeyDefinition {
    code: String,
    key_code: i64,
    text: Option<String>,
}

/// DOM `code`, Windows virtual key code and produced text for a DOM key name.
fn key_definition(key: &str) -> KeyDefinition {
    let named = |code: &str, key_code: i64, text: Option<&str>| KeyDefinition {
        code: code.to_string(),
        key_code,
        text: text.map(str::to_string),
    };
    match key {
        "Enter" => named("Enter", 13, Some("\r")),
        "Tab" => named("Tab", 9, None),
        "Escape" => named("Escape", 27, None),
        "Backspace" => named("Backspace", 8, None),
        "Delete" => named("Delete", 46, None),
        "ArrowLeft" => named("ArrowLeft", 37, None),
        "ArrowUp" => named("ArrowUp", 38, None),
        "ArrowRight" => named("ArrowRight", 39, None),
        "ArrowDown" => named("ArrowDown", 40, None),
        "Home" => named("Home", 36, None),
        "End" => named("End", 35, None),
        "PageUp" => named("PageUp", 33, None),
        "PageDown" => named("PageDown", 34, None),
        " " => named("Space", 32, Some(" ")),
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => KeyDefinition {
                    code: format!("Key{}", c.to_ascii_uppercase()),
                    key_code: c.to_ascii_uppercase() as i64,
                    text: Some(c.to_string()),
                },
                (Some(c), None) if c.is_ascii_digit() => KeyDefinition {
                    code: format!("Digit{}", c),
                    key_code: c as i64,
                    text: Some(c.to_string()),
                },
                (Some(c), None) => KeyDefinition {
                    code: String::new(),
                    key_code: 0,
                    text: Some(c.to_string()),
                },
                _ => named(other, 0, None),
            }
        }
    }
}

/// Launches Chrome on first use and keeps one page per tab id.
pub struct CdpHostProvider {
    headless: bool,
    viewport: Viewport,
    browser: Mutex<Option<Browser>>,
    hosts: DashMap<String, Arc<CdpPageHost>>,
}

impl CdpHostProvider {
    pub fn new(headless: bool, viewport: Viewport) -> Self {
        Self {
            headless,
            viewport,
            browser: Mutex::new(None),
            hosts: DashMap::new(),
        }
    }

    async fn launch(&self) -> anyhow::Result<Browser> {
        let mut config = BrowserConfig::builder().window_size(self.viewport.width, self.viewport.height);
        if !self.headless {
            config = config.with_head();
        }
        let config = config
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-default-apps")
            .arg("--disable-extensions")
            .build()
            .map_err(|e| anyhow!("Failed to build browser config: {}", e))?;

        let (browser, mut handler) = timeout(LAUNCH_TIMEOUT, Browser::launch(config))
            .await
            .map_err(|_| anyhow!("Browser launch timeout (30s) - Chrome may not be installed or is unresponsive"))?
            .map_err(|e| anyhow!("Failed to launch browser: {}", e))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                tracing::trace!("Browser event: {:?}", event);
            }
        });

        tracing::info!("Browser launched (headless: {})", self.headless);
        Ok(browser)
    }

    async fn open(&self, tab_id: &str) -> anyhow::Result<Arc<CdpPageHost>> {
        let mut guard = self.browser.lock().await;
        // Another caller may have opened the tab while we waited for the lock
        if let Some(host) = self.hosts.get(tab_id) {
            return Ok(host.value().clone());
        }
        if guard.is_none() {
            *guard = Some(self.launch().await?);
        }
        let browser = guard
            .as_ref()
            .ok_or_else(|| anyhow!("Browser is not running"))?;

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| anyhow!("Failed to create page: {}", e))?;
        let host = Arc::new(CdpPageHost::attach(tab_id, page).await?);
        host.set_viewport(&self.viewport).await?;
        self.hosts.insert(tab_id.to_string(), host.clone());
        Ok(host)
    }

    /// Close every page and the browser
    pub async fn close(&self) {
        for entry in self.hosts.iter() {
            if let Err(e) = entry.value().page.clone().close().await {
                tracing::warn!("Failed to close page {}: {}", entry.key(), e);
            }
        }
        self.hosts.clear();
        if let Some(mut browser) = self.browser.lock().await.take() {
            let _ = browser.close().await;
        }
        tracing::info!("Browser closed");
    }
}

#[async_trait]
impl HostProvider for CdpHostProvider {
    async fn page_host(&self, tab_id: &str) -> Result<Arc<dyn PageHost>, HostError> {
        if let Some(host) = self.hosts.get(tab_id) {
            return Ok(host.value().clone() as Arc<dyn PageHost>);
        }
        let host = self
            .open(tab_id)
            .await
            .map_err(|e| HostError::Protocol(e.to_string()))?;
        Ok(host as Arc<dyn PageHost>)
    }
}
