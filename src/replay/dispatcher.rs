use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::{HostError, ReplayError};
use crate::host::{
    evaluate, DocumentReport, ElementReport, Interaction, InteractionReport, Locator, PageHost, PageScript,
    SyntheticInput, ValueReport,
};
use crate::models::{ActionKind, ControlGate, GateDeadline, Modifiers, Point, Target, Viewport};
use crate::selector::{Resolved, SelectorResolver};

/// How an action's effect reached the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchOutcome {
    /// Delivered through raw pointer/keyboard input instead of DOM events
    pub used_fallback: bool,
}

impl DispatchOutcome {
    fn structural() -> Self {
        Self { used_fallback: false }
    }

    fn synthetic() -> Self {
        Self { used_fallback: true }
    }
}

/// Structural interaction for a target-bearing action.
pub fn interaction_for(kind: &ActionKind) -> Option<Interaction> {
    Some(match kind {
        ActionKind::Click { .. } => Interaction::Click,
        ActionKind::Input { value, .. } => Interaction::Input { value: value.clone() },
        ActionKind::Focus { .. } => Interaction::Focus,
        ActionKind::Keypress { key, modifiers, .. } => Interaction::Keypress {
            key: key.clone(),
            modifiers: *modifiers,
        },
        ActionKind::Submit { .. } => Interaction::Submit,
        ActionKind::Checkbox { checked, .. } => Interaction::Checkbox { checked: *checked },
        ActionKind::Select { value, .. } => Interaction::Select { value: value.clone() },
        ActionKind::Hover { .. } => Interaction::Hover,
        _ => return None,
    })
}

fn press(point: Point) -> [SyntheticInput; 3] {
    [
        SyntheticInput::MouseMove { x: point.x, y: point.y },
        SyntheticInput::MouseDown {
            x: point.x,
            y: point.y,
            click_count: 1,
        },
        SyntheticInput::MouseUp {
            x: point.x,
            y: point.y,
            click_count: 1,
        },
    ]
}

fn key_stroke(key: &str, modifiers: Modifiers) -> [SyntheticInput; 2] {
    [
        SyntheticInput::KeyDown {
            key: key.to_string(),
            modifiers,
        },
        SyntheticInput::KeyUp {
            key: key.to_string(),
            modifiers,
        },
    ]
}

/// Raw input that reproduces `interaction` at a viewport point.
///
/// Everything except hover starts with a press so the element under the
/// point receives focus first.
pub fn synthetic_sequence(interaction: &Interaction, point: Point) -> Vec<SyntheticInput> {
    let mut inputs = Vec::new();
    match interaction {
        Interaction::Hover => inputs.push(SyntheticInput::MouseMove { x: point.x, y: point.y }),
        Interaction::Click | Interaction::Focus | Interaction::Checkbox { .. } => inputs.extend(press(point)),
        Interaction::Input { value } | Interaction::Select { value } => {
            inputs.extend(press(point));
            let select_all = Modifiers {
                ctrl: true,
                ..Modifiers::default()
            };
            inputs.extend(key_stroke("a", select_all));
            inputs.push(SyntheticInput::InsertText { text: value.clone() });
        }
        Interaction::Keypress { key, modifiers } => {
            inputs.extend(press(point));
            inputs.extend(key_stroke(key, *modifiers));
        }
        Interaction::Submit => {
            inputs.extend(press(point));
            inputs.extend(key_stroke("Enter", Modifiers::default()));
        }
    }
    inputs
}

/// Executes one action against a page host: structural DOM interaction
/// first, synthetic input when that fails.
pub struct ActionDispatcher {
    host: Arc<dyn PageHost>,
    config: EngineConfig,
    recorded: Viewport,
    current: Viewport,
}

impl ActionDispatcher {
    pub fn new(host: Arc<dyn PageHost>, config: EngineConfig, recorded: Viewport) -> Self {
        Self {
            host,
            config,
            current: recorded.clone(),
            recorded,
        }
    }

    pub fn current_viewport(&self) -> &Viewport {
        &self.current
    }

    /// Re-read the live viewport so point hints scale correctly.
    pub async fn refresh_viewport(&mut self) {
        match evaluate::<DocumentReport>(self.host.as_ref(), &PageScript::ReadDocument).await {
            Ok(doc) if doc.width > 0 && doc.height > 0 => self.current = doc.viewport(),
            Ok(_) => {}
            Err(e) => tracing::debug!("[{}] Could not read viewport: {}", self.host.id(), e),
        }
    }

    pub async fn dispatch(&mut self, kind: &ActionKind, gate: &mut ControlGate) -> Result<DispatchOutcome, ReplayError> {
        match kind {
            ActionKind::Navigate { url } => self.navigate(url, gate).await,
            ActionKind::SpaNavigate { url } => self.spa_navigate(url, gate).await,
            ActionKind::Viewport {
                width,
                height,
                pixel_ratio,
            } => {
                let viewport = Viewport {
                    width: *width,
                    height: *height,
                    pixel_ratio: *pixel_ratio,
                };
                gate.interruptible(self.host.set_viewport(&viewport)).await??;
                self.current = viewport;
                Ok(DispatchOutcome::structural())
            }
            ActionKind::Wait { duration_ms } => {
                gate.sleep(Duration::from_millis(*duration_ms)).await?;
                Ok(DispatchOutcome::structural())
            }
            ActionKind::Scroll { x, y } => self.scroll(*x, *y, gate).await,
            _ => {
                let (Some(target), Some(interaction)) = (kind.target(), interaction_for(kind)) else {
                    return Err(ReplayError::Host(format!("no dispatch for {}", kind.type_name())));
                };
                self.interact(target, &interaction, gate).await
            }
        }
    }

    async fn navigate(&mut self, url: &str, gate: &mut ControlGate) -> Result<DispatchOutcome, ReplayError> {
        let deadline = gate.deadline(self.config.navigate_timeout());
        let timer = gate.active_timer(self.config.navigate_timeout());
        let host = self.host.clone();
        let navigation = async move {
            tokio::select! {
                biased;
                result = host.navigate(url) => Some(result),
                () = timer => None,
            }
        };

        match gate.interruptible(navigation).await? {
            Some(result) => result?,
            None => return Err(ReplayError::NavigationTimeout(url.to_string())),
        }

        let doc = self.await_document(url, &deadline, gate).await?;
        if doc.width > 0 && doc.height > 0 {
            self.current = doc.viewport();
        }
        Ok(DispatchOutcome::structural())
    }

    /// Poll the new document until it is scriptable and parsed. Stale
    /// contexts are expected here and are retried until the deadline.
    async fn await_document(
        &self,
        url: &str,
        deadline: &GateDeadline,
        gate: &mut ControlGate,
    ) -> Result<DocumentReport, ReplayError> {
        loop {
            match evaluate::<DocumentReport>(self.host.as_ref(), &PageScript::ReadDocument).await {
                Ok(doc) if doc.is_ready() => return Ok(doc),
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    tracing::debug!("[{}] Waiting for document after navigation: {}", self.host.id(), e);
                }
                Err(e) => return Err(e.into()),
            }
            if gate.is_past(deadline) {
                return Err(ReplayError::NavigationTimeout(url.to_string()));
            }
            gate.sleep(self.config.stale_context_delay()).await?;
        }
    }

    async fn spa_navigate(&mut self, url: &str, gate: &mut ControlGate) -> Result<DispatchOutcome, ReplayError> {
        // The click that caused the route change has usually been replayed
        // already; give the router one settle period to catch up.
        for _ in 0..2 {
            if self.host.current_url().await? == url {
                return Ok(DispatchOutcome::structural());
            }
            gate.sleep(self.config.settle_delay()).await?;
        }
        tracing::debug!("[{}] In-page route not reached, loading {} directly", self.host.id(), url);
        self.navigate(url, gate).await
    }

    async fn scroll(&mut self, x: f64, y: f64, gate: &mut ControlGate) -> Result<DispatchOutcome, ReplayError> {
        let doc: DocumentReport = self.evaluate_settled(&PageScript::ScrollTo { x, y }, gate).await??;
        if (doc.scroll_x - x).abs() <= 1.0 && (doc.scroll_y - y).abs() <= 1.0 {
            return Ok(DispatchOutcome::structural());
        }

        let centre = Point::new(self.current.width as f64 / 2.0, self.current.height as f64 / 2.0);
        let wheel = SyntheticInput::Wheel {
            x: centre.x,
            y: centre.y,
            delta_x: x - doc.scroll_x,
            delta_y: y - doc.scroll_y,
        };
        self.deliver_synthetic(vec![wheel], gate).await?;
        Ok(DispatchOutcome::synthetic())
    }

    async fn interact(
        &mut self,
        target: &Target,
        interaction: &Interaction,
        gate: &mut ControlGate,
    ) -> Result<DispatchOutcome, ReplayError> {
        let resolved = {
            let resolver = SelectorResolver::new(self.host.as_ref(), &self.config, &self.recorded, &self.current);
            resolver.wait_for(target, gate).await?
        };

        if resolved.via_point {
            tracing::debug!("[{}] {} resolved by point hint only", self.host.id(), target.primary_selector);
            let point = resolved.report.client.unwrap_or_else(|| locator_point(&resolved.locator));
            return self.synthetic_at(&resolved, interaction, point, gate).await;
        }

        let script = PageScript::Perform {
            locator: resolved.locator.clone(),
            interaction: interaction.clone(),
        };
        let failure = match self.evaluate_settled::<InteractionReport>(&script, gate).await? {
            Ok(report) if report.ok => return Ok(DispatchOutcome::structural()),
            Ok(report) => {
                tracing::debug!(
                    "[{}] Structural {:?} on {} failed: {:?} {}",
                    self.host.id(),
                    interaction,
                    resolved.locator.describe(),
                    report.reason,
                    report.detail.as_deref().unwrap_or("")
                );
                report
            }
            Err(e) if e.is_transient() => return Err(ReplayError::StaleContext),
            Err(HostError::Script(message)) => InteractionReport {
                ok: false,
                detail: Some(message),
                ..Default::default()
            },
            Err(e) => return Err(e.into()),
        };

        let point = match failure.client {
            Some(point) => point,
            None => self.reveal(&resolved.locator, gate).await?.client.ok_or_else(|| {
                ReplayError::ElementNotVisible(resolved.locator.describe())
            })?,
        };
        self.synthetic_at(&resolved, interaction, point, gate).await
    }

    async fn reveal(&self, locator: &Locator, gate: &mut ControlGate) -> Result<ElementReport, ReplayError> {
        let script = PageScript::Reveal {
            locator: locator.clone(),
        };
        Ok(self.evaluate_settled(&script, gate).await??)
    }

    /// Run a runtime call, retrying a bounded number of times while the
    /// script context is being replaced. The outer error is a control
    /// outcome; the inner one is whatever the page reported last.
    async fn evaluate_settled<T: DeserializeOwned>(
        &self,
        script: &PageScript,
        gate: &mut ControlGate,
    ) -> Result<Result<T, HostError>, ReplayError> {
        let mut stale = 0;
        loop {
            match evaluate::<T>(self.host.as_ref(), script).await {
                Err(e) if e.is_transient() && stale < self.config.stale_context_retries => {
                    stale += 1;
                    tracing::debug!("[{}] Stale context, retrying runtime call ({}): {}", self.host.id(), stale, e);
                    gate.sleep(self.config.stale_context_delay()).await?;
                }
                result => return Ok(result),
            }
        }
    }

    async fn synthetic_at(
        &self,
        resolved: &Resolved,
        interaction: &Interaction,
        point: Point,
        gate: &mut ControlGate,
    ) -> Result<DispatchOutcome, ReplayError> {
        if let Interaction::Checkbox { checked } = interaction {
            if self.read_value(&resolved.locator, gate).await?.checked == Some(*checked) {
                return Ok(DispatchOutcome::synthetic());
            }
        }

        self.deliver_synthetic(synthetic_sequence(interaction, point), gate).await?;

        // Raw input has no return value; confirm where the page can tell us
        let confirmed = match interaction {
            Interaction::Checkbox { checked } => {
                self.read_value(&resolved.locator, gate).await?.checked.map_or(true, |c| c == *checked)
            }
            Interaction::Select { value } => self
                .read_value(&resolved.locator, gate)
                .await?
                .value
                .map_or(true, |v| v == *value),
            _ => true,
        };
        if !confirmed {
            return Err(ReplayError::SyntheticInputFailed(format!(
                "{} did not take effect on {}",
                interaction_name(interaction),
                resolved.locator.describe()
            )));
        }
        Ok(DispatchOutcome::synthetic())
    }

    async fn read_value(&self, locator: &Locator, gate: &mut ControlGate) -> Result<ValueReport, ReplayError> {
        if locator.is_point() {
            return Ok(ValueReport::default());
        }
        let script = PageScript::ReadValue {
            locator: locator.clone(),
        };
        Ok(self.evaluate_settled(&script, gate).await??)
    }

    /// The single fallback path: raw input delivered below page script.
    pub async fn deliver_synthetic(
        &self,
        inputs: Vec<SyntheticInput>,
        gate: &mut ControlGate,
    ) -> Result<(), ReplayError> {
        for input in inputs {
            gate.interruptible(self.host.send_synthetic_input(input))
                .await?
                .map_err(|e| match e {
                    HostError::StaleContext(_) => ReplayError::StaleContext,
                    other => ReplayError::SyntheticInputFailed(other.to_string()),
                })?;
        }
        Ok(())
    }
}

fn locator_point(locator: &Locator) -> Point {
    match locator {
        Locator::Point { x, y } => Point::new(*x, *y),
        _ => Point::default(),
    }
}

fn interaction_name(interaction: &Interaction) -> &'static str {
    match interaction {
        Interaction::Click => "click",
        Interaction::Input { .. } => "input",
        Interaction::Focus => "focus",
        Interaction::Keypress { .. } => "keypress",
        Interaction::Submit => "submit",
        Interaction::Checkbox { .. } => "checkbox",
        Interaction::Select { .. } => "select",
        Interaction::Hover => "hover",
    }
}
