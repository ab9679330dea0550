use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::EngineConfig;
use crate::host::{CapturedEvent, CapturedKind};
use crate::models::ActionKind;
use crate::selector::{generate_target, ElementDescriptor};

use super::injector::CAPTURE_KEYS;

struct Pending {
    kind: ActionKind,
    deadline: Instant,
}

/// Turns raw capture events into actions.
///
/// At most one debounced action (`input` or `scroll`) is pending at a time.
/// Every other event flushes it first, so the final value keeps its place in
/// the log.
pub struct CaptureNormalizer {
    input_debounce: Duration,
    scroll_debounce: Duration,
    text_limit: usize,
    keys: Vec<String>,
    pending: Option<Pending>,
    last_seq: HashMap<String, u64>,
    last_emitted: Option<ActionKind>,
}

impl CaptureNormalizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            input_debounce: config.input_debounce(),
            scroll_debounce: config.scroll_debounce(),
            text_limit: config.click_text_limit,
            keys: CAPTURE_KEYS.iter().map(|k| k.to_string()).collect(),
            pending: None,
            last_seq: HashMap::new(),
            last_emitted: None,
        }
    }

    /// Feed one event; returns the actions that are now final, in order.
    pub fn accept(&mut self, event: CapturedEvent, now: Instant) -> Vec<ActionKind> {
        let last = self.last_seq.entry(event.context_id.clone()).or_insert(0);
        if event.seq <= *last {
            tracing::debug!("Dropping duplicate capture {}#{}", event.context_id, event.seq);
            return Vec::new();
        }
        *last = event.seq;

        let mut out = Vec::new();
        match event.kind {
            CapturedKind::Input => {
                let (Some(element), Some(value)) = (event.element.as_ref(), event.value.clone()) else {
                    return out;
                };
                let target = generate_target(element, None);
                if let Some(Pending {
                    kind: ActionKind::Input { target: pending, value: slot },
                    deadline,
                }) = self.pending.as_mut()
                {
                    if pending.same_element(&target) {
                        *slot = value;
                        *deadline = now + self.input_debounce;
                        return out;
                    }
                }
                self.flush_into(&mut out);
                self.pending = Some(Pending {
                    kind: ActionKind::Input { target, value },
                    deadline: now + self.input_debounce,
                });
            }
            CapturedKind::Scroll => {
                let x = event.scroll_x.unwrap_or_default();
                let y = event.scroll_y.unwrap_or_default();
                if let Some(Pending {
                    kind: ActionKind::Scroll { x: px, y: py },
                    deadline,
                }) = self.pending.as_mut()
                {
                    *px = x;
                    *py = y;
                    *deadline = now + self.scroll_debounce;
                    return out;
                }
                self.flush_into(&mut out);
                self.pending = Some(Pending {
                    kind: ActionKind::Scroll { x, y },
                    deadline: now + self.scroll_debounce,
                });
            }
            _ => {
                self.flush_into(&mut out);
                if let Some(kind) = self.immediate(&event) {
                    self.emit(kind, &mut out);
                }
            }
        }
        out
    }

    /// Actions emitted without debouncing. `None` means the event is dropped.
    fn immediate(&self, event: &CapturedEvent) -> Option<ActionKind> {
        let element = event.element.as_ref()?;
        let target = || generate_target(element, None);

        match event.kind {
            CapturedKind::Click => {
                // Toggles and selects are recorded from their change events
                if element.is_toggle() || matches!(element.tag.as_str(), "select" | "option") {
                    return None;
                }
                Some(ActionKind::Click {
                    target: generate_target(element, event.point()),
                    text: click_text(element, self.text_limit),
                })
            }
            CapturedKind::Focus => {
                if !element.is_form_field() {
                    return None;
                }
                let target = target();
                if let Some(ActionKind::Focus { target: previous }) = &self.last_emitted {
                    if previous.same_element(&target) {
                        return None;
                    }
                }
                Some(ActionKind::Focus { target })
            }
            CapturedKind::Keypress => {
                let key = event.key.clone()?;
                if !self.keys.contains(&key) {
                    return None;
                }
                Some(ActionKind::Keypress {
                    target: target(),
                    key,
                    modifiers: event.modifiers,
                })
            }
            CapturedKind::Submit => {
                // A submit caused by the click or Enter just recorded would
                // fire twice on replay
                match &self.last_emitted {
                    Some(ActionKind::Click { .. }) => None,
                    Some(ActionKind::Keypress { key, .. }) if key == "Enter" => None,
                    _ => Some(ActionKind::Submit { target: target() }),
                }
            }
            CapturedKind::Checkbox => Some(ActionKind::Checkbox {
                target: target(),
                checked: event.checked?,
            }),
            CapturedKind::Select => Some(ActionKind::Select {
                target: target(),
                value: event.value.clone()?,
            }),
            CapturedKind::Input | CapturedKind::Scroll => None,
        }
    }

    fn emit(&mut self, kind: ActionKind, out: &mut Vec<ActionKind>) {
        self.last_emitted = Some(kind.clone());
        out.push(kind);
    }

    fn flush_into(&mut self, out: &mut Vec<ActionKind>) {
        if let Some(pending) = self.pending.take() {
            self.emit(pending.kind, out);
        }
    }

    /// When the pending action becomes final if nothing else arrives
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|p| p.deadline)
    }

    pub fn poll_expired(&mut self, now: Instant) -> Option<ActionKind> {
        if self.pending.as_ref().is_some_and(|p| p.deadline <= now) {
            return self.flush();
        }
        None
    }

    /// Emit the pending action now (navigation, pause, stop)
    pub fn flush(&mut self) -> Option<ActionKind> {
        let mut out = Vec::with_capacity(1);
        self.flush_into(&mut out);
        out.pop()
    }

    /// Record an action appended outside the normalizer so duplicate
    /// suppression sees it.
    pub fn observe(&mut self, kind: &ActionKind) {
        self.last_emitted = Some(kind.clone());
    }
}

fn click_text(element: &ElementDescriptor, limit: usize) -> Option<String> {
    let text = element.text.as_deref()?.trim();
    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(limit).collect())
}
