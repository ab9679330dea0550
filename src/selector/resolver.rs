use crate::config::EngineConfig;
use crate::error::{HostError, ReplayError};
use crate::host::{evaluate, ElementReport, Locator, PageHost, PageScript};
use crate::models::{ControlGate, Point, Target, Viewport};

/// A target pinned to exactly one live element.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub locator: Locator,
    pub report: ElementReport,
    /// Found by hit-testing the point hint rather than by a selector
    pub via_point: bool,
}

/// Result of a single resolution pass.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(Resolved),
    /// A unique match exists but is not visible
    Hidden(String),
    Missing,
}

/// Resolves recorded targets against the live page: primary selector, then
/// alternates in order, then the scaled point hint.
pub struct SelectorResolver<'a> {
    host: &'a dyn PageHost,
    config: &'a EngineConfig,
    recorded: &'a Viewport,
    current: &'a Viewport,
}

impl<'a> SelectorResolver<'a> {
    pub fn new(
        host: &'a dyn PageHost,
        config: &'a EngineConfig,
        recorded: &'a Viewport,
        current: &'a Viewport,
    ) -> Self {
        Self {
            host,
            config,
            recorded,
            current,
        }
    }

    /// Point hint translated into the current viewport
    pub fn scaled_hint(&self, target: &Target) -> Option<Point> {
        target
            .point_hint
            .map(|p| p.scaled(self.recorded, self.current))
    }

    pub async fn resolve_once(&self, target: &Target) -> Result<Resolution, HostError> {
        let mut hidden = None;

        for selector in target.candidates() {
            let locator = Locator::from(&selector);
            let report: ElementReport = evaluate(
                self.host,
                &PageScript::Resolve {
                    locator: locator.clone(),
                },
            )
            .await?;

            if report.is_unique_and_visible() {
                return Ok(Resolution::Found(Resolved {
                    locator,
                    report,
                    via_point: false,
                }));
            }
            if report.found && report.count == 1 && hidden.is_none() {
                hidden = Some(selector.value.clone());
            }
            if report.count > 1 {
                tracing::debug!("Selector {} is ambiguous ({} matches)", selector.value, report.count);
            }
        }

        if let Some(point) = self.scaled_hint(target) {
            let locator = Locator::from(point);
            let report: ElementReport = evaluate(
                self.host,
                &PageScript::Resolve {
                    locator: locator.clone(),
                },
            )
            .await?;
            if report.found && report.visible && !report.is_document_hit() {
                return Ok(Resolution::Found(Resolved {
                    locator,
                    report,
                    via_point: true,
                }));
            }
        }

        Ok(match hidden {
            Some(selector) => Resolution::Hidden(selector),
            None => Resolution::Missing,
        })
    }

    /// Poll until the target resolves to a visible element or the visibility
    /// window closes. Stale contexts are retried a bounded number of times.
    /// Time spent paused does not shrink the window.
    pub async fn wait_for(&self, target: &Target, gate: &mut ControlGate) -> Result<Resolved, ReplayError> {
        let deadline = gate.deadline(self.config.visibility_timeout());
        let mut stale = 0;
        let mut hidden = None;

        loop {
            match self.resolve_once(target).await {
                Ok(Resolution::Found(resolved)) => return Ok(resolved),
                Ok(Resolution::Hidden(selector)) => hidden = Some(selector),
                Ok(Resolution::Missing) => {}
                Err(e) if e.is_transient() => {
                    stale += 1;
                    if stale > self.config.stale_context_retries {
                        return Err(ReplayError::StaleContext);
                    }
                    tracing::debug!("Stale context while resolving {} (retry {})", target.primary_selector, stale);
                    gate.sleep(self.config.stale_context_delay()).await?;
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            if gate.is_past(&deadline) {
                break;
            }
            gate.sleep(self.config.resolve_poll()).await?;
        }

        Err(match hidden {
            Some(selector) => ReplayError::ElementNotVisible(selector),
            None => ReplayError::ElementNotFound(target.primary_selector.clone()),
        })
    }
}
