use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::dispatcher::{ActionDispatcher, DispatchOutcome};
use crate::config::EngineConfig;
use crate::error::ReplayError;
use crate::host::PageHost;
use crate::models::{ActionKind, PlaybackResult, PlaybackSession, ProgressEvent, StepOutcome, StepStatus};

/// Drives a page host through an automation, one action at a time.
pub struct PlaybackEngine {
    host: Arc<dyn PageHost>,
    config: EngineConfig,
    progress: broadcast::Sender<ProgressEvent>,
}

struct Attempted {
    attempts: u32,
    result: Result<DispatchOutcome, ReplayError>,
}

impl PlaybackEngine {
    pub fn new(host: Arc<dyn PageHost>, config: EngineConfig, progress: broadcast::Sender<ProgressEvent>) -> Self {
        Self { host, config, progress }
    }

    fn emit(&self, event: ProgressEvent) {
        // No subscribers is fine
        let _ = self.progress.send(event);
    }

    pub async fn run(&self, mut session: PlaybackSession) -> PlaybackResult {
        let automation = session.automation.clone();
        let host_id = session.host_id.clone();
        let total = session.total();

        let mut dispatcher = ActionDispatcher::new(self.host.clone(), self.config.clone(), automation.viewport.clone());
        if let Err(e) = self.host.set_viewport(&automation.viewport).await {
            tracing::warn!("[{}] Could not size page to recorded viewport: {}", host_id, e);
        }
        dispatcher.refresh_viewport().await;

        tracing::info!(
            "[{}] Playing '{}' ({} actions, session {})",
            host_id,
            automation.name,
            total,
            session.id
        );
        self.emit(ProgressEvent::PlaybackStarted {
            host_id: host_id.clone(),
            automation_id: automation.id.clone(),
            total,
        });

        let mut stopped = false;
        while let Some(action) = session.current().cloned() {
            let step = session.cursor;

            match session.control.checkpoint().await {
                Ok(()) => {}
                Err(ReplayError::UserSkipped) => {
                    self.finish_step(&mut session, skipped(step, &action.kind), Some(&ReplayError::UserSkipped));
                    continue;
                }
                Err(_) => {
                    stopped = true;
                    break;
                }
            }

            self.emit(ProgressEvent::StepStarted {
                host_id: host_id.clone(),
                step,
                total,
                action_type: action.type_name().to_string(),
                description: action.kind.describe(),
            });

            let started = Instant::now();
            let attempted = self.attempt(&mut dispatcher, &mut session, &action.kind).await;
            let duration_ms = started.elapsed().as_millis() as u64;

            let (outcome, error) = match attempted.result {
                Ok(dispatched) => (
                    StepOutcome {
                        step,
                        action_type: action.type_name().to_string(),
                        status: StepStatus::Succeeded,
                        attempts: attempted.attempts,
                        used_fallback: dispatched.used_fallback,
                        error: None,
                        duration_ms,
                    },
                    None,
                ),
                Err(ReplayError::UserStopped) => {
                    stopped = true;
                    break;
                }
                Err(ReplayError::UserSkipped) => (
                    StepOutcome {
                        attempts: attempted.attempts,
                        duration_ms,
                        ..skipped(step, &action.kind)
                    },
                    Some(ReplayError::UserSkipped),
                ),
                Err(e) => {
                    tracing::warn!(
                        "[{}] Step {} ({}) failed after {} attempts: {}",
                        host_id,
                        step,
                        action.type_name(),
                        attempted.attempts,
                        e
                    );
                    (
                        StepOutcome {
                            step,
                            action_type: action.type_name().to_string(),
                            status: StepStatus::Failed,
                            attempts: attempted.attempts,
                            used_fallback: false,
                            error: Some(e.to_string()),
                            duration_ms,
                        },
                        Some(e),
                    )
                }
            };
            self.finish_step(&mut session, outcome, error.as_ref());

            if session.cursor < total && session.control.settle(self.config.settle_delay()).await.is_err() {
                stopped = true;
                break;
            }
        }

        let result = session.finish(stopped);
        tracing::info!(
            "[{}] Playback {:?}: {}/{} succeeded, {} failed, {} skipped",
            host_id,
            result.state,
            result.success_count,
            result.total,
            result.failed_actions.len(),
            result.skipped_actions.len()
        );
        self.emit(ProgressEvent::PlaybackFinished {
            host_id,
            result: result.clone(),
        });
        result
    }

    fn finish_step(&self, session: &mut PlaybackSession, outcome: StepOutcome, error: Option<&ReplayError>) {
        let step = outcome.step;
        session.record(outcome.clone(), error);
        self.emit(ProgressEvent::StepFinished {
            host_id: session.host_id.clone(),
            step,
            total: session.total(),
            outcome,
            success_count: session.success_count,
            failure_count: session.failed_actions.len(),
        });
    }

    fn timeout_for(&self, kind: &ActionKind) -> Duration {
        match kind {
            // A recorded pause is part of the action, not time spent failing
            ActionKind::Wait { duration_ms } => Duration::from_millis(*duration_ms) + self.config.action_timeout(),
            _ if kind.is_navigation() => self.config.navigate_timeout(),
            _ => self.config.action_timeout(),
        }
    }

    /// Run one action with the per-action timeout, retrying failures up to
    /// the retry ceiling. Control outcomes end the loop at once. Paused time
    /// does not count against the timeout.
    async fn attempt(
        &self,
        dispatcher: &mut ActionDispatcher,
        session: &mut PlaybackSession,
        kind: &ActionKind,
    ) -> Attempted {
        let max_attempts = self.config.max_action_attempts.max(1);
        let timeout = self.timeout_for(kind);
        let mut last_error = ReplayError::Host("not attempted".to_string());

        for attempt in 1..=max_attempts {
            session.retry_count_for_current = attempt - 1;
            // The budget only runs while playback is unpaused
            let timer = session.control.active_timer(timeout);
            let result = tokio::select! {
                biased;
                result = dispatcher.dispatch(kind, &mut session.control) => result,
                () = timer => Err(timed_out(kind)),
            };

            match result {
                Ok(dispatched) => {
                    return Attempted {
                        attempts: attempt,
                        result: Ok(dispatched),
                    }
                }
                Err(e) if e.is_control() => {
                    return Attempted {
                        attempts: attempt,
                        result: Err(e),
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        "[{}] {} attempt {}/{} failed: {}",
                        session.host_id,
                        kind.type_name(),
                        attempt,
                        max_attempts,
                        e
                    );
                    last_error = e;
                }
            }

            if attempt < max_attempts {
                if let Err(control) = session.control.sleep(self.config.retry_delay()).await {
                    return Attempted {
                        attempts: attempt,
                        result: Err(control),
                    };
                }
            }
        }

        Attempted {
            attempts: max_attempts,
            result: Err(last_error),
        }
    }
}

fn skipped(step: usize, kind: &ActionKind) -> StepOutcome {
    StepOutcome {
        step,
        action_type: kind.type_name().to_string(),
        status: StepStatus::Skipped,
        attempts: 0,
        used_fallback: false,
        error: None,
        duration_ms: 0,
    }
}

fn timed_out(kind: &ActionKind) -> ReplayError {
    match kind {
        ActionKind::Navigate { url } | ActionKind::SpaNavigate { url } => ReplayError::NavigationTimeout(url.clone()),
        _ => match kind.target() {
            Some(target) => ReplayError::ElementNotFound(target.primary_selector.clone()),
            None => ReplayError::Host(format!("{} timed out", kind.type_name())),
        },
    }
}
