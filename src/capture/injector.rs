use std::sync::Arc;

use crate::config::{EngineConfig, RetryPolicy};
use crate::error::HostError;
use crate::host::{evaluate, CaptureConfig, PageHost, PageScript, ProbeReport};

/// Non-printable keys recorded as `keypress` actions.
pub const CAPTURE_KEYS: [&str; 7] = [
    "Enter",
    "Tab",
    "Escape",
    "ArrowUp",
    "ArrowDown",
    "ArrowLeft",
    "ArrowRight",
];

#[derive(Debug, Clone, PartialEq)]
pub enum InstallOutcome {
    Verified { attempts: u32, report: ProbeReport },
    Exhausted { attempts: u32, last_error: String },
}

impl InstallOutcome {
    pub fn is_verified(&self) -> bool {
        matches!(self, InstallOutcome::Verified { .. })
    }
}

/// Installs the capture module into a page host's script context and checks
/// that it is listening with the expected active flag.
pub struct CaptureInjector {
    host: Arc<dyn PageHost>,
    text_limit: usize,
    policy: RetryPolicy,
}

impl CaptureInjector {
    pub fn new(host: Arc<dyn PageHost>, config: &EngineConfig) -> Self {
        Self {
            host,
            text_limit: config.click_text_limit,
            policy: config.install_retry(),
        }
    }

    fn capture_config(&self, active: bool, epoch: u64) -> CaptureConfig {
        CaptureConfig {
            active,
            epoch,
            keys: CAPTURE_KEYS.iter().map(|k| k.to_string()).collect(),
            text_limit: self.text_limit,
        }
    }

    /// Install (or refresh) the module. Listeners are registered at most once
    /// per context; a repeat install only updates the configuration.
    pub async fn install(&self, active: bool, epoch: u64) -> Result<ProbeReport, HostError> {
        evaluate(
            self.host.as_ref(),
            &PageScript::InstallCapture {
                config: self.capture_config(active, epoch),
            },
        )
        .await
    }

    pub async fn probe(&self) -> Result<ProbeReport, HostError> {
        evaluate(self.host.as_ref(), &PageScript::ProbeCapture).await
    }

    pub async fn set_active(&self, active: bool) -> Result<ProbeReport, HostError> {
        evaluate(self.host.as_ref(), &PageScript::SetCaptureActive { active }).await
    }

    /// Install and verify, retrying with backoff because "document ready"
    /// can fire before the context is scriptable.
    pub async fn install_verified(&self, active: bool, epoch: u64) -> InstallOutcome {
        let mut last_error = String::from("not attempted");

        for attempt in 1..=self.policy.max_attempts {
            let delay = self.policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let installed = match self.install(active, epoch).await {
                Ok(report) => report,
                Err(HostError::Destroyed) => {
                    return InstallOutcome::Exhausted {
                        attempts: attempt,
                        last_error: HostError::Destroyed.to_string(),
                    };
                }
                Err(e) => {
                    tracing::debug!("[{}] Capture install attempt {} failed: {}", self.host.id(), attempt, e);
                    last_error = e.to_string();
                    continue;
                }
            };

            // Confirm through a separate probe: the install may have landed in
            // a context that is being replaced.
            match self.probe().await {
                Ok(report) if is_verified(&report, active) => {
                    tracing::debug!(
                        "[{}] Capture verified on attempt {} (context {:?})",
                        self.host.id(),
                        attempt,
                        report.context_id
                    );
                    return InstallOutcome::Verified {
                        attempts: attempt,
                        report,
                    };
                }
                Ok(report) => {
                    last_error = format!(
                        "probe reported installed={} active={} after install in context {:?}",
                        report.installed, report.active, installed.context_id
                    );
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        InstallOutcome::Exhausted {
            attempts: self.policy.max_attempts,
            last_error,
        }
    }
}

/// The module is listening and its active flag mirrors the session.
pub fn is_verified(report: &ProbeReport, active: bool) -> bool {
    report.installed && report.listeners > 0 && report.active == active
}
