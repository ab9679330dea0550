use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use super::action::{Action, ActionKind, Viewport};
use super::automation::Automation;
use crate::error::ReplayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingStatus {
    Recording,
    Paused,
    Stopped,
}

/// Transient state of one recording, owned by the session controller.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingSession {
    pub id: String,
    pub host_id: String,
    pub source_url: String,
    pub status: RecordingStatus,
    pub actions: Vec<Action>,
    pub is_active: bool,
    /// Incremented every time the host's script context is torn down
    pub navigation_epoch: u64,
    pub viewport: Viewport,
    pub started_at: DateTime<Utc>,
    #[serde(skip)]
    last_timestamp: i64,
}

impl RecordingSession {
    pub fn new(host_id: String, source_url: String, viewport: Viewport) -> Self {
        let mut session = Self {
            id: uuid::Uuid::new_v4().to_string(),
            host_id,
            source_url,
            status: RecordingStatus::Recording,
            actions: Vec::new(),
            is_active: true,
            navigation_epoch: 0,
            viewport: viewport.clone(),
            started_at: Utc::now(),
            last_timestamp: 0,
        };
        session.append(ActionKind::Viewport {
            width: viewport.width,
            height: viewport.height,
            pixel_ratio: viewport.pixel_ratio,
        });
        session
    }

    /// True when captured events should be appended
    pub fn capturing(&self) -> bool {
        self.is_active && self.status == RecordingStatus::Recording
    }

    pub fn pause(&mut self) {
        if self.status == RecordingStatus::Recording {
            self.status = RecordingStatus::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.status == RecordingStatus::Paused {
            self.status = RecordingStatus::Recording;
        }
    }

    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.status = RecordingStatus::Stopped;
    }

    pub fn bump_epoch(&mut self) -> u64 {
        self.navigation_epoch += 1;
        self.navigation_epoch
    }

    /// Strictly increasing capture timestamp in milliseconds
    fn next_timestamp(&mut self) -> i64 {
        let now = Utc::now().timestamp_millis();
        self.last_timestamp = now.max(self.last_timestamp + 1);
        self.last_timestamp
    }

    /// Append an action to the log. The log is append-only; nothing is added
    /// once the session has been deactivated.
    pub fn append(&mut self, kind: ActionKind) -> Option<(usize, Action)> {
        if !self.is_active {
            return None;
        }
        let action = Action::new(self.next_timestamp(), kind);
        self.actions.push(action.clone());
        Some((self.actions.len() - 1, action))
    }

    /// URL of the most recent `navigate` action, if any
    pub fn last_navigate_url(&self) -> Option<&str> {
        self.actions.iter().rev().find_map(|a| match &a.kind {
            ActionKind::Navigate { url } => Some(url.as_str()),
            _ => None,
        })
    }

    /// Convert into an automation. Returns `None` when nothing but the
    /// viewport descriptor was captured.
    pub fn finish(self, name: String) -> Option<Automation> {
        let automation = Automation {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            source_url: self.source_url,
            actions: self.actions,
            viewport: self.viewport,
            created_at: Utc::now(),
        };
        (automation.meaningful_len() > 0).then_some(automation)
    }
}

/// Flags written by the user interface, read by the playback loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ControlFlags {
    pub paused: bool,
    pub stopped: bool,
    /// Each skip request bumps this counter; one request abandons one action
    pub skip_requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedAction {
    pub step: usize,
    pub action_type: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedAction {
    pub step: usize,
    pub action_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: usize,
    pub action_type: String,
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(default)]
    pub used_fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// The cursor reached the end of the actions
    Completed,
    /// The user stopped the run
    Stopped,
    /// Every attempted action failed
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackResult {
    pub session_id: String,
    pub automation_id: String,
    pub state: PlaybackState,
    pub total: usize,
    pub attempted: usize,
    pub success_count: usize,
    pub failed_actions: Vec<FailedAction>,
    pub skipped_actions: Vec<SkippedAction>,
    pub steps: Vec<StepOutcome>,
}

impl PlaybackResult {
    /// Steps that only succeeded through the synthetic-input channel
    pub fn fallback_steps(&self) -> Vec<usize> {
        self.steps
            .iter()
            .filter(|s| s.used_fallback && s.status == StepStatus::Succeeded)
            .map(|s| s.step)
            .collect()
    }

    /// Human readable summary of every failure
    pub fn failure_summary(&self) -> Vec<String> {
        self.failed_actions
            .iter()
            .map(|f| format!("step {} ({}): {}", f.step, f.action_type, f.error))
            .collect()
    }
}

/// Read side of the playback control flags.
///
/// Every suspension point of the playback loop goes through the gate so
/// that stop, skip and pause are honoured mid-action. Time spent paused is
/// never charged against a sleep, a [`GateDeadline`] or an
/// [`ControlGate::active_timer`].
#[derive(Debug)]
pub struct ControlGate {
    rx: watch::Receiver<ControlFlags>,
    skips_seen: u64,
    /// Total time this gate has held the caller while paused
    paused_for: Duration,
}

/// A deadline measured in unpaused time, see [`ControlGate::deadline`].
#[derive(Debug, Clone, Copy)]
pub struct GateDeadline {
    at: Instant,
    paused_before: Duration,
}

impl ControlGate {
    pub fn new(rx: watch::Receiver<ControlFlags>) -> Self {
        let skips_seen = rx.borrow().skip_requests;
        Self {
            rx,
            skips_seen,
            paused_for: Duration::ZERO,
        }
    }

    /// A gate nobody will ever signal
    pub fn detached() -> Self {
        let (_tx, rx) = watch::channel(ControlFlags::default());
        Self::new(rx)
    }

    pub fn flags(&self) -> ControlFlags {
        *self.rx.borrow()
    }

    /// Start a deadline `budget` from now. Pauses held by this gate push it
    /// back by their length.
    pub fn deadline(&self, budget: Duration) -> GateDeadline {
        GateDeadline {
            at: Instant::now() + budget,
            paused_before: self.paused_for,
        }
    }

    pub fn is_past(&self, deadline: &GateDeadline) -> bool {
        let held = self.paused_for.saturating_sub(deadline.paused_before);
        Instant::now() >= deadline.at + held
    }

    /// A timer that fires once `budget` of unpaused time has passed.
    ///
    /// It watches the flags on its own receiver, so it can race a future
    /// that holds the gate itself.
    pub fn active_timer(&self, budget: Duration) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            let mut remaining = budget;
            loop {
                let paused = rx.borrow_and_update().paused;
                if paused {
                    if rx.changed().await.is_err() {
                        // Nobody can resume; the gate reports the stop
                        std::future::pending::<()>().await;
                    }
                    continue;
                }
                let started = Instant::now();
                tokio::select! {
                    _ = tokio::time::sleep(remaining) => return,
                    changed = rx.changed() => {
                        remaining = remaining.saturating_sub(started.elapsed());
                        if changed.is_err() {
                            tokio::time::sleep(remaining).await;
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Non-blocking check for stop and skip requests.
    fn interrupted(&mut self, honor_skip: bool) -> Result<(), ReplayError> {
        let flags = *self.rx.borrow();
        if flags.stopped {
            return Err(ReplayError::UserStopped);
        }
        if honor_skip && flags.skip_requests > self.skips_seen {
            self.skips_seen = flags.skip_requests;
            return Err(ReplayError::UserSkipped);
        }
        Ok(())
    }

    /// Wait here while paused; fail on stop or a pending skip.
    pub async fn checkpoint(&mut self) -> Result<(), ReplayError> {
        self.wait_unpaused(true).await
    }

    async fn wait_unpaused(&mut self, honor_skip: bool) -> Result<(), ReplayError> {
        let started = Instant::now();
        let result = self.hold_while_paused(honor_skip).await;
        self.paused_for += started.elapsed();
        result
    }

    async fn hold_while_paused(&mut self, honor_skip: bool) -> Result<(), ReplayError> {
        loop {
            self.interrupted(honor_skip)?;
            if !self.rx.borrow().paused {
                return Ok(());
            }
            if self.rx.changed().await.is_err() {
                // Writer gone while paused: nobody can resume us
                return Err(ReplayError::UserStopped);
            }
        }
    }

    /// Drive `fut` to completion unless a stop or skip arrives first.
    pub async fn interruptible<F: Future>(&mut self, fut: F) -> Result<F::Output, ReplayError> {
        tokio::pin!(fut);
        loop {
            self.interrupted(true)?;
            tokio::select! {
                out = &mut fut => return Ok(out),
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return Ok(fut.await);
                    }
                }
            }
        }
    }

    /// Sleep for `duration` of unpaused time. A pause freezes the remainder
    /// until resume; stop (and skip, when honoured) cuts it short.
    async fn pausable_sleep(&mut self, duration: Duration, honor_skip: bool) -> Result<(), ReplayError> {
        let mut remaining = duration;
        loop {
            self.wait_unpaused(honor_skip).await?;
            if remaining.is_zero() {
                return Ok(());
            }
            let started = Instant::now();
            tokio::select! {
                _ = tokio::time::sleep(remaining) => remaining = Duration::ZERO,
                changed = self.rx.changed() => {
                    remaining = remaining.saturating_sub(started.elapsed());
                    if changed.is_err() {
                        tokio::time::sleep(remaining).await;
                        remaining = Duration::ZERO;
                    }
                }
            }
        }
    }

    /// Sleep inside an action: stop and skip cut it short, pause extends it.
    pub async fn sleep(&mut self, duration: Duration) -> Result<(), ReplayError> {
        self.pausable_sleep(duration, true).await
    }

    /// Sleep between actions: only stop cuts it short. A skip stays pending
    /// for the next action.
    pub async fn settle(&mut self, duration: Duration) -> Result<(), ReplayError> {
        self.pausable_sleep(duration, false).await
    }
}

/// Transient state of one replay.
///
/// `control` is only ever read here; writes come from the controller.
#[derive(Debug)]
pub struct PlaybackSession {
    pub id: String,
    pub automation: Arc<Automation>,
    pub host_id: String,
    pub cursor: usize,
    pub retry_count_for_current: u32,
    pub success_count: usize,
    pub failed_actions: Vec<FailedAction>,
    pub skipped_actions: Vec<SkippedAction>,
    pub steps: Vec<StepOutcome>,
    pub control: ControlGate,
}

impl PlaybackSession {
    pub fn new(automation: Arc<Automation>, host_id: String, control: ControlGate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            automation,
            host_id,
            cursor: 0,
            retry_count_for_current: 0,
            success_count: 0,
            failed_actions: Vec::new(),
            skipped_actions: Vec::new(),
            steps: Vec::new(),
            control,
        }
    }

    pub fn total(&self) -> usize {
        self.automation.actions.len()
    }

    pub fn current(&self) -> Option<&Action> {
        self.automation.actions.get(self.cursor)
    }

    /// Record the outcome of the action under the cursor and advance.
    pub fn record(&mut self, outcome: StepOutcome, error: Option<&ReplayError>) {
        match outcome.status {
            StepStatus::Succeeded => self.success_count += 1,
            StepStatus::Failed => self.failed_actions.push(FailedAction {
                step: outcome.step,
                action_type: outcome.action_type.clone(),
                error: error
                    .map(|e| e.to_string())
                    .or_else(|| outcome.error.clone())
                    .unwrap_or_else(|| "unknown error".to_string()),
            }),
            StepStatus::Skipped => self.skipped_actions.push(SkippedAction {
                step: outcome.step,
                action_type: outcome.action_type.clone(),
            }),
        }
        self.steps.push(outcome);
        self.cursor += 1;
        self.retry_count_for_current = 0;
    }

    pub fn finish(self, stopped: bool) -> PlaybackResult {
        let attempted = self.steps.len();
        let state = if stopped {
            PlaybackState::Stopped
        } else if attempted > 0 && self.failed_actions.len() == attempted {
            PlaybackState::Exhausted
        } else {
            PlaybackState::Completed
        };
        PlaybackResult {
            session_id: self.id,
            automation_id: self.automation.id.clone(),
            state,
            total: self.automation.actions.len(),
            attempted,
            success_count: self.success_count,
            failed_actions: self.failed_actions,
            skipped_actions: self.skipped_actions,
            steps: self.steps,
        }
    }
}
