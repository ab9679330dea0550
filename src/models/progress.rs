use serde::Serialize;

use super::action::Action;
use super::session::{PlaybackResult, StepOutcome};

/// Lightweight, order-preserving notifications for the shell's live
/// progress display.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    RecordingStarted {
        host_id: String,
        session_id: String,
    },
    ActionRecorded {
        host_id: String,
        index: usize,
        action: Action,
    },
    CaptureDegraded {
        host_id: String,
        url: String,
        attempts: u32,
    },
    CaptureRestored {
        host_id: String,
    },
    RecordingStopped {
        host_id: String,
        action_count: usize,
    },
    PlaybackStarted {
        host_id: String,
        automation_id: String,
        total: usize,
    },
    StepStarted {
        host_id: String,
        step: usize,
        total: usize,
        action_type: String,
        description: String,
    },
    StepFinished {
        host_id: String,
        step: usize,
        total: usize,
        outcome: StepOutcome,
        success_count: usize,
        failure_count: usize,
    },
    PlaybackFinished {
        host_id: String,
        result: PlaybackResult,
    },
}

impl ProgressEvent {
    pub fn host_id(&self) -> &str {
        match self {
            ProgressEvent::RecordingStarted { host_id, .. }
            | ProgressEvent::ActionRecorded { host_id, .. }
            | ProgressEvent::CaptureDegraded { host_id, .. }
            | ProgressEvent::CaptureRestored { host_id }
            | ProgressEvent::RecordingStopped { host_id, .. }
            | ProgressEvent::PlaybackStarted { host_id, .. }
            | ProgressEvent::StepStarted { host_id, .. }
            | ProgressEvent::StepFinished { host_id, .. }
            | ProgressEvent::PlaybackFinished { host_id, .. } => host_id,
        }
    }
}
