use serde::Serialize;

use super::automation::{Automation, AutomationSummary};
use super::session::RecordingSession;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct StartRecordingResponse {
    pub session_id: String,
    pub tab_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct StopRecordingResponse {
    /// `None` when nothing was captured and nothing was saved
    pub automation: Option<Automation>,
}

#[derive(Debug, Serialize)]
pub struct RecordingStatusResponse {
    pub recording: Option<RecordingSession>,
}

#[derive(Debug, Serialize)]
pub struct AutomationListResponse {
    pub automations: Vec<AutomationSummary>,
}

#[derive(Debug, Serialize)]
pub struct StartPlaybackResponse {
    pub automation_id: String,
    pub tab_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct GenericResponse {
    pub status: String,
}
