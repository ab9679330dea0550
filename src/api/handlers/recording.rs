use axum::{extract::State, Json};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    GenericResponse, RecordingStatusResponse, StartRecordingRequest, StartRecordingResponse, StopRecordingRequest,
    StopRecordingResponse,
};

use super::super::state::AppState;

/// Start recording the page host behind a tab
pub async fn start_recording(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRecordingRequest>,
) -> Result<Json<StartRecordingResponse>> {
    let host = state.hosts.page_host(&request.tab_id).await?;
    let info = state.controller.start_recording(host).await?;

    Ok(Json(StartRecordingResponse {
        session_id: info.session_id,
        tab_id: info.host_id,
        status: "recording".to_string(),
    }))
}

/// Stop recording and save the automation (if anything was captured)
pub async fn stop_recording(
    State(state): State<Arc<AppState>>,
    request: Option<Json<StopRecordingRequest>>,
) -> Result<Json<StopRecordingResponse>> {
    let name = request.and_then(|Json(r)| r.name);
    let automation = state.controller.stop_recording(name).await?;
    Ok(Json(StopRecordingResponse { automation }))
}

pub async fn abort_recording(State(state): State<Arc<AppState>>) -> Result<Json<GenericResponse>> {
    state.controller.abort_recording().await?;
    Ok(Json(GenericResponse {
        status: "aborted".to_string(),
    }))
}

pub async fn pause_recording(State(state): State<Arc<AppState>>) -> Result<Json<GenericResponse>> {
    state.controller.pause_recording().await?;
    Ok(Json(GenericResponse {
        status: "paused".to_string(),
    }))
}

pub async fn resume_recording(State(state): State<Arc<AppState>>) -> Result<Json<GenericResponse>> {
    state.controller.resume_recording().await?;
    Ok(Json(GenericResponse {
        status: "recording".to_string(),
    }))
}

pub async fn get_recording_status(State(state): State<Arc<AppState>>) -> Json<RecordingStatusResponse> {
    Json(RecordingStatusResponse {
        recording: state.controller.recording_status().await,
    })
}
