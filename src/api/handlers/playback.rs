use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::error::Result;
use crate::models::GenericResponse;

use super::super::state::AppState;

fn status(status: &str) -> Json<GenericResponse> {
    Json(GenericResponse {
        status: status.to_string(),
    })
}

pub async fn pause_playback(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<String>,
) -> Result<Json<GenericResponse>> {
    state.controller.pause_playback(&tab_id)?;
    Ok(status("paused"))
}

pub async fn resume_playback(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<String>,
) -> Result<Json<GenericResponse>> {
    state.controller.resume_playback(&tab_id)?;
    Ok(status("playing"))
}

pub async fn skip_action(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<String>,
) -> Result<Json<GenericResponse>> {
    state.controller.skip_current(&tab_id)?;
    Ok(status("skipping"))
}

pub async fn stop_playback(
    State(state): State<Arc<AppState>>,
    Path(tab_id): Path<String>,
) -> Result<Json<GenericResponse>> {
    state.controller.stop_playback(&tab_id)?;
    Ok(status("stopping"))
}
