use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{
    Automation, AutomationListResponse, GenericResponse, PlayAutomationRequest, RenameAutomationRequest,
    StartPlaybackResponse,
};

use super::super::state::AppState;

pub async fn list_automations(State(state): State<Arc<AppState>>) -> Result<Json<AutomationListResponse>> {
    let automations = state.controller.list_automations().await?;
    Ok(Json(AutomationListResponse {
        automations: automations.iter().map(Automation::summary).collect(),
    }))
}

pub async fn get_automation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Automation>> {
    Ok(Json(state.controller.get_automation(&id).await?))
}

pub async fn rename_automation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<RenameAutomationRequest>,
) -> Result<Json<Automation>> {
    Ok(Json(state.controller.rename_automation(&id, &request.name).await?))
}

pub async fn delete_automation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<GenericResponse>> {
    state.controller.delete_automation(&id).await?;
    Ok(Json(GenericResponse {
        status: "deleted".to_string(),
    }))
}

/// Start replaying an automation on a tab
///
/// Returns once the run is scheduled; progress and the final result are
/// streamed over the WebSocket.
pub async fn play_automation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<PlayAutomationRequest>,
) -> Result<Json<StartPlaybackResponse>> {
    // Fail fast on unknown ids and unavailable tabs
    state.controller.get_automation(&id).await?;
    let host = state.hosts.page_host(&request.tab_id).await?;

    let controller = Arc::clone(&state.controller);
    let automation_id = id.clone();
    let tab_id = request.tab_id.clone();
    tokio::spawn(async move {
        match controller.play_automation(&automation_id, host).await {
            Ok(result) => tracing::info!(
                "Playback of {} on {} finished: {:?}",
                automation_id,
                tab_id,
                result.state
            ),
            Err(e) => tracing::error!("Playback of {} on {} failed: {}", automation_id, tab_id, e),
        }
    });

    Ok(Json(StartPlaybackResponse {
        automation_id: id,
        tab_id: request.tab_id,
        status: "started".to_string(),
    }))
}
