use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{automations, health, playback, recording};
use super::state::AppState;
use super::websocket::ws_handler;

const LOCAL_ORIGINS: [&str; 4] = [
    "http://localhost:1420",
    "http://localhost:5173",
    "http://127.0.0.1:1420",
    "http://127.0.0.1:5173",
];

pub fn create_router(state: Arc<AppState>) -> Router {
    // The engine is only ever driven by a local shell
    let cors = CorsLayer::new()
        .allow_origin(
            LOCAL_ORIGINS
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Recording endpoints
        .route("/recording/start", post(recording::start_recording))
        .route("/recording/stop", post(recording::stop_recording))
        .route("/recording/abort", post(recording::abort_recording))
        .route("/recording/pause", post(recording::pause_recording))
        .route("/recording/resume", post(recording::resume_recording))
        .route("/recording/status", get(recording::get_recording_status))
        // Automation endpoints
        .route("/automations", get(automations::list_automations))
        .route(
            "/automations/:id",
            get(automations::get_automation)
                .patch(automations::rename_automation)
                .delete(automations::delete_automation),
        )
        .route("/automations/:id/play", post(automations::play_automation))
        // Playback control endpoints
        .route("/playback/:tab_id/pause", post(playback::pause_playback))
        .route("/playback/:tab_id/resume", post(playback::resume_playback))
        .route("/playback/:tab_id/skip", post(playback::skip_action))
        .route("/playback/:tab_id/stop", post(playback::stop_playback))
        // WebSocket
        .route("/ws/:client_id", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
