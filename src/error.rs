use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Failures reported by a page host.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HostError {
    #[error("Page host has been destroyed")]
    Destroyed,

    #[error("Script context was destroyed: {0}")]
    StaleContext(String),

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("Synthetic input rejected: {0}")]
    Input(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl HostError {
    /// Stale contexts are an expected transient right after a navigation.
    pub fn is_transient(&self) -> bool {
        matches!(self, HostError::StaleContext(_))
    }

    /// Classify an error message coming back from a script evaluation.
    pub fn from_script_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        if lower.contains("execution context was destroyed")
            || lower.contains("cannot find context with specified id")
            || lower.contains("inspected target navigated or closed")
            || lower.contains("uniqueid not found")
        {
            HostError::StaleContext(message)
        } else if lower.contains("target closed") || lower.contains("session closed") {
            HostError::Destroyed
        } else {
            HostError::Script(message)
        }
    }
}

/// Per-action outcomes raised by the playback engine.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ReplayError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Element not visible: {0}")]
    ElementNotVisible(String),

    #[error("Script context went stale")]
    StaleContext,

    #[error("Synthetic input failed: {0}")]
    SyntheticInputFailed(String),

    #[error("Navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("Skipped by user")]
    UserSkipped,

    #[error("Stopped by user")]
    UserStopped,

    #[error("Page host error: {0}")]
    Host(String),
}

impl ReplayError {
    /// Control outcomes are not failures and must never be retried.
    pub fn is_control(&self) -> bool {
        matches!(self, ReplayError::UserSkipped | ReplayError::UserStopped)
    }
}

impl From<HostError> for ReplayError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::StaleContext(_) => ReplayError::StaleContext,
            HostError::Input(msg) => ReplayError::SyntheticInputFailed(msg),
            other => ReplayError::Host(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Automation not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lock error: {0}")]
    Lock(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("A recording session is already active on {0}")]
    RecordingActive(String),

    #[error("No active recording session")]
    NoActiveRecording,

    #[error("Page host {0} is busy")]
    HostBusy(String),

    #[error("Automation not found: {0}")]
    AutomationNotFound(String),

    #[error("No playback running on {0}")]
    PlaybackNotFound(String),

    #[error("Invalid request: {0}")]
    ValidationError(String),

    #[error("Page host error: {0}")]
    Host(#[from] HostError),

    #[error("Storage error: {0}")]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => AppError::AutomationNotFound(id),
            other => AppError::Store(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    detail: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::RecordingActive(_) => (StatusCode::CONFLICT, "Conflict"),
            AppError::HostBusy(_) => (StatusCode::CONFLICT, "Conflict"),
            AppError::NoActiveRecording => (StatusCode::NOT_FOUND, "Not Found"),
            AppError::AutomationNotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            AppError::PlaybackNotFound(_) => (StatusCode::NOT_FOUND, "Not Found"),
            AppError::ValidationError(_) => (StatusCode::BAD_REQUEST, "Bad Request"),
            AppError::Host(_) => (StatusCode::BAD_GATEWAY, "Page Host Error"),
            AppError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Storage Error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Error"),
        };

        let body = Json(ErrorResponse {
            error: error_message.to_string(),
            detail: self.to_string(),
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
