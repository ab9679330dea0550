use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct StartRecordingRequest {
    /// Tab whose page host should be recorded
    pub tab_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct StopRecordingRequest {
    /// Name for the saved automation; a timestamped default is used if absent
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RenameAutomationRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct PlayAutomationRequest {
    pub tab_id: String,
}
