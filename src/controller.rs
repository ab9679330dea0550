use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};

use crate::config::EngineConfig;
use crate::error::{AppError, Result};
use crate::host::PageHost;
use crate::models::{
    default_automation_name, Automation, PlaybackResult, PlaybackSession, ProgressEvent, RecordingSession,
};
use crate::recording::Recorder;
use crate::replay::{PlaybackControl, PlaybackEngine};
use crate::store::AutomationStore;

#[derive(Debug, Clone, Serialize)]
pub struct RecordingInfo {
    pub session_id: String,
    pub host_id: String,
}

/// The engine's single entry point for the surrounding shell.
///
/// Owns at most one recording and one playback per page host. The shell
/// observes both through `subscribe` and never touches session state.
pub struct SessionController {
    store: Arc<dyn AutomationStore>,
    config: EngineConfig,
    progress: broadcast::Sender<ProgressEvent>,
    /// Held for the whole of a start so two starts cannot race
    recording: Mutex<Option<Recorder>>,
    /// Running playbacks: host_id -> control flags
    playbacks: DashMap<String, Arc<PlaybackControl>>,
    /// Serializes playbacks on one host
    host_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionController {
    pub fn new(store: Arc<dyn AutomationStore>, config: EngineConfig) -> Self {
        let (progress, _) = broadcast::channel(1024);
        Self {
            store,
            config,
            progress,
            recording: Mutex::new(None),
            playbacks: DashMap::new(),
            host_locks: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    // Recording

    pub async fn start_recording(&self, host: Arc<dyn PageHost>) -> Result<RecordingInfo> {
        let mut slot = self.recording.lock().await;
        if let Some(active) = slot.as_ref() {
            return Err(AppError::RecordingActive(active.host_id().to_string()));
        }
        if self.playbacks.contains_key(host.id()) {
            return Err(AppError::HostBusy(host.id().to_string()));
        }

        let recorder = Recorder::start(host, &self.config, self.progress.clone()).await?;
        let info = RecordingInfo {
            session_id: recorder.session_id().to_string(),
            host_id: recorder.host_id().to_string(),
        };
        *slot = Some(recorder);
        Ok(info)
    }

    pub async fn pause_recording(&self) -> Result<()> {
        let slot = self.recording.lock().await;
        let recorder = slot.as_ref().ok_or(AppError::NoActiveRecording)?;
        recorder.pause().await;
        Ok(())
    }

    pub async fn resume_recording(&self) -> Result<()> {
        let slot = self.recording.lock().await;
        let recorder = slot.as_ref().ok_or(AppError::NoActiveRecording)?;
        recorder.resume().await;
        Ok(())
    }

    /// Stop capturing and discard everything recorded
    pub async fn abort_recording(&self) -> Result<()> {
        let recorder = self.recording.lock().await.take().ok_or(AppError::NoActiveRecording)?;
        recorder.abort().await;
        Ok(())
    }

    /// Stop capturing and persist the log as an automation. Returns `None`
    /// (and saves nothing) when no page action was captured.
    pub async fn stop_recording(&self, name: Option<String>) -> Result<Option<Automation>> {
        let recorder = self.recording.lock().await.take().ok_or(AppError::NoActiveRecording)?;
        let session = recorder.stop().await;
        let session_id = session.id.clone();

        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(default_automation_name);

        let Some(automation) = session.finish(name) else {
            tracing::info!("Recording {} captured no actions, nothing saved", session_id);
            return Ok(None);
        };

        self.store.save(&automation).await?;
        tracing::info!(
            "Saved automation '{}' ({}) with {} actions",
            automation.name,
            automation.id,
            automation.actions.len()
        );
        Ok(Some(automation))
    }

    pub async fn recording_status(&self) -> Option<RecordingSession> {
        match self.recording.lock().await.as_ref() {
            Some(recorder) => Some(recorder.snapshot().await),
            None => None,
        }
    }

    // Automations

    pub async fn list_automations(&self) -> Result<Vec<Automation>> {
        Ok(self.store.load_all().await?)
    }

    pub async fn get_automation(&self, id: &str) -> Result<Automation> {
        Ok(self.store.get(id).await?)
    }

    pub async fn rename_automation(&self, id: &str, name: &str) -> Result<Automation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::ValidationError("name must not be empty".to_string()));
        }
        Ok(self.store.rename(id, name).await?)
    }

    pub async fn delete_automation(&self, id: &str) -> Result<()> {
        self.store.delete(id).await?;
        tracing::info!("Deleted automation {}", id);
        Ok(())
    }

    // Playback

    /// Replay an automation to completion, stop or exhaustion. A second
    /// playback on the same host waits for the first to finish.
    pub async fn play_automation(&self, id: &str, host: Arc<dyn PageHost>) -> Result<PlaybackResult> {
        let automation = self.store.get(id).await?;
        let host_id = host.id().to_string();

        let lock = self.host_locks.entry(host_id.clone()).or_default().clone();
        let _serial = lock.lock().await;

        let control = Arc::new(PlaybackControl::new());
        {
            // Claim the host under the recording lock, which start_recording
            // holds while it checks for playbacks
            let recording = self.recording.lock().await;
            if recording.as_ref().is_some_and(|r| r.host_id() == host_id) {
                return Err(AppError::HostBusy(host_id));
            }
            self.playbacks.insert(host_id.clone(), control.clone());
        }

        let session = PlaybackSession::new(Arc::new(automation), host_id.clone(), control.gate());
        let engine = PlaybackEngine::new(host, self.config.clone(), self.progress.clone());
        let result = engine.run(session).await;

        self.playbacks.remove(&host_id);
        Ok(result)
    }

    fn control(&self, host_id: &str) -> Result<Arc<PlaybackControl>> {
        self.playbacks
            .get(host_id)
            .map(|c| c.value().clone())
            .ok_or_else(|| AppError::PlaybackNotFound(host_id.to_string()))
    }

    pub fn is_playing(&self, host_id: &str) -> bool {
        self.playbacks.contains_key(host_id)
    }

    pub fn pause_playback(&self, host_id: &str) -> Result<()> {
        self.control(host_id)?.pause();
        tracing::info!("[{}] Playback paused", host_id);
        Ok(())
    }

    pub fn resume_playback(&self, host_id: &str) -> Result<()> {
        self.control(host_id)?.resume();
        tracing::info!("[{}] Playback resumed", host_id);
        Ok(())
    }

    pub fn skip_current(&self, host_id: &str) -> Result<()> {
        self.control(host_id)?.skip();
        tracing::info!("[{}] Skip requested", host_id);
        Ok(())
    }

    pub fn stop_playback(&self, host_id: &str) -> Result<()> {
        self.control(host_id)?.stop();
        tracing::info!("[{}] Stop requested", host_id);
        Ok(())
    }
}
