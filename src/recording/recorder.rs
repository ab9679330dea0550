use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::tracker::{Directive, NavigationTracker, Notice};
use crate::capture::{is_verified, CaptureInjector, CaptureNormalizer, InstallOutcome};
use crate::config::EngineConfig;
use crate::error::HostError;
use crate::host::{evaluate, CapturedEvent, DocumentReport, HostEvent, NavigationEvent, PageHost, PageMessage, PageScript};
use crate::models::{ActionKind, ProgressEvent, RecordingSession, Viewport};

enum Command {
    Pause(oneshot::Sender<()>),
    Resume(oneshot::Sender<()>),
    Stop(oneshot::Sender<RecordingSession>),
    Abort,
}

/// A live recording bound to one page host.
///
/// Host events, debounce deadlines, health checks and user commands are all
/// handled by one task, so actions are appended in the order they happened.
pub struct Recorder {
    session_id: String,
    host_id: String,
    session: Arc<Mutex<RecordingSession>>,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
    progress: broadcast::Sender<ProgressEvent>,
}

impl Recorder {
    pub async fn start(
        host: Arc<dyn PageHost>,
        config: &EngineConfig,
        progress: broadcast::Sender<ProgressEvent>,
    ) -> Result<Self, HostError> {
        // Subscribe before installing so no event slips between the two
        let events = host.subscribe();
        let host_id = host.id().to_string();

        let (url, viewport) = match evaluate::<DocumentReport>(host.as_ref(), &PageScript::ReadDocument).await {
            Ok(doc) => {
                let viewport = doc.viewport();
                (doc.url, viewport)
            }
            Err(e) => {
                tracing::debug!("[{}] Could not read document, falling back to host URL: {}", host_id, e);
                (host.current_url().await?, Viewport::default())
            }
        };

        let mut session = RecordingSession::new(host_id.clone(), url.clone(), viewport);
        let session_id = session.id.clone();
        if !url.is_empty() && url != "about:blank" {
            session.append(ActionKind::Navigate { url: url.clone() });
        }
        let _ = progress.send(ProgressEvent::RecordingStarted {
            host_id: host_id.clone(),
            session_id: session_id.clone(),
        });
        for (index, action) in session.actions.iter().enumerate() {
            let _ = progress.send(ProgressEvent::ActionRecorded {
                host_id: host_id.clone(),
                index,
                action: action.clone(),
            });
        }

        let epoch = session.navigation_epoch;
        let session = Arc::new(Mutex::new(session));
        let mut worker = RecorderLoop {
            host_id: host_id.clone(),
            injector: CaptureInjector::new(host.clone(), config),
            session: session.clone(),
            normalizer: CaptureNormalizer::new(config),
            tracker: NavigationTracker::new(url),
            progress: progress.clone(),
            health_every: config.health_check(),
        };

        let outcome = worker.injector.install_verified(true, epoch).await;
        worker.apply_install(&outcome);

        let (commands, rx) = mpsc::channel(16);
        let task = tokio::spawn(worker.run(events, rx));

        tracing::info!("[{}] Recording started: {}", host_id, session_id);
        Ok(Self {
            session_id,
            host_id,
            session,
            commands,
            task,
            progress,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    pub async fn snapshot(&self) -> RecordingSession {
        self.session.lock().await.clone()
    }

    pub async fn pause(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Pause(tx)).await.is_ok() {
            let _ = rx.await;
        } else {
            self.session.lock().await.pause();
        }
    }

    pub async fn resume(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Resume(tx)).await.is_ok() {
            let _ = rx.await;
        } else {
            self.session.lock().await.resume();
        }
    }

    /// Flush anything pending, deactivate capture and hand back the log.
    pub async fn stop(self) -> RecordingSession {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Stop(tx)).await.is_ok() {
            if let Ok(session) = rx.await {
                let _ = self.task.await;
                return session;
            }
        }

        // The loop already ended (host went away); settle the session here
        let mut session = self.session.lock().await;
        session.deactivate();
        let _ = self.progress.send(ProgressEvent::RecordingStopped {
            host_id: self.host_id.clone(),
            action_count: session.actions.len(),
        });
        session.clone()
    }

    /// Stop capturing and discard the log.
    pub async fn abort(self) {
        if self.commands.send(Command::Abort).await.is_ok() {
            let _ = self.task.await;
        } else {
            self.session.lock().await.deactivate();
        }
        tracing::info!("[{}] Recording aborted: {}", self.host_id, self.session_id);
    }
}

struct RecorderLoop {
    host_id: String,
    injector: CaptureInjector,
    session: Arc<Mutex<RecordingSession>>,
    normalizer: CaptureNormalizer,
    tracker: NavigationTracker,
    progress: broadcast::Sender<ProgressEvent>,
    health_every: Duration,
}

impl RecorderLoop {
    async fn run(mut self, mut events: broadcast::Receiver<HostEvent>, mut commands: mpsc::Receiver<Command>) {
        let mut health = tokio::time::interval_at(Instant::now() + self.health_every, self.health_every);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let deadline = self.normalizer.next_deadline();
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(Command::Pause(reply)) => {
                        self.pause().await;
                        let _ = reply.send(());
                    }
                    Some(Command::Resume(reply)) => {
                        self.resume().await;
                        let _ = reply.send(());
                    }
                    Some(Command::Stop(reply)) => {
                        let session = self.finish().await;
                        let _ = reply.send(session);
                        break;
                    }
                    Some(Command::Abort) | None => {
                        self.finish().await;
                        break;
                    }
                },
                event = events.recv() => match event {
                    Ok(HostEvent::Message(PageMessage::Captured(captured))) => self.on_captured(captured).await,
                    Ok(HostEvent::Navigation(navigation)) => self.on_navigation(navigation).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("[{}] Recorder lagged, {} host events lost", self.host_id, skipped);
                    }
                    Err(RecvError::Closed) => {
                        tracing::warn!("[{}] Page host closed during recording", self.host_id);
                        if let Some(kind) = self.normalizer.flush() {
                            self.append(kind).await;
                        }
                        break;
                    }
                },
                _ = sleep_until(deadline) => {
                    if let Some(kind) = self.normalizer.poll_expired(Instant::now()) {
                        self.append(kind).await;
                    }
                }
                _ = health.tick() => self.health_check().await,
            }
        }
        tracing::debug!("[{}] Recorder loop finished", self.host_id);
    }

    async fn append(&mut self, kind: ActionKind) {
        let recorded = {
            let mut session = self.session.lock().await;
            if !session.capturing() {
                return;
            }
            session.append(kind)
        };
        if let Some((index, action)) = recorded {
            tracing::debug!("[{}] Recorded #{}: {}", self.host_id, index, action.kind.describe());
            let _ = self.progress.send(ProgressEvent::ActionRecorded {
                host_id: self.host_id.clone(),
                index,
                action,
            });
        }
    }

    async fn on_captured(&mut self, event: CapturedEvent) {
        if !self.session.lock().await.capturing() {
            return;
        }
        for kind in self.normalizer.accept(event, Instant::now()) {
            self.append(kind).await;
        }
    }

    async fn on_navigation(&mut self, event: NavigationEvent) {
        tracing::debug!("[{}] Navigation event: {:?}", self.host_id, event);
        if let Some(kind) = self.normalizer.flush() {
            self.append(kind).await;
        }

        let last_navigate = self.session.lock().await.last_navigate_url().map(str::to_string);
        for directive in self.tracker.on_event(&event, last_navigate.as_deref()) {
            match directive {
                Directive::BumpEpoch => {
                    let epoch = self.session.lock().await.bump_epoch();
                    tracing::debug!("[{}] Navigation epoch {}", self.host_id, epoch);
                }
                Directive::Record(kind) => {
                    self.normalizer.observe(&kind);
                    self.append(kind).await;
                }
                Directive::Install => self.install().await,
                Directive::Verify => self.verify().await,
            }
        }
    }

    fn capture_state(session: &RecordingSession) -> (bool, u64) {
        (session.capturing(), session.navigation_epoch)
    }

    async fn install(&mut self) {
        let (active, epoch) = Self::capture_state(&*self.session.lock().await);
        let outcome = self.injector.install_verified(active, epoch).await;
        self.apply_install(&outcome);
    }

    fn apply_install(&mut self, outcome: &InstallOutcome) {
        let attempts = match outcome {
            InstallOutcome::Verified { attempts, .. } => *attempts,
            InstallOutcome::Exhausted { attempts, last_error } => {
                tracing::warn!(
                    "[{}] Capture install failed after {} attempts: {}",
                    self.host_id,
                    attempts,
                    last_error
                );
                *attempts
            }
        };
        let notice = self.tracker.on_install(outcome.is_verified());
        self.notify(notice, attempts);
    }

    fn notify(&self, notice: Option<Notice>, attempts: u32) {
        match notice {
            Some(Notice::Degraded { url }) => {
                tracing::warn!("[{}] Capture degraded on {}: in-page actions are not being recorded", self.host_id, url);
                let _ = self.progress.send(ProgressEvent::CaptureDegraded {
                    host_id: self.host_id.clone(),
                    url,
                    attempts,
                });
            }
            Some(Notice::Restored) => {
                tracing::info!("[{}] Capture restored", self.host_id);
                let _ = self.progress.send(ProgressEvent::CaptureRestored {
                    host_id: self.host_id.clone(),
                });
            }
            None => {}
        }
    }

    /// Re-check the active flag; reinstall when it silently went away.
    async fn verify(&mut self) {
        let (active, _) = Self::capture_state(&*self.session.lock().await);
        match self.injector.probe().await {
            Ok(report) if is_verified(&report, active) => {
                let notice = self.tracker.on_install(true);
                self.notify(notice, 0);
            }
            Ok(report) => {
                tracing::debug!(
                    "[{}] Capture probe mismatch (installed={}, active={}), reinstalling",
                    self.host_id,
                    report.installed,
                    report.active
                );
                self.install().await;
            }
            Err(e) => {
                tracing::debug!("[{}] Capture probe failed: {}", self.host_id, e);
                self.install().await;
            }
        }
    }

    async fn health_check(&mut self) {
        if !self.session.lock().await.is_active {
            return;
        }
        let directive = self.tracker.on_health_check();
        if directive == Directive::Verify {
            self.verify().await;
        }
    }

    async fn pause(&mut self) {
        if let Some(kind) = self.normalizer.flush() {
            self.append(kind).await;
        }
        self.session.lock().await.pause();
        if let Err(e) = self.injector.set_active(false).await {
            tracing::debug!("[{}] Could not clear capture flag: {}", self.host_id, e);
        }
        tracing::info!("[{}] Recording paused", self.host_id);
    }

    async fn resume(&mut self) {
        self.session.lock().await.resume();
        match self.injector.set_active(true).await {
            Ok(report) if is_verified(&report, true) => {}
            _ => self.verify().await,
        }
        tracing::info!("[{}] Recording resumed", self.host_id);
    }

    async fn finish(&mut self) -> RecordingSession {
        if let Some(kind) = self.normalizer.flush() {
            self.append(kind).await;
        }
        let session = {
            let mut session = self.session.lock().await;
            session.deactivate();
            session.clone()
        };
        if let Err(e) = self.injector.set_active(false).await {
            tracing::debug!("[{}] Could not clear capture flag: {}", self.host_id, e);
        }
        let _ = self.progress.send(ProgressEvent::RecordingStopped {
            host_id: self.host_id.clone(),
            action_count: session.actions.len(),
        });
        tracing::info!("[{}] Recording stopped with {} actions", self.host_id, session.actions.len());
        session
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
