use serde::Serialize;

use crate::host::NavigationEvent;
use crate::models::ActionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerState {
    /// Capture module verified in the current document
    Stable,
    /// A new document is loading; capture is not yet present
    Transitioning,
    /// Install retries ran out; only host-level navigations are recorded
    Degraded,
}

/// What the recorder must do in response to a lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    /// The script context was torn down
    BumpEpoch,
    Record(ActionKind),
    /// Install with the retry policy, then report through `on_install`
    Install,
    /// Probe the active flag; reinstall if it went false
    Verify,
}

/// State change worth surfacing to the shell.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Degraded { url: String },
    Restored,
}

/// Keeps the capture module present across a page host's navigations.
#[derive(Debug)]
pub struct NavigationTracker {
    state: TrackerState,
    current_url: String,
}

impl NavigationTracker {
    pub fn new(current_url: impl Into<String>) -> Self {
        Self {
            state: TrackerState::Transitioning,
            current_url: current_url.into(),
        }
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    /// `last_navigate` is the URL of the most recent `navigate` action in the
    /// log, used to suppress duplicates.
    pub fn on_event(&mut self, event: &NavigationEvent, last_navigate: Option<&str>) -> Vec<Directive> {
        match event {
            NavigationEvent::Started { url } => {
                self.state = TrackerState::Transitioning;
                self.current_url = url.clone();
                let mut directives = vec![Directive::BumpEpoch];
                if last_navigate != Some(url.as_str()) {
                    directives.push(Directive::Record(ActionKind::Navigate { url: url.clone() }));
                }
                directives
            }
            NavigationEvent::DocumentReady { url } => {
                if !url.is_empty() {
                    self.current_url = url.clone();
                }
                vec![Directive::Install]
            }
            NavigationEvent::InPage { url } => {
                let mut directives = Vec::new();
                if *url != self.current_url {
                    self.current_url = url.clone();
                    directives.push(Directive::Record(ActionKind::SpaNavigate { url: url.clone() }));
                }
                directives.push(Directive::Verify);
                directives
            }
        }
    }

    /// Outcome of an install or verification pass.
    pub fn on_install(&mut self, verified: bool) -> Option<Notice> {
        let previous = self.state;
        if verified {
            self.state = TrackerState::Stable;
            (previous == TrackerState::Degraded).then_some(Notice::Restored)
        } else {
            self.state = TrackerState::Degraded;
            (previous != TrackerState::Degraded).then(|| Notice::Degraded {
                url: self.current_url.clone(),
            })
        }
    }

    /// Periodic re-verification, independent of lifecycle events.
    pub fn on_health_check(&self) -> Directive {
        Directive::Verify
    }
}
