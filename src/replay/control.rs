use tokio::sync::watch;

use crate::models::{ControlFlags, ControlGate};

/// Write side of a playback's control flags, held by the session controller.
#[derive(Debug)]
pub struct PlaybackControl {
    tx: watch::Sender<ControlFlags>,
}

impl PlaybackControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ControlFlags::default());
        Self { tx }
    }

    /// Read side for the playback loop
    pub fn gate(&self) -> ControlGate {
        ControlGate::new(self.tx.subscribe())
    }

    pub fn flags(&self) -> ControlFlags {
        *self.tx.borrow()
    }

    pub fn pause(&self) {
        self.tx.send_modify(|f| f.paused = true);
    }

    pub fn resume(&self) {
        self.tx.send_modify(|f| f.paused = false);
    }

    /// Abandon the action currently executing (or the next one, if between
    /// actions).
    pub fn skip(&self) {
        self.tx.send_modify(|f| f.skip_requests += 1);
    }

    pub fn stop(&self) {
        self.tx.send_modify(|f| {
            f.stopped = true;
            f.paused = false;
        });
    }
}

impl Default for PlaybackControl {
    fn default() -> Self {
        Self::new()
    }
}
