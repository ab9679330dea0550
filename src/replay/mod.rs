//! Playback: executes an automation's actions against a page host.

pub mod control;
pub mod dispatcher;
pub mod engine;

pub use control::PlaybackControl;
pub use dispatcher::{interaction_for, synthetic_sequence, ActionDispatcher, DispatchOutcome};
pub use engine::PlaybackEngine;
