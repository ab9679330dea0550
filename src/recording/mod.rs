pub mod recorder;
pub mod tracker;

pub use recorder::Recorder;
pub use tracker::{Directive, NavigationTracker, Notice, TrackerState};
