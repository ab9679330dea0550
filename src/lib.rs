//! Record and replay engine for browser automations.
//!
//! A recording installs a capture module into a page host and turns user
//! interaction into an ordered action log. Playback drives a page host
//! through a saved log, preferring structural DOM interaction and falling
//! back to synthetic input.

pub mod api;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod models;
pub mod recording;
pub mod replay;
pub mod selector;
pub mod store;
