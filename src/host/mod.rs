//! Page-host boundary: the embedded browsing surface the engine drives.

pub mod cdp;
pub mod protocol;
pub mod runtime;

pub use cdp::{CdpHostProvider, CdpPageHost};
pub use protocol::*;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::HostError;
use crate::models::Viewport;

/// One tab's browsing surface.
///
/// Calls made after the host has been torn down fail with
/// `HostError::Destroyed`. Calls that race a navigation fail with
/// `HostError::StaleContext`.
#[async_trait]
pub trait PageHost: Send + Sync {
    fn id(&self) -> &str;

    /// Run a page runtime call inside the current script context.
    async fn execute_in_context(&self, script: &PageScript) -> Result<serde_json::Value, HostError>;

    async fn send_synthetic_input(&self, input: SyntheticInput) -> Result<(), HostError>;

    async fn navigate(&self, url: &str) -> Result<(), HostError>;

    async fn current_url(&self) -> Result<String, HostError>;

    async fn set_viewport(&self, viewport: &Viewport) -> Result<(), HostError>;

    /// Navigation lifecycle and page messages, in emission order.
    fn subscribe(&self) -> broadcast::Receiver<HostEvent>;
}

/// Obtains (or creates) the page host for a tab.
#[async_trait]
pub trait HostProvider: Send + Sync {
    async fn page_host(&self, tab_id: &str) -> Result<Arc<dyn PageHost>, HostError>;
}

/// Execute a runtime call and decode its report. A `null` result means the
/// call landed in a context without the runtime, which only happens while a
/// navigation is replacing the document.
pub async fn evaluate<T: DeserializeOwned>(
    host: &dyn PageHost,
    script: &PageScript,
) -> Result<T, HostError> {
    let value = host.execute_in_context(script).await?;
    if value.is_null() {
        return Err(HostError::StaleContext("page runtime returned no value".into()));
    }
    serde_json::from_value(value)
        .map_err(|e| HostError::Script(format!("unexpected runtime result: {}", e)))
}
