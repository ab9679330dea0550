//! The static capture/replay module evaluated inside page script contexts.
//!
//! The module source never changes at runtime; every call is a serialized
//! `PageScript` handed to `window.__automation.dispatch`.

use super::protocol::PageScript;
use crate::error::HostError;

/// Bumped whenever `page_runtime.js` changes behaviour. A context holding an
/// older version gets the new runtime; the same version is never redefined.
pub const RUNTIME_VERSION: &str = "1";

/// Name of the CDP binding that carries page messages out of the context.
pub const BINDING_NAME: &str = "__automationEmit";

const PAGE_RUNTIME: &str = include_str!("page_runtime.js");

/// Render a runtime call as a self-contained expression. Defining the runtime
/// is a no-op when the context already has this version.
pub fn render(script: &PageScript) -> Result<String, HostError> {
    let command = serde_json::to_string(script)
        .map_err(|e| HostError::Script(format!("failed to encode runtime call: {}", e)))?;
    let version = serde_json::to_string(RUNTIME_VERSION).unwrap_or_default();
    let binding = serde_json::to_string(BINDING_NAME).unwrap_or_default();
    Ok(format!(
        "(() => {{\n({})({}, {});\nreturn window.__automation.dispatch({});\n}})()",
        PAGE_RUNTIME.trim_end(),
        version,
        binding,
        command
    ))
}
