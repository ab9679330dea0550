use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::{Action, ActionKind, Viewport};

/// A named, persisted action log.
///
/// Identity is `id`; `name` is the only field that may change after saving.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Automation {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub actions: Vec<Action>,
    #[serde(default)]
    pub viewport: Viewport,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Automation {
    pub fn new(name: String, source_url: String, actions: Vec<Action>, viewport: Viewport) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            source_url,
            actions,
            viewport,
            created_at: Utc::now(),
        }
    }

    /// Number of actions that do something on the page. The leading
    /// `viewport` descriptor does not count.
    pub fn meaningful_len(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| !matches!(a.kind, ActionKind::Viewport { .. }))
            .count()
    }

    pub fn summary(&self) -> AutomationSummary {
        AutomationSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            source_url: self.source_url.clone(),
            action_count: self.actions.len(),
            created_at: self.created_at,
        }
    }
}

/// Listing entry without the action payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomationSummary {
    pub id: String,
    pub name: String,
    pub source_url: String,
    pub action_count: usize,
    pub created_at: DateTime<Utc>,
}

pub fn default_automation_name() -> String {
    format!("Recording {}", Utc::now().format("%Y-%m-%d %H:%M"))
}
