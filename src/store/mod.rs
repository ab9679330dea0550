//! Persistence for automations: an ordered list of records keyed by id.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryAutomationStore;
pub use sqlite::SqliteAutomationStore;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::Automation;

#[async_trait]
pub trait AutomationStore: Send + Sync {
    /// Every automation, oldest first
    async fn load_all(&self) -> Result<Vec<Automation>, StoreError>;

    async fn get(&self, id: &str) -> Result<Automation, StoreError>;

    /// Insert, or replace in place when the id already exists.
    async fn save(&self, automation: &Automation) -> Result<(), StoreError>;

    async fn rename(&self, id: &str, name: &str) -> Result<Automation, StoreError>;

    async fn delete(&self, id: &str) -> Result<(), StoreError>;
}
