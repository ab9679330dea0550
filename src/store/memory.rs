use async_trait::async_trait;
use tokio::sync::RwLock;

use super::AutomationStore;
use crate::error::StoreError;
use crate::models::Automation;

/// Process-local store, for tests and shells without a data directory.
#[derive(Default)]
pub struct MemoryAutomationStore {
    automations: RwLock<Vec<Automation>>,
}

impl MemoryAutomationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AutomationStore for MemoryAutomationStore {
    async fn load_all(&self) -> Result<Vec<Automation>, StoreError> {
        Ok(self.automations.read().await.clone())
    }

    async fn get(&self, id: &str) -> Result<Automation, StoreError> {
        self.automations
            .read()
            .await
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn save(&self, automation: &Automation) -> Result<(), StoreError> {
        let mut automations = self.automations.write().await;
        match automations.iter_mut().find(|a| a.id == automation.id) {
            Some(existing) => *existing = automation.clone(),
            None => automations.push(automation.clone()),
        }
        Ok(())
    }

    async fn rename(&self, id: &str, name: &str) -> Result<Automation, StoreError> {
        let mut automations = self.automations.write().await;
        let automation = automations
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        automation.name = name.to_string();
        Ok(automation.clone())
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut automations = self.automations.write().await;
        let before = automations.len();
        automations.retain(|a| a.id != id);
        if automations.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
