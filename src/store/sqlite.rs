use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::AutomationStore;
use crate::error::StoreError;
use crate::models::Automation;

/// Default database path under the user's data directory
pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        StoreError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Could not find data directory",
        ))
    })?;
    Ok(data_dir.join("com.browser-automation.app").join("automations.db"))
}

/// Automation repository for SQLite persistence.
///
/// Each record keeps the full automation as JSON in `body`; the other
/// columns exist for ordering and listing.
pub struct SqliteAutomationStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteAutomationStore {
    /// Open (or create) the database at `path` and initialize the schema
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        tracing::info!("Automation store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_default() -> Result<Self, StoreError> {
        Self::open(&default_db_path()?)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|e| StoreError::Lock(e.to_string()))
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS automations (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                source_url TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                position INTEGER NOT NULL,
                body TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_automations_position ON automations(position);
            "#,
        )?;

        Ok(())
    }

    fn find(conn: &Connection, id: &str) -> Result<Automation, StoreError> {
        let body: Option<String> = conn
            .query_row("SELECT body FROM automations WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        match body {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl AutomationStore for SqliteAutomationStore {
    async fn load_all(&self) -> Result<Vec<Automation>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, body FROM automations ORDER BY position ASC")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut automations = Vec::new();
        for row in rows {
            let (id, body) = row?;
            match serde_json::from_str(&body) {
                Ok(automation) => automations.push(automation),
                // One unreadable record must not hide the rest
                Err(e) => tracing::warn!("Skipping unreadable automation {}: {}", id, e),
            }
        }
        Ok(automations)
    }

    async fn get(&self, id: &str) -> Result<Automation, StoreError> {
        let conn = self.lock()?;
        Self::find(&conn, id)
    }

    async fn save(&self, automation: &Automation) -> Result<(), StoreError> {
        let body = serde_json::to_string(automation)?;
        let conn = self.lock()?;

        let updated = conn.execute(
            "UPDATE automations SET name = ?2, source_url = ?3, body = ?4 WHERE id = ?1",
            params![automation.id, automation.name, automation.source_url, body],
        )?;
        if updated == 0 {
            conn.execute(
                r#"
                INSERT INTO automations (id, name, source_url, created_at, position, body)
                VALUES (?1, ?2, ?3, ?4, (SELECT COALESCE(MAX(position), 0) + 1 FROM automations), ?5)
                "#,
                params![
                    automation.id,
                    automation.name,
                    automation.source_url,
                    automation.created_at.to_rfc3339(),
                    body
                ],
            )?;
        }

        tracing::debug!("Saved automation {} ({} actions)", automation.id, automation.actions.len());
        Ok(())
    }

    async fn rename(&self, id: &str, name: &str) -> Result<Automation, StoreError> {
        let conn = self.lock()?;
        let mut automation = Self::find(&conn, id)?;
        automation.name = name.to_string();
        conn.execute(
            "UPDATE automations SET name = ?2, body = ?3 WHERE id = ?1",
            params![id, name, serde_json::to_string(&automation)?],
        )?;
        Ok(automation)
    }

    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM automations WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
