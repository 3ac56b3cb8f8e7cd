use chrono::Utc;
use serde_json::Value;
use zappy_persistence::Database;

use crate::ConfigStoreError;

/// `system_config(key PK, value_json, updated_at)` — runtime configuration
/// that overrides environment variables (§4.4, §6: "DB values shadow
/// environment values").
#[derive(Clone)]
pub struct SystemConfigStore {
    db: Database,
}

impl SystemConfigStore {
    /// Wraps an already-migrated state database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Reads a config value, if present.
    pub fn get(&self, key: &str) -> Result<Option<Value>, ConfigStoreError> {
        let raw: Option<String> = self.db.with_connection(|conn| {
            conn.query_row(
                "SELECT value_json FROM system_config WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .ok()
        })?;
        raw.map(|text| {
            serde_json::from_str(&text).map_err(|e| ConfigStoreError::Malformed {
                key: key.to_string(),
                detail: e.to_string(),
            })
        })
        .transpose()
    }

    /// Upserts a config value.
    pub fn set(&self, key: &str, value: &Value) -> Result<(), ConfigStoreError> {
        let payload = serde_json::to_string(value).map_err(|e| ConfigStoreError::Malformed {
            key: key.to_string(),
            detail: e.to_string(),
        })?;
        let now = Utc::now().to_rfc3339();
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO system_config (key, value_json, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
                rusqlite::params![key, payload, now],
            )
        })?;
        Ok(())
    }

    /// Resolves `key`: a DB value wins if present, otherwise falls back to
    /// `fallback` (typically sourced from an environment variable).
    pub fn resolve(&self, key: &str, fallback: Option<Value>) -> Result<Option<Value>, ConfigStoreError> {
        Ok(self.get(key)?.or(fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zappy_persistence::migrate_state_db;

    fn store() -> SystemConfigStore {
        SystemConfigStore::new(Database::open_in_memory(migrate_state_db).unwrap())
    }

    #[test]
    fn set_then_get_round_trips() {
        let store = store();
        store.set("weather.api_key", &Value::from("abc123")).unwrap();
        assert_eq!(store.get("weather.api_key").unwrap(), Some(Value::from("abc123")));
    }

    #[test]
    fn db_value_shadows_environment_fallback() {
        let store = store();
        store.set("model.fast", &Value::from("db-model")).unwrap();
        let resolved = store
            .resolve("model.fast", Some(Value::from("env-model")))
            .unwrap();
        assert_eq!(resolved, Some(Value::from("db-model")));
    }

    #[test]
    fn falls_back_to_environment_when_absent() {
        let store = store();
        let resolved = store
            .resolve("model.fast", Some(Value::from("env-model")))
            .unwrap();
        assert_eq!(resolved, Some(Value::from("env-model")));
    }
}
