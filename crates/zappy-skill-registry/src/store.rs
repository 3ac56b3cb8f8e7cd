use chrono::Utc;
use serde_json::Value;
use zappy_core::embedding::{pack_embedding, unpack_embedding};
use zappy_core::skill::SkillMetadata;
use zappy_persistence::Database;

use crate::SkillRegistryError;

/// `skills`/`embeddings`/`skill_configs` persistence (§4.2).
#[derive(Clone)]
pub struct SkillStore {
    db: Database,
}

impl SkillStore {
    /// Wraps an already-migrated skills database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upserts a skill's metadata row.
    pub fn upsert_metadata(&self, metadata: &SkillMetadata) -> Result<(), SkillRegistryError> {
        let json_data = serde_json::to_string(metadata).expect("SkillMetadata always serialises");
        let now = Utc::now().to_rfc3339();
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO skills (name, description, category, sub_category, json_data, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(name) DO UPDATE SET
                    description = excluded.description,
                    category = excluded.category,
                    sub_category = excluded.sub_category,
                    json_data = excluded.json_data,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    metadata.name,
                    metadata.description,
                    metadata.category,
                    metadata.sub_category,
                    json_data,
                    now,
                ],
            )
        })?;
        Ok(())
    }

    /// Loads every persisted metadata row.
    pub fn all_metadata(&self) -> Result<Vec<SkillMetadata>, SkillRegistryError> {
        let rows: Vec<String> = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT json_data FROM skills")?;
            stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows
            .into_iter()
            .filter_map(|json| serde_json::from_str(&json).ok())
            .collect())
    }

    /// Stores (or overwrites) a skill's embedding.
    pub fn set_embedding(&self, name: &str, vector: &[f32]) -> Result<(), SkillRegistryError> {
        let packed = pack_embedding(vector);
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO embeddings (skill_name, vector) VALUES (?1, ?2)
                 ON CONFLICT(skill_name) DO UPDATE SET vector = excluded.vector",
                rusqlite::params![name, packed],
            )
        })?;
        Ok(())
    }

    /// All stored embeddings, by skill name.
    pub fn all_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>, SkillRegistryError> {
        let rows: Vec<(String, Vec<u8>)> = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT skill_name, vector FROM embeddings")?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows.into_iter().map(|(name, bytes)| (name, unpack_embedding(&bytes))).collect())
    }

    /// Skill names that have a metadata row but no embedding yet.
    pub fn missing_embeddings(&self) -> Result<Vec<String>, SkillRegistryError> {
        let names = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT name FROM skills WHERE name NOT IN (SELECT skill_name FROM embeddings)",
            )?;
            stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(names)
    }

    /// Merges `patch` into a skill's persisted config (§4.2 `updateConfig`).
    pub fn update_config(&self, name: &str, patch: &Value) -> Result<Value, SkillRegistryError> {
        let current = self.get_config(name)?;
        let merged = merge_json(current, patch.clone());
        let payload = serde_json::to_string(&merged).expect("merged config always serialises");
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO skill_configs (skill_name, config_json) VALUES (?1, ?2)
                 ON CONFLICT(skill_name) DO UPDATE SET config_json = excluded.config_json",
                rusqlite::params![name, payload],
            )
        })?;
        Ok(merged)
    }

    /// A skill's persisted config, or an empty object if none is stored.
    pub fn get_config(&self, name: &str) -> Result<Value, SkillRegistryError> {
        let raw: Option<String> = self.db.with_connection(|conn| {
            conn.query_row(
                "SELECT config_json FROM skill_configs WHERE skill_name = ?1",
                [name],
                |row| row.get(0),
            )
            .ok()
        })?;
        Ok(raw
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
    }

    /// `true` unless the skill's config explicitly sets `enabled: false`.
    pub fn is_enabled(&self, name: &str) -> Result<bool, SkillRegistryError> {
        Ok(self
            .get_config(name)?
            .get("enabled")
            .and_then(Value::as_bool)
            .unwrap_or(true))
    }
}

fn merge_json(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base_map), Value::Object(patch_map)) => {
            for (key, value) in patch_map {
                base_map.insert(key, value);
            }
            Value::Object(base_map)
        }
        (_, patch) => patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zappy_persistence::migrate_skills_db;

    fn store() -> SkillStore {
        SkillStore::new(Database::open_in_memory(migrate_skills_db).unwrap())
    }

    fn metadata(name: &str) -> SkillMetadata {
        SkillMetadata {
            name: name.to_string(),
            description: "demo skill".into(),
            category: "web".into(),
            sub_category: String::new(),
            input_schema: serde_json::json!({"properties": {}, "required": []}),
            output_schema: serde_json::json!({}),
            config_schema: None,
            dependencies: vec![],
            version: "0.1.0".into(),
            timeout_default_ms: 30_000,
        }
    }

    #[test]
    fn update_config_merges_and_persists() {
        let store = store();
        store.upsert_metadata(&metadata("web_search")).unwrap();
        store.update_config("web_search", &serde_json::json!({"api_key": "abc"})).unwrap();
        let config = store.get_config("web_search").unwrap();
        assert_eq!(config["api_key"], "abc");
        store.update_config("web_search", &serde_json::json!({"enabled": false})).unwrap();
        let config = store.get_config("web_search").unwrap();
        assert_eq!(config["api_key"], "abc");
        assert_eq!(config["enabled"], false);
        assert!(!store.is_enabled("web_search").unwrap());
    }

    #[test]
    fn missing_embeddings_lists_unembedded_skills() {
        let store = store();
        store.upsert_metadata(&metadata("web_search")).unwrap();
        assert_eq!(store.missing_embeddings().unwrap(), vec!["web_search".to_string()]);
        store.set_embedding("web_search", &[0.1, 0.2]).unwrap();
        assert!(store.missing_embeddings().unwrap().is_empty());
    }
}
