use chrono::Utc;
use zappy_core::embedding::{pack_embedding, unpack_embedding};
use zappy_persistence::Database;

use crate::ConfigStoreError;

/// Row shape of `perceptions(name PK, description, category, sub_category,
/// type, version, enabled, last_updated, embedding BLOB)` (§4.4).
#[derive(Debug, Clone)]
pub struct PerceptionRow {
    /// Unique perception-module name.
    pub name: String,
    /// Summary used in retrieval and planning prompts.
    pub description: String,
    /// Broad taxonomic category.
    pub category: String,
    /// Narrower taxonomic category.
    pub sub_category: String,
    /// Implementation kind (`"built_in"` or a dynamic manifest `type`).
    pub kind: String,
    /// Free-form version string.
    pub version: String,
    /// Whether this module is currently enabled.
    pub enabled: bool,
}

/// Perception-module registry persistence, shared between the Perception
/// Layer and the Config/KV Store (§4.4, §4.5).
#[derive(Clone)]
pub struct PerceptionStore {
    db: Database,
}

impl PerceptionStore {
    /// Wraps an already-migrated state database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upserts a perception module's metadata. Uses `COALESCE` against the
    /// existing embedding column so re-registration never clobbers a
    /// previously-computed embedding, matching the distilled source's
    /// `register_perception`.
    pub fn upsert(&self, row: &PerceptionRow) -> Result<(), ConfigStoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO perceptions (name, description, category, sub_category, type, version, enabled, last_updated, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL)
                 ON CONFLICT(name) DO UPDATE SET
                    description = excluded.description,
                    category = excluded.category,
                    sub_category = excluded.sub_category,
                    type = excluded.type,
                    version = excluded.version,
                    enabled = excluded.enabled,
                    last_updated = excluded.last_updated,
                    embedding = COALESCE(perceptions.embedding, excluded.embedding)",
                rusqlite::params![
                    row.name,
                    row.description,
                    row.category,
                    row.sub_category,
                    row.kind,
                    row.version,
                    i64::from(row.enabled),
                    now,
                ],
            )
        })?;
        Ok(())
    }

    /// Stores (or overwrites) the embedding for a named perception module.
    pub fn set_embedding(&self, name: &str, vector: &[f32]) -> Result<(), ConfigStoreError> {
        let packed = pack_embedding(vector);
        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE perceptions SET embedding = ?2 WHERE name = ?1",
                rusqlite::params![name, packed],
            )
        })?;
        Ok(())
    }

    /// All registered perception modules lacking a stored embedding.
    pub fn missing_embeddings(&self) -> Result<Vec<String>, ConfigStoreError> {
        let names = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM perceptions WHERE embedding IS NULL")?;
            stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<_>, _>>()
        })?;
        Ok(names)
    }

    /// Loads every registered, enabled module along with its embedding (if
    /// any), for use by the Perception Layer's search.
    pub fn all_with_embeddings(&self) -> Result<Vec<(PerceptionRow, Option<Vec<f32>>)>, ConfigStoreError> {
        let rows: Vec<(String, String, String, String, String, String, i64, Option<Vec<u8>>)> =
            self.db.with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT name, description, category, sub_category, type, version, enabled, embedding FROM perceptions",
                )?;
                stmt.query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()
            })?;
        Ok(rows
            .into_iter()
            .map(|(name, description, category, sub_category, kind, version, enabled, embedding)| {
                (
                    PerceptionRow {
                        name,
                        description,
                        category,
                        sub_category,
                        kind,
                        version,
                        enabled: enabled != 0,
                    },
                    embedding.map(|bytes| unpack_embedding(&bytes)),
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zappy_persistence::migrate_state_db;

    fn store() -> PerceptionStore {
        PerceptionStore::new(Database::open_in_memory(migrate_state_db).unwrap())
    }

    fn row(name: &str) -> PerceptionRow {
        PerceptionRow {
            name: name.to_string(),
            description: "demo".into(),
            category: "env".into(),
            sub_category: String::new(),
            kind: "built_in".into(),
            version: "0.1.0".into(),
            enabled: true,
        }
    }

    #[test]
    fn re_registration_does_not_clobber_embedding() {
        let store = store();
        store.upsert(&row("clock")).unwrap();
        store.set_embedding("clock", &[1.0, 2.0]).unwrap();
        store.upsert(&row("clock")).unwrap();
        let all = store.all_with_embeddings().unwrap();
        let (_, embedding) = all.iter().find(|(r, _)| r.name == "clock").unwrap();
        assert_eq!(embedding.as_deref(), Some([1.0_f32, 2.0].as_slice()));
    }

    #[test]
    fn missing_embeddings_lists_unembedded_modules() {
        let store = store();
        store.upsert(&row("clock")).unwrap();
        assert_eq!(store.missing_embeddings().unwrap(), vec!["clock".to_string()]);
        store.set_embedding("clock", &[1.0]).unwrap();
        assert!(store.missing_embeddings().unwrap().is_empty());
    }
}
