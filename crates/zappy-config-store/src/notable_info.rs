use chrono::Utc;
use serde_json::Value;
use zappy_persistence::Database;

use crate::ConfigStoreError;

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct NotableInfoHit {
    /// Matched key.
    pub key: String,
    /// Stored value.
    pub value: Value,
    /// Hybrid score used to rank this hit (see [`NotableInfoStore::search`]).
    pub score: f64,
}

const SEARCH_THRESHOLD: f64 = 0.4;

/// `notable_information(key PK, value_json, updated_at)` — named facts
/// surfaced into every planning prompt, fuzzy-searchable by key (§4.4).
#[derive(Clone)]
pub struct NotableInfoStore {
    db: Database,
}

impl NotableInfoStore {
    /// Wraps an already-migrated state database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Upserts a fact.
    pub fn set(&self, key: &str, value: &Value) -> Result<(), ConfigStoreError> {
        let payload = serde_json::to_string(value).map_err(|e| ConfigStoreError::Malformed {
            key: key.to_string(),
            detail: e.to_string(),
        })?;
        let now = Utc::now().to_rfc3339();
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO notable_information (key, value_json, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
                rusqlite::params![key, payload, now],
            )
        })?;
        Ok(())
    }

    /// Exact lookup by key.
    pub fn get(&self, key: &str) -> Result<Option<Value>, ConfigStoreError> {
        let raw: Option<String> = self.db.with_connection(|conn| {
            conn.query_row(
                "SELECT value_json FROM notable_information WHERE key = ?1",
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

    /// Fuzzy-ranks every stored key against `query` (§4.4, §8): hybrid score
    /// is `1.0 + len(query)/len(key)` when `query` is a substring of `key`,
    /// otherwise a Jaro-Winkler similarity ratio in `[0,1]`; only scores
    /// above [`SEARCH_THRESHOLD`] are returned, highest first.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<NotableInfoHit>, ConfigStoreError> {
        let rows: Vec<(String, String)> = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT key, value_json FROM notable_information")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        let query_lower = query.to_lowercase();
        let mut hits: Vec<NotableInfoHit> = Vec::new();
        for (key, payload) in rows {
            let key_lower = key.to_lowercase();
            let score = if !query_lower.is_empty() && key_lower.contains(&query_lower) {
                1.0 + (query_lower.len() as f64 / key_lower.len().max(1) as f64)
            } else {
                strsim::jaro_winkler(&query_lower, &key_lower)
            };
            if score < SEARCH_THRESHOLD {
                continue;
            }
            let value: Value = serde_json::from_str(&payload).map_err(|e| ConfigStoreError::Malformed {
                key: key.clone(),
                detail: e.to_string(),
            })?;
            hits.push(NotableInfoHit { key, value, score });
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zappy_persistence::migrate_state_db;

    fn store() -> NotableInfoStore {
        NotableInfoStore::new(Database::open_in_memory(migrate_state_db).unwrap())
    }

    #[test]
    fn exact_key_match_ranks_first() {
        let store = store();
        store.set("favorite_color", &Value::from("blue")).unwrap();
        store.set("favorite_food", &Value::from("pizza")).unwrap();
        let hits = store.search("favorite_color", 5).unwrap();
        assert_eq!(hits[0].key, "favorite_color");
    }

    #[test]
    fn substring_query_is_found() {
        let store = store();
        store.set("home_address", &Value::from("123 Main St")).unwrap();
        let hits = store.search("address", 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "home_address");
    }

    #[test]
    fn unrelated_query_is_excluded() {
        let store = store();
        store.set("favorite_color", &Value::from("blue")).unwrap();
        let hits = store.search("zzzzzzzzzzzzzz", 5).unwrap();
        assert!(hits.is_empty());
    }
}
