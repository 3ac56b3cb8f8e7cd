use chrono::Utc;
use serde_json::Value;
use zappy_core::embedding::{cosine_similarity, pack_embedding, unpack_embedding};
use zappy_model_router::ModelRouter;
use zappy_persistence::Database;

use crate::MemoryError;

const DEFAULT_RELEVANCE_THRESHOLD: f32 = 0.15;

/// One stored long-term memory, see §3 "Memory Entry (long-term)".
#[derive(Debug, Clone)]
pub struct StoredMemory {
    /// Auto-assigned row id.
    pub id: i64,
    /// The memory's text content.
    pub content: String,
    /// Arbitrary metadata (e.g. `{"type": "daily_summary"}`).
    pub metadata: Value,
    /// Unix timestamp when this memory was created.
    pub timestamp: i64,
}

/// A [`StoredMemory`] paired with its similarity score against a query.
#[derive(Debug, Clone)]
pub struct RankedMemory {
    /// The stored memory.
    pub memory: StoredMemory,
    /// Cosine similarity against the query embedding.
    pub score: f32,
}

/// `memories(id AUTOINC, content, embedding BLOB, metadata_json, timestamp)`
/// — long-term vector memory searched by in-process cosine similarity
/// (§4.3). Acceptable to ~10,000 entries per the scaling note; an
/// implementer may substitute a vector index without changing this
/// contract.
#[derive(Clone)]
pub struct LongTermMemory {
    db: Database,
    relevance_threshold: f32,
}

impl LongTermMemory {
    /// Wraps an already-migrated state database with the default
    /// relevance threshold.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            relevance_threshold: DEFAULT_RELEVANCE_THRESHOLD,
        }
    }

    /// Overrides the minimum cosine-similarity score `recall` will return.
    #[must_use]
    pub const fn with_relevance_threshold(mut self, threshold: f32) -> Self {
        self.relevance_threshold = threshold;
        self
    }

    /// Embeds `text` and inserts it as a new long-term memory.
    pub async fn store(
        &self,
        router: &ModelRouter,
        text: &str,
        metadata: Value,
    ) -> Result<i64, MemoryError> {
        let embedding = router.embed(text).await?;
        let packed = pack_embedding(&embedding);
        let timestamp = Utc::now().timestamp();
        let metadata_json = metadata.to_string();
        let id = self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO memories (content, embedding, metadata_json, timestamp) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![text, packed, metadata_json, timestamp],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        Ok(id)
    }

    /// Embeds `query`, scores every stored memory by cosine similarity, and
    /// returns the top `limit` above the configured relevance threshold
    /// (§4.3; the distilled source omits this threshold, this
    /// implementation follows the explicit spec requirement instead — see
    /// DESIGN.md).
    pub async fn recall(&self, router: &ModelRouter, query: &str, limit: usize) -> Result<Vec<RankedMemory>, MemoryError> {
        let query_embedding = router.embed(query).await?;
        let rows: Vec<(i64, String, Vec<u8>, String, i64)> = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT id, content, embedding, metadata_json, timestamp FROM memories")?;
            stmt.query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?
            .collect::<Result<Vec<_>, _>>()
        })?;

        let mut ranked: Vec<RankedMemory> = rows
            .into_iter()
            .map(|(id, content, embedding_bytes, metadata_json, timestamp)| {
                let embedding = unpack_embedding(&embedding_bytes);
                let score = cosine_similarity(&query_embedding, &embedding);
                RankedMemory {
                    memory: StoredMemory {
                        id,
                        content,
                        metadata: serde_json::from_str(&metadata_json).unwrap_or(Value::Null),
                        timestamp,
                    },
                    score,
                }
            })
            .filter(|ranked| ranked.score >= self.relevance_threshold)
            .collect();

        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Deletes a memory by id.
    pub fn delete(&self, id: i64) -> Result<(), MemoryError> {
        self.db.with_connection(|conn| conn.execute("DELETE FROM memories WHERE id = ?1", [id]))?;
        Ok(())
    }

    /// All stored memories, unranked (diagnostics / `get_all`).
    pub fn all(&self) -> Result<Vec<StoredMemory>, MemoryError> {
        let rows = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT id, content, metadata_json, timestamp FROM memories")?;
            stmt.query_map([], |row| {
                let metadata_json: String = row.get(2)?;
                Ok(StoredMemory {
                    id: row.get(0)?,
                    content: row.get(1)?,
                    metadata: serde_json::from_str(&metadata_json).unwrap_or(Value::Null),
                    timestamp: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows)
    }
}
