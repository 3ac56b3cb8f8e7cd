use chrono::Utc;
use serde::{Deserialize, Serialize};
use zappy_persistence::Database;

use crate::ConfigStoreError;

/// Status of one missing-skill query, driving the background skill-review
/// loop (§3 "Skill-Request Log Entry", §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillRequestStatus {
    /// Logged, not yet reviewed.
    Pending,
    /// A remote registry candidate was found but not yet installed.
    FoundRemote,
    /// A skill was installed to satisfy this request.
    Created,
    /// Review concluded with no viable skill found.
    Failed,
}

impl SkillRequestStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::FoundRemote => "found_remote",
            Self::Created => "created",
            Self::Failed => "failed",
        }
    }

    fn parse(raw: &str) -> Self {
        match raw {
            "found_remote" => Self::FoundRemote,
            "created" => Self::Created,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// One logged query for a skill the registry could not satisfy.
#[derive(Debug, Clone)]
pub struct SkillRequest {
    /// The query text that found no matching skill.
    pub query: String,
    /// How many times this exact query has been logged.
    pub count: u32,
    /// Current review status.
    pub status: SkillRequestStatus,
}

/// `skill_requests(query PK, count, status, updated_at)` — the missing-skill
/// log consumed by the background skill-review loop (§4.4, §9).
#[derive(Clone)]
pub struct SkillRequestLog {
    db: Database,
}

impl SkillRequestLog {
    /// Wraps an already-migrated state database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Records (or bumps the count of) a missing-skill query.
    pub fn record(&self, query: &str) -> Result<(), ConfigStoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO skill_requests (query, count, status, updated_at) VALUES (?1, 1, 'pending', ?2)
                 ON CONFLICT(query) DO UPDATE SET count = count + 1, updated_at = excluded.updated_at",
                rusqlite::params![query, now],
            )
        })?;
        Ok(())
    }

    /// Updates the status of an existing query.
    pub fn set_status(&self, query: &str, status: SkillRequestStatus) -> Result<(), ConfigStoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_connection(|conn| {
            conn.execute(
                "UPDATE skill_requests SET status = ?2, updated_at = ?3 WHERE query = ?1",
                rusqlite::params![query, status.as_str(), now],
            )
        })?;
        Ok(())
    }

    /// All queries still awaiting review, highest-count first (the review
    /// loop prioritises the most-frequently-requested gaps).
    pub fn pending(&self) -> Result<Vec<SkillRequest>, ConfigStoreError> {
        let rows: Vec<(String, u32, String)> = self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT query, count, status FROM skill_requests WHERE status = 'pending' ORDER BY count DESC",
            )?;
            stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()
        })?;
        Ok(rows
            .into_iter()
            .map(|(query, count, status)| SkillRequest {
                query,
                count,
                status: SkillRequestStatus::parse(&status),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zappy_persistence::migrate_state_db;

    fn log() -> SkillRequestLog {
        SkillRequestLog::new(Database::open_in_memory(migrate_state_db).unwrap())
    }

    #[test]
    fn repeated_queries_accumulate_count() {
        let log = log();
        log.record("translate to klingon").unwrap();
        log.record("translate to klingon").unwrap();
        let pending = log.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].count, 2);
    }

    #[test]
    fn resolved_requests_drop_out_of_pending() {
        let log = log();
        log.record("translate to klingon").unwrap();
        log.set_status("translate to klingon", SkillRequestStatus::Created).unwrap();
        assert!(log.pending().unwrap().is_empty());
    }
}
