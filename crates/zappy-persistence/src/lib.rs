#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! SQLite connection bootstrap shared by the Skill Registry, Memory Store,
//! and Config/KV Store (§4.14). The teacher workspace carries no database
//! dependency of its own; `rusqlite` with the `bundled` feature is the
//! convention adopted from the wider example pack (see DESIGN.md) so every
//! persistence-backed crate opens its connection the same way.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;
use thiserror::Error;

/// Failures opening or migrating a database file.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The underlying SQLite driver reported an error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The data directory could not be created.
    #[error("failed to prepare data directory {path}: {source}")]
    DataDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A shared, lock-guarded SQLite connection. `rusqlite::Connection` is not
/// `Sync`; every store wraps one of these behind `parking_lot::Mutex` so it
/// can be held by `Arc` and shared across the async tasks that serialise
/// writes through it (§5 shared-resource policy).
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl Database {
    /// Opens (creating if necessary) the SQLite file at `path`, running the
    /// idempotent `migrate` callback once on the fresh connection.
    pub fn open(
        path: impl AsRef<Path>,
        migrate: impl FnOnce(&Connection) -> rusqlite::Result<()>,
    ) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| PersistenceError::DataDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    /// Opens an in-memory database, primarily for unit tests.
    pub fn open_in_memory(
        migrate: impl FnOnce(&Connection) -> rusqlite::Result<()>,
    ) -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Runs `f` with exclusive access to the connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> rusqlite::Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// The filesystem path backing this database (`:memory:` for in-memory
    /// instances).
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Runs the skill-registry schema migration (§4.2): `skills`, `embeddings`,
/// `skill_configs`.
pub fn migrate_skills_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS skills (
            name TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            sub_category TEXT NOT NULL DEFAULT '',
            json_data TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS embeddings (
            skill_name TEXT PRIMARY KEY REFERENCES skills(name),
            vector BLOB NOT NULL
        );
        CREATE TABLE IF NOT EXISTS skill_configs (
            skill_name TEXT PRIMARY KEY REFERENCES skills(name),
            config_json TEXT NOT NULL
        );
        ",
    )
}

/// Runs the shared state-store schema migration (§4.3, §4.4): `memories`,
/// `system_config`, `notable_information`, `perceptions`, `skill_requests`.
pub fn migrate_state_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS memories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            timestamp INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS system_config (
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS notable_information (
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS perceptions (
            name TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            sub_category TEXT NOT NULL DEFAULT '',
            type TEXT NOT NULL DEFAULT '',
            version TEXT NOT NULL DEFAULT '0.1.0',
            enabled INTEGER NOT NULL DEFAULT 1,
            last_updated TEXT NOT NULL,
            embedding BLOB
        );
        CREATE TABLE IF NOT EXISTS skill_requests (
            query TEXT PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 1,
            status TEXT NOT NULL DEFAULT 'pending',
            updated_at TEXT NOT NULL
        );
        ",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_file_backed_database_and_migrates_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skills.db");
        let db = Database::open(&path, migrate_skills_db).unwrap();
        // Re-opening and re-migrating must not error.
        drop(db);
        let db = Database::open(&path, migrate_skills_db).unwrap();
        db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO skills (name, description, category, sub_category, json_data, updated_at) VALUES (?1, '', '', '', '{}', '')",
                [&"demo"],
            )
        })
        .unwrap();
    }

    #[test]
    fn in_memory_database_runs_migration() {
        let db = Database::open_in_memory(migrate_state_db).unwrap();
        let count: i64 = db
            .with_connection(|conn| conn.query_row("SELECT COUNT(*) FROM system_config", [], |row| row.get(0)))
            .unwrap();
        assert_eq!(count, 0);
    }
}
