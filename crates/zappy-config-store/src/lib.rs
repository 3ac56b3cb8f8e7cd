#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Persistent configuration, notable-info lookup, registered perceptions,
//! and the skill-request log — the three (plus one optional) logical
//! tables of §4.4, all backed by one `state.db` SQLite file.

/// Environment-then-DB configuration loading (§6, §2a).
pub mod env_config;
/// Fuzzy-searchable named facts surfaced into every planning prompt.
pub mod notable_info;
/// Registered sensing-module metadata (shared with the Perception Layer).
pub mod perceptions;
/// The missing-skill log consumed by the background skill-review loop.
pub mod skill_requests;
/// Runtime configuration that overrides environment variables.
pub mod system_config;

use thiserror::Error;

/// Failures from the config/KV store.
#[derive(Debug, Error)]
pub enum ConfigStoreError {
    /// The underlying database failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
    /// A stored JSON value did not deserialise as expected.
    #[error("malformed stored value for key {key}: {detail}")]
    Malformed {
        /// Offending key.
        key: String,
        /// What went wrong.
        detail: String,
    },
}

impl From<ConfigStoreError> for zappy_core::error::RuntimeError {
    fn from(err: ConfigStoreError) -> Self {
        Self::Fatal(err.to_string())
    }
}
