#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Loads skills (built-in + dynamic directories), persists metadata and
//! embeddings, and serves semantic retrieval for the Planner and
//! Orchestrator (§4.2).

/// Declarative dynamic-skill manifest loading (§4.2, §9).
pub mod loader;
/// The skill retrieval/ranking algorithm.
pub mod retrieval;
/// The `SkillRegistry` itself: registration, lookup, config, embeddings.
pub mod registry;
/// SQLite persistence for skill metadata, embeddings, and config.
pub mod store;

pub use registry::{SkillHandle, SkillRegistry};

use thiserror::Error;

/// Failures from the Skill Registry.
#[derive(Debug, Error)]
pub enum SkillRegistryError {
    /// The underlying database failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
    /// No skill is registered under the requested name.
    #[error("no skill registered under name `{0}`")]
    NotFound(String),
    /// The named skill exists but is disabled in its persisted config.
    #[error("skill `{0}` is disabled")]
    Disabled(String),
    /// A dynamic manifest failed to parse or named an unknown template.
    #[error("failed to load skill directory {path}: {detail}")]
    Manifest {
        /// Offending directory.
        path: String,
        /// What went wrong.
        detail: String,
    },
    /// The model router could not embed a skill's description.
    #[error("embedding failed: {0}")]
    Embedding(#[from] zappy_model_router::ModelRouterError),
}

impl From<SkillRegistryError> for zappy_core::error::RuntimeError {
    fn from(err: SkillRegistryError) -> Self {
        match err {
            SkillRegistryError::NotFound(_) | SkillRegistryError::Disabled(_) => {
                Self::Execution(err.to_string())
            }
            SkillRegistryError::Manifest { .. } => Self::Validation(err.to_string()),
            SkillRegistryError::Embedding(inner) => inner.into(),
            SkillRegistryError::Persistence(_) => Self::Fatal(err.to_string()),
        }
    }
}
