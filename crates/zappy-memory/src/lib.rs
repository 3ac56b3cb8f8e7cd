#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Two strictly separate memory tiers (§4.3): an in-memory short-term ring
//! of recent dialogue turns, and a SQLite-backed long-term vector store
//! searched by in-process cosine similarity.

/// Long-term, embedding-searchable memory.
pub mod long_term;
/// In-memory bounded short-term conversation ring.
pub mod short_term;

use thiserror::Error;

/// Failures from either memory tier.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The underlying database failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),
    /// The model router could not embed text.
    #[error("embedding failed: {0}")]
    Embedding(#[from] zappy_model_router::ModelRouterError),
}

impl From<MemoryError> for zappy_core::error::RuntimeError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::Embedding(inner) => inner.into(),
            MemoryError::Persistence(_) => Self::Fatal(err.to_string()),
        }
    }
}

use serde_json::json;
use zappy_model_router::ModelRouter;

use self::long_term::LongTermMemory;
use self::short_term::{ShortTermMemory, WorkingMemory};

/// Coordinates the short-term ring and long-term vector store as one unit,
/// matching the distilled source's `MemoryManager` (§4.3).
pub struct MemoryStore {
    short_term: ShortTermMemory,
    long_term: LongTermMemory,
}

impl MemoryStore {
    /// Wires a short-term ring and a long-term store together.
    #[must_use]
    pub fn new(short_term: ShortTermMemory, long_term: LongTermMemory) -> Self {
        Self { short_term, long_term }
    }

    /// The short-term tier.
    #[must_use]
    pub const fn short_term(&self) -> &ShortTermMemory {
        &self.short_term
    }

    /// The long-term tier.
    #[must_use]
    pub const fn long_term(&self) -> &LongTermMemory {
        &self.long_term
    }

    /// The context window handed to the planner: working memory plus
    /// whatever else the facade wants to fold in (§4.12 step 2).
    #[must_use]
    pub fn get_context_window(&self) -> WorkingMemory {
        self.short_term.working_memory()
    }

    /// Compresses the current short-term turns to a long-term "daily
    /// summary" entry, then clears them. Mirrors the distilled source's
    /// `summarize_and_persist`, with the summarisation window left to the
    /// caller (tests may summarise immediately; production code gates this
    /// behind an age check before calling it).
    pub async fn summarize_and_persist(&self, router: &ModelRouter) -> Result<(), MemoryError> {
        if self.short_term.turns().is_empty() {
            return Ok(());
        }
        self.short_term.update_summary(router).await?;
        let Some(summary) = self.short_term.working_memory().summary else {
            return Ok(());
        };
        self.long_term
            .store(router, &summary, json!({"type": "daily_summary"}))
            .await?;
        self.short_term.clear();
        Ok(())
    }
}
