#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Sensing modules: gathers environment/digital-world data and normalises it
//! for the runtime (§4.5). A [`layer::PerceptionLayer`] holds the live
//! instances; persistence and embeddings are delegated to
//! `zappy-config-store`'s shared `perceptions` table.

/// Perception metadata and the `PerceptionModule` capability trait.
pub mod base;
/// The `PerceptionLayer`: registration, search, and dispatch.
pub mod layer;

pub use base::{PerceptionMetadata, PerceptionModule};
pub use layer::PerceptionLayer;

use thiserror::Error;

/// Failures from the Perception Layer.
#[derive(Debug, Error)]
pub enum PerceptionError {
    /// The underlying persistence layer failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] zappy_config_store::ConfigStoreError),
    /// No module is registered under the requested name.
    #[error("no perception module registered under name `{0}`")]
    NotFound(String),
    /// The model router could not embed a module's description.
    #[error("embedding failed: {0}")]
    Embedding(#[from] zappy_model_router::ModelRouterError),
}

impl From<PerceptionError> for zappy_core::error::RuntimeError {
    fn from(err: PerceptionError) -> Self {
        match err {
            PerceptionError::NotFound(_) => Self::Execution(err.to_string()),
            PerceptionError::Embedding(inner) => inner.into(),
            PerceptionError::Persistence(inner) => inner.into(),
        }
    }
}
