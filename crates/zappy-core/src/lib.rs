#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]
#![allow(clippy::module_name_repetitions)]

//! Shared data model, error taxonomy, and event vocabulary for the Zappy
//! agentic runtime. Every other `zappy-*` crate depends on this one for its
//! cross-cutting types so that plans, actions, and events mean the same
//! thing no matter which component produced them.

/// Action, Plan, and DAG validation primitives.
pub mod action;

/// Per-action and per-plan execution state tracking.
pub mod execution;

/// Skill metadata and the `Skill` capability trait.
pub mod skill;

/// The runtime-wide typed event vocabulary.
pub mod event;

/// The runtime-wide error taxonomy (§7).
pub mod error;

/// Packed little-endian float32 embedding codec shared by every store.
pub mod embedding;

/// Tolerant JSON extraction cascade shared by every call site that parses a
/// model's structured output (§9).
pub mod json_extract;

/// Prelude re-exporting the types most consumers need.
pub mod prelude {
    pub use crate::action::{Action, ActionPriority, Plan, PlanMetadata};
    pub use crate::embedding::{cosine_similarity, pack_embedding, unpack_embedding};
    pub use crate::error::RuntimeError;
    pub use crate::event::{Event, EventPhase};
    pub use crate::execution::{ExecutionState, StepResult};
    pub use crate::skill::{Skill, SkillConfigSchema, SkillMetadata};
}
