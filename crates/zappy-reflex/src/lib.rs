#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! "If trigger then plan" units that run independent of the deliberative
//! planner until a matching event arrives (§4.6). A [`layer::ReflexLayer`]
//! holds the live registry and turns triggered reflexes into [`zappy_core::action::Plan`]s
//! the Orchestrator can run the same way it runs planner output.

/// Reflex metadata and the `ReflexModule` capability trait.
pub mod base;
/// The `ReflexLayer`: registration and event processing.
pub mod layer;

pub use base::{ReflexMetadata, ReflexModule};
pub use layer::{ReflexLayer, TriggeredPlan};
