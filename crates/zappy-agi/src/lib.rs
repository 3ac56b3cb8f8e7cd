#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Wires every tier of the runtime into one facade: intent classification,
//! plan synthesis, dependency-ordered execution, in-place repair, and
//! reflex/sensor event ingestion (§4.12). Analogous to the distilled
//! source's `agi.AGI` class, but built from `Arc`-shared component handles
//! rather than one monolithic constructor.

/// The handful of built-in reference skills registered by [`AgiBuilder`]
/// for end-to-end testability (§1) — not a product skill surface.
pub mod builtin;
/// The facade itself: [`Agi`], [`AgiBuilder`], and `execute`/`handle_sensor_event`.
pub mod facade;
/// The built-in `voice_commander` reflex bridging sensor events to the brain.
pub mod reflexes;

pub use facade::{Agi, AgiBuilder, ExecuteOutcome};
