#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Background sensor drivers that inject events onto the runtime's event
//! channel rather than owning any runtime state themselves (§4.7, §5). Each
//! driver runs its own `tokio::spawn`ed loop and is stopped by dropping its
//! handle or calling `stop()`.

/// The shared `is_speaking` gate preventing Voice Ear self-triggering.
pub mod gate;
/// Scheduled-event watcher, emitting `time_event`s once per due entry.
pub mod time_sensor;
/// Debounced voice-command listener, emitting `voice_input` events.
pub mod voice_ear;

pub use gate::AudioGate;
pub use time_sensor::{ScheduledEvent, TimeSensor};
pub use voice_ear::{AudioCapture, VoiceEar};
