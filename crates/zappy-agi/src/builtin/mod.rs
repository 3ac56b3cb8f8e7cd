//! The handful of built-in reference skills and perception module
//! registered by [`crate::facade::AgiBuilder`] (§1, §8): enough to exercise
//! every tier of the runtime end to end without any external integration.

/// Fire-and-forget back-reference from a plan step into the facade itself.
pub mod brain_interface;
/// Emotion sensing: a fire-and-forget perception and a plan-composable skill.
pub mod emotion;
/// Foundation conversational skill used by the CHAT fast-path and the planner.
pub mod general_chat;
/// Toggles the shared speaking gate around a spoken reply.
pub mod speak;
/// Deterministic text summarisation/extraction reference skill.
pub mod text_analyzer;
/// Config-gated web search reference skill.
pub mod web_search;

pub use brain_interface::AgiBrainInterfaceSkill;
pub use emotion::{EmotionDetectionSkill, EmotionPerceptionModule};
pub use general_chat::GeneralChatSkill;
pub use speak::SpeakSkill;
pub use text_analyzer::TextAnalyzerSkill;
pub use web_search::WebSearchSkill;
